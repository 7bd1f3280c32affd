use std::time::Duration;

use anyhow::Result;
use rollcall_core::{AttendanceDeterminer, GeminiClient};
use rollcall_hw::V4lDevice;
use rollcall_store::SqliteStore;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rollcalld starting");

    let config = config::Config::from_env()?;

    let store = SqliteStore::open(&config.db_path).await?;
    let client = GeminiClient::new(config.gemini())?;
    if !client.has_credential() {
        tracing::warn!(
            "no API key configured (ROLLCALL_API_KEY or GEMINI_API_KEY); determinations will fail"
        );
    }

    let info = engine::EngineInfo {
        model: client.model().to_string(),
        credential_configured: client.has_credential(),
        camera_device: config.camera_device.clone(),
        database: config.db_path.display().to_string(),
    };
    let device = V4lDevice::new(config.camera_device.clone(), config.warmup_frames);
    let engine = engine::Engine::new(AttendanceDeterminer::new(client, store), device, info);
    let (handle, engine_task) = engine::spawn_engine(engine);

    let connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, AttendanceService::new(handle))?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    // Dropping the service drops the last engine handle; the engine then
    // drains in-flight requests and closes the store.
    connection
        .object_server()
        .remove::<AttendanceService, _>(OBJECT_PATH)
        .await?;
    drop(connection);

    match tokio::time::timeout(SHUTDOWN_GRACE, engine_task).await {
        Ok(joined) => joined?,
        Err(_) => tracing::warn!("engine did not finish in time; exiting anyway"),
    }

    Ok(())
}
