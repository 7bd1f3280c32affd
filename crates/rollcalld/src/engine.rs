use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rollcall_core::history::{self, HistorySummary};
use rollcall_core::normalize;
use rollcall_core::store::{attendance_history, roster_or_empty};
use rollcall_core::{
    AttendanceDeterminer, AttendanceRecord, Determination, Identity, NormalizeError, PipelineError,
    Recognizer, RosterStore,
};
use rollcall_hw::{CameraError, CaptureController, CaptureDevice};
use rollcall_store::SqliteStore;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

const REQUEST_QUEUE: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("image error: {0}")]
    Image(#[from] NormalizeError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("storage error: {0}")]
    Store(#[from] rollcall_store::Error),
    #[error("display name must not be empty")]
    EmptyName,
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("engine task exited")]
    ChannelClosed,
}

/// One enrolled identity as shown to clients (reference photo omitted).
#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub enrolled_at: DateTime<Utc>,
    pub photo_bytes: usize,
}

/// Result of one determination.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    pub record_id: String,
    pub captured_at: DateTime<Utc>,
    pub present: Vec<String>,
    pub absent: Vec<String>,
    pub roster_size: usize,
    pub confidence: Option<String>,
    pub reasoning: Option<String>,
    /// Names that matched more than one identity; all of them were marked.
    pub ambiguous_names: Vec<String>,
}

impl AttendanceReport {
    fn new(roster: &[Identity], det: &Determination) -> Self {
        let (present, absent): (Vec<&Identity>, Vec<&Identity>) = roster
            .iter()
            .partition(|i| det.record.present_identity_ids.contains(&i.id));

        Self {
            record_id: det.record.id.clone(),
            captured_at: det.record.captured_at,
            present: display_names(present),
            absent: display_names(absent),
            roster_size: det.record.roster_size_at_capture,
            confidence: det.outcome.confidence.clone(),
            reasoning: det.outcome.reasoning.clone(),
            ambiguous_names: det.ambiguous_names.clone(),
        }
    }
}

fn display_names(identities: Vec<&Identity>) -> Vec<String> {
    identities.into_iter().map(|i| i.display_name.clone()).collect()
}

/// One past session, most recent first in a history listing.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    /// Present identities still on the roster, by name.
    pub present: Vec<String>,
    pub present_count: usize,
    pub absent_count: usize,
    pub roster_size: usize,
    pub note: Option<String>,
}

impl HistoryEntry {
    fn new(record: &AttendanceRecord, names: &HashMap<&str, &str>) -> Self {
        Self {
            id: record.id.clone(),
            captured_at: record.captured_at,
            present: record
                .present_identity_ids
                .iter()
                .filter_map(|id| names.get(id.as_str()).map(|n| n.to_string()))
                .collect(),
            present_count: record.present_count(),
            absent_count: record.absent_count(),
            roster_size: record.roster_size_at_capture,
            note: record.note.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub roster_size: usize,
    #[serde(flatten)]
    pub summary: HistorySummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub model: String,
    pub credential_configured: bool,
    pub camera_device: String,
    pub database: String,
    pub roster_size: usize,
    pub sessions: usize,
}

/// Static facts about the running daemon reported by `Status`.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub model: String,
    pub credential_configured: bool,
    pub camera_device: String,
    pub database: String,
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from D-Bus handlers to the engine task.
enum EngineRequest {
    Enroll {
        name: String,
        photo: Vec<u8>,
        reply: Reply<String>,
    },
    Remove {
        id: String,
        reply: Reply<bool>,
    },
    Roster {
        reply: Reply<Vec<RosterEntry>>,
    },
    Take {
        image: Vec<u8>,
        reply: Reply<AttendanceReport>,
    },
    TakeLive {
        reply: Reply<AttendanceReport>,
    },
    History {
        reply: Reply<Vec<HistoryEntry>>,
    },
    Stats {
        reply: Reply<StatsReport>,
    },
    Status {
        reply: Reply<StatusReport>,
    },
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Normalize a reference photo and add a new identity; returns its id.
    pub async fn enroll(&self, name: String, photo: Vec<u8>) -> Result<String, EngineError> {
        self.request(|reply| EngineRequest::Enroll { name, photo, reply }).await
    }

    pub async fn remove(&self, id: String) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Remove { id, reply }).await
    }

    pub async fn roster(&self) -> Result<Vec<RosterEntry>, EngineError> {
        self.request(|reply| EngineRequest::Roster { reply }).await
    }

    /// Determine attendance from an uploaded scene image.
    pub async fn take(&self, image: Vec<u8>) -> Result<AttendanceReport, EngineError> {
        self.request(|reply| EngineRequest::Take { image, reply }).await
    }

    /// Capture one still from the camera and determine attendance from it.
    pub async fn take_live(&self) -> Result<AttendanceReport, EngineError> {
        self.request(|reply| EngineRequest::TakeLive { reply }).await
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, EngineError> {
        self.request(|reply| EngineRequest::History { reply }).await
    }

    pub async fn stats(&self) -> Result<StatsReport, EngineError> {
        self.request(|reply| EngineRequest::Stats { reply }).await
    }

    pub async fn status(&self) -> Result<StatusReport, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

/// Request handlers over one store connection, one recognition client and
/// one capture device.
pub struct Engine<R, D> {
    determiner: AttendanceDeterminer<R, SqliteStore>,
    device: D,
    info: EngineInfo,
}

impl<R, D> Engine<R, D>
where
    R: Recognizer + 'static,
    D: CaptureDevice + Clone + Send + Sync + 'static,
{
    pub fn new(
        determiner: AttendanceDeterminer<R, SqliteStore>,
        device: D,
        info: EngineInfo,
    ) -> Self {
        Self {
            determiner,
            device,
            info,
        }
    }

    fn store(&self) -> &SqliteStore {
        self.determiner.store()
    }

    async fn handle(&self, req: EngineRequest) {
        // A send error means the caller went away; the work is already done.
        match req {
            EngineRequest::Enroll { name, photo, reply } => {
                let _ = reply.send(self.enroll(name, photo).await);
            }
            EngineRequest::Remove { id, reply } => {
                let _ = reply.send(self.remove(id).await);
            }
            EngineRequest::Roster { reply } => {
                let _ = reply.send(Ok(self.roster().await));
            }
            EngineRequest::Take { image, reply } => {
                let _ = reply.send(self.take(image).await);
            }
            EngineRequest::TakeLive { reply } => {
                let _ = reply.send(self.take_live().await);
            }
            EngineRequest::History { reply } => {
                let _ = reply.send(Ok(self.history().await));
            }
            EngineRequest::Stats { reply } => {
                let _ = reply.send(Ok(self.stats().await));
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(Ok(self.status().await));
            }
        }
    }

    async fn enroll(&self, name: String, photo: Vec<u8>) -> Result<String, EngineError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::EmptyName);
        }

        let reference =
            tokio::task::spawn_blocking(move || normalize::normalize_reference(&photo)).await??;

        let duplicate = match self.store().is_name_enrolled(&name).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "duplicate-name check failed; enrolling anyway");
                false
            }
        };
        if duplicate {
            tracing::warn!(
                name = %name,
                "name already enrolled; sessions cannot tell these identities apart"
            );
        }

        let identity = Identity::enroll(name, reference);
        let id = identity.id.clone();
        tracing::info!(
            id = %id,
            name = %identity.display_name,
            bytes = identity.reference_image.len(),
            "enrolling identity"
        );
        self.store().put_identity(identity).await?;
        Ok(id)
    }

    async fn remove(&self, id: String) -> Result<bool, EngineError> {
        let removed = self.store().delete_identity(id.clone()).await?;
        tracing::info!(id = %id, removed, "remove identity");
        Ok(removed)
    }

    async fn roster(&self) -> Vec<RosterEntry> {
        roster_or_empty(self.store())
            .await
            .into_iter()
            .map(|i| RosterEntry {
                photo_bytes: i.reference_image.len(),
                id: i.id,
                name: i.display_name,
                enrolled_at: i.enrolled_at,
            })
            .collect()
    }

    async fn take(&self, image: Vec<u8>) -> Result<AttendanceReport, EngineError> {
        let scene = tokio::task::spawn_blocking(move || normalize::normalize_scene(&image)).await??;
        self.determine(scene).await
    }

    async fn take_live(&self) -> Result<AttendanceReport, EngineError> {
        if self.store().count_identities().await? == 0 {
            return Err(PipelineError::EmptyRoster.into());
        }

        let device = self.device.clone();
        let jpeg = tokio::task::spawn_blocking(move || {
            let mut controller = CaptureController::new(device);
            controller.enter_live()?;
            controller.snapshot()
        })
        .await??;

        let scene = normalize::normalize_scene(&jpeg)?;
        self.determine(scene).await
    }

    async fn determine(
        &self,
        scene: rollcall_core::EncodedImage,
    ) -> Result<AttendanceReport, EngineError> {
        let roster = roster_or_empty(self.store()).await;
        let det = self.determiner.determine_with(&roster, scene).await?;
        Ok(AttendanceReport::new(&roster, &det))
    }

    async fn history(&self) -> Vec<HistoryEntry> {
        let roster = roster_or_empty(self.store()).await;
        let names: HashMap<&str, &str> = roster
            .iter()
            .map(|i| (i.id.as_str(), i.display_name.as_str()))
            .collect();
        attendance_history(self.store())
            .await
            .iter()
            .map(|r| HistoryEntry::new(r, &names))
            .collect()
    }

    async fn stats(&self) -> StatsReport {
        let roster_size = count_or_zero("roster", self.store().count_identities()).await;
        let records = attendance_history(self.store()).await;
        StatsReport {
            roster_size,
            summary: history::summarize(&records, roster_size),
        }
    }

    async fn status(&self) -> StatusReport {
        StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            model: self.info.model.clone(),
            credential_configured: self.info.credential_configured,
            camera_device: self.info.camera_device.clone(),
            database: self.info.database.clone(),
            roster_size: count_or_zero("roster", self.store().count_identities()).await,
            sessions: count_or_zero("history", self.store().count_records()).await,
        }
    }
}

/// Count for read-only reports; a storage failure degrades to zero.
async fn count_or_zero(
    what: &'static str,
    count: impl std::future::Future<Output = rollcall_store::Result<usize>>,
) -> usize {
    count.await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, what, "count failed; reporting zero");
        0
    })
}

/// Spawn the engine request loop.
///
/// Every request runs in its own task, so a slow determination never blocks
/// roster or history queries and a write finishes even when its caller has
/// gone. Once every handle is dropped the loop drains in-flight requests and
/// closes the store; the returned task completes after that.
pub fn spawn_engine<R, D>(engine: Engine<R, D>) -> (EngineHandle, JoinHandle<()>)
where
    R: Recognizer + 'static,
    D: CaptureDevice + Clone + Send + Sync + 'static,
{
    let store = engine.store().clone();
    let engine = Arc::new(engine);
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(REQUEST_QUEUE);

    let task = tokio::spawn(async move {
        tracing::info!("engine task started");
        let mut inflight = JoinSet::new();
        while let Some(req) = rx.recv().await {
            let engine = Arc::clone(&engine);
            inflight.spawn(async move { engine.handle(req).await });
            // Reap finished requests so the set stays small.
            while inflight.try_join_next().is_some() {}
        }

        while let Some(done) = inflight.join_next().await {
            if let Err(e) = done {
                tracing::warn!(error = %e, "request task failed");
            }
        }
        drop(engine);

        if let Err(e) = store.close().await {
            tracing::warn!(error = %e, "store close failed");
        }
        tracing::info!("engine task exiting");
    });

    (EngineHandle { tx }, task)
}
