use rollcall_core::PipelineError;
use rollcall_hw::CameraError;
use serde::Serialize;
use zbus::fdo;
use zbus::interface;

use crate::engine::{EngineError, EngineHandle};

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    engine: EngineHandle,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Enroll a new identity from a reference photo. Returns the identity id.
    async fn enroll(&self, name: &str, photo: Vec<u8>) -> fdo::Result<String> {
        tracing::info!(name, bytes = photo.len(), "enroll requested");
        Ok(self.engine.enroll(name.to_string(), photo).await?)
    }

    /// Remove an enrolled identity by id. Past records are left untouched.
    async fn remove_identity(&self, id: &str) -> fdo::Result<bool> {
        tracing::info!(id, "remove_identity requested");
        Ok(self.engine.remove(id.to_string()).await?)
    }

    /// List the roster as a JSON array.
    async fn list_roster(&self) -> fdo::Result<String> {
        to_json(&self.engine.roster().await?)
    }

    /// Determine attendance from an uploaded scene image.
    async fn take_attendance(&self, image: Vec<u8>) -> fdo::Result<String> {
        tracing::info!(bytes = image.len(), "take_attendance requested");
        to_json(&self.engine.take(image).await?)
    }

    /// Capture one still from the camera and determine attendance from it.
    async fn take_attendance_live(&self) -> fdo::Result<String> {
        tracing::info!("take_attendance_live requested");
        to_json(&self.engine.take_live().await?)
    }

    /// All sessions, most recent first, as a JSON array.
    async fn history(&self) -> fdo::Result<String> {
        to_json(&self.engine.history().await?)
    }

    /// Aggregate statistics over the whole history.
    async fn stats(&self) -> fdo::Result<String> {
        to_json(&self.engine.stats().await?)
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        to_json(&self.engine.status().await?)
    }
}

impl From<EngineError> for fdo::Error {
    fn from(e: EngineError) -> Self {
        tracing::warn!(error = %e, "request failed");
        let msg = e.to_string();
        match e {
            EngineError::EmptyName | EngineError::Image(_) => fdo::Error::InvalidArgs(msg),
            EngineError::Camera(CameraError::PermissionDenied(_)) => fdo::Error::AccessDenied(msg),
            EngineError::Camera(CameraError::DeviceNotFound(_)) => fdo::Error::FileNotFound(msg),
            EngineError::Pipeline(PipelineError::EmptyRoster) => fdo::Error::NotSupported(msg),
            EngineError::ChannelClosed => fdo::Error::ServiceUnknown(msg),
            _ => fdo::Error::Failed(msg),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| fdo::Error::Failed(format!("encoding reply: {e}")))
}
