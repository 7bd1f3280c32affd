//! Capture mode state machine with scoped stream ownership.
//!
//! The controller holds a device stream only while in [`CaptureMode::Live`].
//! Leaving live mode, dropping the controller, or any device failure
//! releases the stream, so no exit path can leave the camera open.

use crate::camera::CameraError;
use crate::frame::Frame;

// --- Named constants ---
const SNAPSHOT_ATTEMPTS: usize = 3;
const SNAPSHOT_JPEG_QUALITY: u8 = 90;

/// Where the next scene image comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Frames are grabbed from an open device stream.
    Live,
    /// The caller supplies an image file; no device is held.
    Upload,
}

/// A source of frames that stays acquired for as long as the value lives.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

/// A capture device that can be acquired on demand.
pub trait CaptureDevice {
    type Stream: FrameSource;

    /// Human-readable device name for logs.
    fn name(&self) -> &str;

    /// Open the device stream. Dropping the returned stream releases it.
    fn acquire(&mut self) -> Result<Self::Stream, CameraError>;
}

/// Live/upload mode switch over a single capture device.
pub struct CaptureController<D: CaptureDevice> {
    device: D,
    mode: CaptureMode,
    stream: Option<D::Stream>,
}

impl<D: CaptureDevice> CaptureController<D> {
    /// Start in upload mode, holding nothing.
    pub fn new(device: D) -> Self {
        Self {
            device,
            mode: CaptureMode::Upload,
            stream: None,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Whether a device stream is currently held.
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Switch to live capture, acquiring the device stream.
    ///
    /// If the device cannot be acquired (permission denied, missing, busy)
    /// the controller falls back to upload mode and the error is returned
    /// so the caller can tell the user.
    pub fn enter_live(&mut self) -> Result<(), CameraError> {
        if self.mode == CaptureMode::Live && self.stream.is_some() {
            return Ok(());
        }
        match self.device.acquire() {
            Ok(stream) => {
                self.stream = Some(stream);
                self.mode = CaptureMode::Live;
                tracing::info!(device = self.device.name(), "live capture started");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    device = self.device.name(),
                    error = %e,
                    "live capture unavailable; falling back to upload"
                );
                self.fall_back();
                Err(e)
            }
        }
    }

    /// Switch to upload mode, releasing any held stream.
    pub fn enter_upload(&mut self) {
        self.release();
        self.mode = CaptureMode::Upload;
    }

    /// Grab one still from the live stream and encode it as JPEG.
    ///
    /// Dark frames are skipped for a few attempts. A device error releases
    /// the stream and falls back to upload mode before it is returned.
    pub fn snapshot(&mut self) -> Result<Vec<u8>, CameraError> {
        let stream = match (self.mode, self.stream.as_mut()) {
            (CaptureMode::Live, Some(stream)) => stream,
            _ => return Err(CameraError::NotLive),
        };

        let mut result = Err(CameraError::DarkScene);
        for attempt in 0..SNAPSHOT_ATTEMPTS {
            match stream.next_frame() {
                Ok(frame) if frame.is_dark => {
                    tracing::debug!(attempt, seq = frame.sequence, "skipping dark frame");
                }
                Ok(frame) => {
                    result = frame.to_jpeg(SNAPSHOT_JPEG_QUALITY).map_err(CameraError::from);
                    break;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        match result {
            Ok(jpeg) => {
                tracing::info!(bytes = jpeg.len(), "snapshot captured");
                Ok(jpeg)
            }
            Err(CameraError::DarkScene) => Err(CameraError::DarkScene),
            Err(e) => {
                tracing::warn!(error = %e, "snapshot failed; releasing device");
                self.fall_back();
                Err(e)
            }
        }
    }

    fn fall_back(&mut self) {
        self.release();
        self.mode = CaptureMode::Upload;
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!(device = self.device.name(), "capture stream released");
        }
    }
}

impl<D: CaptureDevice> Drop for CaptureController<D> {
    fn drop(&mut self) {
        self.release();
    }
}
