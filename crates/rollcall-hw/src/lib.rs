//! rollcall-hw: hardware abstraction for scene capture.
//!
//! Provides V4L2-based camera access, pixel format conversion to RGB, and a
//! capture controller that owns the device stream only while in live mode.

pub mod camera;
pub mod capture;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat, V4lDevice};
pub use capture::{CaptureController, CaptureDevice, CaptureMode, FrameSource};
pub use frame::Frame;
