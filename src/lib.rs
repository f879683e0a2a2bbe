//! uvc-capture: a blocking V4L2 frame capture engine.
//!
//! The engine opens a capture device, negotiates format and resolution,
//! maps a pool of kernel-owned frame buffers and delivers one frame per
//! blocking [`DeviceHandle::capture`] call. Every kernel request goes through
//! the [`traits::VideoBackend`] seam, so the same engine runs against real
//! hardware ([`V4l2Backend`]) and a simulated device in tests.
//!
//! Handles are not synchronized. All operations on one handle must come from
//! one thread at a time; distinct handles are independent.

mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod handle;
pub mod pool;
pub mod registry;
pub mod retry;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use config::CaptureConfig;
pub use device::V4l2Backend;
pub use error::{status_code, CaptureError, Result, NO_ERROR};
pub use format::{from_wire_format, to_wire_format, FourCC, PixelFormat};
pub use handle::{DeviceHandle, PreviewSize};
pub use registry::{HandleId, Registry, INVALID_VALUE};
pub use traits::VideoBackend;
