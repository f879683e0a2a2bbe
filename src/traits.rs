//! The kernel boundary and the plain data exchanged across it.
//!
//! [`VideoBackend`] names one method per V4L2 request the engine issues.
//! Methods return [`std::io::Result`] so the caller can map the raw `errno`
//! to a status; no policy lives behind this seam.

use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::time::Duration;

use crate::format::FourCC;

/// Capability snapshot taken right after open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Driver version as (major, minor, patch).
    pub version: (u8, u8, u8),
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming I/O.
    pub can_stream: bool,
    /// Human-readable capability flags, for diagnostics.
    pub flags: String,
}

/// A rectangle in sensor coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Cropping limits reported by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropCapabilities {
    /// Area the sensor can capture at all.
    pub bounds: Rect,
    /// Crop rectangle the driver recommends.
    pub default_rect: Rect,
}

/// One entry of the driver's format enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescription {
    /// Enumeration index.
    pub index: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Driver-supplied description.
    pub description: String,
    /// Whether the format is compressed.
    pub compressed: bool,
}

/// Negotiated (or requested) single-plane format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Wire pixel format.
    pub pixel_format: u32,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// A format request; the driver fills in stride and size.
    #[must_use]
    pub const fn request(width: u32, height: u32, pixel_format: u32) -> Self {
        Self {
            width,
            height,
            pixel_format,
            stride: 0,
            size: 0,
        }
    }
}

/// Location of one driver buffer, as answered by a buffer query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Buffer index.
    pub index: u32,
    /// Length in bytes.
    pub length: u32,
    /// Offset to pass to `mmap`.
    pub offset: u32,
}

/// A dequeued buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    /// Buffer index.
    pub index: u32,
    /// Bytes the driver wrote.
    pub bytes_used: u32,
    /// Frame sequence number.
    pub sequence: u32,
}

/// One entry of the driver's frame-size enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    /// A single supported size.
    Discrete {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// A continuous or stepped range of sizes.
    Stepwise {
        /// Smallest width.
        min_width: u32,
        /// Largest width.
        max_width: u32,
        /// Smallest height.
        min_height: u32,
        /// Largest height.
        max_height: u32,
    },
}

/// Access to a V4L2 capture device.
///
/// Implementations must not retry or interpret failures.
pub trait VideoBackend {
    /// A buffer mapped into the process; dropping it unmaps it.
    type Mapping: AsRef<[u8]>;

    /// Open the device node read-only.
    fn open(&self, path: &Path) -> io::Result<RawFd>;

    /// Close a descriptor.
    fn close(&self, fd: RawFd) -> io::Result<()>;

    /// `VIDIOC_QUERYCAP`.
    fn query_capabilities(&self, fd: RawFd) -> io::Result<DeviceCapabilities>;

    /// `VIDIOC_CROPCAP` for the capture queue.
    fn query_crop_capabilities(&self, fd: RawFd) -> io::Result<CropCapabilities>;

    /// `VIDIOC_S_CROP` for the capture queue.
    fn set_crop(&self, fd: RawFd, rect: Rect) -> io::Result<()>;

    /// `VIDIOC_ENUM_FMT` entry `index` of the capture queue.
    fn enum_format(&self, fd: RawFd, index: u32) -> io::Result<FormatDescription>;

    /// `VIDIOC_S_FMT` with interlaced field order.
    fn set_format(&self, fd: RawFd, format: &Format) -> io::Result<()>;

    /// `VIDIOC_G_FMT`.
    fn get_format(&self, fd: RawFd) -> io::Result<Format>;

    /// `VIDIOC_REQBUFS` for MMAP buffers; returns the granted count.
    fn request_buffers(&self, fd: RawFd, count: u32) -> io::Result<u32>;

    /// `VIDIOC_QUERYBUF`.
    fn query_buffer(&self, fd: RawFd, index: u32) -> io::Result<BufferInfo>;

    /// Map a queried buffer read-only and shared.
    fn map_buffer(&self, fd: RawFd, info: &BufferInfo) -> io::Result<Self::Mapping>;

    /// `VIDIOC_QBUF`.
    fn queue_buffer(&self, fd: RawFd, index: u32) -> io::Result<()>;

    /// `VIDIOC_DQBUF`.
    fn dequeue_buffer(&self, fd: RawFd) -> io::Result<DequeuedBuffer>;

    /// `VIDIOC_STREAMON`.
    fn stream_on(&self, fd: RawFd) -> io::Result<()>;

    /// `VIDIOC_STREAMOFF`.
    fn stream_off(&self, fd: RawFd) -> io::Result<()>;

    /// Wait until the descriptor is readable. `Ok(false)` means the timeout
    /// elapsed first.
    fn wait_readable(&self, fd: RawFd, timeout: Duration) -> io::Result<bool>;

    /// `VIDIOC_ENUM_FRAMESIZES` entry `index` for a wire format.
    fn enum_frame_size(&self, fd: RawFd, pixel_format: u32, index: u32) -> io::Result<FrameSize>;
}
