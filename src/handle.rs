//! Device lifecycle: open, configure, release.
//!
//! A [`DeviceHandle`] owns the descriptor, the capability snapshots, the
//! negotiated format and the buffer pool of one capture device. It performs
//! no internal locking; every operation takes `&mut self`, so callers
//! serialize access to a handle by construction.

use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;

use crate::config::CaptureConfig;
use crate::device::V4l2Backend;
use crate::error::{CaptureError, Result};
use crate::format::{to_wire_format, FourCC, PixelFormat};
use crate::pool::BufferPool;
use crate::traits::{
    CropCapabilities, DeviceCapabilities, Format, FormatDescription, FrameSize, Rect,
    VideoBackend,
};

/// Descriptor value of a closed handle.
pub const INVALID_FD: RawFd = -1;

/// One discrete frame size offered by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// An open capture device.
pub struct DeviceHandle<B: VideoBackend = V4l2Backend> {
    pub(crate) backend: B,
    pub(crate) config: CaptureConfig,
    pub(crate) fd: RawFd,
    capabilities: DeviceCapabilities,
    crop_capabilities: Option<CropCapabilities>,
    crop: Option<Rect>,
    formats: Vec<FormatDescription>,
    format: Format,
    pub(crate) pool: Option<BufferPool<B::Mapping>>,
    pub(crate) streaming: bool,
}

impl DeviceHandle<V4l2Backend> {
    /// Open a V4L2 capture device node (e.g., `/dev/video0`).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(V4l2Backend, path.as_ref(), CaptureConfig::default())
    }
}

impl<B: VideoBackend> DeviceHandle<B> {
    /// Open a device through `backend` with the given configuration.
    pub fn open_with(backend: B, path: &Path, config: CaptureConfig) -> Result<Self> {
        let fd = backend.open(path).map_err(|err| {
            log::error!("Can't open video device {} ({err})", path.display());
            match err.raw_os_error() {
                Some(libc::EBUSY) => CaptureError::Busy,
                Some(libc::EPERM | libc::EACCES) => CaptureError::NotPermitted,
                _ => CaptureError::OpenFailed,
            }
        })?;

        // From here on, dropping `handle` closes the descriptor.
        let mut handle = Self {
            backend,
            config,
            fd,
            capabilities: DeviceCapabilities::default(),
            crop_capabilities: None,
            crop: None,
            formats: Vec::new(),
            format: Format::default(),
            pool: None,
            streaming: false,
        };

        handle.capabilities = handle.backend.query_capabilities(fd).map_err(|err| {
            log::error!("Video device capability can not get ({err})");
            CaptureError::NoCapabilities
        })?;
        log_capabilities(&handle.capabilities);

        if !handle.capabilities.can_capture {
            log::error!("Capture is not supported by {}", handle.capabilities.card);
            return Err(CaptureError::CaptureNotSupported);
        }

        match handle.backend.query_crop_capabilities(fd) {
            Ok(caps) => handle.crop_capabilities = Some(caps),
            Err(err) if handle.config.strict_crop => {
                log::error!("Video device crop capability can not get ({err})");
                return Err(CaptureError::NoCropCapabilities);
            }
            Err(err) => log::warn!("No crop capabilities, cropping disabled ({err})"),
        }

        handle.formats = enumerate_formats(&handle.backend, fd)?;

        Ok(handle)
    }

    /// Negotiate the capture format and allocate the buffer pool.
    ///
    /// `format_id` outside the known formats selects [`PixelFormat::DEFAULT`].
    /// A rejected format request is not fatal: the device's own answer is
    /// read back and kept, and only the buffer allocation decides the result.
    pub fn init(&mut self, width: u32, height: u32, format_id: i32) -> Result<()> {
        if self.fd < 0 {
            log::error!("Can't initialize a closed device");
            return Err(CaptureError::InvalidStatus);
        }
        if self.streaming {
            log::error!("Can't initialize while streaming");
            return Err(CaptureError::InvalidStatus);
        }
        if let Some(pool) = self.pool.take() {
            pool.release(&self.backend, self.fd);
        }

        self.apply_crop()?;

        let request = Format::request(width, height, to_wire_format(format_id));
        if let Err(err) = self.backend.set_format(self.fd, &request) {
            match err.raw_os_error() {
                Some(libc::EBUSY) => log::warn!(
                    "Video format can not be changed at this time ({})",
                    CaptureError::Busy
                ),
                Some(libc::EINVAL) => log::warn!(
                    "Invalid format arguments {width}x{height} {} ({})",
                    FourCC::from_wire(request.pixel_format),
                    CaptureError::InvalidFormatArguments
                ),
                _ => log::warn!("Failed to set format ({err})"),
            }
        }

        match self.backend.get_format(self.fd) {
            Ok(format) => {
                log_format(&format);
                self.format = format;
            }
            Err(err) => log::warn!("Failed to read back format ({err})"),
        }

        self.pool = Some(BufferPool::allocate(&self.backend, self.fd, &self.config)?);
        Ok(())
    }

    fn apply_crop(&mut self) -> Result<()> {
        let Some(caps) = self.crop_capabilities else {
            return Ok(());
        };
        let rect = caps.default_rect;
        match self.backend.set_crop(self.fd, rect) {
            Ok(()) => {
                self.crop = Some(rect);
                Ok(())
            }
            Err(err) if err.raw_os_error() == Some(libc::EINVAL) => {
                log::warn!("Cropping is not supported");
                Ok(())
            }
            Err(err) => {
                log::error!("Failed to set cropping area ({err})");
                Err(CaptureError::CroppingFailed)
            }
        }
    }

    /// Release buffers and close the descriptor. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.fd < 0 {
            return;
        }
        if self.streaming {
            self.stop();
        }
        if let Some(pool) = self.pool.take() {
            pool.release(&self.backend, self.fd);
        }

        loop {
            match self.backend.close(self.fd) {
                Ok(()) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::warn!("Failed to close video device ({err})");
                    break;
                }
            }
        }
        log::debug!("Closed video device {}", self.capabilities.card);
        self.fd = INVALID_FD;
    }

    /// Whether the descriptor is still open.
    pub const fn is_open(&self) -> bool {
        self.fd >= 0
    }

    /// Capability snapshot taken at open.
    pub const fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Crop capabilities, if the device reported any.
    pub const fn crop_capabilities(&self) -> Option<&CropCapabilities> {
        self.crop_capabilities.as_ref()
    }

    /// Active crop rectangle, if one was applied.
    pub const fn crop(&self) -> Option<Rect> {
        self.crop
    }

    /// Formats enumerated at open.
    pub fn supported_formats(&self) -> &[FormatDescription] {
        &self.formats
    }

    /// Format the device accepted during the last `init`.
    pub const fn format(&self) -> &Format {
        &self.format
    }

    /// Number of mapped buffers.
    pub fn buffer_count(&self) -> usize {
        self.pool.as_ref().map_or(0, BufferPool::len)
    }

    /// Size of one frame buffer in bytes, once buffers are allocated.
    pub fn frame_size(&self) -> Option<u32> {
        self.pool
            .as_ref()
            .and_then(|pool| pool.buffer(0))
            .and_then(|buffer| u32::try_from(buffer.len()).ok())
    }

    /// Negotiated frame width.
    pub const fn frame_width(&self) -> u32 {
        self.format.width
    }

    /// Negotiated frame height.
    pub const fn frame_height(&self) -> u32 {
        self.format.height
    }

    /// Negotiated pixel format, if it is one of the known formats.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        PixelFormat::from_wire(self.format.pixel_format)
    }

    /// Discrete frame size number `index` for `format_id`.
    ///
    /// Returns [`CaptureError::NoMoreData`] past the last size and
    /// [`CaptureError::PreviewSizeNotSupported`] if the device only reports
    /// a size range.
    pub fn enum_preview_size(&self, index: i32, format_id: i32) -> Result<PreviewSize> {
        let Ok(index) = u32::try_from(index) else {
            log::error!("Invalid preview size index {index}");
            return Err(CaptureError::InvalidArguments);
        };
        if self.fd < 0 {
            return Err(CaptureError::InvalidStatus);
        }

        let wire = to_wire_format(format_id);
        match self.backend.enum_frame_size(self.fd, wire, index) {
            Ok(FrameSize::Discrete { width, height }) => Ok(PreviewSize { width, height }),
            Ok(FrameSize::Stepwise {
                min_width,
                max_width,
                min_height,
                max_height,
            }) => {
                log::warn!(
                    "{} sizes are a range {min_width}x{min_height}..{max_width}x{max_height}",
                    FourCC::from_wire(wire)
                );
                Err(CaptureError::PreviewSizeNotSupported)
            }
            Err(err) if err.raw_os_error() == Some(libc::EINVAL) => Err(CaptureError::NoMoreData),
            Err(err) => {
                log::error!("Failed to enumerate frame sizes ({err})");
                Err(CaptureError::IoError)
            }
        }
    }

    /// Every discrete frame size the device offers for `format`.
    pub fn supported_preview_sizes(&self, format: PixelFormat) -> Result<Vec<PreviewSize>> {
        let mut sizes = Vec::new();
        for index in 0.. {
            match self.enum_preview_size(index, format.id()) {
                Ok(size) => sizes.push(size),
                Err(CaptureError::NoMoreData) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(sizes)
    }

    /// The backend this handle talks through.
    pub const fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: VideoBackend> Drop for DeviceHandle<B> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<B: VideoBackend> std::fmt::Debug for DeviceHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("fd", &self.fd)
            .field("card", &self.capabilities.card)
            .field("format", &self.format)
            .field("buffers", &self.buffer_count())
            .field("streaming", &self.streaming)
            .finish_non_exhaustive()
    }
}

fn enumerate_formats<B: VideoBackend>(backend: &B, fd: RawFd) -> Result<Vec<FormatDescription>> {
    let mut formats = Vec::new();
    for index in 0.. {
        match backend.enum_format(fd, index) {
            Ok(desc) => {
                log::info!(
                    "Format {}: {} '{}'{}",
                    desc.index,
                    desc.fourcc,
                    desc.description,
                    if desc.compressed { " (compressed)" } else { "" }
                );
                formats.push(desc);
            }
            Err(err) if err.raw_os_error() == Some(libc::EINVAL) => break,
            Err(err) => {
                log::error!("Failed to enumerate pixel formats ({err})");
                return Err(CaptureError::EnumFormatFailed);
            }
        }
    }
    Ok(formats)
}

fn log_capabilities(caps: &DeviceCapabilities) {
    let (major, minor, patch) = caps.version;
    log::info!("Video device capabilities...");
    log::info!("  Driver : {}", caps.driver);
    log::info!("  Card   : {}", caps.card);
    log::info!("  Bus    : {}", caps.bus_info);
    log::info!("  Version: {major}.{minor}.{patch}");
    log::info!("  Flags  : {}", caps.flags);
}

fn log_format(format: &Format) {
    log::info!(
        "Pixel format: {}x{} {} stride={} size={}",
        format.width,
        format.height,
        FourCC::from_wire(format.pixel_format),
        format.stride,
        format.size
    );
}
