//! Status taxonomy shared by every capture operation.

use std::fmt;

/// Status code reported for a successful operation.
pub const NO_ERROR: i32 = 0;

/// Error type for capture operations.
///
/// Each variant carries a stable numeric status code (see [`CaptureError::code`])
/// so a binding layer can translate it into its own error convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureError {
    /// A caller-supplied argument (handle, index) is not valid.
    InvalidArguments,
    /// The device rejected the requested format.
    InvalidFormatArguments,
    /// The operation is not allowed in the handle's current state.
    InvalidStatus,
    /// The device is in use or cannot change configuration now.
    Busy,
    /// The device node could not be opened.
    OpenFailed,
    /// The capability query failed.
    NoCapabilities,
    /// The crop-capability query failed.
    NoCropCapabilities,
    /// The device cannot capture video.
    CaptureNotSupported,
    /// Setting the crop rectangle failed.
    CroppingFailed,
    /// Format enumeration failed.
    EnumFormatFailed,
    /// Querying a buffer descriptor failed.
    QueryBufferFailed,
    /// Stream-on was refused.
    StreamingFailed,
    /// Memory-mapped streaming is not supported by the driver.
    IoMethodNotSupported,
    /// Low-level I/O failure while talking to the device.
    IoError,
    /// Mapping a buffer into the process failed.
    MemoryMappingFailed,
    /// Handing a buffer to the kernel failed.
    QueueingFailed,
    /// Taking a filled buffer from the kernel failed.
    DequeueingFailed,
    /// The driver granted too few buffers.
    InsufficientMemory,
    /// Permission denied by the system.
    NotPermitted,
    /// An enumeration ran past its last entry.
    NoMoreData,
    /// The device reports frame sizes as a range, not a discrete list.
    PreviewSizeNotSupported,
}

impl CaptureError {
    /// Numeric status code for this error.
    ///
    /// Codes start at 100 and follow taxonomy order. Code 114 is reserved
    /// for a file-creation failure that this engine never reports.
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidArguments => 100,
            Self::InvalidFormatArguments => 101,
            Self::InvalidStatus => 102,
            Self::Busy => 103,
            Self::OpenFailed => 104,
            Self::NoCapabilities => 105,
            Self::NoCropCapabilities => 106,
            Self::CaptureNotSupported => 107,
            Self::CroppingFailed => 108,
            Self::EnumFormatFailed => 109,
            Self::QueryBufferFailed => 110,
            Self::StreamingFailed => 111,
            Self::IoMethodNotSupported => 112,
            Self::IoError => 113,
            Self::MemoryMappingFailed => 115,
            Self::QueueingFailed => 116,
            Self::DequeueingFailed => 117,
            Self::InsufficientMemory => 118,
            Self::NotPermitted => 119,
            Self::NoMoreData => 120,
            Self::PreviewSizeNotSupported => 121,
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidArguments => "invalid arguments",
            Self::InvalidFormatArguments => "invalid format arguments",
            Self::InvalidStatus => "operation not allowed in current state",
            Self::Busy => "video device is busy",
            Self::OpenFailed => "failed to open video device",
            Self::NoCapabilities => "video device capabilities unavailable",
            Self::NoCropCapabilities => "video device crop capabilities unavailable",
            Self::CaptureNotSupported => "video capture is not supported",
            Self::CroppingFailed => "failed to set cropping area",
            Self::EnumFormatFailed => "failed to enumerate pixel formats",
            Self::QueryBufferFailed => "failed to query buffer",
            Self::StreamingFailed => "failed to start streaming",
            Self::IoMethodNotSupported => "memory-mapped I/O is not supported",
            Self::IoError => "I/O error",
            Self::MemoryMappingFailed => "failed to map video memory",
            Self::QueueingFailed => "failed to queue buffer",
            Self::DequeueingFailed => "failed to dequeue buffer",
            Self::InsufficientMemory => "insufficient memory",
            Self::NotPermitted => "operation not permitted",
            Self::NoMoreData => "no more data",
            Self::PreviewSizeNotSupported => "preview size is not supported",
        };
        write!(f, "{msg} (status {})", self.code())
    }
}

impl std::error::Error for CaptureError {}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Flatten a result into a status code: [`NO_ERROR`] or the error's code.
pub fn status_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => NO_ERROR,
        Err(err) => err.code(),
    }
}
