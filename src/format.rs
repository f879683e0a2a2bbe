//! Pixel formats and their mapping to V4L2 wire identifiers.

use std::fmt;

/// Pixel format code as four ASCII bytes (e.g., YUYV, RGBP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// Kernel wire identifier, `v4l2_fourcc(a, b, c, d)`.
    #[must_use]
    pub const fn to_wire(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Decode a kernel wire identifier.
    #[must_use]
    pub const fn from_wire(wire: u32) -> Self {
        Self(wire.to_le_bytes())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            let ch = if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '.'
            };
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

/// Pixel formats the engine can negotiate, in stable id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 16-bit RGB 5-6-5.
    Rgb565 = 0,
    /// 32-bit RGB.
    Rgb32 = 1,
    /// 32-bit BGR.
    Bgr32 = 2,
    /// Packed 4:2:2, Y0 U Y1 V.
    Yuyv = 3,
    /// Packed 4:2:2, U Y0 V Y1.
    Uyvy = 4,
    /// Planar 4:2:0.
    Yuv420 = 5,
    /// Planar 4:1:0.
    Yuv410 = 6,
    /// Planar 4:2:2.
    Yuv422P = 7,
}

/// Id reported for a wire format outside the table.
pub const UNKNOWN_FORMAT_ID: i32 = -1;

impl PixelFormat {
    /// Every known format in id order.
    pub const ALL: [Self; 8] = [
        Self::Rgb565,
        Self::Rgb32,
        Self::Bgr32,
        Self::Yuyv,
        Self::Uyvy,
        Self::Yuv420,
        Self::Yuv410,
        Self::Yuv422P,
    ];

    /// Format substituted for ids outside the table.
    pub const DEFAULT: Self = Self::Yuyv;

    /// Look up a format by its numeric id.
    #[must_use]
    pub const fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::Rgb565),
            1 => Some(Self::Rgb32),
            2 => Some(Self::Bgr32),
            3 => Some(Self::Yuyv),
            4 => Some(Self::Uyvy),
            5 => Some(Self::Yuv420),
            6 => Some(Self::Yuv410),
            7 => Some(Self::Yuv422P),
            _ => None,
        }
    }

    /// Numeric id of this format.
    #[must_use]
    pub const fn id(self) -> i32 {
        self as i32
    }

    /// Four-character code used by the kernel for this format.
    #[must_use]
    pub const fn fourcc(self) -> FourCC {
        match self {
            Self::Rgb565 => FourCC::new(b"RGBP"),
            Self::Rgb32 => FourCC::new(b"RGB4"),
            Self::Bgr32 => FourCC::new(b"BGR4"),
            Self::Yuyv => FourCC::new(b"YUYV"),
            Self::Uyvy => FourCC::new(b"UYVY"),
            Self::Yuv420 => FourCC::new(b"YU12"),
            Self::Yuv410 => FourCC::new(b"YUV9"),
            Self::Yuv422P => FourCC::new(b"422P"),
        }
    }

    /// Kernel wire identifier for this format.
    #[must_use]
    pub const fn wire(self) -> u32 {
        self.fourcc().to_wire()
    }

    /// Reverse lookup from a kernel wire identifier.
    #[must_use]
    pub fn from_wire(wire: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.wire() == wire)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fourcc())
    }
}

/// Wire identifier for a format id.
///
/// Ids outside the table map to [`PixelFormat::DEFAULT`] instead of failing.
#[must_use]
pub fn to_wire_format(id: i32) -> u32 {
    match PixelFormat::from_id(id) {
        Some(format) => format.wire(),
        None => {
            log::debug!(
                "Unknown pixel format id {id}, falling back to {}",
                PixelFormat::DEFAULT
            );
            PixelFormat::DEFAULT.wire()
        }
    }
}

/// Format id for a wire identifier, or [`UNKNOWN_FORMAT_ID`].
#[must_use]
pub fn from_wire_format(wire: u32) -> i32 {
    PixelFormat::from_wire(wire).map_or(UNKNOWN_FORMAT_ID, PixelFormat::id)
}
