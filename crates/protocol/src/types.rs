//! Scan mode, frame shape and transport error types
//!
//! These are the small shared vocabulary types used by the script tables
//! and by the scanner crate that executes them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// USB transport error kinds
///
/// Mirrors the libusb error codes a transfer can fail with. The scanner crate
/// maps `rusb::Error` onto this type so the interpreter never depends on rusb.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum UsbError {
    /// Transfer timed out
    Timeout,
    /// Endpoint stalled (protocol error)
    Pipe,
    /// Device was disconnected
    NoDevice,
    /// Device or endpoint not found
    NotFound,
    /// Device is busy
    Busy,
    /// Buffer overflow
    Overflow,
    /// I/O error
    Io,
    /// Invalid parameter
    InvalidParam,
    /// Access denied (permissions)
    Access,
    /// Other error with message
    Other { message: String },
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::Timeout => write!(f, "transfer timed out"),
            UsbError::Pipe => write!(f, "endpoint stalled"),
            UsbError::NoDevice => write!(f, "device disconnected"),
            UsbError::NotFound => write!(f, "device or endpoint not found"),
            UsbError::Busy => write!(f, "device busy"),
            UsbError::Overflow => write!(f, "buffer overflow"),
            UsbError::Io => write!(f, "I/O error"),
            UsbError::InvalidParam => write!(f, "invalid parameter"),
            UsbError::Access => write!(f, "access denied"),
            UsbError::Other { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for UsbError {}

/// Scan mode selected at session start
///
/// Fixes the setup and scan scripts, the output frame shape and whether the
/// streamed bytes are bit-inverted before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// 24-bit RGB at 100 dpi
    #[default]
    Color,
    /// 1-bit line art at 200 dpi ("text" mode)
    #[serde(alias = "text", alias = "mono")]
    Monochrome,
}

impl ScanMode {
    /// Optical resolution the scripts for this mode were captured at
    pub fn dpi(self) -> u32 {
        match self {
            ScanMode::Color => 100,
            ScanMode::Monochrome => 200,
        }
    }

    /// The device reports inverted luminance in monochrome mode
    pub fn inverts_output(self) -> bool {
        matches!(self, ScanMode::Monochrome)
    }

    /// Output frame shape for this mode
    pub fn frame_shape(self) -> FrameShape {
        match self {
            ScanMode::Color => FrameShape::COLOR,
            ScanMode::Monochrome => FrameShape::MONOCHROME,
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Color => write!(f, "color"),
            ScanMode::Monochrome => write!(f, "monochrome"),
        }
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "color" | "colour" | "rgb" => Ok(ScanMode::Color),
            "monochrome" | "mono" | "text" | "lineart" => Ok(ScanMode::Monochrome),
            other => Err(format!(
                "Invalid scan mode '{}', must be one of: color, text",
                other
            )),
        }
    }
}

/// Geometry of the image produced by one scan
///
/// These are fixed properties of the captured scripts, not computed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    /// Bits per sample
    pub pixel_depth: u8,
    /// Number of scan lines
    pub row_count: u32,
    /// Pixels in one scan line
    pub pixels_per_row: u32,
    /// Bytes in one scan line
    pub bytes_per_row: u32,
}

impl FrameShape {
    pub const COLOR: FrameShape = FrameShape {
        pixel_depth: 8,
        row_count: 1221,
        pixels_per_row: 826,
        bytes_per_row: 2478,
    };

    pub const MONOCHROME: FrameShape = FrameShape {
        pixel_depth: 1,
        row_count: 2342,
        pixels_per_row: 1656,
        bytes_per_row: 207,
    };

    /// Total number of image bytes the device streams for one frame
    pub fn frame_bytes(&self) -> u64 {
        u64::from(self.bytes_per_row) * u64::from(self.row_count)
    }
}
