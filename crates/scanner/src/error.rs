//! Scanner error types

use crate::session::SessionState;
use common::DeviceFilter;
use protocol::{ProtocolError, RecordKind, UsbError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Script phase a record was executed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Setup,
    Calibration,
    Scan,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Setup => "setup",
            Phase::Calibration => "calibration",
            Phase::Scan => "scan",
            Phase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the scan engine
#[derive(Debug, Error)]
pub enum ScanError {
    /// Bus-level failure: stall, disconnect, transfer timeout
    #[error("{phase} record {index} ({kind}) failed: {error}")]
    Transport {
        phase: Phase,
        index: usize,
        kind: RecordKind,
        error: UsbError,
    },

    /// Transfer completed without moving any of the expected bytes
    #[error("{phase} record {index} ({kind}) transferred nothing (expected {expected} bytes)")]
    NothingTransferred {
        phase: Phase,
        index: usize,
        kind: RecordKind,
        expected: usize,
    },

    /// Poll loop did not see the expected status byte within its bound
    #[error(
        "{phase} record {index}: device never reported {expected:#04x} ({attempts} polls in {elapsed:?})"
    )]
    ProtocolTimeout {
        phase: Phase,
        index: usize,
        expected: u8,
        attempts: u32,
        elapsed: Duration,
    },

    /// No device matching the filter is attached
    #[error("No scanner matching {filter} found")]
    DeviceNotFound { filter: DeviceFilter },

    /// Device was found but could not be opened or configured
    #[error("Failed to open scanner: {0}")]
    Open(UsbError),

    /// Hard reset after cancel failed
    #[error("Failed to reset scanner: {0}")]
    Reset(UsbError),

    /// Operation is not valid in the current session state
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Script bundle error
    #[error(transparent)]
    Script(#[from] ProtocolError),
}

impl ScanError {
    /// Transport error behind this failure, if any
    pub fn usb_error(&self) -> Option<&UsbError> {
        match self {
            ScanError::Transport { error, .. }
            | ScanError::Open(error)
            | ScanError::Reset(error) => Some(error),
            _ => None,
        }
    }
}

/// Type alias for scanner results
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = ScanError::Transport {
            phase: Phase::Calibration,
            index: 7,
            kind: RecordKind::CalibrationWrite,
            error: UsbError::Pipe,
        };
        let msg = err.to_string();
        assert!(msg.contains("calibration record 7"));
        assert!(msg.contains("calibration_write"));
        assert!(msg.contains("stalled"));
        assert_eq!(err.usb_error(), Some(&UsbError::Pipe));
    }

    #[test]
    fn test_protocol_timeout_display() {
        let err = ScanError::ProtocolTimeout {
            phase: Phase::Setup,
            index: 2,
            expected: 0x02,
            attempts: 2000,
            elapsed: Duration::from_secs(30),
        };
        let msg = err.to_string();
        assert!(msg.contains("0x02"));
        assert!(msg.contains("2000 polls"));
        assert!(err.usb_error().is_none());
    }

    #[test]
    fn test_device_not_found_display() {
        let err = ScanError::DeviceNotFound {
            filter: common::COLORADO_2400U,
        };
        assert_eq!(err.to_string(), "No scanner matching 0x0461:0x0346 found");
    }
}
