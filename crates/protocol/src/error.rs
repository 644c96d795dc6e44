//! Protocol error types

use thiserror::Error;

/// Errors raised while decoding transfer records or loading a script bundle
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A capture row did not have exactly 16 bytes
    #[error("Invalid capture row length: {len} bytes (expected {expected})")]
    InvalidRowLength { len: usize, expected: usize },

    /// Inline control payload is longer than the declared transfer length
    #[error("Control payload too long: {payload} bytes for a {length}-byte transfer")]
    PayloadTooLong { payload: usize, length: u16 },

    /// Control payload is too long for its length to fit the setup packet
    #[error("Control payload length overflows wLength: {payload} bytes (max: {max})")]
    PayloadLengthOverflow { payload: usize, max: usize },

    /// Calibration payload does not fit into the calibration region
    #[error("Calibration payload too large: {size} bytes (max: {max})")]
    CalibrationPayloadTooLarge { size: usize, max: usize },

    /// A record was rejected while loading a named script
    #[error("Invalid record {index} in script '{script}': {source}")]
    InvalidRecord {
        script: &'static str,
        index: usize,
        #[source]
        source: Box<ProtocolError>,
    },

    /// Script bundle could not be parsed
    #[error("Failed to parse script bundle: {0}")]
    Parse(#[from] toml::de::Error),

    /// I/O error while reading a script bundle
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::PayloadTooLong {
            payload: 9,
            length: 4,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("9 bytes"));
        assert!(msg.contains("4-byte"));
    }

    #[test]
    fn test_invalid_record_display() {
        let err = ProtocolError::InvalidRecord {
            script: "init",
            index: 3,
            source: Box::new(ProtocolError::InvalidRowLength {
                len: 15,
                expected: 16,
            }),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("record 3"));
        assert!(msg.contains("'init'"));
        assert!(msg.contains("15 bytes"));
    }
}
