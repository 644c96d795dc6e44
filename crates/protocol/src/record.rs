//! Transfer record model
//!
//! A transfer record describes one device transaction replayed from a
//! captured driver session. Records are decoded once when a script is loaded
//! and are immutable afterwards; the interpreter dispatches on the enum
//! variant rather than on opcode bytes.
//!
//! # Capture rows
//!
//! The captured tables store every record as a 16-byte row. The first byte
//! is either an opcode sentinel or, for plain control transfers, the
//! request type:
//!
//! ```text
//! 0xFA  bulk read            [FA, ep, size_hi, size_lo, ..]
//! 0xFB  repeat until match   [FB, type, req, val_lo, val_hi, idx_lo, idx_hi, len_lo, len_hi, expected, ..]
//! 0xFC  calibration write    [FC, ep, size_hi, size_lo, ..]
//! 0xFD  computed calibrate   [FD, ..]
//! 0xFF  bulk write zeros     [FF, ep, size_hi, size_lo, ..]
//! else  control transfer     [type, req, val_lo, val_hi, idx_lo, idx_hi, len_lo, len_hi, payload[0..8]]
//! ```

use crate::error::{ProtocolError, Result};
use serde::Deserialize;
use std::fmt;

/// Length of one capture row
pub const ROW_LEN: usize = 16;

/// Maximum inline payload a capture row can carry
pub const INLINE_PAYLOAD_MAX: usize = 8;

/// Capacity of the shared working buffer
pub const WORKING_BUFFER_SIZE: usize = 0xFFFF;

/// Size of the zeroed region prepared for a calibration write
pub const CALIBRATION_REGION_SIZE: usize = 0x3000;

/// Length of the generated calibration pattern
pub const COMPUTED_CALIBRATION_LEN: usize = 0xC000;

/// Bytes per step of the generated calibration pattern
pub const COMPUTED_CALIBRATION_RUN: usize = 64;

/// Bulk endpoint the generated calibration pattern is written to
pub const COMPUTED_CALIBRATION_ENDPOINT: u8 = 0x02;

const OP_BULK_READ: u8 = 0xFA;
const OP_REPEAT_CONTROL: u8 = 0xFB;
const OP_CALIBRATION_WRITE: u8 = 0xFC;
const OP_COMPUTED_CALIBRATE: u8 = 0xFD;
const OP_BULK_WRITE_ZEROS: u8 = 0xFF;

/// Control transfer addressing (bmRequestType, bRequest, wValue, wIndex, wLength)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    /// Request type byte (bmRequestType); bit 7 set means device-to-host
    pub request_type: u8,
    /// Request byte (bRequest)
    pub request: u8,
    /// Value parameter (wValue)
    pub value: u16,
    /// Index parameter (wIndex)
    pub index: u16,
    /// Data stage length (wLength)
    pub length: u16,
}

impl ControlSetup {
    /// Whether the data stage flows from device to host
    pub fn is_in(&self) -> bool {
        (self.request_type & 0x80) != 0
    }

    fn from_row(row: &[u8; ROW_LEN], offset: usize) -> Self {
        Self {
            request_type: row[offset],
            request: row[offset + 1],
            value: u16::from_le_bytes([row[offset + 2], row[offset + 3]]),
            index: u16::from_le_bytes([row[offset + 4], row[offset + 5]]),
            length: u16::from_le_bytes([row[offset + 6], row[offset + 7]]),
        }
    }
}

/// Record kind, without parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    PlainControl,
    BulkRead,
    BulkWriteZeros,
    RepeatControlUntil,
    CalibrationWrite,
    ComputedCalibrate,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::PlainControl => "control",
            RecordKind::BulkRead => "bulk_read",
            RecordKind::BulkWriteZeros => "bulk_write_zeros",
            RecordKind::RepeatControlUntil => "repeat_control_until",
            RecordKind::CalibrationWrite => "calibration_write",
            RecordKind::ComputedCalibrate => "computed_calibrate",
        };
        f.write_str(name)
    }
}

/// One decoded device transaction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RecordEntry")]
pub enum TransferRecord {
    /// Control transfer whose data stage is the inline payload
    Control {
        setup: ControlSetup,
        payload: Vec<u8>,
    },
    /// Bulk read of `size` bytes into the working buffer
    BulkRead { endpoint: u8, size: u16 },
    /// Bulk write of `size` zero bytes
    BulkWriteZeros { endpoint: u8, size: u16 },
    /// Control transfer repeated until the first reply byte equals `expected`
    RepeatControlUntil { setup: ControlSetup, expected: u8 },
    /// Bulk write of the calibration payload table, zero padded
    CalibrationWrite { endpoint: u8, size: u16 },
    /// Bulk write of the generated calibration ramp
    ComputedCalibrate,
}

impl TransferRecord {
    /// Decode a 16-byte capture row
    pub fn from_row(row: &[u8]) -> Result<Self> {
        let row: &[u8; ROW_LEN] = row
            .try_into()
            .map_err(|_| ProtocolError::InvalidRowLength {
                len: row.len(),
                expected: ROW_LEN,
            })?;

        let bulk_size = u16::from_be_bytes([row[2], row[3]]);

        let record = match row[0] {
            OP_BULK_READ => TransferRecord::BulkRead {
                endpoint: row[1],
                size: bulk_size,
            },
            OP_REPEAT_CONTROL => TransferRecord::RepeatControlUntil {
                setup: ControlSetup::from_row(row, 1),
                expected: row[9],
            },
            OP_CALIBRATION_WRITE => TransferRecord::CalibrationWrite {
                endpoint: row[1],
                size: bulk_size,
            },
            OP_COMPUTED_CALIBRATE => TransferRecord::ComputedCalibrate,
            OP_BULK_WRITE_ZEROS => TransferRecord::BulkWriteZeros {
                endpoint: row[1],
                size: bulk_size,
            },
            _ => {
                let setup = ControlSetup::from_row(row, 0);
                let inline = usize::from(setup.length).min(INLINE_PAYLOAD_MAX);
                TransferRecord::Control {
                    setup,
                    payload: row[8..8 + inline].to_vec(),
                }
            }
        };

        Ok(record)
    }

    /// Build a control record, checking the payload against the declared length
    pub fn control(setup: ControlSetup, payload: Vec<u8>) -> Result<Self> {
        let record = TransferRecord::Control { setup, payload };
        record.validate()?;
        Ok(record)
    }

    /// Kind of this record
    pub fn kind(&self) -> RecordKind {
        match self {
            TransferRecord::Control { .. } => RecordKind::PlainControl,
            TransferRecord::BulkRead { .. } => RecordKind::BulkRead,
            TransferRecord::BulkWriteZeros { .. } => RecordKind::BulkWriteZeros,
            TransferRecord::RepeatControlUntil { .. } => RecordKind::RepeatControlUntil,
            TransferRecord::CalibrationWrite { .. } => RecordKind::CalibrationWrite,
            TransferRecord::ComputedCalibrate => RecordKind::ComputedCalibrate,
        }
    }

    /// Number of bytes the transaction is expected to move
    pub fn expected_len(&self) -> usize {
        match self {
            TransferRecord::Control { setup, .. }
            | TransferRecord::RepeatControlUntil { setup, .. } => usize::from(setup.length),
            TransferRecord::BulkRead { size, .. }
            | TransferRecord::BulkWriteZeros { size, .. }
            | TransferRecord::CalibrationWrite { size, .. } => usize::from(*size),
            TransferRecord::ComputedCalibrate => COMPUTED_CALIBRATION_LEN,
        }
    }

    /// Check the record against the working buffer constraints
    pub fn validate(&self) -> Result<()> {
        if let TransferRecord::Control { setup, payload } = self {
            if payload.len() > usize::from(setup.length) {
                return Err(ProtocolError::PayloadTooLong {
                    payload: payload.len(),
                    length: setup.length,
                });
            }
        }
        // Every length is a u16, so it always fits in the working buffer
        debug_assert!(self.expected_len() <= WORKING_BUFFER_SIZE);
        Ok(())
    }
}

/// Byte `offset` of the generated calibration pattern
pub fn computed_calibration_byte(offset: usize) -> u8 {
    ((offset / COMPUTED_CALIBRATION_RUN) % 256) as u8
}

/// On-disk record representation: either a raw capture row or a named table
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordEntry {
    Row(Vec<u8>),
    Structured(StructuredRecord),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StructuredRecord {
    Control {
        request_type: u8,
        request: u8,
        #[serde(default)]
        value: u16,
        #[serde(default)]
        index: u16,
        #[serde(default)]
        length: Option<u16>,
        #[serde(default)]
        payload: Vec<u8>,
    },
    BulkRead {
        endpoint: u8,
        size: u16,
    },
    BulkWriteZeros {
        endpoint: u8,
        size: u16,
    },
    RepeatControlUntil {
        request_type: u8,
        request: u8,
        #[serde(default)]
        value: u16,
        #[serde(default)]
        index: u16,
        length: u16,
        expected: u8,
    },
    CalibrationWrite {
        endpoint: u8,
        size: u16,
    },
    ComputedCalibrate,
}

impl TryFrom<RecordEntry> for TransferRecord {
    type Error = ProtocolError;

    fn try_from(entry: RecordEntry) -> Result<Self> {
        let structured = match entry {
            RecordEntry::Row(row) => return TransferRecord::from_row(&row),
            RecordEntry::Structured(structured) => structured,
        };

        let record = match structured {
            StructuredRecord::Control {
                request_type,
                request,
                value,
                index,
                length,
                payload,
            } => {
                let length = match length {
                    Some(length) => length,
                    None => u16::try_from(payload.len()).map_err(|_| {
                        ProtocolError::PayloadLengthOverflow {
                            payload: payload.len(),
                            max: usize::from(u16::MAX),
                        }
                    })?,
                };
                let setup = ControlSetup {
                    request_type,
                    request,
                    value,
                    index,
                    length,
                };
                TransferRecord::control(setup, payload)?
            }
            StructuredRecord::BulkRead { endpoint, size } => {
                TransferRecord::BulkRead { endpoint, size }
            }
            StructuredRecord::BulkWriteZeros { endpoint, size } => {
                TransferRecord::BulkWriteZeros { endpoint, size }
            }
            StructuredRecord::RepeatControlUntil {
                request_type,
                request,
                value,
                index,
                length,
                expected,
            } => TransferRecord::RepeatControlUntil {
                setup: ControlSetup {
                    request_type,
                    request,
                    value,
                    index,
                    length,
                },
                expected,
            },
            StructuredRecord::CalibrationWrite { endpoint, size } => {
                TransferRecord::CalibrationWrite { endpoint, size }
            }
            StructuredRecord::ComputedCalibrate => TransferRecord::ComputedCalibrate,
        };

        Ok(record)
    }
}
