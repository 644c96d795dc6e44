//! Test utilities for the scan engine
//!
//! `MockTransport` stands in for the scanner: it records every call, replays
//! queued bulk-read payloads and control replies, and fails chosen calls.
//!
//! # Example
//!
//! ```
//! use scanner::test_utils::{MockTransport, bulk_read};
//! use scanner::{Interpreter, PollLimit, TransferTimeouts};
//!
//! let transport = MockTransport::new().with_bulk_read(vec![1, 2, 3]);
//! let mut interp = Interpreter::new(
//!     transport,
//!     TransferTimeouts::default(),
//!     PollLimit::default(),
//!     Vec::new(),
//! );
//! assert_eq!(interp.execute(&bulk_read(3)).transferred(), 3);
//! assert_eq!(interp.staged(0, 3), &[1, 2, 3]);
//! ```

use crate::usb::Transport;
use protocol::{ControlSetup, ScriptSet, TransferRecord, TransferScript, UsbError};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Bulk endpoint the test scripts read image data from
pub const TEST_READ_ENDPOINT: u8 = 0x03;

/// One call observed by `MockTransport`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// Control transfer with the buffer contents as handed to the transport
    Control { setup: ControlSetup, data: Vec<u8> },
    BulkRead { endpoint: u8, len: usize },
    BulkWrite { endpoint: u8, data: Vec<u8> },
    Reset,
}

/// Scripted stand-in for the scanner
///
/// Control IN transfers pop the next queued reply; with none queued they
/// report the full length and leave the buffer as staged. Bulk reads pop the
/// next queued payload; with none queued they time out. Bulk writes accept
/// everything up to the write limit.
#[derive(Debug, Default)]
pub struct MockTransport {
    calls: Vec<TransportCall>,
    bulk_reads: VecDeque<Result<Vec<u8>, UsbError>>,
    control_replies: VecDeque<Result<Vec<u8>, UsbError>>,
    failures: HashMap<usize, UsbError>,
    write_limit: Option<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a payload for the next bulk read
    pub fn with_bulk_read(mut self, data: Vec<u8>) -> Self {
        self.bulk_reads.push_back(Ok(data));
        self
    }

    /// Queue an error for the next bulk read
    pub fn with_bulk_read_error(mut self, error: UsbError) -> Self {
        self.bulk_reads.push_back(Err(error));
        self
    }

    /// Queue a reply for the next control IN transfer
    pub fn with_control_reply(mut self, data: Vec<u8>) -> Self {
        self.control_replies.push_back(Ok(data));
        self
    }

    /// Queue an error for the next control IN transfer
    pub fn with_control_error(mut self, error: UsbError) -> Self {
        self.control_replies.push_back(Err(error));
        self
    }

    /// Fail the call with the given index (counting every call from zero)
    pub fn fail_call(mut self, index: usize, error: UsbError) -> Self {
        self.failures.insert(index, error);
        self
    }

    /// Cap the bytes accepted by each bulk write
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    pub fn calls(&self) -> &[TransportCall] {
        &self.calls
    }

    pub fn control_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Control { .. }))
            .count()
    }

    pub fn bulk_read_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, TransportCall::BulkRead { .. }))
            .count()
    }

    /// Endpoint and data of every bulk write, in order
    pub fn bulk_writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::BulkWrite { endpoint, data } => Some((*endpoint, data.clone())),
                _ => None,
            })
            .collect()
    }

    /// `value` field of every control transfer, in order
    pub fn control_values(&self) -> Vec<u16> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Control { setup, .. } => Some(setup.value),
                _ => None,
            })
            .collect()
    }

    pub fn reset_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Reset))
            .count()
    }

    fn record(&mut self, call: TransportCall) -> Result<(), UsbError> {
        let index = self.calls.len();
        self.calls.push(call);
        match self.failures.remove(&index) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Transport for MockTransport {
    fn control_transfer(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.record(TransportCall::Control {
            setup: *setup,
            data: buf.to_vec(),
        })?;

        if !setup.is_in() {
            return Ok(buf.len());
        }

        match self.control_replies.pop_front() {
            Some(Ok(reply)) => {
                let n = reply.len().min(buf.len());
                buf[..n].copy_from_slice(&reply[..n]);
                Ok(n)
            }
            Some(Err(error)) => Err(error),
            None => Ok(buf.len()),
        }
    }

    fn bulk_read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.record(TransportCall::BulkRead {
            endpoint,
            len: buf.len(),
        })?;

        match self.bulk_reads.pop_front() {
            Some(Ok(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(Err(error)) => Err(error),
            None => Err(UsbError::Timeout),
        }
    }

    fn bulk_write(
        &mut self,
        endpoint: u8,
        buf: &[u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        let accepted = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.record(TransportCall::BulkWrite {
            endpoint,
            data: buf.to_vec(),
        })?;
        Ok(accepted)
    }

    fn reset(&mut self) -> Result<(), UsbError> {
        self.record(TransportCall::Reset)
    }
}

/// Vendor OUT control record carrying `payload`, tagged by `value`
pub fn control_out(value: u16, payload: &[u8]) -> TransferRecord {
    TransferRecord::Control {
        setup: ControlSetup {
            request_type: 0x40,
            request: 0x0c,
            value,
            index: 0,
            length: payload.len() as u16,
        },
        payload: payload.to_vec(),
    }
}

/// Status poll waiting for `expected`
pub fn repeat_until(expected: u8) -> TransferRecord {
    TransferRecord::RepeatControlUntil {
        setup: ControlSetup {
            request_type: 0xc0,
            request: 0x0c,
            value: 0x87,
            index: 0,
            length: 1,
        },
        expected,
    }
}

/// Bulk read of `size` bytes from the test read endpoint
pub fn bulk_read(size: u16) -> TransferRecord {
    TransferRecord::BulkRead {
        endpoint: TEST_READ_ENDPOINT,
        size,
    }
}

/// Script bundle with one tagged control record per phase
///
/// Each phase's record carries a distinct `value` so tests can tell from
/// the transport log which scripts ran: init 0x10, setup 0x20 (color) or
/// 0x21 (monochrome), calibration 0x30, finalize 0xF0. The scan scripts
/// are supplied by the caller.
pub fn script_set(scan_color: Vec<TransferRecord>, scan_monochrome: Vec<TransferRecord>) -> ScriptSet {
    ScriptSet {
        init: TransferScript::new(vec![control_out(0x10, &[0x01])]),
        setup_color: TransferScript::new(vec![control_out(0x20, &[0x02])]),
        setup_monochrome: TransferScript::new(vec![control_out(0x21, &[0x02])]),
        calibration: TransferScript::new(vec![control_out(0x30, &[0x03])]),
        scan_color: TransferScript::new(scan_color),
        scan_monochrome: TransferScript::new(scan_monochrome),
        finalize: TransferScript::new(vec![control_out(0xF0, &[0x04])]),
        calibration_payload: Vec::new(),
    }
}
