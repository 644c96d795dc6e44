//! Script interpreter
//!
//! Executes transfer records against a `Transport` and classifies each
//! outcome as full, partial or failed. The interpreter owns the working
//! buffer: every record stages its payload there, and bulk reads leave their
//! data there for the streaming read buffer to hand out.

use crate::buffer::WorkingBuffer;
use crate::error::{Phase, Result, ScanError};
use crate::usb::Transport;
use protocol::{
    CALIBRATION_REGION_SIZE, COMPUTED_CALIBRATION_ENDPOINT, COMPUTED_CALIBRATION_LEN,
    ControlSetup, RecordKind, TransferRecord, UsbError, computed_calibration_byte,
};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Per-transfer timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTimeouts {
    /// Control transfers, including each poll of a repeat record
    pub control: Duration,
    /// Bulk reads of scan data
    pub bulk_read: Duration,
    /// Bulk writes (zeros, calibration data)
    pub bulk_write: Duration,
}

impl Default for TransferTimeouts {
    fn default() -> Self {
        Self {
            control: Duration::from_millis(300),
            bulk_read: Duration::from_millis(3000),
            bulk_write: Duration::from_millis(100),
        }
    }
}

/// Bound on the repeat-until-match poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollLimit {
    /// Maximum number of control transfers per repeat record
    pub max_attempts: u32,
    /// Wall-clock cap per repeat record
    pub timeout: Duration,
    /// Pause between polls
    pub interval: Duration,
}

impl Default for PollLimit {
    fn default() -> Self {
        Self {
            max_attempts: 2000,
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(5),
        }
    }
}

/// Why a record failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The transport reported an error
    Transport(UsbError),
    /// The transfer completed but moved none of the expected bytes
    NothingTransferred { expected: usize },
    /// The poll loop hit its bound without seeing the expected byte
    PollTimeout {
        expected: u8,
        attempts: u32,
        elapsed: Duration,
    },
}

impl Failure {
    /// Whether a tolerant script may continue past this failure
    ///
    /// A vanished device and an exhausted poll bound end the session
    /// regardless of policy.
    pub fn is_tolerable(&self) -> bool {
        match self {
            Failure::Transport(UsbError::NoDevice) => false,
            Failure::Transport(_) | Failure::NothingTransferred { .. } => true,
            Failure::PollTimeout { .. } => false,
        }
    }

    pub fn into_error(self, phase: Phase, index: usize, kind: RecordKind) -> ScanError {
        match self {
            Failure::Transport(error) => ScanError::Transport {
                phase,
                index,
                kind,
                error,
            },
            Failure::NothingTransferred { expected } => ScanError::NothingTransferred {
                phase,
                index,
                kind,
                expected,
            },
            Failure::PollTimeout {
                expected,
                attempts,
                elapsed,
            } => ScanError::ProtocolTimeout {
                phase,
                index,
                expected,
                attempts,
                elapsed,
            },
        }
    }
}

/// Classified result of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Full { transferred: usize },
    Partial { transferred: usize, expected: usize },
    Failed(Failure),
}

impl Outcome {
    /// Classify a transport result against the expected byte count
    pub fn classify(result: std::result::Result<usize, UsbError>, expected: usize) -> Self {
        match result {
            Err(e) => Outcome::Failed(Failure::Transport(e)),
            Ok(n) if n >= expected => Outcome::Full { transferred: n },
            Ok(0) => Outcome::Failed(Failure::NothingTransferred { expected }),
            Ok(n) => Outcome::Partial {
                transferred: n,
                expected,
            },
        }
    }

    /// Bytes actually moved; zero for failures
    pub fn transferred(&self) -> usize {
        match self {
            Outcome::Full { transferred } | Outcome::Partial { transferred, .. } => *transferred,
            Outcome::Failed(_) => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// What to do when a record fails while running a whole script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failed record
    Abort,
    /// Log and continue; setup scripts contain advisory status queries
    Tolerate,
}

/// Aggregate classification of a script run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptReport {
    pub full: usize,
    pub partial: usize,
    pub failed: usize,
}

impl ScriptReport {
    pub fn executed(&self) -> usize {
        self.full + self.partial + self.failed
    }
}

pub struct Interpreter<T> {
    transport: T,
    buffer: WorkingBuffer,
    timeouts: TransferTimeouts,
    poll: PollLimit,
    calibration_payload: Vec<u8>,
}

impl<T: Transport> Interpreter<T> {
    pub fn new(
        transport: T,
        timeouts: TransferTimeouts,
        poll: PollLimit,
        calibration_payload: Vec<u8>,
    ) -> Self {
        Self {
            transport,
            buffer: WorkingBuffer::new(),
            timeouts,
            poll,
            calibration_payload,
        }
    }

    /// Execute one record and classify the outcome
    pub fn execute(&mut self, record: &TransferRecord) -> Outcome {
        trace!("Executing {} record", record.kind());

        match record {
            TransferRecord::Control { setup, payload } => {
                let len = usize::from(setup.length);
                let buf = self.buffer.load(payload, len);
                let result =
                    self.transport
                        .control_transfer(setup, &mut buf[..len], self.timeouts.control);
                Outcome::classify(result, len)
            }

            TransferRecord::BulkRead { endpoint, size } => {
                let len = usize::from(*size);
                let buf = self.buffer.prefix_mut(len);
                let result = self
                    .transport
                    .bulk_read(*endpoint, buf, self.timeouts.bulk_read);
                Outcome::classify(result, len)
            }

            TransferRecord::BulkWriteZeros { endpoint, size } => {
                let len = usize::from(*size);
                let buf = self.buffer.zero(len);
                let result = self
                    .transport
                    .bulk_write(*endpoint, buf, self.timeouts.bulk_write);
                Outcome::classify(result, len)
            }

            TransferRecord::CalibrationWrite { endpoint, size } => {
                let len = usize::from(*size);
                let buf = self
                    .buffer
                    .load(&self.calibration_payload, CALIBRATION_REGION_SIZE.max(len));
                let result =
                    self.transport
                        .bulk_write(*endpoint, &buf[..len], self.timeouts.bulk_write);
                Outcome::classify(result, len)
            }

            TransferRecord::ComputedCalibrate => {
                let buf = self.buffer.prefix_mut(COMPUTED_CALIBRATION_LEN);
                for (offset, byte) in buf.iter_mut().enumerate() {
                    *byte = computed_calibration_byte(offset);
                }
                let result = self.transport.bulk_write(
                    COMPUTED_CALIBRATION_ENDPOINT,
                    buf,
                    self.timeouts.bulk_write,
                );
                Outcome::classify(result, COMPUTED_CALIBRATION_LEN)
            }

            TransferRecord::RepeatControlUntil { setup, expected } => {
                self.poll_until(setup, *expected)
            }
        }
    }

    /// Repeat a control transfer until the first reply byte matches
    fn poll_until(&mut self, setup: &ControlSetup, expected: u8) -> Outcome {
        let len = usize::from(setup.length);
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let buf = self.buffer.zero(len);
            match self
                .transport
                .control_transfer(setup, buf, self.timeouts.control)
            {
                Err(e) => return Outcome::Failed(Failure::Transport(e)),
                Ok(n) if n > 0 && buf[0] == expected => {
                    debug!("Device reported {:#04x} after {} polls", expected, attempts);
                    return Outcome::Full { transferred: n };
                }
                Ok(_) => {}
            }

            let elapsed = started.elapsed();
            if attempts >= self.poll.max_attempts || elapsed >= self.poll.timeout {
                return Outcome::Failed(Failure::PollTimeout {
                    expected,
                    attempts,
                    elapsed,
                });
            }

            if !self.poll.interval.is_zero() {
                thread::sleep(self.poll.interval);
            }
        }
    }

    /// Execute every record of a script in order
    pub fn run_script(
        &mut self,
        phase: Phase,
        script: &[TransferRecord],
        policy: FailurePolicy,
    ) -> Result<ScriptReport> {
        let mut report = ScriptReport::default();

        for (index, record) in script.iter().enumerate() {
            match self.execute(record) {
                Outcome::Full { .. } => report.full += 1,
                Outcome::Partial {
                    transferred,
                    expected,
                } => {
                    warn!(
                        "{} record {} ({}): short transfer, {} of {} bytes",
                        phase,
                        index,
                        record.kind(),
                        transferred,
                        expected
                    );
                    report.partial += 1;
                }
                Outcome::Failed(failure) => {
                    report.failed += 1;
                    if policy == FailurePolicy::Tolerate && failure.is_tolerable() {
                        warn!(
                            "{} record {} ({}) failed, continuing: {:?}",
                            phase,
                            index,
                            record.kind(),
                            failure
                        );
                        continue;
                    }

                    let err = failure.into_error(phase, index, record.kind());
                    error!("Aborting {} script: {}", phase, err);
                    return Err(err);
                }
            }
        }

        info!(
            "{} script complete: {} records ({} full, {} partial, {} failed)",
            phase,
            report.executed(),
            report.full,
            report.partial,
            report.failed
        );
        Ok(report)
    }

    /// Bytes left in the working buffer by the last bulk read
    pub fn staged(&self, offset: usize, len: usize) -> &[u8] {
        self.buffer.slice(offset, len)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockTransport, TransportCall, bulk_read, control_out, repeat_until};

    fn interpreter(transport: MockTransport) -> Interpreter<MockTransport> {
        Interpreter::new(
            transport,
            TransferTimeouts::default(),
            PollLimit {
                max_attempts: 5,
                timeout: Duration::from_secs(5),
                interval: Duration::ZERO,
            },
            vec![0xa1, 0xa2, 0xa3],
        )
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            Outcome::classify(Ok(4), 4),
            Outcome::Full { transferred: 4 }
        );
        assert_eq!(
            Outcome::classify(Ok(0), 0),
            Outcome::Full { transferred: 0 }
        );
        assert_eq!(
            Outcome::classify(Ok(3), 4),
            Outcome::Partial {
                transferred: 3,
                expected: 4
            }
        );
        assert_eq!(
            Outcome::classify(Ok(0), 4),
            Outcome::Failed(Failure::NothingTransferred { expected: 4 })
        );
        assert_eq!(
            Outcome::classify(Err(UsbError::Pipe), 4),
            Outcome::Failed(Failure::Transport(UsbError::Pipe))
        );
    }

    #[test]
    fn test_control_sends_inline_payload() {
        let mut interp = interpreter(MockTransport::new());
        let outcome = interp.execute(&control_out(0x87, &[0x01, 0x02]));

        assert_eq!(outcome, Outcome::Full { transferred: 2 });
        match &interp.transport().calls()[0] {
            TransportCall::Control { setup, data } => {
                assert_eq!(setup.value, 0x87);
                assert_eq!(data, &vec![0x01, 0x02]);
            }
            other => panic!("Expected control call, got {:?}", other),
        }
    }

    #[test]
    fn test_control_in_short_reply_is_partial() {
        let setup = ControlSetup {
            request_type: 0xc0,
            request: 0x0c,
            value: 0,
            index: 0,
            length: 4,
        };
        let record = TransferRecord::Control {
            setup,
            payload: Vec::new(),
        };
        let mut interp = interpreter(MockTransport::new().with_control_reply(vec![0x55]));

        assert_eq!(
            interp.execute(&record),
            Outcome::Partial {
                transferred: 1,
                expected: 4
            }
        );
    }

    #[test]
    fn test_bulk_read_stages_data() {
        let mut interp = interpreter(MockTransport::new().with_bulk_read(vec![5, 6, 7, 8]));
        let outcome = interp.execute(&bulk_read(4));

        assert_eq!(outcome, Outcome::Full { transferred: 4 });
        assert_eq!(interp.staged(0, 4), &[5, 6, 7, 8]);
        assert_eq!(interp.staged(2, 2), &[7, 8]);
    }

    #[test]
    fn test_bulk_read_failures() {
        let mut interp = interpreter(
            MockTransport::new()
                .with_bulk_read(Vec::new())
                .with_bulk_read_error(UsbError::Timeout),
        );

        assert_eq!(
            interp.execute(&bulk_read(4)),
            Outcome::Failed(Failure::NothingTransferred { expected: 4 })
        );
        assert_eq!(
            interp.execute(&bulk_read(4)),
            Outcome::Failed(Failure::Transport(UsbError::Timeout))
        );
    }

    #[test]
    fn test_bulk_write_zeros() {
        let mut interp = interpreter(MockTransport::new());
        // Dirty the buffer first
        interp.execute(&control_out(0, &[0xff, 0xff, 0xff]));

        let outcome = interp.execute(&TransferRecord::BulkWriteZeros {
            endpoint: 2,
            size: 16,
        });

        assert_eq!(outcome, Outcome::Full { transferred: 16 });
        assert_eq!(
            interp.transport().bulk_writes()[0],
            (2, vec![0u8; 16])
        );
    }

    #[test]
    fn test_calibration_write_prefixes_payload() {
        let mut interp = interpreter(MockTransport::new());
        let outcome = interp.execute(&TransferRecord::CalibrationWrite {
            endpoint: 2,
            size: 0x3000,
        });

        assert_eq!(outcome, Outcome::Full { transferred: 0x3000 });
        let (endpoint, data) = &interp.transport().bulk_writes()[0];
        assert_eq!(*endpoint, 2);
        assert_eq!(data.len(), 0x3000);
        assert_eq!(&data[..3], &[0xa1, 0xa2, 0xa3]);
        assert!(data[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_computed_calibrate_pattern() {
        let mut interp = interpreter(MockTransport::new());
        let outcome = interp.execute(&TransferRecord::ComputedCalibrate);

        assert_eq!(outcome, Outcome::Full { transferred: 0xC000 });
        let (endpoint, data) = &interp.transport().bulk_writes()[0];
        assert_eq!(*endpoint, COMPUTED_CALIBRATION_ENDPOINT);
        assert_eq!(data.len(), 0xC000);
        for (k, &byte) in data.iter().enumerate() {
            assert_eq!(byte, ((k / 64) % 256) as u8, "offset {}", k);
        }
    }

    #[test]
    fn test_short_bulk_write_is_partial() {
        let mut interp = interpreter(MockTransport::new().with_write_limit(10));
        assert_eq!(
            interp.execute(&TransferRecord::ComputedCalibrate),
            Outcome::Partial {
                transferred: 10,
                expected: 0xC000
            }
        );
    }

    #[test]
    fn test_repeat_until_match() {
        let mut interp = interpreter(
            MockTransport::new()
                .with_control_reply(vec![0x00])
                .with_control_reply(vec![0x01])
                .with_control_reply(vec![0x02]),
        );

        assert_eq!(
            interp.execute(&repeat_until(0x02)),
            Outcome::Full { transferred: 1 }
        );
        assert_eq!(interp.transport().control_count(), 3);
    }

    #[test]
    fn test_repeat_until_is_bounded() {
        let mut interp = interpreter(MockTransport::new());

        match interp.execute(&repeat_until(0x02)) {
            Outcome::Failed(Failure::PollTimeout {
                expected, attempts, ..
            }) => {
                assert_eq!(expected, 0x02);
                assert_eq!(attempts, 5);
            }
            other => panic!("Expected poll timeout, got {:?}", other),
        }
        assert_eq!(interp.transport().control_count(), 5);
    }

    #[test]
    fn test_repeat_until_transport_error() {
        let mut interp = interpreter(
            MockTransport::new()
                .with_control_reply(vec![0x00])
                .with_control_error(UsbError::NoDevice),
        );

        assert_eq!(
            interp.execute(&repeat_until(0x02)),
            Outcome::Failed(Failure::Transport(UsbError::NoDevice))
        );
        assert_eq!(interp.transport().control_count(), 2);
    }

    #[test]
    fn test_run_script_abort_stops_at_failure() {
        let script = vec![control_out(1, &[1]), control_out(2, &[2]), control_out(3, &[3])];
        let mut interp = interpreter(MockTransport::new().fail_call(1, UsbError::Pipe));

        let err = interp
            .run_script(Phase::Init, &script, FailurePolicy::Abort)
            .unwrap_err();

        assert!(matches!(
            err,
            ScanError::Transport {
                phase: Phase::Init,
                index: 1,
                error: UsbError::Pipe,
                ..
            }
        ));
        assert_eq!(interp.transport().calls().len(), 2);
    }

    #[test]
    fn test_run_script_tolerate_continues() {
        let script = vec![control_out(1, &[1]), control_out(2, &[2]), control_out(3, &[3])];
        let mut interp = interpreter(MockTransport::new().fail_call(1, UsbError::Pipe));

        let report = interp
            .run_script(Phase::Setup, &script, FailurePolicy::Tolerate)
            .unwrap();

        assert_eq!(
            report,
            ScriptReport {
                full: 2,
                partial: 0,
                failed: 1
            }
        );
        assert_eq!(interp.transport().calls().len(), 3);
    }

    #[test]
    fn test_run_script_tolerate_still_aborts_on_poll_timeout() {
        let script = vec![repeat_until(0x02), control_out(1, &[1])];
        let mut interp = interpreter(MockTransport::new());

        let err = interp
            .run_script(Phase::Setup, &script, FailurePolicy::Tolerate)
            .unwrap_err();

        assert!(matches!(err, ScanError::ProtocolTimeout { index: 0, .. }));
    }

    #[test]
    fn test_run_script_tolerate_still_aborts_on_disconnect() {
        let script = vec![control_out(1, &[1]), control_out(2, &[2])];
        let mut interp = interpreter(MockTransport::new().fail_call(0, UsbError::NoDevice));

        assert!(
            interp
                .run_script(Phase::Setup, &script, FailurePolicy::Tolerate)
                .is_err()
        );
        assert_eq!(interp.transport().calls().len(), 1);
    }
}
