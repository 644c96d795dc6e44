//! Scan session state machine
//!
//! A session owns the device connection and sequences the scripts:
//!
//! ```text
//! Idle -> Initializing -> SettingUp -> Calibrating -> Scanning -> Finalizing -> Done
//! ```
//!
//! `start` runs init, setup and calibration to completion. The scan script
//! is then driven one `pull` at a time; when it runs out the finalize script
//! runs once and the stream reports end of data. Any fatal failure moves the
//! session to `Error`.

use crate::error::{Phase, Result, ScanError};
use crate::interpreter::{FailurePolicy, Interpreter, PollLimit, TransferTimeouts};
use crate::stream::{Advance, StreamBuffer, StreamCursor};
use crate::usb::Transport;
use protocol::{FrameShape, ScanMode, ScriptSet};
use std::fmt;
use std::io;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Initializing,
    SettingUp,
    Calibrating,
    Scanning,
    Finalizing,
    Done,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::SettingUp => "setting up",
            SessionState::Calibrating => "calibrating",
            SessionState::Scanning => "scanning",
            SessionState::Finalizing => "finalizing",
            SessionState::Done => "done",
            SessionState::Error => "in error",
        };
        f.write_str(name)
    }
}

/// Result of a successful pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// This many bytes were written to the destination
    Data(usize),
    /// The scan is over; no more data will follow
    EndOfStream,
}

/// Everything a session needs to talk to the scanner
pub struct SessionContext<T> {
    pub interpreter: Interpreter<T>,
    pub scripts: ScriptSet,
    pub mode: ScanMode,
}

pub struct ScanSession<T> {
    context: SessionContext<T>,
    stream: StreamBuffer,
    state: SessionState,
}

impl<T: Transport> ScanSession<T> {
    /// Build a session over `transport`, rejecting a bundle that fails
    /// validation
    pub fn new(
        transport: T,
        scripts: ScriptSet,
        timeouts: TransferTimeouts,
        poll: PollLimit,
    ) -> Result<Self> {
        scripts.validate()?;

        let interpreter = Interpreter::new(
            transport,
            timeouts,
            poll,
            scripts.calibration_payload.clone(),
        );

        Ok(Self {
            context: SessionContext {
                interpreter,
                scripts,
                mode: ScanMode::default(),
            },
            stream: StreamBuffer::default(),
            state: SessionState::Idle,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> ScanMode {
        self.context.mode
    }

    /// Shape of the frame produced in the current mode
    pub fn frame_shape(&self) -> FrameShape {
        self.context.mode.frame_shape()
    }

    pub fn cursor(&self) -> StreamCursor {
        self.stream.cursor()
    }

    pub fn transport(&self) -> &T {
        self.context.interpreter.transport()
    }

    /// Hard-reset the scanner and hand back the transport
    ///
    /// The reset happens whatever state the session ended in. A failed reset
    /// is logged and otherwise ignored.
    pub fn close(mut self) -> T {
        if let Err(e) = self.context.interpreter.transport_mut().reset() {
            debug!("Device reset on close failed: {}", e);
        }
        self.context.interpreter.into_transport()
    }

    /// Bring the scanner up and position it to stream a frame
    ///
    /// Runs the init script, the setup script for `mode` and the calibration
    /// script. Setup records may fail without ending the session; init and
    /// calibration failures are fatal.
    pub fn start(&mut self, mode: ScanMode) -> Result<FrameShape> {
        match self.state {
            SessionState::Idle | SessionState::Done | SessionState::Error => {}
            state => {
                return Err(ScanError::InvalidState {
                    operation: "start",
                    state,
                });
            }
        }

        info!("Starting {} scan at {} dpi", mode, mode.dpi());
        self.context.mode = mode;
        self.stream.reset(mode.inverts_output());

        self.transition(SessionState::Initializing);
        self.run_phase(Phase::Init, FailurePolicy::Abort)?;

        self.transition(SessionState::SettingUp);
        self.run_phase(Phase::Setup, FailurePolicy::Tolerate)?;

        self.transition(SessionState::Calibrating);
        self.run_phase(Phase::Calibration, FailurePolicy::Abort)?;

        self.transition(SessionState::Scanning);
        Ok(mode.frame_shape())
    }

    /// Copy the next bytes of the frame into `dest`
    ///
    /// Returns `EndOfStream` once the scan script is exhausted, and on every
    /// call after that. A failed transfer returns the error once and moves
    /// the session to `Error`; later pulls report end of stream.
    pub fn pull(&mut self, dest: &mut [u8]) -> Result<ReadStatus> {
        match self.state {
            SessionState::Scanning => {}
            SessionState::Done | SessionState::Error => return Ok(ReadStatus::EndOfStream),
            state => {
                return Err(ScanError::InvalidState {
                    operation: "pull",
                    state,
                });
            }
        }

        let SessionContext {
            interpreter,
            scripts,
            mode,
        } = &mut self.context;

        match self.stream.pull(interpreter, scripts.scan(*mode), dest) {
            Ok(Advance::Delivered(n)) => Ok(ReadStatus::Data(n)),
            Ok(Advance::Exhausted) => {
                info!("Scan data exhausted");
                self.finish()?;
                Ok(ReadStatus::EndOfStream)
            }
            Err(e) => {
                error!("Scan aborted: {}", e);
                self.transition(SessionState::Error);
                Err(e)
            }
        }
    }

    /// Abandon the scan
    ///
    /// From `Scanning` this runs the finalize script and hard-resets the
    /// device. From `Error` it only resets. It does nothing before a scan
    /// starts or after one completes.
    pub fn cancel(&mut self) -> Result<()> {
        let finalized = match self.state {
            SessionState::Idle | SessionState::Done => return Ok(()),
            SessionState::Scanning => {
                info!("Cancelling scan");
                self.transition(SessionState::Finalizing);
                self.run_phase(Phase::Finalize, FailurePolicy::Abort)
            }
            SessionState::Error => Ok(()),
            state => {
                return Err(ScanError::InvalidState {
                    operation: "cancel",
                    state,
                });
            }
        };

        let reset = self
            .context
            .interpreter
            .transport_mut()
            .reset()
            .map_err(|e| {
                warn!("Device reset failed: {}", e);
                ScanError::Reset(e)
            });

        finalized?;
        if let Err(e) = reset {
            self.transition(SessionState::Error);
            return Err(e);
        }

        self.transition(SessionState::Done);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.transition(SessionState::Finalizing);
        self.run_phase(Phase::Finalize, FailurePolicy::Abort)?;
        self.transition(SessionState::Done);
        Ok(())
    }

    fn run_phase(&mut self, phase: Phase, policy: FailurePolicy) -> Result<()> {
        let SessionContext {
            interpreter,
            scripts,
            mode,
        } = &mut self.context;

        let script = match phase {
            Phase::Init => &scripts.init,
            Phase::Setup => scripts.setup(*mode),
            Phase::Calibration => &scripts.calibration,
            Phase::Scan => scripts.scan(*mode),
            Phase::Finalize => &scripts.finalize,
        };

        if let Err(e) = interpreter.run_script(phase, script, policy) {
            self.transition(SessionState::Error);
            return Err(e);
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {} -> {}", self.state, next);
        self.state = next;
    }
}

impl<T: Transport> io::Read for ScanSession<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.pull(buf) {
            Ok(ReadStatus::Data(n)) => Ok(n),
            Ok(ReadStatus::EndOfStream) => Ok(0),
            Err(e) => Err(io::Error::other(e)),
        }
    }
}
