//! Scan engine for the Primax Colorado 2400U
//!
//! The scanner is driven by replaying transfer scripts captured from its
//! native driver. A `ScanSession` runs the init, setup and calibration
//! scripts, then streams the scan script's bulk reads to the caller one
//! `pull` at a time.
//!
//! # Example
//!
//! ```
//! use protocol::ScanMode;
//! use scanner::test_utils::{MockTransport, bulk_read, script_set};
//! use scanner::{PollLimit, ReadStatus, ScanSession, TransferTimeouts};
//!
//! let transport = MockTransport::new().with_bulk_read(vec![0xAA; 6]);
//! let scripts = script_set(vec![bulk_read(6)], Vec::new());
//! let mut session = ScanSession::new(
//!     transport,
//!     scripts,
//!     TransferTimeouts::default(),
//!     PollLimit::default(),
//! )
//! .unwrap();
//!
//! session.start(ScanMode::Color).unwrap();
//! let mut chunk = [0u8; 4];
//! assert_eq!(session.pull(&mut chunk).unwrap(), ReadStatus::Data(4));
//! assert_eq!(session.pull(&mut chunk).unwrap(), ReadStatus::Data(2));
//! assert_eq!(session.pull(&mut chunk).unwrap(), ReadStatus::EndOfStream);
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod output;
pub mod session;
pub mod stream;
pub mod test_utils;
pub mod usb;

pub use config::ScannerConfig;
pub use error::{Phase, Result, ScanError};
pub use interpreter::{
    Failure, FailurePolicy, Interpreter, Outcome, PollLimit, ScriptReport, TransferTimeouts,
};
pub use output::{PnmWriter, write_frame};
pub use session::{ReadStatus, ScanSession, SessionContext, SessionState};
pub use stream::{Advance, StreamBuffer, StreamCursor};
pub use usb::{ConnectionSettings, ScannerDevice, Transport};
