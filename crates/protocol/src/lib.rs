//! Transfer-script model for the Primax Colorado 2400U scanner
//!
//! This crate defines the static data the scanner driver replays: transfer
//! records decoded from captured driver traffic, the scripts that group them,
//! and the bundle that holds every script for a scanner model. It performs no
//! device I/O.
//!
//! # Example
//!
//! ```
//! use protocol::{ScanMode, ScriptSet, TransferRecord};
//!
//! let bundle = r#"
//! init = []
//! setup_color = []
//! setup_monochrome = []
//! calibration = [[0xfd, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]]
//! scan_color = [{ kind = "bulk_read", endpoint = 3, size = 2478 }]
//! scan_monochrome = []
//! finalize = []
//! "#;
//!
//! let scripts = ScriptSet::from_toml_str(bundle).unwrap();
//! assert_eq!(scripts.calibration[0], TransferRecord::ComputedCalibrate);
//! assert_eq!(scripts.scan(ScanMode::Color).len(), 1);
//! ```

pub mod error;
pub mod record;
pub mod script;
pub mod types;

pub use error::{ProtocolError, Result};
pub use record::{
    CALIBRATION_REGION_SIZE, COMPUTED_CALIBRATION_ENDPOINT, COMPUTED_CALIBRATION_LEN,
    COMPUTED_CALIBRATION_RUN, ControlSetup, INLINE_PAYLOAD_MAX, ROW_LEN, RecordKind,
    TransferRecord, WORKING_BUFFER_SIZE, computed_calibration_byte,
};
pub use script::{ScriptSet, TransferScript};
pub use types::{FrameShape, ScanMode, UsbError};
