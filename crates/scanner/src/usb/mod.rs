//! USB subsystem
//!
//! Device discovery and connection setup, and the transport the script
//! interpreter drives. Everything here is synchronous and blocking; a scan
//! session owns its connection and is confined to one thread.

pub mod device;
pub mod transfers;

pub use device::{ConnectionSettings, DeviceSummary, ScannerDevice, list_devices};
pub use transfers::{Transport, map_rusb_error};
