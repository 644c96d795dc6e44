//! Common utilities for primascan
//!
//! This crate provides functionality shared by the protocol and scanner
//! crates: logging setup, the shared error type, and USB device filters.

pub mod error;
pub mod logging;
pub mod usb_types;

pub use error::{Error, Result};
pub use logging::setup_logging;
pub use usb_types::{COLORADO_2400U, DeviceFilter};
