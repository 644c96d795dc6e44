//! USB transfer execution
//!
//! This module defines the `Transport` seam the script interpreter drives and
//! implements it on top of rusb. A transport performs exactly one transaction
//! per call: no retries, no interpretation of record semantics.

use crate::usb::device::ScannerDevice;
use protocol::{ControlSetup, UsbError};
use std::time::Duration;
use tracing::{debug, warn};

const ENDPOINT_DIR_IN: u8 = 0x80;
const ENDPOINT_NUMBER_MASK: u8 = 0x7f;

/// One device transaction at a time against an open connection
///
/// Each method returns the number of bytes actually moved, or the transport
/// error that ended the transfer.
pub trait Transport {
    /// Control transfer on endpoint 0; direction follows bit 7 of the request type
    fn control_transfer(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;

    /// Bulk IN transfer into `buf`
    fn bulk_read(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration)
    -> Result<usize, UsbError>;

    /// Bulk OUT transfer of `buf`
    fn bulk_write(&mut self, endpoint: u8, buf: &[u8], timeout: Duration)
    -> Result<usize, UsbError>;

    /// Hard reset of the device connection
    fn reset(&mut self) -> Result<(), UsbError>;
}

impl Transport for ScannerDevice {
    fn control_transfer(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        debug!(
            "Control transfer: request_type={:#x}, request={:#x}, value={:#x}, index={:#x}, len={}",
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            buf.len()
        );

        let handle = self.handle();
        let result = if setup.is_in() {
            handle.read_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                buf,
                timeout,
            )
        } else {
            handle.write_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                buf,
                timeout,
            )
        };

        result.map_err(|e| {
            warn!("Control transfer failed: {}", e);
            map_rusb_error(e)
        })
    }

    fn bulk_read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        let endpoint = in_endpoint(endpoint);
        debug!(
            "Bulk read: endpoint={:#x}, len={}, timeout={}ms",
            endpoint,
            buf.len(),
            timeout.as_millis()
        );

        self.handle()
            .read_bulk(endpoint, buf, timeout)
            .map_err(|e| {
                warn!("Bulk read on endpoint {:#x} failed: {}", endpoint, e);
                map_rusb_error(e)
            })
    }

    fn bulk_write(
        &mut self,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        let endpoint = out_endpoint(endpoint);
        debug!(
            "Bulk write: endpoint={:#x}, len={}, timeout={}ms",
            endpoint,
            buf.len(),
            timeout.as_millis()
        );

        self.handle()
            .write_bulk(endpoint, buf, timeout)
            .map_err(|e| {
                warn!("Bulk write on endpoint {:#x} failed: {}", endpoint, e);
                map_rusb_error(e)
            })
    }

    fn reset(&mut self) -> Result<(), UsbError> {
        ScannerDevice::reset(self).map_err(map_rusb_error)
    }
}

/// Address of the IN endpoint with the given number
///
/// The capture tables name bulk endpoints by number; libusb wants the
/// direction bit set on the address.
pub fn in_endpoint(endpoint: u8) -> u8 {
    endpoint | ENDPOINT_DIR_IN
}

/// Address of the OUT endpoint with the given number
pub fn out_endpoint(endpoint: u8) -> u8 {
    endpoint & ENDPOINT_NUMBER_MASK
}

/// Map rusb::Error to protocol::UsbError
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::Io => UsbError::Io,
        rusb::Error::InvalidParam => UsbError::InvalidParam,
        rusb::Error::Access => UsbError::Access,
        _ => UsbError::Other {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), UsbError::Timeout);
        assert_eq!(map_rusb_error(rusb::Error::Pipe), UsbError::Pipe);
        assert_eq!(map_rusb_error(rusb::Error::NoDevice), UsbError::NoDevice);
        assert_eq!(map_rusb_error(rusb::Error::NotFound), UsbError::NotFound);
        assert!(matches!(
            map_rusb_error(rusb::Error::Interrupted),
            UsbError::Other { .. }
        ));
    }

    #[test]
    fn test_endpoint_direction() {
        assert_eq!(in_endpoint(0x03), 0x83);
        assert_eq!(in_endpoint(0x83), 0x83);
        assert_eq!(out_endpoint(0x02), 0x02);
        assert_eq!(out_endpoint(0x82), 0x02);
    }
}
