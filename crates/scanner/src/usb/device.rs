//! Scanner device discovery and connection
//!
//! Finds the scanner on the bus, opens it, and prepares it for transfers:
//! select the configuration, detach any kernel driver, claim the interface
//! and select the alternate setting. The scripts take it from there.

use crate::error::{Result, ScanError};
use crate::usb::transfers::map_rusb_error;
use common::DeviceFilter;
use rusb::{Context, Device, DeviceHandle, UsbContext};
use tracing::{debug, info, warn};

/// Interface selection used when opening the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub configuration: u8,
    pub interface: u8,
    pub alt_setting: u8,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            configuration: 1,
            interface: 0,
            alt_setting: 0,
        }
    }
}

/// Summary of an enumerated USB device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub bus_number: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
    /// Whether the device matches the configured scanner filter
    pub matches: bool,
}

/// Open connection to the scanner
pub struct ScannerDevice {
    handle: DeviceHandle<Context>,
    interface: u8,
    kernel_driver_detached: bool,
}

impl ScannerDevice {
    /// Find the first device matching `filter` and open it
    pub fn open(filter: &DeviceFilter, settings: &ConnectionSettings) -> Result<Self> {
        let context = Context::new().map_err(|e| ScanError::Open(map_rusb_error(e)))?;
        let device = find_device(&context, filter)?.ok_or(ScanError::DeviceNotFound {
            filter: *filter,
        })?;

        info!(
            "Found scanner on bus {} address {}",
            device.bus_number(),
            device.address()
        );

        let mut handle = device.open().map_err(|e| {
            warn!("Failed to open device: {}", e);
            ScanError::Open(map_rusb_error(e))
        })?;

        let kernel_driver_detached = match handle.kernel_driver_active(settings.interface) {
            Ok(true) => {
                debug!(
                    "Detaching kernel driver from interface {}",
                    settings.interface
                );
                handle
                    .detach_kernel_driver(settings.interface)
                    .map_err(|e| ScanError::Open(map_rusb_error(e)))?;
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    settings.interface, e
                );
                false
            }
        };

        handle
            .set_active_configuration(settings.configuration)
            .map_err(|e| {
                warn!(
                    "Failed to select configuration {}: {}",
                    settings.configuration, e
                );
                ScanError::Open(map_rusb_error(e))
            })?;

        handle.claim_interface(settings.interface).map_err(|e| {
            warn!("Failed to claim interface {}: {}", settings.interface, e);
            ScanError::Open(map_rusb_error(e))
        })?;

        handle
            .set_alternate_setting(settings.interface, settings.alt_setting)
            .map_err(|e| {
                warn!(
                    "Failed to select alternate setting {}: {}",
                    settings.alt_setting, e
                );
                let _ = handle.release_interface(settings.interface);
                ScanError::Open(map_rusb_error(e))
            })?;

        debug!(
            "Claimed interface {} (configuration {}, alt setting {})",
            settings.interface, settings.configuration, settings.alt_setting
        );

        Ok(Self {
            handle,
            interface: settings.interface,
            kernel_driver_detached,
        })
    }

    pub(crate) fn handle(&self) -> &DeviceHandle<Context> {
        &self.handle
    }

    /// Reset the device
    ///
    /// This invalidates the claimed interface; the device re-enumerates.
    pub fn reset(&mut self) -> std::result::Result<(), rusb::Error> {
        self.handle.reset()?;
        debug!("Reset scanner");
        Ok(())
    }

    /// Release the interface and hand the device back to the kernel
    pub fn close(mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            debug!("Failed to release interface {}: {}", self.interface, e);
        }

        if self.kernel_driver_detached {
            if let Err(e) = self.handle.attach_kernel_driver(self.interface) {
                debug!(
                    "Could not reattach kernel driver to interface {}: {}",
                    self.interface, e
                );
            }
        }

        debug!("Closed scanner");
    }
}

/// List every device on the bus, flagging the ones matching `filter`
pub fn list_devices(filter: &DeviceFilter) -> Result<Vec<DeviceSummary>> {
    let context = Context::new().map_err(|e| ScanError::Open(map_rusb_error(e)))?;
    let devices = context
        .devices()
        .map_err(|e| ScanError::Open(map_rusb_error(e)))?;

    let mut summaries = Vec::new();
    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                debug!(
                    "Skipping device on bus {} address {}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                continue;
            }
        };

        let product = descriptor.product_string_index().and_then(|idx| {
            device
                .open()
                .ok()
                .and_then(|h| h.read_string_descriptor_ascii(idx).ok())
        });

        summaries.push(DeviceSummary {
            bus_number: device.bus_number(),
            address: device.address(),
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            product,
            matches: filter.matches(descriptor.vendor_id(), descriptor.product_id()),
        });
    }

    Ok(summaries)
}

fn find_device(context: &Context, filter: &DeviceFilter) -> Result<Option<Device<Context>>> {
    let devices = context
        .devices()
        .map_err(|e| ScanError::Open(map_rusb_error(e)))?;

    Ok(devices.iter().find(|device| {
        device
            .device_descriptor()
            .map(|d| filter.matches(d.vendor_id(), d.product_id()))
            .unwrap_or(false)
    }))
}
