//! USB device abstraction
//!
//! Wraps `rusb::Device` with the descriptor fields the registry matches on,
//! read once when the device is first seen.

use hotplug::{DeviceDescriptor, DeviceId, HotplugDevice};
use rusb::{Context, Device};
use std::fmt;

/// USB device handle with cached match fields
#[derive(Clone)]
pub struct UsbDevice {
    device: Device<Context>,
    id: DeviceId,
    descriptor: DeviceDescriptor,
}

impl UsbDevice {
    /// Create a new USB device wrapper
    ///
    /// Fails if the device descriptor cannot be read.
    pub fn new(device: Device<Context>) -> Result<Self, rusb::Error> {
        let desc = device.device_descriptor()?;
        let id = DeviceId::from_bus_address(device.bus_number(), device.address());

        Ok(Self {
            device,
            id,
            descriptor: DeviceDescriptor::new(desc.vendor_id(), desc.product_id(), desc.class_code()),
        })
    }

    pub fn bus_number(&self) -> u8 {
        self.device.bus_number()
    }

    pub fn device_address(&self) -> u8 {
        self.device.address()
    }

    pub fn speed(&self) -> rusb::Speed {
        self.device.speed()
    }

    /// Read manufacturer and product strings, if the device can be opened
    pub fn strings(&self) -> (Option<String>, Option<String>) {
        let Ok(handle) = self.device.open() else {
            return (None, None);
        };
        let Ok(desc) = self.device.device_descriptor() else {
            return (None, None);
        };
        let timeout = std::time::Duration::from_millis(100);
        let Some(language) = handle
            .read_languages(timeout)
            .ok()
            .and_then(|langs| langs.first().copied())
        else {
            return (None, None);
        };

        (
            handle
                .read_manufacturer_string(language, &desc, timeout)
                .ok(),
            handle.read_product_string(language, &desc, timeout).ok(),
        )
    }
}

impl HotplugDevice for UsbDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }
}

impl fmt::Debug for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbDevice")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:04x}:{:04x} class {:#04x}",
            self.id, self.descriptor.vendor_id, self.descriptor.product_id, self.descriptor.class_code
        )
    }
}
