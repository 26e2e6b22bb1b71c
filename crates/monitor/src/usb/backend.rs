//! rusb enumeration backend

use crate::usb::device::UsbDevice;
use hotplug::{Error, HotplugBackend};
use rusb::{Context, UsbContext};
use tracing::{debug, warn};

/// Enumeration backend over a libusb context
#[derive(Clone)]
pub struct RusbBackend {
    context: Context,
}

impl RusbBackend {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl HotplugBackend for RusbBackend {
    type Device = UsbDevice;

    fn has_hotplug(&self) -> bool {
        rusb::has_hotplug()
    }

    fn devices(&self) -> hotplug::Result<Vec<UsbDevice>> {
        let list = self
            .context
            .devices()
            .map_err(|e| Error::EnumerationFailed(e.to_string()))?;

        let mut devices = Vec::with_capacity(list.len());
        for device in list.iter() {
            let (bus, address) = (device.bus_number(), device.address());
            match UsbDevice::new(device) {
                Ok(device) => devices.push(device),
                Err(e) => {
                    warn!(
                        "Skipping device bus={} addr={}: failed to read descriptor: {}",
                        bus, address, e
                    );
                }
            }
        }

        debug!("Enumerated {} devices", devices.len());
        Ok(devices)
    }
}
