//! libusb hotplug forwarding
//!
//! libusb invokes these callbacks from inside `handle_events` on the event
//! thread. They only queue a message on the registry's pipe; the registry
//! dispatches it on the next `handle_pending`.

use crate::usb::device::UsbDevice;
use hotplug::HotplugNotifier;
use rusb::{Context, Device, Hotplug, Registration};
use tracing::{debug, error, warn};

/// Forwards libusb hotplug notifications onto the hotplug pipe
pub struct HotplugForwarder {
    notifier: HotplugNotifier<UsbDevice>,
}

impl HotplugForwarder {
    pub fn new(notifier: HotplugNotifier<UsbDevice>) -> Self {
        Self { notifier }
    }

    /// Register with libusb for every device change
    ///
    /// Enumeration is left to the registry, which replays present devices per
    /// registration.
    pub fn register(self, context: &Context) -> Result<Registration<Context>, rusb::Error> {
        let registration = rusb::HotplugBuilder::new()
            .enumerate(false)
            .register(context, Box::new(self))?;
        debug!("libusb hot-plug callbacks registered");
        Ok(registration)
    }

    fn forward(&self, device: Device<Context>, arrived: bool) {
        let (bus, address) = (device.bus_number(), device.address());
        let device = match UsbDevice::new(device) {
            Ok(device) => device,
            Err(e) => {
                warn!(
                    "Dropping hot-plug event for bus={} addr={}: failed to read descriptor: {}",
                    bus, address, e
                );
                return;
            }
        };

        let result = if arrived {
            self.notifier.arrived(device)
        } else {
            self.notifier.left(device)
        };

        if let Err(e) = result {
            error!("Failed to queue hot-plug event for bus={} addr={}: {}", bus, address, e);
        }
    }
}

impl Hotplug<Context> for HotplugForwarder {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!("libusb: device arrived");
        self.forward(device, true);
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!("libusb: device left");
        self.forward(device, false);
    }
}
