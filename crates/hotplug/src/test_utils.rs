//! Test utilities for the hotplug registry
//!
//! Provides an in-memory backend and helpers for recording callback
//! invocations.
//!
//! # Example
//!
//! ```
//! use hotplug::test_utils::{MockBackend, mock_device};
//! use hotplug::HotplugBackend;
//!
//! let backend = MockBackend::new();
//! backend.plug(mock_device(1, 0x1234, 0x5678, 0x00));
//! assert_eq!(backend.devices().unwrap().len(), 1);
//! ```

use crate::backend::{HotplugBackend, HotplugDevice};
use crate::error::{Error, Result};
use crate::filter::{CallbackAction, HotplugBuilder};
use crate::types::{AttachedDevice, DeviceDescriptor, DeviceId, HotplugEvent};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory device handle
///
/// Clones share a liveness token so tests can check whether the registry
/// still holds a reference to a device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub id: DeviceId,
    pub descriptor: DeviceDescriptor,
    token: Arc<()>,
}

impl MockDevice {
    /// Weak reference to this device's token; upgrades while any clone lives
    pub fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.token)
    }
}

impl HotplugDevice for MockDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }
}

/// Create a mock device
///
/// # Example
/// ```
/// use hotplug::test_utils::mock_device;
///
/// let device = mock_device(1, 0x046d, 0xc52b, 0x03);
/// assert_eq!(device.descriptor.vendor_id, 0x046d);
/// ```
pub fn mock_device(id: u32, vendor_id: u16, product_id: u16, class_code: u8) -> MockDevice {
    MockDevice {
        id: DeviceId(id),
        descriptor: DeviceDescriptor::new(vendor_id, product_id, class_code),
        token: Arc::new(()),
    }
}

/// Create a mock HID device (keyboard/mouse)
pub fn mock_hid_device(id: u32) -> MockDevice {
    mock_device(id, 0x046d, 0xc52b, 0x03)
}

/// Create a mock mass storage device
pub fn mock_mass_storage_device(id: u32) -> MockDevice {
    mock_device(id, 0x0781, 0x5581, 0x08)
}

/// Create `count` devices with distinct ids and vendor ids
pub fn mock_device_list(count: u32) -> Vec<MockDevice> {
    (1..=count)
        .map(|i| mock_device(i, 0x1000 + (i as u16), 0x2000 + (i as u16), 0x00))
        .collect()
}

#[derive(Debug, Default)]
struct MockState {
    unsupported: AtomicBool,
    fail_enumeration: AtomicBool,
    enumerations: AtomicUsize,
    devices: Mutex<Vec<MockDevice>>,
}

/// In-memory enumeration backend
///
/// Clones share state, so a test can keep one clone while the registry owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose capability query reports no hotplug support
    pub fn unsupported() -> Self {
        let backend = Self::new();
        backend.set_supported(false);
        backend
    }

    pub fn set_supported(&self, supported: bool) {
        self.state.unsupported.store(!supported, Ordering::SeqCst);
    }

    pub fn set_fail_enumeration(&self, fail: bool) {
        self.state.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Add a device to the list returned by `devices()`
    pub fn plug(&self, device: MockDevice) {
        self.state
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device);
    }

    /// Remove a device from the list returned by `devices()`
    pub fn unplug(&self, id: DeviceId) -> Option<MockDevice> {
        let mut devices = self
            .state
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let index = devices.iter().position(|d| d.id == id)?;
        Some(devices.remove(index))
    }

    /// Number of successful or failed `devices()` calls so far
    pub fn enumeration_count(&self) -> usize {
        self.state.enumerations.load(Ordering::SeqCst)
    }
}

impl HotplugBackend for MockBackend {
    type Device = MockDevice;

    fn has_hotplug(&self) -> bool {
        !self.state.unsupported.load(Ordering::SeqCst)
    }

    fn devices(&self) -> Result<Vec<MockDevice>> {
        self.state.enumerations.fetch_add(1, Ordering::SeqCst);

        if self.state.fail_enumeration.load(Ordering::SeqCst) {
            return Err(Error::EnumerationFailed(
                "mock device list unavailable".to_string(),
            ));
        }

        Ok(self
            .state
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Records callback invocations in order
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<(HotplugEvent, DeviceId)>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: HotplugEvent, id: DeviceId) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event, id));
    }

    pub fn events(&self) -> Vec<(HotplugEvent, DeviceId)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, event: HotplugEvent) -> usize {
        self.events().iter().filter(|(e, _)| *e == event).count()
    }

    pub fn count_for(&self, event: HotplugEvent, id: DeviceId) -> usize {
        self.events()
            .iter()
            .filter(|(e, d)| *e == event && *d == id)
            .count()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Builder whose callbacks record into this recorder
    pub fn builder(&self) -> HotplugBuilder<MockBackend> {
        let arrived = self.clone();
        let left = self.clone();
        HotplugBuilder::new()
            .on_arrived(move |_, device: &MockDevice| {
                arrived.record(HotplugEvent::Arrived, device.id);
                CallbackAction::Continue
            })
            .on_left(move |_, device: &AttachedDevice| {
                left.record(HotplugEvent::Left, device.id);
            })
    }
}
