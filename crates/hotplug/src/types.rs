//! Device identity, descriptor and event types
//!
//! These are the values the registry exchanges with the enumeration backend.
//! The registry never owns a device; it only compares [`DeviceId`]s and reads
//! the three descriptor fields a filter can match on.

use std::fmt;
use std::ops::BitOr;

/// Stable device identity assigned by the enumeration layer
///
/// Two device handles refer to the same physical device if and only if their
/// ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Build an id from a bus number and device address
    pub fn from_bus_address(bus: u8, address: u8) -> Self {
        DeviceId((u32::from(bus) << 8) | u32::from(address))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:03}", self.0 >> 8, self.0 & 0xff)
    }
}

/// Descriptor fields a filter can match on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    /// USB Vendor ID (idVendor)
    pub vendor_id: u16,
    /// USB Product ID (idProduct)
    pub product_id: u16,
    /// USB device class (bDeviceClass)
    pub class_code: u8,
}

impl DeviceDescriptor {
    pub fn new(vendor_id: u16, product_id: u16, class_code: u8) -> Self {
        Self {
            vendor_id,
            product_id,
            class_code,
        }
    }
}

/// What a registration remembers about a device it has attached
///
/// Passed to `on_left` in place of a live handle: by the time a device leaves
/// (or the registration is swept) the enumeration layer may have released it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachedDevice {
    pub id: DeviceId,
    pub descriptor: DeviceDescriptor,
}

/// A physical device change reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotplugEvent {
    /// Device connected and ready to use
    Arrived,
    /// Device disconnected
    Left,
}

impl HotplugEvent {
    /// The mask bit corresponding to this event
    pub fn mask(self) -> EventMask {
        match self {
            HotplugEvent::Arrived => EventMask::ARRIVED,
            HotplugEvent::Left => EventMask::LEFT,
        }
    }
}

/// Set of [`HotplugEvent`]s a registration cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventMask(u8);

impl EventMask {
    pub const ARRIVED: EventMask = EventMask(0x01);
    pub const LEFT: EventMask = EventMask(0x02);
    pub const BOTH: EventMask = EventMask(0x03);

    pub const fn empty() -> Self {
        EventMask(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

/// Registration handle returned by `register`
///
/// Handles are unique within one registry and assigned in increasing order,
/// starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HotplugHandle(pub(crate) u32);

impl HotplugHandle {
    /// Raw numeric value of the handle
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HotplugHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
