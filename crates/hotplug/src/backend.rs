//! Interface to the platform enumeration backend
//!
//! The registry does not detect devices itself. A backend answers the
//! capability query, lists the devices currently present (for
//! enumerate-on-register replay) and describes each device handle. Physical
//! changes are pushed into the registry through a
//! [`HotplugNotifier`](crate::HotplugNotifier).

use crate::types::{AttachedDevice, DeviceDescriptor, DeviceId};

/// A reference-counted device handle owned by the enumeration layer
///
/// Clones must refer to the same physical device. The registry borrows a
/// handle only for the duration of a dispatch; attached sets record the
/// [`AttachedDevice`] id and descriptor instead.
pub trait HotplugDevice: Clone + Send + Sync + 'static {
    /// Stable identity of the device
    fn id(&self) -> DeviceId;

    /// Cached descriptor fields used for matching
    fn descriptor(&self) -> DeviceDescriptor;
}

impl HotplugDevice for AttachedDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }
}

/// Platform enumeration backend
pub trait HotplugBackend: Send + Sync + 'static {
    type Device: HotplugDevice;

    /// Whether hotplug notifications are supported on this platform
    fn has_hotplug(&self) -> bool;

    /// List the devices currently known to the backend
    ///
    /// Failures should be reported as
    /// [`Error::EnumerationFailed`](crate::Error::EnumerationFailed).
    fn devices(&self) -> crate::Result<Vec<Self::Device>>;
}
