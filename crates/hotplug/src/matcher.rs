//! Filter matching
//!
//! Pure functions only; nothing here invokes a callback or touches the
//! registry.

use crate::filter::Filter;
use crate::types::{DeviceDescriptor, HotplugEvent};

/// Whether `filter` accepts a device with `descriptor`
///
/// Vendor, product and class are checked independently; each passes when the
/// filter field is a wildcard or equals the descriptor field.
pub fn matches(filter: &Filter, descriptor: &DeviceDescriptor) -> bool {
    let vendor = filter.vendor_id.accepts(u32::from(descriptor.vendor_id));
    let product = filter.product_id.accepts(u32::from(descriptor.product_id));
    let class = filter.class_code.accepts(u32::from(descriptor.class_code));

    vendor && product && class
}

/// Whether `filter` wants `event` delivered to its callbacks
pub fn wants(filter: &Filter, event: HotplugEvent) -> bool {
    filter.events.contains(event.mask())
}
