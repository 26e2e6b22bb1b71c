//! Registration of configured watches

use crate::config::WatchConfig;
use anyhow::{Context, Result};
use hotplug::{
    AttachedDevice, CallbackAction, HotplugBackend, HotplugBuilder, HotplugDevice, HotplugHandle,
    HotplugRegistry,
};
use std::sync::Arc;
use tracing::info;

fn describe<D: HotplugDevice>(device: &D) -> String {
    let desc = device.descriptor();
    format!(
        "{} {:04x}:{:04x} class {:#04x}",
        device.id(),
        desc.vendor_id,
        desc.product_id,
        desc.class_code
    )
}

/// Register one watch, logging every delivered event under its name
pub fn register_watch<B: HotplugBackend>(
    registry: &HotplugRegistry<B>,
    watch: &WatchConfig,
) -> Result<HotplugHandle> {
    let filter = watch.to_filter()?;

    let arrived_name: Arc<str> = Arc::from(watch.name.as_str());
    let left_name = Arc::clone(&arrived_name);

    let handle = HotplugBuilder::<B>::new()
        .vendor_id(filter.vendor_id)
        .product_id(filter.product_id)
        .class_code(filter.class_code)
        .events(filter.events)
        .enumerate(filter.enumerate)
        .on_arrived(move |_, device: &B::Device| {
            info!(watch = %arrived_name, "arrived: {}", describe(device));
            println!("[{}] + {}", arrived_name, describe(device));
            CallbackAction::Continue
        })
        .on_left(move |_, device: &AttachedDevice| {
            info!(watch = %left_name, "left: {}", describe(device));
            println!("[{}] - {}", left_name, describe(device));
        })
        .register(registry)
        .with_context(|| format!("Failed to register watch '{}'", watch.name))?;

    info!("Watching '{}' ({}) as {}", watch.name, filter, handle);
    Ok(handle)
}

/// Register every configured watch
///
/// Stops at the first failure; watches registered before it stay active.
pub fn register_all<B: HotplugBackend>(
    registry: &HotplugRegistry<B>,
    watches: &[WatchConfig],
) -> Result<Vec<HotplugHandle>> {
    watches
        .iter()
        .map(|watch| register_watch(registry, watch))
        .collect()
}
