//! Hotplug callback registry for USB host access
//!
//! This crate lets clients register interest in device arrival and removal,
//! filtered by vendor ID, product ID and device class, and dispatches the
//! notifications produced by an enumeration backend to every matching
//! registration.
//!
//! Registration and deregistration may happen on any thread. Dispatch and the
//! reclamation of deregistered entries happen on the single event-processing
//! thread that drives [`HotplugRegistry::handle_pending`] or
//! [`HotplugRegistry::handle_events`]. User callbacks are never invoked while
//! the registry lock is held, so a callback may register or deregister
//! further filters.

pub mod backend;
pub mod channel;
pub mod error;
pub mod filter;
pub mod logging;
pub mod matcher;
pub mod registry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

pub use backend::{HotplugBackend, HotplugDevice};
pub use channel::{HotplugMessage, HotplugNotifier};
pub use error::{Error, Result};
pub use filter::{CallbackAction, Filter, HotplugBuilder, MATCH_ANY, MatchValue};
pub use logging::setup_logging;
pub use matcher::matches;
pub use registry::HotplugRegistry;
pub use types::{
    AttachedDevice, DeviceDescriptor, DeviceId, EventMask, HotplugEvent, HotplugHandle,
};
