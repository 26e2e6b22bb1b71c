//! USB subsystem
//!
//! Connects the hotplug registry to libusb:
//! - Device enumeration through an rusb context
//! - Forwarding of libusb hot-plug notifications onto the hotplug pipe
//! - The event thread that runs libusb's event loop and delivers callbacks

pub mod backend;
pub mod device;
pub mod watcher;
pub mod worker;

pub use backend::RusbBackend;
pub use worker::{WorkerCommand, spawn_event_thread};
