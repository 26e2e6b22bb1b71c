//! Hotplug registry
//!
//! Owns the registrations of one library context and dispatches device
//! arrival and removal to them.
//!
//! Locking:
//! - `inner` (the registry lock) guards the entry list and the handle counter.
//!   It is held only to mutate or snapshot the list, never across a callback.
//! - Each entry has a delivery lock (`callbacks`) held while one of its
//!   callbacks runs, which serializes callbacks of the same registration.
//! - Each entry's attached set has its own short-lived lock.
//!
//! Lock order is delivery lock, then registry lock, then attached set.
//!
//! Entries are freed only by [`HotplugRegistry::sweep`] on the event thread
//! (or by teardown). `deregister` flags the entry and wakes the event thread
//! through the hotplug pipe.

use crate::backend::{HotplugBackend, HotplugDevice};
use crate::channel::{HotplugMessage, HotplugNotifier, HotplugPipe};
use crate::error::{Error, Result};
use crate::filter::{CallbackAction, Callbacks, Filter};
use crate::matcher::{matches, wants};
use crate::types::{AttachedDevice, DeviceDescriptor, DeviceId, HotplugEvent, HotplugHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry-owned record of one `register` call
struct Entry<B: HotplugBackend> {
    handle: HotplugHandle,
    filter: Filter,
    /// Set once, never cleared
    pending: AtomicBool,
    /// Delivery lock
    callbacks: Mutex<Callbacks<B>>,
    /// Devices currently matched under this entry. Only the id and the
    /// descriptor are kept; device handles stay with the enumeration layer.
    attached: Mutex<HashMap<DeviceId, DeviceDescriptor>>,
}

impl<B: HotplugBackend> Entry<B> {
    fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns true if the flag was newly set
    fn mark_pending(&self) -> bool {
        !self.pending.swap(true, Ordering::AcqRel)
    }
}

struct Inner<B: HotplugBackend> {
    /// Insertion order is dispatch order
    entries: Vec<Arc<Entry<B>>>,
    next_handle: u32,
}

/// Outcome of offering an arrival to one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    Ignored,
    Attached,
    Deregistered,
}

/// Hotplug registry of one library context
///
/// Share it between threads with an `Arc`. Client threads call
/// [`register`](Self::register) and [`deregister`](Self::deregister); the event
/// thread calls [`handle_pending`](Self::handle_pending) or
/// [`handle_events`](Self::handle_events), which dispatch queued device changes
/// and sweep deregistered entries.
///
/// Callbacks receive the registry and may register or deregister filters.
/// They must not call `dispatch`, `handle_pending`, `handle_events` or `sweep`.
pub struct HotplugRegistry<B: HotplugBackend> {
    backend: B,
    inner: Mutex<Inner<B>>,
    pipe: HotplugPipe<B::Device>,
}

impl<B: HotplugBackend> HotplugRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                next_handle: 1,
            }),
            pipe: HotplugPipe::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Sender the backend uses to queue device changes for dispatch
    pub fn notifier(&self) -> HotplugNotifier<B::Device> {
        self.pipe.notifier()
    }

    /// Register a filter
    ///
    /// With `filter.enumerate` set, every device currently reported by the
    /// backend is replayed to this registration as an arrival before this
    /// returns. If the device list cannot be obtained the registration is
    /// rolled back and the enumeration error is returned.
    pub fn register(&self, filter: Filter, callbacks: Callbacks<B>) -> Result<HotplugHandle> {
        if !self.backend.has_hotplug() {
            return Err(Error::Unsupported);
        }

        filter.validate()?;
        callbacks.validate(filter.events)?;

        let mut inner = lock(&self.inner);
        inner.entries.try_reserve(1).map_err(|_| Error::NoMemory)?;

        let handle = HotplugHandle(inner.next_handle);
        inner.next_handle = inner.next_handle.wrapping_add(1);

        let entry = Arc::new(Entry {
            handle,
            filter,
            pending: AtomicBool::new(false),
            callbacks: Mutex::new(callbacks),
            attached: Mutex::new(HashMap::new()),
        });

        // Nobody else can hold the new entry's delivery lock yet. Holding it
        // until replay is done keeps concurrent dispatch from delivering to a
        // half-initialized registration.
        let mut delivery = lock(&entry.callbacks);
        inner.entries.push(Arc::clone(&entry));
        drop(inner);

        info!("Registered hotplug callback {} for {}", handle, filter);

        if filter.enumerate {
            let devices = match self.backend.devices() {
                Ok(devices) => devices,
                Err(e) => {
                    warn!(
                        "Enumeration failed while registering {}, rolling back: {}",
                        handle, e
                    );
                    entry.mark_pending();
                    lock(&self.inner)
                        .entries
                        .retain(|other| other.handle != handle);
                    return Err(e);
                }
            };

            debug!("Replaying {} devices to {}", devices.len(), handle);
            for device in &devices {
                if self.offer_arrival(&entry, &mut delivery, device) == Arrival::Deregistered {
                    break;
                }
            }
        }

        Ok(handle)
    }

    /// Deregister a filter
    ///
    /// Unknown handles are ignored. The entry stops receiving dispatches
    /// immediately; its final `on_left` notifications and the free happen in
    /// the next sweep on the event thread.
    pub fn deregister(&self, handle: HotplugHandle) {
        if !self.backend.has_hotplug() {
            return;
        }

        let found = {
            let inner = lock(&self.inner);
            match inner.entries.iter().find(|e| e.handle == handle) {
                Some(entry) => {
                    entry.mark_pending();
                    true
                }
                None => false,
            }
        };

        if !found {
            debug!("Deregister of unknown hotplug handle {}", handle);
            return;
        }

        info!("Deregistered hotplug callback {}", handle);
        self.wake_event_thread();
    }

    /// Deliver one physical device change to every matching registration
    ///
    /// Returns the number of registrations whose attached set changed.
    pub fn dispatch(&self, device: &B::Device, event: HotplugEvent) -> usize {
        let snapshot: Vec<Arc<Entry<B>>> = lock(&self.inner)
            .entries
            .iter()
            .filter(|e| !e.is_pending())
            .cloned()
            .collect();

        let mut delivered = 0;
        for entry in &snapshot {
            let mut delivery = lock(&entry.callbacks);
            let changed = match event {
                HotplugEvent::Arrived => {
                    self.offer_arrival(entry, &mut delivery, device) != Arrival::Ignored
                }
                HotplugEvent::Left => self.offer_left(entry, &mut delivery, device.id()),
            };
            if changed {
                delivered += 1;
            }
        }

        debug!(
            "Dispatched {:?} for device {} to {} of {} registrations",
            event,
            device.id(),
            delivered,
            snapshot.len()
        );
        delivered
    }

    /// Drain the hotplug pipe without blocking, then sweep
    ///
    /// Only messages already queued on entry are processed; anything written
    /// by callbacks during this call is left for the next one. Returns the
    /// number of messages processed.
    pub fn handle_pending(&self) -> usize {
        let queued = self.pipe.len();
        let mut handled = 0;

        for _ in 0..queued {
            match self.pipe.try_read() {
                Some(message) => {
                    self.process(message);
                    handled += 1;
                }
                None => break,
            }
        }

        self.sweep();
        handled
    }

    /// Block until the pipe has a message, then behave like `handle_pending`
    pub fn handle_events(&self) -> Result<usize> {
        let message = self.pipe.read_blocking()?;
        self.process(message);
        Ok(1 + self.handle_pending())
    }

    /// Reclaim every entry flagged for deletion
    ///
    /// Devices still attached to a reclaimed entry get their `on_left` so the
    /// client's view stays symmetric. Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let removed: Vec<Arc<Entry<B>>> = {
            let mut inner = lock(&self.inner);
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.entries)
                .into_iter()
                .partition(|e| e.is_pending());
            inner.entries = kept;
            removed
        };

        for entry in &removed {
            let mut delivery = lock(&entry.callbacks);
            let devices: Vec<AttachedDevice> = lock(&entry.attached)
                .drain()
                .map(|(id, descriptor)| AttachedDevice { id, descriptor })
                .collect();

            if wants(&entry.filter, HotplugEvent::Left)
                && let Some(on_left) = delivery.on_left.as_mut()
            {
                for device in &devices {
                    on_left(self, device);
                }
            }

            debug!(
                "Swept hotplug callback {} ({} attached devices released)",
                entry.handle,
                devices.len()
            );
        }

        removed.len()
    }

    /// Destroy every registration without invoking callbacks
    ///
    /// Returns the number of entries destroyed, pending ones included.
    pub fn deregister_all(&self) -> usize {
        let entries = std::mem::take(&mut lock(&self.inner).entries);
        if !entries.is_empty() {
            info!("Destroying {} hotplug registrations", entries.len());
        }
        entries.len()
    }

    /// Context destruction: [`deregister_all`](Self::deregister_all), then
    /// discard queued pipe messages
    pub fn teardown(&self) {
        self.deregister_all();
        while self.pipe.try_read().is_some() {}
    }

    /// Whether `handle` is registered and not flagged for deletion
    pub fn is_registered(&self, handle: HotplugHandle) -> bool {
        lock(&self.inner)
            .entries
            .iter()
            .any(|e| e.handle == handle && !e.is_pending())
    }

    /// Number of entries held, including those awaiting a sweep
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the devices attached under `handle`, sorted
    ///
    /// Returns `None` once the entry has been swept or torn down.
    pub fn attached_devices(&self, handle: HotplugHandle) -> Option<Vec<DeviceId>> {
        let entry = lock(&self.inner)
            .entries
            .iter()
            .find(|e| e.handle == handle)
            .cloned()?;

        let mut ids: Vec<DeviceId> = lock(&entry.attached).keys().copied().collect();
        ids.sort();
        Some(ids)
    }

    fn process(&self, message: HotplugMessage<B::Device>) {
        match message {
            HotplugMessage::Wakeup => {}
            HotplugMessage::Device { device, event } => {
                self.dispatch(&device, event);
            }
        }
    }

    fn wake_event_thread(&self) {
        if let Err(e) = self.pipe.write_wakeup() {
            warn!("Error writing hotplug wakeup: {}", e);
        }
    }

    /// Must be called with the entry's delivery lock held
    fn offer_arrival(
        &self,
        entry: &Entry<B>,
        callbacks: &mut Callbacks<B>,
        device: &B::Device,
    ) -> Arrival {
        if entry.is_pending() {
            return Arrival::Ignored;
        }

        let id = device.id();
        let descriptor = device.descriptor();
        if lock(&entry.attached).contains_key(&id) || !matches(&entry.filter, &descriptor) {
            return Arrival::Ignored;
        }

        let action = match callbacks.on_arrived.as_mut() {
            Some(on_arrived) if wants(&entry.filter, HotplugEvent::Arrived) => {
                on_arrived(self, device)
            }
            _ => CallbackAction::Continue,
        };

        match action {
            CallbackAction::Continue => {
                lock(&entry.attached).insert(id, descriptor);
                Arrival::Attached
            }
            CallbackAction::Deregister => {
                let newly = {
                    let _inner = lock(&self.inner);
                    entry.mark_pending()
                };
                if newly {
                    info!(
                        "Hotplug callback {} asked to be deregistered on device {}",
                        entry.handle, id
                    );
                    self.wake_event_thread();
                }
                Arrival::Deregistered
            }
        }
    }

    /// Must be called with the entry's delivery lock held
    fn offer_left(&self, entry: &Entry<B>, callbacks: &mut Callbacks<B>, id: DeviceId) -> bool {
        if entry.is_pending() {
            return false;
        }

        let Some(descriptor) = lock(&entry.attached).remove(&id) else {
            return false;
        };

        if wants(&entry.filter, HotplugEvent::Left)
            && let Some(on_left) = callbacks.on_left.as_mut()
        {
            on_left(self, &AttachedDevice { id, descriptor });
        }

        true
    }
}

impl<B: HotplugBackend> Drop for HotplugRegistry<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
