//! Concurrency stress tests
//!
//! Client threads register and deregister filters while a single event thread
//! plugs and unplugs devices and drains the hotplug pipe. Callbacks sleep for
//! a random interval so that the windows between releasing the registry lock
//! and re-acquiring it are wide.
//!
//! Run with: `cargo test -p hotplug --test concurrency_tests`

use hotplug::test_utils::{DEFAULT_TEST_TIMEOUT, MockBackend, MockDevice, mock_device};
use hotplug::{
    AttachedDevice, CallbackAction, DeviceId, HotplugBackend, HotplugBuilder, HotplugDevice, HotplugEvent,
    HotplugHandle, HotplugRegistry,
};
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const CLIENT_THREADS: usize = 4;
const REGISTRATIONS_PER_THREAD: usize = 40;
const DEVICE_POOL: u32 = 8;

/// Per-registration view of attached devices, as seen through callbacks
#[derive(Default)]
struct Tracker {
    attached: Mutex<HashSet<DeviceId>>,
    arrived: AtomicUsize,
    left: AtomicUsize,
    violations: AtomicUsize,
}

fn jitter(max_micros: u64) {
    let micros = rand::rng().random_range(0..=max_micros);
    if micros > 0 {
        thread::sleep(Duration::from_micros(micros));
    }
}

fn tracked_builder(tracker: &Arc<Tracker>) -> HotplugBuilder<MockBackend> {
    let on_arrived = Arc::clone(tracker);
    let on_left = Arc::clone(tracker);

    HotplugBuilder::<MockBackend>::new()
        .on_arrived(move |_, device: &MockDevice| {
            jitter(50);
            if !on_arrived.attached.lock().unwrap().insert(device.id()) {
                on_arrived.violations.fetch_add(1, Ordering::SeqCst);
            }
            on_arrived.arrived.fetch_add(1, Ordering::SeqCst);
            CallbackAction::Continue
        })
        .on_left(move |_, device: &AttachedDevice| {
            jitter(50);
            if !on_left.attached.lock().unwrap().remove(&device.id) {
                on_left.violations.fetch_add(1, Ordering::SeqCst);
            }
            on_left.left.fetch_add(1, Ordering::SeqCst);
        })
}

fn pool_device(index: u32) -> MockDevice {
    // Alternate two vendors so some filters reject some devices
    let vendor = if index % 2 == 0 { 0x1234 } else { 0x5678 };
    mock_device(index + 1, vendor, 0x0001 + index as u16, 0x00)
}

#[test]
fn test_concurrent_register_deregister_with_dispatch() {
    let backend = MockBackend::new();
    let registry = Arc::new(HotplugRegistry::new(backend.clone()));
    let stop = Arc::new(AtomicBool::new(false));

    // Event thread: toggle devices and drain the pipe
    let event_thread = {
        let registry = Arc::clone(&registry);
        let backend = backend.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let notifier = registry.notifier();
            let mut present = vec![false; DEVICE_POOL as usize];
            let mut rng = rand::rng();

            while !stop.load(Ordering::SeqCst) {
                let index = rng.random_range(0..DEVICE_POOL);
                let device = pool_device(index);

                if present[index as usize] {
                    backend.unplug(device.id());
                    notifier.left(device).unwrap();
                } else {
                    backend.plug(device.clone());
                    notifier.arrived(device).unwrap();
                }
                present[index as usize] = !present[index as usize];

                registry.handle_pending();
                jitter(100);
            }

            registry.handle_pending();
        })
    };

    // Client threads: register, wait, maybe deregister
    let clients: Vec<_> = (0..CLIENT_THREADS)
        .map(|client| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let mut rng = rand::rng();
                let mut kept = Vec::new();
                let mut dropped = Vec::new();

                for i in 0..REGISTRATIONS_PER_THREAD {
                    let tracker = Arc::new(Tracker::default());
                    let mut builder = tracked_builder(&tracker).enumerate(rng.random_bool(0.5));
                    if (client + i) % 3 == 0 {
                        builder = builder.vendor_id(0x1234u16);
                    }

                    let handle = builder.register(&registry).unwrap();
                    jitter(200);

                    if rng.random_bool(0.6) {
                        registry.deregister(handle);
                        dropped.push((handle, tracker));
                    } else {
                        kept.push((handle, tracker));
                    }
                }

                (kept, dropped)
            })
        })
        .collect();

    let mut kept: Vec<(HotplugHandle, Arc<Tracker>)> = Vec::new();
    let mut dropped: Vec<(HotplugHandle, Arc<Tracker>)> = Vec::new();
    for client in clients {
        let (k, d) = client.join().expect("client thread panicked");
        kept.extend(k);
        dropped.extend(d);
    }

    stop.store(true, Ordering::SeqCst);
    event_thread.join().expect("event thread panicked");

    // Every live registration is fully registered, every dropped one is gone
    registry.handle_pending();
    assert_eq!(registry.len(), kept.len());
    for (handle, _) in &kept {
        assert!(registry.is_registered(*handle));
    }
    for (handle, tracker) in &dropped {
        assert!(!registry.is_registered(*handle));
        assert!(registry.attached_devices(*handle).is_none());
        assert!(tracker.attached.lock().unwrap().is_empty());
    }

    // Unplug everything still present; live entries must end empty
    for device in backend.devices().unwrap() {
        backend.unplug(device.id());
        registry.dispatch(&device, HotplugEvent::Left);
    }
    for (handle, _) in &kept {
        assert_eq!(registry.attached_devices(*handle), Some(Vec::new()));
    }

    for (_, tracker) in kept.iter().chain(dropped.iter()) {
        assert_eq!(tracker.violations.load(Ordering::SeqCst), 0);
        assert_eq!(
            tracker.arrived.load(Ordering::SeqCst),
            tracker.left.load(Ordering::SeqCst)
        );
        assert!(tracker.attached.lock().unwrap().is_empty());
    }

    for (handle, _) in &kept {
        registry.deregister(*handle);
    }
    registry.handle_pending();
    assert!(registry.is_empty());
}

#[test]
fn test_reentrant_registration_from_event_thread_does_not_deadlock() {
    let registry = Arc::new(HotplugRegistry::new(MockBackend::new()));
    let nested = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&nested);
    HotplugBuilder::<MockBackend>::new()
        .on_arrived(move |registry, _: &MockDevice| {
            let handle = HotplugBuilder::<MockBackend>::new()
                .enumerate(true)
                .on_arrived(|_, _: &MockDevice| CallbackAction::Continue)
                .register(registry)
                .unwrap();
            registry.deregister(handle);
            counter.fetch_add(1, Ordering::SeqCst);
            CallbackAction::Continue
        })
        .register(&registry)
        .unwrap();

    let client = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for _ in 0..50 {
                let handle = HotplugBuilder::<MockBackend>::new()
                    .on_left(|_, _: &AttachedDevice| {})
                    .register(&registry)
                    .unwrap();
                registry.deregister(handle);
            }
        })
    };

    let notifier = registry.notifier();
    let deadline = Instant::now() + DEFAULT_TEST_TIMEOUT;
    for id in 0..50 {
        notifier
            .arrived(mock_device(id, 0x1234, 0x0001, 0x00))
            .unwrap();
        registry.handle_pending();
        assert!(Instant::now() < deadline, "event loop stalled");
    }

    client.join().expect("client thread panicked");
    registry.handle_pending();

    assert_eq!(nested.load(Ordering::SeqCst), 50);
    assert_eq!(registry.len(), 1);
}
