//! Hotplug event thread
//!
//! Dedicated thread that runs libusb's event loop and drains the registry's
//! hotplug pipe after every pass. This is the only thread that delivers
//! callbacks; the Tokio runtime talks to it through a command channel.

use crate::usb::backend::RusbBackend;
use crate::usb::watcher::HotplugForwarder;
use anyhow::{Context as _, anyhow};
use hotplug::{HotplugBackend, HotplugRegistry};
use rusb::{Context, Registration, UsbContext};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Commands accepted by the event thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    Shutdown,
}

/// Event thread state
pub struct EventThread {
    registry: Arc<HotplugRegistry<RusbBackend>>,
    commands: async_channel::Receiver<WorkerCommand>,
    poll_interval: Duration,
    /// libusb hotplug registration, dropped when the thread exits
    registration: Option<Registration<Context>>,
}

impl EventThread {
    /// Create the event thread state and hook up libusb notifications
    ///
    /// Without platform hotplug support the thread still runs, so callbacks
    /// registered later are reclaimed, but no device changes are reported.
    pub fn new(
        registry: Arc<HotplugRegistry<RusbBackend>>,
        commands: async_channel::Receiver<WorkerCommand>,
        poll_interval: Duration,
    ) -> Result<Self, rusb::Error> {
        let registration = if registry.backend().has_hotplug() {
            let forwarder = HotplugForwarder::new(registry.notifier());
            Some(forwarder.register(registry.backend().context())?)
        } else {
            warn!("libusb reports no hot-plug support on this platform");
            None
        };

        Ok(Self {
            registry,
            commands,
            poll_interval,
            registration,
        })
    }

    /// Run the event loop
    ///
    /// Each iteration:
    /// 1. Checks for a command from Tokio (non-blocking)
    /// 2. Processes libusb events, which may queue hot-plug messages
    /// 3. Drains the hotplug pipe and reclaims deregistered entries
    ///
    /// The loop continues until a Shutdown command is received or the
    /// command channel closes.
    pub fn run(mut self) -> Result<(), rusb::Error> {
        info!("Hotplug event thread started");

        loop {
            match self.commands.try_recv() {
                Ok(WorkerCommand::Shutdown) | Err(async_channel::TryRecvError::Closed) => {
                    info!("Hotplug event thread shutting down");
                    break;
                }
                Err(async_channel::TryRecvError::Empty) => {}
            }

            match self
                .registry
                .backend()
                .context()
                .handle_events(Some(self.poll_interval))
            {
                Ok(()) => {}
                Err(rusb::Error::Interrupted) => {
                    debug!("USB event handling interrupted");
                }
                Err(e) => {
                    warn!("Error handling USB events: {}", e);
                    std::thread::sleep(self.poll_interval);
                }
            }

            let processed = self.registry.handle_pending();
            if processed > 0 {
                debug!("Event pass processed {} hotplug messages", processed);
            }
        }

        // Stop libusb from queueing into a pipe nobody drains
        self.registration.take();
        self.registry.handle_pending();

        info!("Hotplug event thread stopped");
        Ok(())
    }
}

/// Spawn the hotplug event thread
///
/// Returns once libusb notifications are hooked up, so devices plugged in
/// after this call are reported to watches registered afterwards. Returns
/// the command sender used to stop the thread and its join handle.
pub fn spawn_event_thread(
    registry: Arc<HotplugRegistry<RusbBackend>>,
    poll_interval: Duration,
) -> anyhow::Result<(
    async_channel::Sender<WorkerCommand>,
    JoinHandle<Result<(), rusb::Error>>,
)> {
    let (tx, rx) = async_channel::bounded(8);

    let handle = spawn_initialized(
        "hotplug-events",
        move || EventThread::new(registry, rx, poll_interval),
        EventThread::run,
    )?;

    Ok((tx, handle))
}

/// Spawn a named thread that runs `init`, then `run` on its result
///
/// Blocks until `init` has finished. An `init` failure is returned here and
/// the thread exits without calling `run`.
fn spawn_initialized<T, E, I, R>(
    name: &str,
    init: I,
    run: R,
) -> anyhow::Result<JoinHandle<Result<(), E>>>
where
    I: FnOnce() -> Result<T, E> + Send + 'static,
    R: FnOnce(T) -> Result<(), E> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let (ready_tx, ready_rx) = async_channel::bounded(1);

    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || match init() {
            Ok(state) => {
                let _ = ready_tx.send_blocking(None);
                run(state)
            }
            Err(e) => {
                let _ = ready_tx.send_blocking(Some(e));
                Ok(())
            }
        })
        .with_context(|| format!("Failed to spawn thread '{}'", name))?;

    match ready_rx.recv_blocking() {
        Ok(None) => Ok(handle),
        Ok(Some(e)) => {
            let _ = handle.join();
            Err(anyhow::Error::new(e).context(format!("Thread '{}' failed to start", name)))
        }
        Err(_) => {
            let _ = handle.join();
            Err(anyhow!("Thread '{}' exited during startup", name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_spawn_waits_for_init() {
        let ready = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ready);

        let handle = spawn_initialized(
            "init-test",
            move || {
                std::thread::sleep(Duration::from_millis(50));
                flag.store(true, Ordering::SeqCst);
                Ok::<_, io::Error>(7u32)
            },
            |state| {
                assert_eq!(state, 7);
                Ok(())
            },
        )
        .unwrap();

        assert!(ready.load(Ordering::SeqCst));
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_spawn_reports_init_failure() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let err = spawn_initialized(
            "init-test",
            || Err::<(), _>(io::Error::other("no hotplug")),
            move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .unwrap_err();

        assert!(format!("{:#}", err).contains("no hotplug"));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_spawn_reports_init_panic() {
        let result = spawn_initialized(
            "init-test",
            || -> Result<(), io::Error> { panic!("init panicked") },
            |_| Ok(()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_event_thread_stops_on_shutdown() {
        // May fail without USB access; only exercise the loop when it works
        let context = match Context::new() {
            Ok(context) => context,
            Err(e) => {
                eprintln!("USB context creation failed (expected without permissions): {}", e);
                return;
            }
        };

        let registry = Arc::new(HotplugRegistry::new(RusbBackend::new(context)));
        let spawned = spawn_event_thread(Arc::clone(&registry), Duration::from_millis(10));
        let (tx, handle) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                eprintln!("Event thread failed to start (expected without hot-plug): {:#}", e);
                return;
            }
        };

        tx.send_blocking(WorkerCommand::Shutdown).unwrap();
        handle.join().expect("event thread panicked").unwrap();
    }

    #[test]
    fn test_event_thread_stops_when_sender_dropped() {
        let context = match Context::new() {
            Ok(context) => context,
            Err(e) => {
                eprintln!("USB context creation failed (expected without permissions): {}", e);
                return;
            }
        };

        let registry = Arc::new(HotplugRegistry::new(RusbBackend::new(context)));
        let Ok((tx, handle)) = spawn_event_thread(registry, Duration::from_millis(10)) else {
            return;
        };

        drop(tx);
        let _ = handle.join().expect("event thread panicked");
    }
}
