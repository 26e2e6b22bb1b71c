//! Hotplug pipe between client threads, the backend and the event thread
//!
//! `deregister` never frees an entry itself. It flags the entry and writes a
//! [`HotplugMessage::Wakeup`] here; the event thread drains the pipe and sweeps.
//! The backend uses the same pipe to queue device arrival and removal through a
//! [`HotplugNotifier`], so the event thread sees device changes and
//! deregistration wakeups in the order they were written.
//!
//! The pipe is unbounded so a device change can only be refused once the pipe
//! is closed. At most one wakeup is queued at a time: one sweep reclaims every
//! flagged entry, so further wakeups before it is read carry nothing new.

use crate::error::{Error, Result};
use crate::types::HotplugEvent;
use async_channel::{Receiver, Sender, unbounded};
use std::sync::atomic::{AtomicBool, Ordering};

/// Messages carried by the hotplug pipe
#[derive(Debug)]
pub enum HotplugMessage<D> {
    /// Zero-length record written by `deregister`
    Wakeup,
    /// A physical device change queued by the backend
    Device { device: D, event: HotplugEvent },
}

/// Both ends of the pipe, owned by the registry
pub(crate) struct HotplugPipe<D> {
    tx: Sender<HotplugMessage<D>>,
    rx: Receiver<HotplugMessage<D>>,
    /// Set while a wakeup sits unread in the pipe
    wakeup_queued: AtomicBool,
}

impl<D> HotplugPipe<D> {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            wakeup_queued: AtomicBool::new(false),
        }
    }

    /// Wake the event thread so it sweeps pending entries
    ///
    /// Does nothing if an unread wakeup is already queued.
    pub(crate) fn write_wakeup(&self) -> Result<()> {
        if self.wakeup_queued.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.tx.try_send(HotplugMessage::Wakeup).map_err(|e| {
            self.wakeup_queued.store(false, Ordering::Release);
            Error::ChannelWriteFailed(e.to_string())
        })
    }

    pub(crate) fn notifier(&self) -> HotplugNotifier<D> {
        HotplugNotifier {
            tx: self.tx.clone(),
        }
    }

    /// Next queued message, without blocking
    pub(crate) fn try_read(&self) -> Option<HotplugMessage<D>> {
        self.rx.try_recv().ok().map(|message| self.mark_read(message))
    }

    /// Block until a message is available
    pub(crate) fn read_blocking(&self) -> Result<HotplugMessage<D>> {
        self.rx
            .recv_blocking()
            .map(|message| self.mark_read(message))
            .map_err(|e| Error::ChannelReadFailed(e.to_string()))
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    fn mark_read(&self, message: HotplugMessage<D>) -> HotplugMessage<D> {
        if matches!(message, HotplugMessage::Wakeup) {
            // Cleared before the caller sweeps, so a deregister racing with
            // this read either lands in that sweep or queues a new wakeup
            self.wakeup_queued.swap(false, Ordering::AcqRel);
        }
        message
    }
}

/// Backend-side handle for queuing device changes
///
/// Cheap to clone and usable from any thread. Queued changes are dispatched
/// the next time the event thread drains the pipe.
pub struct HotplugNotifier<D> {
    tx: Sender<HotplugMessage<D>>,
}

impl<D> Clone for HotplugNotifier<D> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<D> HotplugNotifier<D> {
    /// Queue a device change for dispatch
    ///
    /// Fails only once the registry that owns the pipe is gone.
    pub fn notify(&self, device: D, event: HotplugEvent) -> Result<()> {
        self.tx
            .try_send(HotplugMessage::Device { device, event })
            .map_err(|e| Error::ChannelWriteFailed(e.to_string()))
    }

    pub fn arrived(&self, device: D) -> Result<()> {
        self.notify(device, HotplugEvent::Arrived)
    }

    pub fn left(&self, device: D) -> Result<()> {
        self.notify(device, HotplugEvent::Left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wakeup_roundtrip() {
        let pipe: HotplugPipe<u32> = HotplugPipe::new();
        pipe.write_wakeup().unwrap();
        assert_eq!(pipe.len(), 1);
        assert!(matches!(pipe.try_read(), Some(HotplugMessage::Wakeup)));
        assert!(pipe.try_read().is_none());
    }

    #[test]
    fn test_notifier_preserves_order() {
        let pipe: HotplugPipe<u32> = HotplugPipe::new();
        let notifier = pipe.notifier();

        notifier.arrived(7).unwrap();
        pipe.write_wakeup().unwrap();
        notifier.left(7).unwrap();

        assert!(matches!(
            pipe.try_read(),
            Some(HotplugMessage::Device {
                device: 7,
                event: HotplugEvent::Arrived
            })
        ));
        assert!(matches!(pipe.try_read(), Some(HotplugMessage::Wakeup)));
        assert!(matches!(
            pipe.try_read(),
            Some(HotplugMessage::Device {
                device: 7,
                event: HotplugEvent::Left
            })
        ));
    }

    #[test]
    fn test_unread_wakeups_coalesce() {
        let pipe: HotplugPipe<u32> = HotplugPipe::new();
        for _ in 0..5000 {
            pipe.write_wakeup().unwrap();
        }
        assert_eq!(pipe.len(), 1);

        assert!(matches!(pipe.try_read(), Some(HotplugMessage::Wakeup)));
        pipe.write_wakeup().unwrap();
        assert_eq!(pipe.len(), 1);
    }

    #[test]
    fn test_device_changes_queue_behind_many_wakeups() {
        let pipe: HotplugPipe<u32> = HotplugPipe::new();
        let notifier = pipe.notifier();

        for device in 0..5000 {
            pipe.write_wakeup().unwrap();
            notifier.arrived(device).unwrap();
        }
        notifier.left(1).unwrap();

        assert_eq!(pipe.len(), 5002);
    }

    #[test]
    fn test_closed_pipe_reports_write_failure() {
        let pipe: HotplugPipe<u32> = HotplugPipe::new();
        pipe.tx.close();

        let err = pipe.write_wakeup().unwrap_err();
        assert!(matches!(err, Error::ChannelWriteFailed(_)));
        // A failed write leaves no phantom wakeup behind
        assert!(matches!(
            pipe.write_wakeup(),
            Err(Error::ChannelWriteFailed(_))
        ));

        let err = pipe.notifier().arrived(1).unwrap_err();
        assert!(matches!(err, Error::ChannelWriteFailed(_)));
    }

    #[test]
    fn test_closed_pipe_reports_read_failure() {
        let pipe: HotplugPipe<u32> = HotplugPipe::new();
        pipe.tx.close();

        let err = pipe.read_blocking().unwrap_err();
        assert!(matches!(err, Error::ChannelReadFailed(_)));
    }

    #[test]
    fn test_blocking_read_from_other_thread() {
        let pipe: HotplugPipe<u32> = HotplugPipe::new();
        let notifier = pipe.notifier();

        let handle = std::thread::spawn(move || notifier.arrived(42).unwrap());

        let msg = pipe.read_blocking().unwrap();
        assert!(matches!(msg, HotplugMessage::Device { device: 42, .. }));
        handle.join().unwrap();
    }
}
