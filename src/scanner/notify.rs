//! Scanner notifications and their delivery on the UI context.
//!
//! Background jobs never call application code directly. They post
//! [`ScannerEvent`]s into a channel; the [`Notifications`] pump owns the
//! receiving end and delivers events to a [`ScannerDelegate`] on whatever
//! thread calls [`Notifications::dispatch`]. The pump is `Send` but not
//! `Sync`, so it lives on exactly one thread at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ScannerError;

/// Receiver of scanner notifications. Every method must be implemented.
pub trait ScannerDelegate {
    /// A sync job is about to start.
    fn will_sync(&mut self);

    /// The sync job completed.
    fn did_sync(&mut self);

    /// The sync job failed.
    fn failed_to_sync(&mut self, error: &ScannerError);

    /// An online search completed. `None` means no match.
    fn did_search(&mut self, result: Option<&str>);

    /// An online search failed.
    fn failed_to_search(&mut self, error: &ScannerError);
}

/// A notification posted by a background job.
#[derive(Debug)]
pub enum ScannerEvent {
    WillSync,
    DidSync,
    FailedToSync(ScannerError),
    DidSearch(Option<String>),
    FailedToSearch(ScannerError),
}

impl ScannerEvent {
    /// Hand this event to the matching delegate method.
    pub fn deliver<D: ScannerDelegate + ?Sized>(&self, delegate: &mut D) {
        match self {
            ScannerEvent::WillSync => delegate.will_sync(),
            ScannerEvent::DidSync => delegate.did_sync(),
            ScannerEvent::FailedToSync(e) => delegate.failed_to_sync(e),
            ScannerEvent::DidSearch(result) => delegate.did_search(result.as_deref()),
            ScannerEvent::FailedToSearch(e) => delegate.failed_to_search(e),
        }
    }
}

/// An event plus the search epoch it belongs to (search events only).
#[derive(Debug)]
pub(crate) struct Envelope {
    event: ScannerEvent,
    search_epoch: Option<u64>,
}

/// Sending half handed to background jobs.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: Sender<Envelope>,
}

impl EventSender {
    pub(crate) fn post(&self, event: ScannerEvent) {
        self.send(Envelope {
            event,
            search_epoch: None,
        });
    }

    pub(crate) fn post_search(&self, event: ScannerEvent, epoch: u64) {
        self.send(Envelope {
            event,
            search_epoch: Some(epoch),
        });
    }

    fn send(&self, envelope: Envelope) {
        if let Err(e) = self.tx.send(envelope) {
            log::debug!("Notification dropped, pump is gone: {:?}", e.0.event);
        }
    }
}

/// Receiving half: delivers scanner events to a delegate on the owning thread.
pub struct Notifications {
    rx: Receiver<Envelope>,
    search_epoch: Arc<AtomicU64>,
}

impl std::fmt::Debug for Notifications {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifications")
            .field("search_epoch", &self.search_epoch.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

pub(crate) fn channel(search_epoch: Arc<AtomicU64>) -> (EventSender, Notifications) {
    let (tx, rx) = std::sync::mpsc::channel();
    (EventSender { tx }, Notifications { rx, search_epoch })
}

impl Notifications {
    /// Deliver every queued event without blocking. Returns how many were delivered.
    pub fn dispatch<D: ScannerDelegate + ?Sized>(&self, delegate: &mut D) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.try_next() {
            event.deliver(delegate);
            delivered += 1;
        }
        delivered
    }

    /// Wait up to `timeout` for at least one event, then deliver everything queued.
    pub fn dispatch_timeout<D: ScannerDelegate + ?Sized>(
        &self,
        delegate: &mut D,
        timeout: Duration,
    ) -> usize {
        match self.next_timeout(timeout) {
            Some(event) => {
                event.deliver(delegate);
                1 + self.dispatch(delegate)
            }
            None => 0,
        }
    }

    /// Take the next deliverable event, if one is queued.
    pub fn try_next(&self) -> Option<ScannerEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => {
                    if let Some(event) = self.filter(envelope) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Wait up to `timeout` for the next deliverable event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<ScannerEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(envelope) => {
                    if let Some(event) = self.filter(envelope) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    /// Drop search results belonging to a cancelled epoch.
    fn filter(&self, envelope: Envelope) -> Option<ScannerEvent> {
        match envelope.search_epoch {
            Some(epoch) if epoch != self.search_epoch.load(Ordering::SeqCst) => {
                log::debug!("Suppressed cancelled search result: {:?}", envelope.event);
                None
            }
            _ => Some(envelope.event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl ScannerDelegate for Recorder {
        fn will_sync(&mut self) {
            self.calls.push("will_sync".into());
        }
        fn did_sync(&mut self) {
            self.calls.push("did_sync".into());
        }
        fn failed_to_sync(&mut self, error: &ScannerError) {
            self.calls.push(format!("failed_to_sync: {}", error));
        }
        fn did_search(&mut self, result: Option<&str>) {
            self.calls.push(format!("did_search: {:?}", result));
        }
        fn failed_to_search(&mut self, error: &ScannerError) {
            self.calls.push(format!("failed_to_search: {}", error));
        }
    }

    #[test]
    fn test_dispatch_delivers_in_order() {
        let epoch = Arc::new(AtomicU64::new(0));
        let (tx, pump) = channel(Arc::clone(&epoch));
        tx.post(ScannerEvent::WillSync);
        tx.post(ScannerEvent::DidSync);
        tx.post_search(ScannerEvent::DidSearch(Some("uid-1".into())), 0);

        let mut recorder = Recorder::default();
        assert_eq!(pump.dispatch(&mut recorder), 3);
        assert_eq!(
            recorder.calls,
            vec!["will_sync", "did_sync", "did_search: Some(\"uid-1\")"]
        );
    }

    #[test]
    fn test_stale_search_events_are_suppressed() {
        let epoch = Arc::new(AtomicU64::new(0));
        let (tx, pump) = channel(Arc::clone(&epoch));
        tx.post_search(ScannerEvent::DidSearch(None), 0);
        tx.post(ScannerEvent::DidSync);
        epoch.store(1, Ordering::SeqCst);
        tx.post_search(ScannerEvent::FailedToSearch(ScannerError::NotOpen), 1);

        let mut recorder = Recorder::default();
        assert_eq!(pump.dispatch(&mut recorder), 2);
        assert_eq!(
            recorder.calls,
            vec!["did_sync", "failed_to_search: Scanner is not open"]
        );
    }

    #[test]
    fn test_dispatch_timeout_returns_zero_when_idle() {
        let (_tx, pump) = channel(Arc::new(AtomicU64::new(0)));
        let mut recorder = Recorder::default();
        assert_eq!(
            pump.dispatch_timeout(&mut recorder, Duration::from_millis(10)),
            0
        );
    }

    #[test]
    fn test_events_from_other_threads_arrive() {
        let (tx, pump) = channel(Arc::new(AtomicU64::new(0)));
        std::thread::spawn(move || tx.post(ScannerEvent::WillSync));

        let event = pump.next_timeout(Duration::from_secs(5));
        assert!(matches!(event, Some(ScannerEvent::WillSync)));
    }
}
