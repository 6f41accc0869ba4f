//! Cancellable one-shot timers that report back through the event loop.
//!
//! Arming a timer spawns a task that sleeps and then posts
//! [`GatewayEvent::Timer`]. Every timer carries a unique id, and the owner
//! compares a fired id with the handle it currently holds. A timer that
//! fires after its owner moved on is recognised as stale and ignored, even
//! if it raced past cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::event::GatewayEvent;

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Bridge handshake window.
    Handshake,
    /// Delay before reopening the serial port.
    Reconnect,
    /// Onboarding window of the active pairing attempt.
    Pairing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub id: TimerId,
}

/// Factory for timers bound to one gateway's event channel.
#[derive(Debug, Clone)]
pub struct Timers {
    next_id: Arc<AtomicU64>,
    events: UnboundedSender<GatewayEvent>,
}

impl Timers {
    pub fn new(events: UnboundedSender<GatewayEvent>) -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    /// Post a [`TimerFired`] event after `delay`.
    pub fn arm(&self, kind: TimerKind, delay: Duration) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!(?kind, id, "Timer fired");
            let _ = events.send(GatewayEvent::Timer(TimerFired { kind, id }));
        });
        TimerHandle { id, kind, task }
    }
}

/// Owned timer; dropping it cancels the pending fire.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    kind: TimerKind,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// `true` if `fired` was produced by this handle.
    pub fn matches(&self, fired: &TimerFired) -> bool {
        self.id == fired.id && self.kind == fired.kind
    }

    /// Abort the pending fire.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = Timers::new(tx);
        let handle = timers.arm(TimerKind::Pairing, Duration::from_secs(90));

        let start = tokio::time::Instant::now();
        let Some(GatewayEvent::Timer(fired)) = rx.recv().await else {
            panic!("expected timer event");
        };
        assert!(handle.matches(&fired));
        assert_eq!(start.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_does_not_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = Timers::new(tx);

        let cancelled = timers.arm(TimerKind::Handshake, Duration::from_millis(10));
        let kept = timers.arm(TimerKind::Handshake, Duration::from_millis(20));
        cancelled.cancel();

        let Some(GatewayEvent::Timer(fired)) = rx.recv().await else {
            panic!("expected timer event");
        };
        assert_eq!(fired.id, kept.id());
    }

    #[tokio::test]
    async fn test_ids_are_unique_across_clones() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let timers = Timers::new(tx);
        let other = timers.clone();

        let a = timers.arm(TimerKind::Reconnect, Duration::from_secs(1));
        let b = other.arm(TimerKind::Reconnect, Duration::from_secs(1));
        assert_ne!(a.id(), b.id());
        assert!(!a.matches(&TimerFired {
            kind: TimerKind::Reconnect,
            id: b.id()
        }));
    }
}
