//! Shutdown fan-out and barrier
//!
//! The dispatcher broadcasts one shared [`WaitGroup`] to every worker
//! subscribed to the [`ShutdownChannel`] and waits until each of them has
//! called [`WaitGroup::done`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, warn};

#[derive(Debug)]
struct WaitGroupInner {
    remaining: AtomicUsize,
    acknowledged: AtomicUsize,
    notify: Notify,
}

/// Counting completion barrier
#[derive(Debug, Clone)]
pub struct WaitGroup {
    inner: Arc<WaitGroupInner>,
}

impl WaitGroup {
    pub fn new(count: usize) -> Self {
        Self {
            inner: Arc::new(WaitGroupInner {
                remaining: AtomicUsize::new(count),
                acknowledged: AtomicUsize::new(0),
                notify: Notify::new(),
            }),
        }
    }

    /// Record one acknowledgment
    pub fn done(&self) {
        let previous = self
            .inner
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(n) => {
                self.inner.acknowledged.fetch_add(1, Ordering::AcqRel);
                if n == 1 {
                    self.inner.notify.notify_one();
                }
            }
            Err(_) => warn!("WaitGroup acknowledged more times than expected"),
        }
    }

    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    pub fn acknowledged(&self) -> usize {
        self.inner.acknowledged.load(Ordering::Acquire)
    }

    /// Wait until every expected acknowledgment arrived
    pub async fn wait(&self) {
        while self.remaining() > 0 {
            self.inner.notify.notified().await;
        }
    }
}

/// Outcome of a shutdown fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers the wait group was sent to
    pub workers: usize,
    /// Acknowledgments received
    pub acknowledged: usize,
}

/// Broadcast channel carrying the shutdown wait group
#[derive(Debug, Clone)]
pub struct ShutdownChannel {
    sender: broadcast::Sender<WaitGroup>,
}

impl ShutdownChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscribers
    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send one wait group sized to the live subscribers. `None` when nobody
    /// is listening.
    pub fn fan_out(&self) -> Option<WaitGroup> {
        let workers = self.listeners();
        if workers == 0 {
            return None;
        }
        let wg = WaitGroup::new(workers);
        match self.sender.send(wg.clone()) {
            Ok(_) => {
                debug!(workers, "Shutdown signal sent");
                Some(wg)
            }
            Err(_) => None,
        }
    }

    /// Fan out and wait for every acknowledgment
    pub async fn shutdown(&self) -> ShutdownReport {
        let Some(wg) = self.fan_out() else {
            return ShutdownReport::default();
        };
        wg.wait().await;
        ShutdownReport {
            workers: wg.acknowledged() + wg.remaining(),
            acknowledged: wg.acknowledged(),
        }
    }
}

impl Default for ShutdownChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker side of the shutdown channel
#[derive(Debug)]
pub struct ShutdownListener {
    receiver: broadcast::Receiver<WaitGroup>,
}

impl ShutdownListener {
    /// Wait for the shutdown wait group. `None` once the channel is closed.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<WaitGroup> {
        loop {
            match self.receiver.recv().await {
                Ok(wg) => return Some(wg),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
