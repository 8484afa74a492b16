//! Subscriber that forwards delivered snapshots to the test thread

use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use repo_tracker::{RepositoryTracker, Snapshot, SubscriptionToken};

pub struct Collector {
    rx: mpsc::Receiver<Arc<Snapshot>>,
    pub token: SubscriptionToken,
}

impl Collector {
    pub fn attach(tracker: &RepositoryTracker) -> Self {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let token = tracker.subscribe(move |snapshot| {
            let _ = tx.lock().unwrap().send(Arc::clone(snapshot));
        });
        Self { rx, token }
    }

    /// Next delivered snapshot, if one arrives within `timeout`
    pub fn next(&self, timeout: Duration) -> Option<Arc<Snapshot>> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Next snapshot, failing the test if none arrives
    pub fn expect(&self, timeout: Duration) -> Arc<Snapshot> {
        self.next(timeout)
            .unwrap_or_else(|| panic!("no snapshot delivered within {:?}", timeout))
    }

    /// First snapshot matching `accept`, skipping others
    pub fn wait_for<F>(&self, timeout: Duration, accept: F) -> Arc<Snapshot>
    where
        F: Fn(&Snapshot) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .unwrap_or_else(|| panic!("no matching snapshot within {:?}", timeout));
            match self.rx.recv_timeout(remaining) {
                Ok(snapshot) if accept(&snapshot) => return snapshot,
                Ok(_) => {}
                Err(_) => panic!("no matching snapshot within {:?}", timeout),
            }
        }
    }

    /// Everything delivered during the next `window`
    pub fn collect(&self, window: Duration) -> Vec<Arc<Snapshot>> {
        let deadline = Instant::now() + window;
        let mut out = Vec::new();
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match self.rx.recv_timeout(remaining) {
                Ok(snapshot) => out.push(snapshot),
                Err(_) => break,
            }
        }
        out
    }

    /// Everything already delivered, without waiting
    pub fn drain(&self) -> Vec<Arc<Snapshot>> {
        self.rx.try_iter().collect()
    }
}
