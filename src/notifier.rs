//! Snapshot fan-out to subscribers
//!
//! [`ChangeNotifier`] keeps an explicit registry of callbacks keyed by
//! [`SubscriptionToken`] and delivers each published snapshot to all of them,
//! in subscription order, on a configurable [`Dispatcher`]. The dispatcher is
//! the only place where work crosses threads on its way to a consumer.
//!
//! # Guarantees
//!
//! - A panicking subscriber is logged and skipped; the rest still receive the
//!   snapshot and the panic never reaches the publisher.
//! - Once `unsubscribe` returns, the callback is not invoked again. A delivery
//!   already running on another thread is waited for; unsubscribing from
//!   inside the callback itself is allowed.
//! - A publish carries a fence checked before each subscriber's callback, so
//!   a snapshot that became stale while queued, or part way through its
//!   fan-out, is dropped for every subscriber not yet reached.
//! - The fence is not held across the callback. An `open` or `close` that
//!   lands between the check and the call lets that one callback see the
//!   superseded snapshot; consumers that must never act on one compare its
//!   `epoch` against the tracker's.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};

use crate::model::Snapshot;

/// Unit of work handed to a dispatcher
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Execution context on which subscriber callbacks run
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs callbacks on the publishing thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// Runs callbacks in FIFO order on one dedicated thread
pub struct ThreadDispatcher {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadDispatcher {
    pub fn new(name: &str) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in rx {
                    job();
                }
            })?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl Dispatcher for ThreadDispatcher {
    fn dispatch(&self, job: Job) {
        if let Some(tx) = self.tx.lock().as_ref() {
            if tx.send(job).is_err() {
                tracing::warn!("[NOTIFY] Delivery thread has exited; dropping job");
            }
        }
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit
        self.tx.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

/// Queues callbacks for a consumer-owned loop (e.g. a UI thread)
///
/// Create with [`queue_dispatcher`]; the consumer drains the paired
/// [`DispatchQueue`] from its own thread.
pub struct QueueDispatcher {
    tx: Mutex<mpsc::Sender<Job>>,
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, job: Job) {
        if self.tx.lock().send(job).is_err() {
            tracing::debug!("[NOTIFY] Dispatch queue dropped; discarding job");
        }
    }
}

/// Receiving end of a [`QueueDispatcher`]
pub struct DispatchQueue {
    rx: mpsc::Receiver<Job>,
}

impl DispatchQueue {
    /// Run every job queued so far, returning how many ran
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one job and run it
    pub fn run_next_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(_) => false,
        }
    }
}

/// Create a dispatcher whose jobs run wherever the returned queue is drained
pub fn queue_dispatcher() -> (QueueDispatcher, DispatchQueue) {
    let (tx, rx) = mpsc::channel();
    (QueueDispatcher { tx: Mutex::new(tx) }, DispatchQueue { rx })
}

/// Registry key returned by [`ChangeNotifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Callback = dyn Fn(&Arc<Snapshot>) + Send + Sync;

struct Subscriber {
    token: SubscriptionToken,
    callback: Box<Callback>,
    /// Held for the duration of each invocation; `false` once unsubscribed
    active: ReentrantMutex<Cell<bool>>,
}

#[derive(Default)]
struct Registry {
    next_token: AtomicU64,
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
}

impl Registry {
    fn deliver(&self, snapshot: &Arc<Snapshot>, is_current: &dyn Fn() -> bool) {
        // Work from a copy so callbacks may subscribe/unsubscribe freely
        let subscribers = self.subscribers.lock().clone();

        for subscriber in subscribers {
            let active = subscriber.active.lock();
            if !active.get() {
                continue;
            }
            if !is_current() {
                tracing::debug!(
                    "[NOTIFY] Snapshot {} superseded during delivery",
                    snapshot.generated_at
                );
                return;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                (subscriber.callback)(snapshot);
            }));
            if let Err(payload) = outcome {
                tracing::error!(
                    "[NOTIFY] Subscriber {:?} panicked: {}",
                    subscriber.token,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Publish/subscribe fan-out of snapshots
pub struct ChangeNotifier {
    registry: Arc<Registry>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl ChangeNotifier {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            dispatcher,
        }
    }

    /// Register a callback for every future publish
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&Arc<Snapshot>) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.registry.next_token.fetch_add(1, Ordering::SeqCst));
        self.registry.subscribers.lock().push(Arc::new(Subscriber {
            token,
            callback: Box::new(callback),
            active: ReentrantMutex::new(Cell::new(true)),
        }));
        tracing::debug!("[NOTIFY] Subscribed {:?}", token);
        token
    }

    /// Remove a callback; returns false for an unknown token
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let removed = {
            let mut subscribers = self.registry.subscribers.lock();
            subscribers
                .iter()
                .position(|s| s.token == token)
                .map(|idx| subscribers.remove(idx))
        };

        match removed {
            Some(subscriber) => {
                // Blocks until an in-flight invocation on another thread finishes
                subscriber.active.lock().set(false);
                tracing::debug!("[NOTIFY] Unsubscribed {:?}", token);
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.lock().len()
    }

    /// Deliver `snapshot` to all subscribers via the dispatcher.
    ///
    /// `is_current` is evaluated when the job runs; once it returns false,
    /// remaining deliveries of this snapshot are dropped.
    pub fn publish<G>(&self, snapshot: Arc<Snapshot>, is_current: G)
    where
        G: Fn() -> bool + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        self.dispatcher.dispatch(Box::new(move || {
            registry.deliver(&snapshot, &is_current);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    fn snapshot(generated_at: u64) -> Arc<Snapshot> {
        Arc::new(Snapshot::empty(generated_at, 0))
    }

    fn inline() -> ChangeNotifier {
        ChangeNotifier::new(Arc::new(InlineDispatcher))
    }

    #[test]
    fn test_delivers_in_subscription_order() {
        let notifier = inline();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["toolbar", "graph", "pending"] {
            let log = Arc::clone(&log);
            notifier.subscribe(move |snap| log.lock().push((name, snap.generated_at)));
        }

        notifier.publish(snapshot(7), || true);

        assert_eq!(
            *log.lock(),
            vec![("toolbar", 7), ("graph", 7), ("pending", 7)]
        );
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let notifier = inline();
        let hits = Arc::new(AtomicU64::new(0));
        notifier.subscribe(|_| panic!("render failed"));
        let h = Arc::clone(&hits);
        notifier.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        notifier.publish(snapshot(1), || true);
        notifier.publish(snapshot(2), || true);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let notifier = inline();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let token = notifier.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        notifier.publish(snapshot(1), || true);
        assert!(notifier.unsubscribe(token));
        assert!(!notifier.unsubscribe(token));
        notifier.publish(snapshot(2), || true);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let notifier = Arc::new(inline());
        let hits = Arc::new(AtomicU64::new(0));
        let token_slot: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&notifier);
        let slot = Arc::clone(&token_slot);
        let h = Arc::clone(&hits);
        let token = notifier.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            if let (Some(notifier), Some(token)) = (weak.upgrade(), *slot.lock()) {
                notifier.unsubscribe(token);
            }
        });
        *token_slot.lock() = Some(token);

        notifier.publish(snapshot(1), || true);
        notifier.publish(snapshot(2), || true);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_fence_drops_delivery() {
        let notifier = inline();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        notifier.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        notifier.publish(snapshot(1), || false);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fence_rechecked_for_each_subscriber() {
        let notifier = inline();
        let current = Arc::new(AtomicBool::new(true));
        let later = Arc::new(AtomicU64::new(0));

        let flip = Arc::clone(&current);
        notifier.subscribe(move |_| flip.store(false, Ordering::SeqCst));
        let h = Arc::clone(&later);
        notifier.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let fence = Arc::clone(&current);
        notifier.publish(snapshot(1), move || fence.load(Ordering::SeqCst));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_queue_dispatcher_defers_until_drained() {
        let (dispatcher, queue) = queue_dispatcher();
        let notifier = ChangeNotifier::new(Arc::new(dispatcher));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        notifier.subscribe(move |snap| s.lock().push(snap.generated_at));

        notifier.publish(snapshot(1), || true);
        notifier.publish(snapshot(2), || true);
        assert!(seen.lock().is_empty());

        assert_eq!(queue.run_pending(), 2);
        assert_eq!(*seen.lock(), vec![1, 2]);
        assert!(!queue.run_next_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_thread_dispatcher_preserves_order() {
        let dispatcher = ThreadDispatcher::new("notify-test").unwrap();
        let notifier = ChangeNotifier::new(Arc::new(dispatcher));
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        notifier.subscribe(move |snap| {
            let _ = tx.lock().send(snap.generated_at);
        });

        for n in 1..=20 {
            notifier.publish(snapshot(n), || true);
        }
        let received: Vec<u64> = (0..20)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(received, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_no_delivery_after_unsubscribe_returns_under_contention() {
        let dispatcher = ThreadDispatcher::new("notify-contention").unwrap();
        let notifier = Arc::new(ChangeNotifier::new(Arc::new(dispatcher)));
        let unsubscribed = Arc::new(AtomicBool::new(false));
        let violations = Arc::new(AtomicU64::new(0));

        let u = Arc::clone(&unsubscribed);
        let v = Arc::clone(&violations);
        let token = notifier.subscribe(move |_| {
            if u.load(Ordering::SeqCst) {
                v.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(1));
        });

        let publisher = {
            let notifier = Arc::clone(&notifier);
            thread::spawn(move || {
                for n in 0..200 {
                    notifier.publish(snapshot(n), || true);
                }
            })
        };
        let churn = {
            let notifier = Arc::clone(&notifier);
            thread::spawn(move || {
                for _ in 0..50 {
                    let t = notifier.subscribe(|_| {});
                    notifier.unsubscribe(t);
                }
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(notifier.unsubscribe(token));
        unsubscribed.store(true, Ordering::SeqCst);

        publisher.join().unwrap();
        churn.join().unwrap();

        // Let the delivery thread drain
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(violations.load(Ordering::SeqCst), 0);
    }
}
