// Dispatcher - marshals callbacks from worker threads onto one consumer thread
//
// Tool output arrives on whichever runtime worker is polling the subprocess.
// Observers (a terminal printer, a GUI log view) expect to be called from the
// thread that owns them, so notifications go through a queue that only the
// owning thread drains:
// - any thread enqueues through a cloneable DispatcherHandle
// - the owner calls drain() once per tick, running callbacks in FIFO order
// - callbacks enqueued while a drain is running wait for the next drain

pub mod observers;

pub use observers::{ObserverSet, Subscription};

use std::collections::VecDeque;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

type Task = Box<dyn FnOnce() + Send>;
type Queue = Mutex<VecDeque<Task>>;

/// Default consumer tick used by [`Dispatcher::run_until`] callers.
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

fn lock(queue: &Queue) -> MutexGuard<'_, VecDeque<Task>> {
    // callbacks never run under the lock
    queue.lock().unwrap_or_else(|e| e.into_inner())
}

/// Single-consumer callback queue.
///
/// `Dispatcher` is `!Send`: the thread that creates it is the one
/// that drains it. Hand [`DispatcherHandle`]s to everything else.
///
/// # Example
/// ```ignore
/// let dispatcher = Dispatcher::new();
/// let handle = dispatcher.handle();
///
/// std::thread::spawn(move || {
///     handle.enqueue(|| println!("runs on the consumer thread"));
/// });
///
/// // consumer loop
/// loop {
///     dispatcher.drain();
///     std::thread::sleep(DEFAULT_TICK);
/// }
/// ```
pub struct Dispatcher {
    queue: Arc<Queue>,
    _not_send: PhantomData<*const ()>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            _not_send: PhantomData,
        }
    }

    /// Cloneable, thread-safe producer side of this queue.
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            queue: Arc::downgrade(&self.queue),
        }
    }

    /// Enqueue from the consumer thread itself.
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        lock(&self.queue).push_back(Box::new(task));
    }

    /// Run every callback queued before this call, in FIFO order.
    ///
    /// The queue is detached under the lock and the callbacks run with the lock
    /// released, so a callback may enqueue more work; that work runs on the next
    /// drain.
    ///
    /// # Returns
    /// The number of callbacks that ran
    pub fn drain(&self) -> usize {
        let batch = std::mem::take(&mut *lock(&self.queue));
        let count = batch.len();

        for task in batch {
            task();
        }

        if count > 0 {
            tracing::trace!("Dispatcher drained {} callbacks", count);
        }
        count
    }

    /// Callbacks waiting for the next drain.
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Drive `future` to completion on the current task, draining every `tick`.
    ///
    /// A final drain runs after the future completes so no notification it
    /// produced is left behind.
    pub async fn run_until<F>(&self, future: F, tick: Duration) -> F::Output
    where
        F: Future,
    {
        tokio::pin!(future);
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let output = loop {
            tokio::select! {
                biased;
                output = &mut future => break output,
                _ = interval.tick() => {
                    self.drain();
                }
            }
        };

        self.drain();
        output
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of a [`Dispatcher`].
///
/// Holds only a weak reference: once the dispatcher is dropped, enqueued
/// callbacks are discarded.
#[derive(Clone)]
pub struct DispatcherHandle {
    queue: Weak<Queue>,
}

impl DispatcherHandle {
    /// Schedule `task` to run on the consumer thread.
    ///
    /// # Returns
    /// `false` if the dispatcher no longer exists and the task was discarded
    pub fn enqueue<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.queue.upgrade() {
            Some(queue) => {
                lock(&queue).push_back(Box::new(task));
                true
            }
            None => {
                tracing::warn!("Dispatcher has been dropped - discarding callback");
                false
            }
        }
    }

    /// True while the owning dispatcher is alive.
    pub fn is_connected(&self) -> bool {
        self.queue.strong_count() > 0
    }
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("connected", &self.is_connected())
            .finish()
    }
}
