//! Ordered asynchronous listener callbacks.
//!
//! Each registered listener owns a FIFO queue of pending callbacks. A queue
//! is drained by one worker of a shared [`WorkerPool`] at a time, so a
//! listener sees its callbacks in enqueue order while different listeners
//! progress independently.
//!
//! A callback that panics cancels its listener: the panic is logged, pending
//! callbacks are discarded and nothing more is delivered to that listener.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

use crate::error::{GossipError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A callback that can be delivered to any number of listeners of type `L`.
pub type Callback<L> = Arc<dyn Fn(&L) + Send + Sync>;

/// Fixed set of threads executing queued jobs.
///
/// Threads exit once the pool is dropped and the queue is empty.
pub struct WorkerPool {
    sender: Sender<Job>,
    workers: usize,
}

impl WorkerPool {
    /// Starts `workers` threads (at least one) named `<name>-<index>`.
    pub fn new(name: &str, workers: usize) -> Result<Arc<Self>> {
        let workers = workers.max(1);
        let (sender, receiver) = channel::unbounded::<Job>();
        for index in 0..workers {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })
                .map_err(|e| GossipError::WorkerSpawn(e.to_string()))?;
        }
        tracing::debug!(name, workers, "callback worker pool started");
        Ok(Arc::new(Self { sender, workers }))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn submit(&self, job: Job) {
        if self.sender.send(job).is_err() {
            tracing::error!("callback worker pool is shut down, dropping job");
        }
    }
}

struct QueueState<L: ?Sized> {
    pending: VecDeque<Callback<L>>,
    scheduled: bool,
    cancelled: bool,
}

struct ListenerQueue<L: ?Sized> {
    listener: Arc<L>,
    state: Mutex<QueueState<L>>,
}

impl<L: ?Sized + Send + Sync + 'static> ListenerQueue<L> {
    fn new(listener: Arc<L>) -> Arc<Self> {
        Arc::new(Self {
            listener,
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                scheduled: false,
                cancelled: false,
            }),
        })
    }

    fn push(self: &Arc<Self>, pool: &WorkerPool, callback: Callback<L>, name: &'static str) {
        let mut state = self.state.lock();
        if state.cancelled {
            return;
        }
        state.pending.push_back(callback);
        if state.scheduled {
            return;
        }
        state.scheduled = true;
        drop(state);

        let queue = Arc::clone(self);
        pool.submit(Box::new(move || queue.drain(name)));
    }

    fn drain(&self, name: &'static str) {
        loop {
            let callback = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(callback) => callback,
                    None => {
                        state.scheduled = false;
                        return;
                    }
                }
            };

            let outcome = catch_unwind(AssertUnwindSafe(|| callback(self.listener.as_ref())));
            if outcome.is_err() {
                let mut state = self.state.lock();
                tracing::error!(
                    manager = name,
                    discarded = state.pending.len(),
                    "listener callback panicked, cancelling the listener"
                );
                state.cancelled = true;
                state.pending.clear();
                state.scheduled = false;
                return;
            }
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        state.pending.clear();
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    fn holds(&self, listener: &Arc<L>) -> bool {
        Arc::as_ptr(&self.listener) as *const () == Arc::as_ptr(listener) as *const ()
    }
}

/// Fans callbacks out to listeners, preserving order per listener.
pub struct OrderedCallbackManager<L: ?Sized + Send + Sync + 'static> {
    name: &'static str,
    pool: Arc<WorkerPool>,
    queues: Mutex<Vec<Arc<ListenerQueue<L>>>>,
}

impl<L: ?Sized + Send + Sync + 'static> OrderedCallbackManager<L> {
    pub fn new(name: &'static str, pool: Arc<WorkerPool>) -> Self {
        Self {
            name,
            pool,
            queues: Mutex::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<L>) {
        self.queues.lock().push(ListenerQueue::new(listener));
    }

    /// Registers `listener` and queues `initial` for it only.
    ///
    /// No callback enqueued concurrently can overtake `initial`.
    pub fn add_listener_and_enqueue(&self, listener: Arc<L>, initial: Callback<L>) {
        let mut queues = self.queues.lock();
        let queue = ListenerQueue::new(listener);
        queue.push(&self.pool, initial, self.name);
        queues.push(queue);
    }

    /// Unregisters `listener`; callbacks not yet started are discarded.
    pub fn remove_listener(&self, listener: &Arc<L>) -> bool {
        let mut queues = self.queues.lock();
        let before = queues.len();
        queues.retain(|queue| {
            if queue.holds(listener) {
                queue.cancel();
                false
            } else {
                true
            }
        });
        queues.len() != before
    }

    /// Queues `callback` for every active listener.
    pub fn enqueue(&self, callback: Callback<L>) {
        let mut queues = self.queues.lock();
        queues.retain(|queue| !queue.is_cancelled());
        for queue in queues.iter() {
            queue.push(&self.pool, Arc::clone(&callback), self.name);
        }
    }

    /// Number of listeners that have not been cancelled.
    pub fn listener_count(&self) -> usize {
        self.queues
            .lock()
            .iter()
            .filter(|queue| !queue.is_cancelled())
            .count()
    }
}
