//! Single-threaded cooperative job dispatcher.
//!
//! Each [`Dispatcher`] owns one dedicated OS thread running a
//! `tokio::runtime::Builder::new_current_thread()` loop. All session event
//! handlers run as jobs posted to a dispatcher; nothing outside `tiger-clock`
//! needs a mutex around session state, because a session's own handlers
//! never run concurrently with each other.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// A unit of work posted to a [`Dispatcher`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Caller-chosen identifier for a dispatched job. Re-dispatching the same
/// handle replaces its deadline and closure rather than queuing a duplicate
/// — sessions reuse a fixed handle per timer kind (e.g. "render tick",
/// "refill check") instead of tracking a fresh id per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(pub u64);

struct Scheduled {
    deadline: Instant,
    seq: u64,
    job: Option<Job>,
}

#[derive(Clone, Copy, Eq, PartialEq)]
struct HeapKey {
    deadline: Instant,
    seq: u64,
    handle: u64,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.seq.cmp(&other.seq))
            .then_with(|| self.handle.cmp(&other.handle))
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reverses [`HeapKey`] ordering so `BinaryHeap` (a max-heap) pops the
/// earliest deadline first.
#[derive(Clone, Copy, Eq, PartialEq)]
struct MinKey(HeapKey);

impl Ord for MinKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

impl PartialOrd for MinKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct State {
    jobs: HashMap<u64, Scheduled>,
    heap: BinaryHeap<MinKey>,
    next_seq: u64,
}

impl State {
    fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

struct Shared {
    state: Mutex<State>,
    wake: Notify,
    shutdown: AtomicBool,
}

/// A dedicated-thread, single-threaded cooperative job dispatcher.
///
/// Cloning a `Dispatcher` shares the same background thread and queue; the
/// thread is joined when the last clone is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Dispatcher {
    /// Spawns the dispatcher's background thread and its `tokio`
    /// current-thread runtime.
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::new()),
            wake: Notify::new(),
            shutdown: AtomicBool::new(false),
        });
        let worker_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("tiger-dispatch".into())
            .spawn(move || run_worker(worker_shared))
            .expect("failed to spawn dispatcher thread");
        Self {
            shared,
            thread: Arc::new(Mutex::new(Some(thread))),
        }
    }

    /// Dispatches `job` under `handle`, to run after `delay`.
    pub fn dispatch(&self, handle: JobHandle, delay: Duration, job: Job) {
        self.dispatch_at(handle, Instant::now() + delay, job);
    }

    /// Dispatches `job` under `handle`, to run as soon as the loop is free.
    pub fn dispatch_now(&self, handle: JobHandle, job: Job) {
        self.dispatch_at(handle, Instant::now(), job);
    }

    fn dispatch_at(&self, handle: JobHandle, deadline: Instant, job: Job) {
        let mut state = self.shared.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.jobs.insert(
            handle.0,
            Scheduled {
                deadline,
                seq,
                job: Some(job),
            },
        );
        state.heap.push(MinKey(HeapKey {
            deadline,
            seq,
            handle: handle.0,
        }));
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Whether `handle` is still pending (not yet run, not removed).
    pub fn exists(&self, handle: JobHandle) -> bool {
        self.shared.state.lock().jobs.contains_key(&handle.0)
    }

    /// Cancels `handle` if it is still pending. A no-op if it already ran or
    /// was never dispatched.
    pub fn remove(&self, handle: JobHandle) {
        self.shared.state.lock().jobs.remove(&handle.0);
    }

    /// Blocks the calling thread until every job dispatched before this call
    /// with a deadline at or before now has run. Jobs those jobs dispatch in
    /// turn are not waited on.
    pub fn flush(&self) {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let handle = JobHandle(u64::MAX - rand_ish());
        self.dispatch_now(
            handle,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        let _ = rx.recv();
    }
}

/// Cheap, non-cryptographic scatter for flush's internal barrier handle so
/// concurrent `flush()` calls don't collide on the same `JobHandle`.
fn rand_ish() -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    Instant::now().hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if Arc::strong_count(&self.shared) == 1 {
            self.shared.shutdown.store(true, AtomicOrdering::SeqCst);
            self.shared.wake.notify_one();
            if let Some(thread) = self.thread.lock().take() {
                let _ = thread.join();
            }
        }
    }
}

fn run_worker(shared: Arc<Shared>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to build dispatcher runtime");
    runtime.block_on(async move {
        loop {
            if shared.shutdown.load(AtomicOrdering::SeqCst) {
                return;
            }
            let next_deadline = {
                let state = shared.state.lock();
                state.heap.peek().map(|k| k.0.deadline)
            };
            match next_deadline {
                None => shared.wake.notified().await,
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        tokio::select! {
                            _ = tokio::time::sleep(deadline - now) => {}
                            _ = shared.wake.notified() => {}
                        }
                        continue;
                    }
                    run_due_jobs(&shared, now);
                }
            }
        }
    });
}

fn run_due_jobs(shared: &Arc<Shared>, now: Instant) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            let Some(top) = state.heap.peek().copied() else {
                return;
            };
            if top.0.deadline > now {
                return;
            }
            state.heap.pop();
            match state.jobs.get_mut(&top.0.handle) {
                Some(entry) if entry.seq == top.0.seq => {
                    let job = entry.job.take();
                    state.jobs.remove(&top.0.handle);
                    job
                }
                _ => {
                    trace!(handle = top.0.handle, "skipping stale dispatcher entry");
                    None
                }
            }
        };
        if let Some(job) = job {
            debug!("running dispatched job");
            job();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn runs_immediate_job() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = mpsc::channel();
        dispatcher.dispatch_now(JobHandle(1), Box::new(move || tx.send(42).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 42);
    }

    #[test]
    fn redispatch_replaces_deadline_not_queues_twice() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = mpsc::channel();
        dispatcher.dispatch(
            JobHandle(7),
            Duration::from_secs(60),
            Box::new(|| panic!("stale job ran")),
        );
        let tx2 = tx.clone();
        dispatcher.dispatch_now(JobHandle(7), Box::new(move || tx2.send(1).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 1);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn remove_cancels_pending_job() {
        let dispatcher = Dispatcher::new();
        dispatcher.dispatch(
            JobHandle(3),
            Duration::from_millis(20),
            Box::new(|| panic!("removed job ran")),
        );
        assert!(dispatcher.exists(JobHandle(3)));
        dispatcher.remove(JobHandle(3));
        assert!(!dispatcher.exists(JobHandle(3)));
        std::thread::sleep(Duration::from_millis(60));
    }

    #[test]
    fn flush_waits_for_currently_queued_jobs() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = mpsc::channel();
        for i in 0..5u64 {
            let tx = tx.clone();
            dispatcher.dispatch_now(JobHandle(100 + i), Box::new(move || tx.send(i).unwrap()));
        }
        dispatcher.flush();
        let mut seen: Vec<u64> = rx.try_iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
