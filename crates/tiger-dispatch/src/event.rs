//! Request/reply plumbing between sessions, with generation tagging baked
//! into the receiving end rather than checked by callers.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use tiger_types::Frame;

use crate::dispatcher::{Dispatcher, Job, JobHandle};

static REPLY_HANDLE: AtomicU64 = AtomicU64::new(0);

fn fresh_reply_handle() -> JobHandle {
    JobHandle(REPLY_HANDLE.fetch_add(1, Ordering::Relaxed))
}

/// A one-shot reply channel: posts its value as a job on the dispatcher that
/// owns the original requester, so the value is always observed on the
/// thread that asked for it.
pub struct Reply<T: Send + 'static> {
    dispatcher: Dispatcher,
    handler: Box<dyn FnOnce(T) + Send>,
}

impl<T: Send + 'static> Reply<T> {
    /// Builds a reply that runs `handler` on `dispatcher` when fired.
    pub fn new(dispatcher: Dispatcher, handler: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            dispatcher,
            handler: Box::new(handler),
        }
    }

    /// Delivers `value`, posting it onto the owning dispatcher.
    pub fn fire(self, value: T) {
        let handler = self.handler;
        let job: Job = Box::new(move || handler(value));
        self.dispatcher.dispatch_now(fresh_reply_handle(), job);
    }
}

/// A request for the next packet on a track.
pub struct PacketRequest {
    /// Where to deliver the answer. `None` means end of stream.
    pub reply: Reply<Option<Frame>>,
    /// Timestamp to seek to, if this is a seeking request.
    pub ts: Option<tiger_time::MediaTime>,
}

/// A request for the next decoded frame on a track.
pub struct FrameRequest {
    /// Where to deliver the answer. `None` means end of stream.
    pub reply: Reply<Option<Frame>>,
    /// Timestamp to seek to, if this is a seeking request.
    pub ts: Option<tiger_time::MediaTime>,
}

/// A session generation, bumped on every seek. Outbound requests carry the
/// generation they were issued under; inbound deliveries under a stale
/// generation are dropped silently by [`GenTagged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(pub u64);

/// Per-session generation counter. Cloning shares the same counter.
#[derive(Clone, Default)]
pub struct GenerationCounter(Arc<AtomicU64>);

impl GenerationCounter {
    /// A fresh counter starting at generation 0.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    /// The current generation.
    pub fn current(&self) -> Generation {
        Generation(self.0.load(Ordering::Acquire))
    }

    /// Bumps to a new generation (called on seek), returning it.
    pub fn bump(&self) -> Generation {
        Generation(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Wraps a handler with the generation it was built under. [`GenTagged::call`]
/// is a no-op, logged at `debug!`, if the session's live generation has since
/// moved on — the idiomatic stand-in for the original's unchecked "stale"
/// drop, made observable here via `tracing`.
pub struct GenTagged<T> {
    generation: Generation,
    counter: GenerationCounter,
    inner: Box<dyn FnOnce(T) + Send>,
}

impl<T> GenTagged<T> {
    /// Tags `inner` with `counter`'s generation at the time of this call.
    pub fn new(counter: GenerationCounter, inner: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            generation: counter.current(),
            counter,
            inner: Box::new(inner),
        }
    }

    /// Runs the wrapped handler unless the session has since moved to a
    /// newer generation.
    pub fn call(self, value: T) {
        if self.generation == self.counter.current() {
            (self.inner)(value)
        } else {
            debug!(
                generation = self.generation.0,
                current = self.counter.current().0,
                "dropping stale generation-tagged reply"
            );
        }
    }
}

struct TokenInner {
    on_last_drop: std::sync::Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Drop for TokenInner {
    fn drop(&mut self) {
        if let Some(cb) = self.on_last_drop.lock().unwrap().take() {
            cb();
        }
    }
}

/// A reference-counted handle representing "something still wants data from
/// this track". When the last clone drops, the owning source's track-disable
/// path runs. `K` exists only to keep [`PacketRequestEvent`] and
/// [`FrameRequestEvent`] distinct types sharing one implementation.
pub struct RequestToken<K> {
    inner: Arc<TokenInner>,
    _kind: PhantomData<K>,
}

impl<K> RequestToken<K> {
    /// Builds a token that invokes `on_last_drop` once, when its last clone
    /// is dropped.
    pub fn new(on_last_drop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                on_last_drop: std::sync::Mutex::new(Some(Box::new(on_last_drop))),
            }),
            _kind: PhantomData,
        }
    }

    /// Number of live clones of this token, including `self`.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<K> Clone for RequestToken<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _kind: PhantomData,
        }
    }
}

/// Marker for [`RequestToken`] instantiations that track packet interest.
pub struct PacketKind;
/// Marker for [`RequestToken`] instantiations that track frame interest.
pub struct FrameKind;

/// Handle representing live interest in a track's compressed packets.
pub type PacketRequestEvent = RequestToken<PacketKind>;
/// Handle representing live interest in a track's decoded frames.
pub type FrameRequestEvent = RequestToken<FrameKind>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn reply_fires_on_owning_dispatcher() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = mpsc::channel();
        let reply = Reply::new(dispatcher, move |v: i32| tx.send(v).unwrap());
        reply.fire(7);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 7);
    }

    #[test]
    fn gen_tagged_drops_stale_generation() {
        let counter = GenerationCounter::new();
        let (tx, rx) = mpsc::channel();
        let tagged = GenTagged::new(counter.clone(), move |v: i32| tx.send(v).unwrap());
        counter.bump();
        tagged.call(99);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn gen_tagged_runs_current_generation() {
        let counter = GenerationCounter::new();
        let (tx, rx) = mpsc::channel();
        let tagged = GenTagged::new(counter.clone(), move |v: i32| tx.send(v).unwrap());
        tagged.call(5);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 5);
    }

    #[test]
    fn last_drop_triggers_callback() {
        let (tx, rx) = mpsc::channel();
        let token: PacketRequestEvent = RequestToken::new(move || tx.send(()).unwrap());
        let clone = token.clone();
        assert_eq!(token.ref_count(), 2);
        drop(clone);
        assert!(rx.try_recv().is_err());
        drop(token);
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
    }
}
