//! Sample interceptors for tests.
//!
//! Each one exercises a single hook of the interceptor contract:
//!
//! - [`GatedInterceptor`] - readiness
//! - [`RecordingInterceptor`] - call ordering and close
//! - [`RejectingInterceptor`] - short-circuiting before the backend
//! - [`ResultRewriteInterceptor`] - rewriting the append result
//! - [`TimeTickInterceptor`] - stamping messages and reporting the tick back

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use walstream_core::{
    AppendFn, AppendResult, AppendResultRewriter, Interceptor, InterceptorBuildParam,
    InterceptorBuilder, WalError, WalResult,
};
use walstream_message::{BasicMessage, MessageId, MutableMessage};
use walstream_sync::{Context, Signal};

/// Wraps an already built interceptor in a builder that hands out clones.
pub fn shared_builder<I>(interceptor: Arc<I>) -> Box<dyn InterceptorBuilder>
where
    I: Interceptor + 'static,
{
    Box::new(move |_: &InterceptorBuildParam| -> Arc<dyn Interceptor> {
        Arc::clone(&interceptor) as Arc<dyn Interceptor>
    })
}

/// Passes appends through; not ready until [`GatedInterceptor::open`].
#[derive(Debug, Default)]
pub struct GatedInterceptor {
    gate: Signal,
}

impl GatedInterceptor {
    /// Creates a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the interceptor ready.
    pub fn open(&self) {
        self.gate.fire();
    }
}

impl Interceptor for GatedInterceptor {
    fn ready(&self) -> Signal {
        self.gate.clone()
    }

    fn do_append(
        &self,
        ctx: &Context,
        msg: MutableMessage,
        next: &AppendFn<'_>,
    ) -> WalResult<MessageId> {
        next(ctx, msg)
    }
}

/// Logs `"{name}:before"`, `"{name}:after"` and `"{name}:close"` events to a
/// shared journal.
#[derive(Debug)]
pub struct RecordingInterceptor {
    name: String,
    journal: Arc<Mutex<Vec<String>>>,
    appended: Mutex<Vec<MessageId>>,
    closes: AtomicUsize,
}

impl RecordingInterceptor {
    /// Creates a recorder writing to `journal`.
    pub fn new(name: impl Into<String>, journal: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            journal: Arc::clone(journal),
            appended: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    /// Ids returned by the rest of the chain, in completion order.
    pub fn appended(&self) -> Vec<MessageId> {
        self.appended.lock().clone()
    }

    /// Times `close` was called.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn record(&self, event: &str) {
        self.journal.lock().push(format!("{}:{event}", self.name));
    }
}

impl Interceptor for RecordingInterceptor {
    fn do_append(
        &self,
        ctx: &Context,
        msg: MutableMessage,
        next: &AppendFn<'_>,
    ) -> WalResult<MessageId> {
        self.record("before");
        let id = next(ctx, msg)?;
        self.appended.lock().push(id.clone());
        self.record("after");
        Ok(id)
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.record("close");
    }
}

type Predicate = Box<dyn Fn(&MutableMessage) -> bool + Send + Sync>;

/// Refuses messages matching a predicate without calling the backend.
pub struct RejectingInterceptor {
    reject: Predicate,
    rejected: AtomicUsize,
}

impl RejectingInterceptor {
    /// Rejects every message for which `reject` returns true.
    pub fn new<F>(reject: F) -> Self
    where
        F: Fn(&MutableMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            reject: Box::new(reject),
            rejected: AtomicUsize::new(0),
        }
    }

    /// Rejects every message.
    pub fn all() -> Self {
        Self::new(|_| true)
    }

    /// Number of messages rejected so far.
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }
}

impl Interceptor for RejectingInterceptor {
    fn do_append(
        &self,
        ctx: &Context,
        msg: MutableMessage,
        next: &AppendFn<'_>,
    ) -> WalResult<MessageId> {
        if (self.reject)(&msg) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(WalError::interceptor(format!(
                "{} message refused",
                msg.message_type()
            )));
        }
        next(ctx, msg)
    }
}

/// Overwrites the result's message id and tags it with an extra field.
#[derive(Debug)]
pub struct ResultRewriteInterceptor {
    id: MessageId,
    tag: (String, String),
}

impl ResultRewriteInterceptor {
    /// Rewrites every result to `id` and sets extra field `key = value`.
    pub fn new(id: MessageId, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id,
            tag: (key.into(), value.into()),
        }
    }
}

impl Interceptor for ResultRewriteInterceptor {
    fn do_append(
        &self,
        ctx: &Context,
        msg: MutableMessage,
        next: &AppendFn<'_>,
    ) -> WalResult<MessageId> {
        next(ctx, msg)
    }

    fn as_result_rewriter(&self) -> Option<&dyn AppendResultRewriter> {
        Some(self)
    }
}

impl AppendResultRewriter for ResultRewriteInterceptor {
    fn rewrite_append_result(&self, result: &mut AppendResult) {
        result.message_id = self.id.clone();
        result.set_extra(self.tag.0.clone(), self.tag.1.clone());
    }
}

/// Stamps a monotonically increasing time tick on every message that lacks
/// one, and reports it in the append result.
///
/// The tick is handed to the rewrite step by appending thread, so rewriters
/// registered ahead of this one may replace the message id freely.
#[derive(Debug)]
pub struct TimeTickInterceptor {
    next_tick: AtomicU64,
    assigned: Mutex<HashMap<ThreadId, u64>>,
}

impl TimeTickInterceptor {
    /// Starts assigning ticks at `start`.
    pub fn starting_at(start: u64) -> Self {
        Self {
            next_tick: AtomicU64::new(start),
            assigned: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for TimeTickInterceptor {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl Interceptor for TimeTickInterceptor {
    fn do_append(
        &self,
        ctx: &Context,
        msg: MutableMessage,
        next: &AppendFn<'_>,
    ) -> WalResult<MessageId> {
        let (msg, tick) = if msg.properties().exists(walstream_message::TIME_TICK_KEY) {
            let tick = msg.time_tick();
            (msg, tick)
        } else {
            let tick = self.next_tick.fetch_add(1, Ordering::SeqCst);
            (msg.with_time_tick(tick), tick)
        };
        let id = next(ctx, msg)?;
        self.assigned.lock().insert(thread::current().id(), tick);
        Ok(id)
    }

    fn as_result_rewriter(&self) -> Option<&dyn AppendResultRewriter> {
        Some(self)
    }
}

impl AppendResultRewriter for TimeTickInterceptor {
    fn rewrite_append_result(&self, result: &mut AppendResult) {
        if let Some(tick) = self.assigned.lock().remove(&thread::current().id()) {
            result.time_tick = tick;
        }
    }
}
