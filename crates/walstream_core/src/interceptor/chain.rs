//! Ordered composition of interceptors.

use super::{AppendFn, AppendResultRewriter, Interceptor};
use crate::error::{WalError, WalResult};
use crate::wal::AppendResult;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;
use walstream_message::{MessageId, MutableMessage};
use walstream_sync::{Context, Signal};

/// Interceptors composed in registration order.
///
/// The chain is itself an [`Interceptor`], so chains nest.
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    ready: Signal,
    closed: Signal,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl InterceptorChain {
    /// Composes `interceptors`, first registered outermost.
    ///
    /// When some member is not ready yet, a watcher thread waits on each
    /// member in turn and fires the chain's readiness once all have resolved.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::Spawn`] if the watcher thread cannot start.
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> WalResult<Self> {
        let ready = Signal::new();
        let closed = Signal::new();
        let pending: Vec<Signal> = interceptors
            .iter()
            .map(|i| i.ready())
            .filter(|s| !s.is_fired())
            .collect();

        let watcher = if pending.is_empty() {
            ready.fire();
            None
        } else {
            let ready = ready.clone();
            let closed = closed.clone();
            let handle = thread::Builder::new()
                .name("interceptor-ready".to_string())
                .spawn(move || watch_ready(&pending, &ready, &closed))
                .map_err(|e| WalError::spawn("interceptor readiness watcher", e))?;
            Some(handle)
        };

        Ok(Self {
            interceptors,
            ready,
            closed,
            watcher: Mutex::new(watcher),
        })
    }

    /// Number of interceptors in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns true for a chain with no interceptors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Returns true once every member is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.is_fired()
    }

    fn walk(
        &self,
        index: usize,
        ctx: &Context,
        msg: MutableMessage,
        tail: &AppendFn<'_>,
    ) -> WalResult<MessageId> {
        match self.interceptors.get(index) {
            None => tail(ctx, msg),
            Some(interceptor) => {
                let next = |ctx: &Context, msg: MutableMessage| self.walk(index + 1, ctx, msg, tail);
                interceptor.do_append(ctx, msg, &next)
            }
        }
    }
}

fn watch_ready(pending: &[Signal], ready: &Signal, closed: &Signal) {
    let stop = closed.done();
    for member in pending {
        let member_ready = member.done();
        crossbeam::select! {
            recv(member_ready) -> _ => {}
            recv(stop) -> _ => {
                debug!("interceptor chain closed before becoming ready");
                return;
            }
        }
    }
    ready.fire();
    debug!("interceptor chain ready");
}

impl Interceptor for InterceptorChain {
    fn ready(&self) -> Signal {
        self.ready.clone()
    }

    fn do_append(
        &self,
        ctx: &Context,
        msg: MutableMessage,
        next: &AppendFn<'_>,
    ) -> WalResult<MessageId> {
        self.walk(0, ctx, msg, next)
    }

    fn as_result_rewriter(&self) -> Option<&dyn AppendResultRewriter> {
        Some(self)
    }

    /// Stops the readiness watcher and closes every member in order.
    fn close(&self) {
        if !self.closed.fire() {
            return;
        }
        if let Some(handle) = self.watcher.lock().take() {
            let _ = handle.join();
        }
        for interceptor in &self.interceptors {
            interceptor.close();
        }
    }
}

impl AppendResultRewriter for InterceptorChain {
    fn rewrite_append_result(&self, result: &mut AppendResult) {
        for interceptor in &self.interceptors {
            if let Some(rewriter) = interceptor.as_result_rewriter() {
                rewriter.rewrite_append_result(result);
            }
        }
    }
}

impl Drop for InterceptorChain {
    fn drop(&mut self) {
        self.closed.fire();
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .field("ready", &self.ready.is_fired())
            .field("closed", &self.closed.is_fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;

    struct Tag {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        ready: Signal,
        rewrite_to: Option<u64>,
        closed: AtomicBool,
    }

    impl Tag {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log: Arc::clone(log),
                ready: Signal::fired(),
                rewrite_to: None,
                closed: AtomicBool::new(false),
            }
        }
    }

    impl Interceptor for Tag {
        fn ready(&self) -> Signal {
            self.ready.clone()
        }

        fn do_append(
            &self,
            ctx: &Context,
            msg: MutableMessage,
            next: &AppendFn<'_>,
        ) -> WalResult<MessageId> {
            self.log.lock().push(format!("{}:before", self.name));
            let id = next(ctx, msg)?;
            self.log.lock().push(format!("{}:after", self.name));
            Ok(id)
        }

        fn as_result_rewriter(&self) -> Option<&dyn AppendResultRewriter> {
            self.rewrite_to.map(|_| self as &dyn AppendResultRewriter)
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            self.log.lock().push(format!("{}:close", self.name));
        }
    }

    impl AppendResultRewriter for Tag {
        fn rewrite_append_result(&self, result: &mut AppendResult) {
            if let Some(seq) = self.rewrite_to {
                result.message_id = MessageId::from_u64("test", seq);
            }
        }
    }

    struct Reject;

    impl Interceptor for Reject {
        fn do_append(
            &self,
            _ctx: &Context,
            _msg: MutableMessage,
            _next: &AppendFn<'_>,
        ) -> WalResult<MessageId> {
            Err(WalError::interceptor("rejected"))
        }
    }

    fn msg() -> MutableMessage {
        MutableMessage::builder(walstream_message::MessageType::Insert).build()
    }

    fn counting_tail(counter: &AtomicU64) -> impl Fn(&Context, MutableMessage) -> WalResult<MessageId> + '_ {
        move |_ctx: &Context, _msg: MutableMessage| {
            let seq = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(MessageId::from_u64("test", seq))
        }
    }

    #[test]
    fn empty_chain_is_ready_and_calls_tail() {
        let chain = InterceptorChain::new(Vec::new()).unwrap();
        assert!(chain.is_ready());
        assert!(chain.is_empty());
        let counter = AtomicU64::new(0);
        let id = chain
            .do_append(&Context::background(), msg(), &counting_tail(&counter))
            .unwrap();
        assert_eq!(id.as_u64(), Some(1));
    }

    #[test]
    fn interceptors_nest_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            Arc::new(Tag::new("a", &log)),
            Arc::new(Tag::new("b", &log)),
        ])
        .unwrap();
        let counter = AtomicU64::new(0);
        chain
            .do_append(&Context::background(), msg(), &counting_tail(&counter))
            .unwrap();
        assert_eq!(
            *log.lock(),
            vec!["a:before", "b:before", "b:after", "a:after"]
        );
    }

    #[test]
    fn rejection_before_tail_has_no_side_effect() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain =
            InterceptorChain::new(vec![Arc::new(Tag::new("a", &log)), Arc::new(Reject)]).unwrap();
        let counter = AtomicU64::new(0);
        let err = chain
            .do_append(&Context::background(), msg(), &counting_tail(&counter))
            .unwrap_err();
        assert!(matches!(err, WalError::Interceptor { .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock(), vec!["a:before"]);
    }

    #[test]
    fn later_rewriter_wins() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut first = Tag::new("a", &log);
        first.rewrite_to = Some(100);
        let mut second = Tag::new("b", &log);
        second.rewrite_to = Some(200);
        let chain = InterceptorChain::new(vec![Arc::new(first), Arc::new(second)]).unwrap();

        let mut result = AppendResult::new(MessageId::from_u64("test", 1));
        chain.rewrite_append_result(&mut result);
        assert_eq!(result.message_id.as_u64(), Some(200));
    }

    #[test]
    fn ready_only_after_every_member() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut slow_a = Tag::new("a", &log);
        slow_a.ready = Signal::new();
        let mut slow_b = Tag::new("b", &log);
        slow_b.ready = Signal::new();
        let gate_a = slow_a.ready.clone();
        let gate_b = slow_b.ready.clone();

        let chain = InterceptorChain::new(vec![Arc::new(slow_a), Arc::new(slow_b)]).unwrap();
        let ready = chain.ready();
        assert!(!ready.wait_timeout(Duration::from_millis(10)));

        gate_b.fire();
        assert!(!ready.wait_timeout(Duration::from_millis(10)));

        gate_a.fire();
        assert!(ready.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn close_stops_watcher_and_closes_members_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut never_ready = Tag::new("a", &log);
        never_ready.ready = Signal::new();
        let chain =
            InterceptorChain::new(vec![Arc::new(never_ready), Arc::new(Tag::new("b", &log))])
                .unwrap();

        chain.close();
        chain.close();
        assert!(!chain.is_ready());
        assert_eq!(*log.lock(), vec!["a:close", "b:close"]);
    }
}
