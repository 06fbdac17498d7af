//! Append-path middleware.
//!
//! An [`Interceptor`] wraps every append. Interceptors are composed into an
//! [`InterceptorChain`] in registration order: the first registered sees the
//! message first and the backend append is the innermost step. Each
//! interceptor receives the rest of the chain as `next` and may act before
//! or after calling it, rewrite the message on the way in, or return an
//! error without calling it at all.
//!
//! ```text
//! append ──► i0 ──► i1 ──► ... ──► backend.append
//!        ◄── id ◄── id ◄── ... ◄──
//! ```
//!
//! After a successful append, interceptors that expose an
//! [`AppendResultRewriter`] get to rewrite the [`AppendResult`], again in
//! registration order.
//!
//! ## Invariants
//!
//! - A failure before `next` is called leaves the backend untouched
//! - A failure after `next` succeeded does not undo the write
//! - The chain is ready only once every member is ready

mod chain;

pub use chain::InterceptorChain;

use crate::error::WalResult;
use crate::wal::{AppendResult, Wal};
use std::fmt;
use std::sync::{Arc, Weak};
use walstream_message::{MessageId, MutableMessage};
use walstream_storage::WalBackend;
use walstream_sync::{Context, Deferred, Signal};

/// The rest of the chain, as seen by one interceptor.
pub type AppendFn<'a> = dyn Fn(&Context, MutableMessage) -> WalResult<MessageId> + 'a;

/// Middleware around the append path.
pub trait Interceptor: Send + Sync {
    /// Resolves once the interceptor can accept appends.
    ///
    /// Appends block on the chain's aggregate readiness. The default is
    /// ready from the start.
    fn ready(&self) -> Signal {
        Signal::fired()
    }

    /// Handles one append, delegating to `next` to continue down the chain.
    ///
    /// # Errors
    ///
    /// Returns whatever `next` returned, or the interceptor's own rejection.
    fn do_append(
        &self,
        ctx: &Context,
        msg: MutableMessage,
        next: &AppendFn<'_>,
    ) -> WalResult<MessageId>;

    /// Returns the interceptor's result rewriting hook, if it has one.
    fn as_result_rewriter(&self) -> Option<&dyn AppendResultRewriter> {
        None
    }

    /// Releases interceptor resources. Called once, when the WAL closes.
    fn close(&self) {}
}

/// Post-append hook that rewrites the result handed back to the producer.
pub trait AppendResultRewriter: Send + Sync {
    /// Rewrites the result in place. Later rewriters see earlier edits.
    fn rewrite_append_result(&self, result: &mut AppendResult);
}

/// What an [`InterceptorBuilder`] gets to build with.
#[derive(Clone)]
pub struct InterceptorBuildParam {
    /// The raw backend under the WAL.
    pub backend: Arc<dyn WalBackend>,
    /// The WAL being built. Published once construction finishes.
    pub wal: Deferred<Weak<dyn Wal>>,
}

impl InterceptorBuildParam {
    /// Returns the WAL if it has been published and is still alive.
    #[must_use]
    pub fn wal(&self) -> Option<Arc<dyn Wal>> {
        self.wal.try_get().and_then(|weak| weak.upgrade())
    }
}

impl fmt::Debug for InterceptorBuildParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorBuildParam")
            .field("channel", self.backend.channel())
            .field("wal", &self.wal)
            .finish()
    }
}

/// Creates an interceptor for a WAL under construction.
pub trait InterceptorBuilder: Send + Sync {
    /// Builds the interceptor.
    fn build(&self, param: &InterceptorBuildParam) -> Arc<dyn Interceptor>;
}

impl<F> InterceptorBuilder for F
where
    F: Fn(&InterceptorBuildParam) -> Arc<dyn Interceptor> + Send + Sync,
{
    fn build(&self, param: &InterceptorBuildParam) -> Arc<dyn Interceptor> {
        self(param)
    }
}
