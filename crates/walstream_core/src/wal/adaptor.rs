//! Turns a raw backend into a governed WAL.

use super::{AppendCallback, AppendResult, Wal};
use crate::config::WalConfig;
use crate::error::{WalError, WalResult};
use crate::interceptor::{
    AppendResultRewriter, Interceptor, InterceptorBuildParam, InterceptorBuilder, InterceptorChain,
};
use crate::scanner::{ReadOptions, ScannerRegistry, WalScanner};
use crate::stats::{WalStats, WalStatsSnapshot};
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use walstream_message::{BasicMessage, MutableMessage};
use walstream_storage::{BackendReadOptions, ChannelInfo, WalBackend};
use walstream_sync::{Admission, Context, Deferred, Lifetime, LifetimeState, Signal, WorkerPool};

/// Hook run once, at the very end of [`Wal::close`].
pub type CleanupHook = Box<dyn FnOnce() + Send>;

/// Builds a WAL over `backend`.
///
/// Interceptors are built in order from `builders`; each builder receives
/// the backend and a deferred handle to the WAL, which is published before
/// this function returns.
///
/// # Errors
///
/// Returns [`WalError::Spawn`] or [`WalError::Pool`] if a background thread
/// cannot be started.
pub fn adapt_backend_to_wal(
    backend: Arc<dyn WalBackend>,
    builders: Vec<Box<dyn InterceptorBuilder>>,
    cleanup: Option<CleanupHook>,
    config: WalConfig,
) -> WalResult<Arc<WalAdaptor>> {
    let param = InterceptorBuildParam {
        backend: Arc::clone(&backend),
        wal: Deferred::new(),
    };
    let interceptors: Vec<Arc<dyn Interceptor>> =
        builders.iter().map(|b| b.build(&param)).collect();
    let chain = InterceptorChain::new(interceptors)?;

    let channel = backend.channel().clone();
    let pool = WorkerPool::new(format!("wal-append-{}", channel.name), config.append_pool_size)?;
    let registry = Arc::new(ScannerRegistry::new(
        channel.clone(),
        config.scanner_name_attempts,
    ));

    let wal = Arc::new_cyclic(|weak_self| WalAdaptor {
        weak_self: weak_self.clone(),
        config,
        lifetime: Lifetime::new(),
        backend,
        chain,
        registry,
        pool,
        stats: Arc::new(WalStats::new()),
        cleanup: Mutex::new(cleanup),
        closing: AtomicBool::new(false),
        torn_down: Signal::new(),
    });

    let handle: Weak<dyn Wal> = Arc::downgrade(&wal) as Weak<dyn Wal>;
    param.wal.set(handle);
    debug!(
        channel = %channel,
        interceptors = wal.chain.len(),
        pool_size = wal.pool.size(),
        "wal adaptor started"
    );
    Ok(wal)
}

/// The WAL built by [`adapt_backend_to_wal`].
///
/// Owns the interceptor chain, the scanner registry and the async append
/// pool. Scanners reach the registry only through a weak handle captured by
/// their cleanup.
pub struct WalAdaptor {
    weak_self: Weak<WalAdaptor>,
    config: WalConfig,
    lifetime: Lifetime,
    backend: Arc<dyn WalBackend>,
    chain: InterceptorChain,
    registry: Arc<ScannerRegistry>,
    pool: WorkerPool,
    stats: Arc<WalStats>,
    cleanup: Mutex<Option<CleanupHook>>,
    closing: AtomicBool,
    torn_down: Signal,
}

impl WalAdaptor {
    /// The configuration the WAL was built with.
    #[must_use]
    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifetimeState {
        self.lifetime.state()
    }

    /// Number of scanners still tracked.
    #[must_use]
    pub fn open_scanners(&self) -> usize {
        self.registry.len()
    }

    fn admit(&self) -> WalResult<Admission> {
        self.lifetime.add().map_err(|_| {
            self.stats.record_rejected();
            WalError::shutdown(&self.backend.channel().name)
        })
    }

    /// The append path, for callers already holding an admission.
    fn append_admitted(&self, ctx: &Context, msg: MutableMessage) -> WalResult<AppendResult> {
        let result = self.run_chain(ctx, msg);
        if let Err(e) = &result {
            self.stats.record_append_failure();
            debug!(channel = %self.backend.channel(), error = %e, "append failed");
        }
        result
    }

    fn run_chain(&self, ctx: &Context, msg: MutableMessage) -> WalResult<AppendResult> {
        ctx.wait(&self.chain.ready().done())?;

        let size = msg.estimate_size() as u64;
        let backend = &self.backend;
        let tail =
            |ctx: &Context, msg: MutableMessage| backend.append(ctx, msg).map_err(WalError::from);
        let id = self.chain.do_append(ctx, msg, &tail)?;
        self.stats.record_append(size);

        let mut result = AppendResult::new(id);
        self.chain.rewrite_append_result(&mut result);
        Ok(result)
    }

    fn teardown(&self) {
        info!(channel = %self.backend.channel(), "wal closing");
        self.lifetime.set_state(LifetimeState::Stopped);
        self.lifetime.wait();
        self.lifetime.close();

        for (id, scanner) in self.registry.snapshot() {
            scanner.close();
            info!(
                id,
                scanner = scanner.name(),
                channel = %self.backend.channel(),
                "closed scanner on wal shutdown"
            );
        }
        self.backend.close();
        self.chain.close();
        self.pool.free();

        let cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        self.torn_down.fire();
        info!(channel = %self.backend.channel(), "wal closed");
    }
}

impl Wal for WalAdaptor {
    fn wal_name(&self) -> &str {
        self.backend.wal_name()
    }

    fn channel(&self) -> &ChannelInfo {
        self.backend.channel()
    }

    fn append(&self, ctx: &Context, msg: MutableMessage) -> WalResult<AppendResult> {
        let _admission = self.admit()?;
        self.append_admitted(ctx, msg)
    }

    fn append_async(&self, ctx: &Context, msg: MutableMessage, callback: AppendCallback) {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(e) => {
                callback(Err(e));
                return;
            }
        };
        let Some(wal) = self.weak_self.upgrade() else {
            drop(admission);
            callback(Err(WalError::shutdown(&self.backend.channel().name)));
            return;
        };
        self.stats.record_async_append();

        let slot = Arc::new(Mutex::new(Some(callback)));
        let job_slot = Arc::clone(&slot);
        let ctx = ctx.clone();
        let submitted = self.pool.submit(move || {
            let _admission = admission;
            let result = wal.append_admitted(&ctx, msg);
            let callback = job_slot.lock().take();
            if let Some(callback) = callback {
                callback(result);
            }
        });

        if let Err(e) = submitted {
            // The rejected job, and the admission inside it, are already dropped.
            warn!(channel = %self.backend.channel(), error = %e, "async append not submitted");
            let callback = slot.lock().take();
            if let Some(callback) = callback {
                callback(Err(e.into()));
            }
        }
    }

    fn read(&self, ctx: &Context, opts: ReadOptions) -> WalResult<Arc<WalScanner>> {
        let _admission = self.admit()?;

        let name = self.registry.allocate_scanner_name()?;
        let inner = match self.backend.read(
            ctx,
            BackendReadOptions::new(name.clone(), opts.deliver_policy.clone()),
        ) {
            Ok(inner) => inner,
            Err(e) => {
                self.registry.release_name(&name);
                return Err(e.into());
            }
        };

        let id = self.registry.allocate_id();
        let registry = Arc::downgrade(&self.registry);
        let stats = Arc::clone(&self.stats);
        let cleanup = Box::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.deregister(id);
            }
            stats.record_scanner_closed();
        });

        let scanner = Arc::new(WalScanner::new(
            name,
            id,
            self.backend.channel().clone(),
            inner,
            opts.filter,
            cleanup,
        ));
        self.registry.register(id, Arc::clone(&scanner));
        self.stats.record_scanner_opened();
        debug!(
            scanner = scanner.name(),
            id,
            channel = %self.backend.channel(),
            "scanner opened"
        );
        Ok(scanner)
    }

    fn is_available(&self) -> bool {
        !self.lifetime.is_closed()
    }

    fn available(&self) -> Receiver<()> {
        self.lifetime.closed()
    }

    fn stats(&self) -> WalStatsSnapshot {
        self.stats.snapshot()
    }

    fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            self.torn_down.wait();
            return;
        }
        self.teardown();
    }
}

impl Drop for WalAdaptor {
    fn drop(&mut self) {
        if !self.closing.swap(true, Ordering::SeqCst) {
            debug!(channel = %self.backend.channel(), "wal dropped without close");
            self.teardown();
        }
    }
}

impl fmt::Debug for WalAdaptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalAdaptor")
            .field("channel", self.backend.channel())
            .field("wal_name", &self.backend.wal_name())
            .field("state", &self.lifetime.state())
            .field("chain", &self.chain)
            .field("scanners", &self.registry.len())
            .finish()
    }
}
