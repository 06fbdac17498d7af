//! WAL adaptor configuration.

/// Default number of worker threads serving `append_async`.
pub const DEFAULT_APPEND_POOL_SIZE: usize = 10;

/// Default number of names tried before scanner allocation gives up.
pub const DEFAULT_SCANNER_NAME_ATTEMPTS: usize = 16;

/// Configuration for a [`WalAdaptor`](crate::WalAdaptor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalConfig {
    /// Worker threads serving `append_async`. Excess work queues.
    pub append_pool_size: usize,

    /// Scanner names tried before `read` fails with a retryable error.
    pub scanner_name_attempts: usize,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            append_pool_size: DEFAULT_APPEND_POOL_SIZE,
            scanner_name_attempts: DEFAULT_SCANNER_NAME_ATTEMPTS,
        }
    }
}

impl WalConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the async append pool size.
    #[must_use]
    pub const fn append_pool_size(mut self, size: usize) -> Self {
        self.append_pool_size = size;
        self
    }

    /// Sets the number of scanner name attempts.
    #[must_use]
    pub const fn scanner_name_attempts(mut self, attempts: usize) -> Self {
        self.scanner_name_attempts = attempts;
        self
    }
}
