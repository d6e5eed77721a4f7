//! Parallel processing utilities for reconstruction
//!
//! Field evaluation over a frozen octree and per-cell vertex solves are
//! embarrassingly parallel. This module owns the process-wide rayon pool they
//! run on and a small set of map helpers that fall back to sequential
//! iteration for small inputs or when parallelism is switched off.

use meshscan_core::{Error, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, warn};

static GLOBAL_THREAD_POOL: OnceLock<Arc<ThreadPool>> = OnceLock::new();
static THREAD_POOL_CONFIG: Mutex<ThreadPoolConfig> = Mutex::new(ThreadPoolConfig::new());

const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Thread pool configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of threads to use (None = one per available core)
    pub num_threads: Option<usize>,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Enable parallel processing (can be disabled for debugging)
    pub enabled: bool,
    /// Inputs shorter than this are processed sequentially; also the
    /// smallest batch handed to a worker
    pub min_chunk_size: usize,
}

impl ThreadPoolConfig {
    const fn new() -> Self {
        Self {
            num_threads: None,
            stack_size: None,
            thread_name_prefix: String::new(),
            enabled: true,
            min_chunk_size: 64,
        }
    }

    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the sequential threshold and smallest worker batch
    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size.max(1);
        self
    }
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            stack_size: Some(DEFAULT_STACK_SIZE),
            thread_name_prefix: "meshscan-recon".to_string(),
            ..Self::new()
        }
    }
}

fn build_pool(config: &ThreadPoolConfig) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new();

    if let Some(num_threads) = config.num_threads {
        builder = builder.num_threads(num_threads);
    }

    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    if !config.thread_name_prefix.is_empty() {
        let prefix = config.thread_name_prefix.clone();
        builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
    }

    builder
        .build()
        .map_err(|e| Error::InvalidConfig(format!("failed to create thread pool: {}", e)))
}

/// Initialize the global thread pool with a custom configuration.
///
/// The pool can only be built once per process; later calls only update the
/// `enabled` flag and chunk size.
pub fn init_thread_pool(config: ThreadPoolConfig) -> Result<()> {
    if GLOBAL_THREAD_POOL.get().is_none() {
        let pool = build_pool(&config)?;
        if GLOBAL_THREAD_POOL.set(Arc::new(pool)).is_err() {
            debug!("thread pool was initialized concurrently, keeping the existing one");
        }
    }

    if let Ok(mut global_config) = THREAD_POOL_CONFIG.lock() {
        *global_config = config;
    }

    Ok(())
}

/// The global pool, built with defaults on first use.
///
/// `None` if the default pool could not be created; callers then run on
/// rayon's implicit global pool.
pub fn get_thread_pool() -> Option<Arc<ThreadPool>> {
    if let Some(pool) = GLOBAL_THREAD_POOL.get() {
        return Some(pool.clone());
    }

    match build_pool(&ThreadPoolConfig::default()) {
        Ok(pool) => Some(GLOBAL_THREAD_POOL.get_or_init(|| Arc::new(pool)).clone()),
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

/// Get current thread pool configuration
pub fn get_config() -> ThreadPoolConfig {
    THREAD_POOL_CONFIG
        .lock()
        .map(|config| config.clone())
        .unwrap_or_else(|_| ThreadPoolConfig::default())
}

/// Check if parallel processing is enabled
pub fn is_parallel_enabled() -> bool {
    get_config().enabled
}

/// Execute an operation inside the global thread pool
pub fn execute_parallel<F, R>(op: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match get_thread_pool() {
        Some(pool) if is_parallel_enabled() => pool.install(op),
        _ => op(),
    }
}

/// Map `f` over `data`, in parallel when enabled and worthwhile.
///
/// Output order always matches input order.
pub fn parallel_map<T, U, F>(data: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    parallel_map_if(true, data, f)
}

/// Like [`parallel_map`], with a per-call switch on top of the global one
pub fn parallel_map_if<T, U, F>(enabled: bool, data: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    let config = get_config();
    if !enabled || !config.enabled || data.len() < config.min_chunk_size {
        return data.iter().map(f).collect();
    }

    let min_len = config.min_chunk_size.max(1);
    execute_parallel(|| data.par_iter().with_min_len(min_len).map(f).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_map_preserves_order() {
        let data: Vec<u32> = (0..10_000).collect();
        let squared = parallel_map(&data, |x| x * 2);
        assert_eq!(squared.len(), data.len());
        assert!(squared.iter().enumerate().all(|(i, v)| *v == 2 * i as u32));
    }

    #[test]
    fn test_parallel_map_if_disabled_matches() {
        let data: Vec<f32> = (0..500).map(|i| i as f32 * 0.5).collect();
        let sequential = parallel_map_if(false, &data, |x| x.sqrt());
        let parallel = parallel_map_if(true, &data, |x| x.sqrt());
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_small_inputs() {
        let empty: Vec<u8> = Vec::new();
        assert!(parallel_map(&empty, |x| *x).is_empty());
        assert_eq!(parallel_map(&[3u8], |x| x + 1), vec![4]);
    }

    #[test]
    fn test_config_builders() {
        let config = ThreadPoolConfig::default()
            .with_threads(2)
            .with_stack_size(1 << 20)
            .with_enabled(false)
            .with_min_chunk_size(0);

        assert_eq!(config.num_threads, Some(2));
        assert_eq!(config.stack_size, Some(1 << 20));
        assert!(!config.enabled);
        assert_eq!(config.min_chunk_size, 1);
        assert_eq!(config.thread_name_prefix, "meshscan-recon");
    }

    #[test]
    fn test_execute_parallel_returns_value() {
        assert_eq!(execute_parallel(|| 6 * 7), 42);
    }
}
