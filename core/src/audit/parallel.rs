//! Parallelization infrastructure for per-feature audits.
//!
//! Every feature is audited independently, so the detectors map over feature
//! indices either sequentially or on a dedicated Rayon pool. Results are
//! always returned in feature order.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Deserialize;

use crate::audit::error::AuditError;

/// Minimal parallelization configuration.
///
/// This struct provides a single knob for controlling parallelization:
/// - `n_threads == 0 or 1`: Fully sequential execution, no Rayon overhead
/// - `n_threads >= 2`: Parallel execution using Rayon with specified thread count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParallelSettings {
    /// Number of threads to use for parallel execution.
    /// Values <= 1 result in sequential execution.
    pub n_threads: usize,
}

impl ParallelSettings {
    /// Returns `true` if parallel execution should be used.
    #[inline]
    pub fn is_parallel(self) -> bool {
        self.n_threads > 1
    }

    /// Creates a sequential configuration (no parallelization).
    #[inline]
    pub fn sequential() -> Self {
        Self { n_threads: 1 }
    }

    /// Creates a parallel configuration with the specified number of threads.
    ///
    /// # Arguments
    /// * `n` - Number of threads. Values <= 1 are clamped to 1 (sequential).
    #[inline]
    pub fn with_n_threads(n: usize) -> Self {
        Self {
            n_threads: n.max(1),
        }
    }

    /// Creates a parallel configuration using all available CPU cores.
    ///
    /// Falls back to 2 threads if parallelism cannot be determined.
    #[inline]
    pub fn auto() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .max(2);
        Self { n_threads: n }
    }

    /// Applies `f` to every feature index in `0..n_features` and collects the
    /// results in feature order.
    ///
    /// # Errors
    /// Returns the first error produced by `f` (in feature order for the
    /// sequential path), or `AuditError::ThreadPoolError` if the Rayon pool
    /// cannot be built.
    pub fn map_features<T, F>(self, n_features: usize, f: F) -> Result<Vec<T>, AuditError>
    where
        T: Send,
        F: Fn(usize) -> Result<T, AuditError> + Send + Sync,
    {
        if !self.is_parallel() {
            // Sequential path: no Rayon anywhere
            return (0..n_features).map(f).collect();
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.n_threads)
            .build()
            .map_err(|e| AuditError::ThreadPoolError(e.to_string()))?;

        // Indexed parallel iterators keep collection order.
        pool.install(|| (0..n_features).into_par_iter().map(f).collect())
    }
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self::sequential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_n_threads_clamps_to_sequential() {
        assert_eq!(ParallelSettings::with_n_threads(0), ParallelSettings::sequential());
        assert!(!ParallelSettings::with_n_threads(1).is_parallel());
        assert!(ParallelSettings::with_n_threads(4).is_parallel());
        assert!(ParallelSettings::auto().is_parallel());
    }

    #[test]
    fn test_map_features_preserves_order() {
        let seq = ParallelSettings::sequential()
            .map_features(16, |j| Ok(j * 10))
            .unwrap();
        let par = ParallelSettings::with_n_threads(4)
            .map_features(16, |j| Ok(j * 10))
            .unwrap();
        assert_eq!(seq, (0..16).map(|j| j * 10).collect::<Vec<_>>());
        assert_eq!(seq, par);
    }

    #[test]
    fn test_map_features_propagates_error() {
        let result = ParallelSettings::sequential().map_features(4, |j| {
            if j == 2 {
                Err(AuditError::InvalidThreshold(2.0))
            } else {
                Ok(j)
            }
        });
        assert!(matches!(result, Err(AuditError::InvalidThreshold(_))));
    }

    #[test]
    fn test_deserialize_partial_settings() {
        let settings: ParallelSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ParallelSettings::sequential());
        let settings: ParallelSettings = serde_json::from_str(r#"{"n_threads": 3}"#).unwrap();
        assert_eq!(settings.n_threads, 3);
    }
}
