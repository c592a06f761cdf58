//! Posterior oracle interface.
//!
//! The oracle is the sole boundary to the external inference engine. The
//! harness hands it a simulated dataset and an iteration budget, and gets
//! back a raw sequence of posterior draws plus diagnostics. The harness
//! never inspects how the draws were produced.
//!
//! Oracle calls are the only long-blocking operation in the pipeline. They
//! run under a per-call timeout and a cooperative [`CancelToken`]: a
//! well-behaved oracle polls the token at its checkpoints (e.g. once per
//! sampling iteration) and returns [`OracleError::Cancelled`] promptly when
//! asked to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::types::{Dataset, ParameterVector};

/// Per-call configuration handed to the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Warmup iterations before draws are recorded.
    pub warmup: usize,
    /// Number of posterior draws to return.
    pub iterations: usize,
    /// Seed for the oracle's own randomness. Derived per simulation and
    /// attempt by the harness so that full runs are reproducible for any
    /// worker count.
    pub seed: u64,
}

/// Diagnostics reported alongside posterior draws.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleDiagnostics {
    /// Number of divergent transitions (sampler trajectories that failed to
    /// respect the target geometry). Nonzero counts are surfaced as warnings
    /// on otherwise-successful simulations.
    pub divergences: usize,
}

/// Result of a successful oracle call.
#[derive(Debug, Clone)]
pub struct Inference {
    /// Posterior draws, one [`ParameterVector`] per iteration, in chain
    /// order.
    pub draws: Vec<ParameterVector>,
    /// Sampler diagnostics.
    pub diagnostics: OracleDiagnostics,
}

/// Opaque interface to the external inference engine.
///
/// Implementations must be `Send + Sync`: the worker pool shares one oracle
/// across simulations, and a timed-out call may still be unwinding on its
/// own thread while the next attempt starts.
pub trait PosteriorOracle: Send + Sync {
    /// Run inference on a simulated dataset.
    ///
    /// Must return exactly `config.iterations` draws on success, each with
    /// the model's parameters in declaration order. Should poll `cancel` at
    /// checkpoints and bail out with [`OracleError::Cancelled`] when set.
    fn infer(
        &self,
        dataset: &Dataset,
        config: &OracleConfig,
        cancel: &CancelToken,
    ) -> Result<Inference, OracleError>;

    /// Short human-readable name for logs and reports.
    fn name(&self) -> &str {
        "oracle"
    }
}

/// Cooperative cancellation token.
///
/// Cloning shares the underlying flag. [`CancelToken::child`] creates a
/// token that also observes its parent, used for per-call timeouts nested
/// inside whole-run cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that is cancelled when either itself or `self` is.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(self.flag.clone()),
        }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Check whether cancellation was requested on this token or its parent.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(Ordering::Acquire))
    }
}
