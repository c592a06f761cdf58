//! Run configuration for the calibration harness.

use std::time::Duration;

use crate::constants::DEFAULT_SEED;
use crate::error::SbcError;

/// Configuration options for an SBC run.
///
/// Construct through [`SbcHarness`](crate::SbcHarness) builder methods, or
/// directly when embedding the harness. `validate()` runs before any
/// simulation; violations are fatal.
#[derive(Debug, Clone)]
pub struct SbcConfig {
    // =========================================================================
    // Run shape
    // =========================================================================
    /// Number of independent simulate/infer/rank cycles (N). Default: 100.
    pub simulations: usize,

    /// Thinning target M: every completed simulation keeps exactly this many
    /// posterior draws, and ranks lie in `[0, M]`. Default: 99.
    pub posterior_draws: usize,

    /// Number of histogram bins J for the uniformity test.
    ///
    /// Choosing J so that `(M+1) % J == 0` gives equal-width bins; other
    /// choices are allowed and handled with exact per-bin expected counts.
    /// Default: 20 (pairs with the default M=99 for width-5 bins).
    pub bins: usize,

    // =========================================================================
    // Adaptive inference budget
    // =========================================================================
    /// Iteration budget for the first oracle call of each simulation.
    /// Doubled until the effective sample size of every parameter reaches
    /// `posterior_draws`. Default: 256.
    pub initial_iterations: usize,

    /// Warmup iterations forwarded to the oracle on every call.
    /// Default: 500.
    pub warmup: usize,

    /// Maximum number of budget doublings before a simulation is marked
    /// `failed` with an insufficient-ESS error. Bounds the retry loop so a
    /// pathological oracle cannot stall the run. Default: 5.
    pub max_doublings: usize,

    // =========================================================================
    // Oracle resource limits
    // =========================================================================
    /// Per-call oracle timeout. On expiry the call is signalled to cancel
    /// and the attempt counts as timed out. Default: 60 seconds.
    pub oracle_timeout: Duration,

    /// Additional attempts after a timed-out oracle call before the
    /// simulation is marked `timed-out`. Default: 1.
    pub max_retries: usize,

    // =========================================================================
    // Reproducibility and scheduling
    // =========================================================================
    /// Run seed. Each simulation derives an independent substream from this
    /// seed and its index, so results are reproducible for any worker count.
    pub seed: u64,

    /// Worker threads. `0` means one worker per available CPU (capped at N).
    pub threads: usize,

    /// Completion-rate threshold below which the report carries a
    /// reliability warning. Default: 0.9.
    pub completion_warn_ratio: f64,
}

impl Default for SbcConfig {
    fn default() -> Self {
        Self {
            simulations: 100,
            posterior_draws: 99,
            bins: 20,
            initial_iterations: 256,
            warmup: 500,
            max_doublings: 5,
            oracle_timeout: Duration::from_secs(60),
            max_retries: 1,
            seed: DEFAULT_SEED,
            threads: 0,
            completion_warn_ratio: 0.9,
        }
    }
}

impl SbcConfig {
    /// Validate the configuration. Fatal errors; nothing runs on failure.
    pub fn validate(&self) -> Result<(), SbcError> {
        if self.simulations == 0 {
            return Err(invalid("simulations must be positive"));
        }
        if self.posterior_draws == 0 {
            return Err(invalid("posterior_draws (M) must be positive"));
        }
        if self.bins < 2 {
            return Err(invalid("bins (J) must be at least 2"));
        }
        if self.bins > self.posterior_draws + 1 {
            return Err(invalid(
                "bins (J) must not exceed M+1, or some bins could never be hit",
            ));
        }
        if self.initial_iterations == 0 {
            return Err(invalid("initial_iterations must be positive"));
        }
        if self.oracle_timeout.is_zero() {
            return Err(invalid("oracle_timeout must be positive"));
        }
        if !(self.completion_warn_ratio > 0.0 && self.completion_warn_ratio <= 1.0) {
            return Err(invalid("completion_warn_ratio must be in (0, 1]"));
        }
        Ok(())
    }

    /// True when `(M+1) % J == 0`, i.e. every bin has the same integer width.
    pub fn uniform_bins(&self) -> bool {
        (self.posterior_draws + 1) % self.bins == 0
    }
}

fn invalid(message: &str) -> SbcError {
    SbcError::InvalidConfiguration {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SbcConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_simulations_rejected() {
        let config = SbcConfig {
            simulations: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SbcError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_degenerate_bins_rejected() {
        let config = SbcConfig {
            bins: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SbcConfig {
            bins: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bins_exceeding_rank_range_rejected() {
        let config = SbcConfig {
            posterior_draws: 9,
            bins: 11,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_dividing_bins_allowed() {
        // (M+1) % J != 0 is legal; expected counts become bin-specific.
        let config = SbcConfig {
            posterior_draws: 9,
            bins: 3,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(!config.uniform_bins());
    }

    #[test]
    fn test_uniform_bins_detection() {
        let config = SbcConfig {
            posterior_draws: 999,
            bins: 20,
            ..Default::default()
        };
        assert!(config.uniform_bins());
    }
}
