//! Adaptive iteration budgeting and thinning.
//!
//! The oracle's raw draw sequence is autocorrelated to an unknown degree,
//! so the harness cannot know up front how many iterations yield M
//! near-independent draws. The loop here starts at a configured budget,
//! measures the per-parameter effective sample size of the returned chain,
//! and doubles the budget until the minimum ESS reaches the thinning target
//! M. The doubling count is bounded: an oracle whose chains never decorrelate
//! fails the simulation instead of stalling the run.
//!
//! On success the raw chain is thinned to exactly M draws by taking every
//! `stride`-th draw with `stride = floor(len / M)` and discarding the
//! remainder.

use crate::error::SimulationFailure;
use crate::oracle::{Inference, OracleConfig};
use crate::rng::substream_seed;
use crate::statistics::effective_sample_size;
use crate::types::ParameterVector;

/// Budget parameters of the adaptive loop, extracted from the run config.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveBudget {
    /// Iteration budget of the first attempt.
    pub initial_iterations: usize,
    /// Warmup iterations forwarded on every call.
    pub warmup: usize,
    /// Maximum number of doublings after the first attempt.
    pub max_doublings: usize,
    /// Thinning target M (also the ESS target).
    pub target_draws: usize,
}

/// Successful outcome of the adaptive loop.
#[derive(Debug, Clone)]
pub struct ThinnedPosterior {
    /// Exactly `target_draws` thinned draws.
    pub draws: Vec<ParameterVector>,
    /// Length of the raw chain that was thinned.
    pub raw_len: usize,
    /// Minimum per-parameter ESS of the accepted chain.
    pub min_ess: f64,
    /// Oracle calls consumed by the loop (excluding timeout retries, which
    /// the invoker accounts for separately).
    pub attempts: usize,
    /// Divergence count reported on the accepted call.
    pub divergences: usize,
}

/// Drive the oracle until the ESS target is met, then thin.
///
/// `invoke` performs one oracle call under the harness's timeout/retry
/// policy and returns the inference or a terminal failure. The loop owns
/// budget doubling and ESS checking; it derives a fresh oracle seed per
/// attempt so repeated attempts explore independent sampler randomness
/// while remaining reproducible.
pub fn run_adaptive_inference(
    parameter_names: &[String],
    budget: &AdaptiveBudget,
    oracle_seed: u64,
    mut invoke: impl FnMut(&OracleConfig) -> Result<Inference, SimulationFailure>,
) -> Result<ThinnedPosterior, SimulationFailure> {
    let target = budget.target_draws;
    let mut iterations = budget.initial_iterations.max(target);
    let mut attempts = 0;
    let mut last_min_ess = 0.0;

    for doubling in 0..=budget.max_doublings {
        let config = OracleConfig {
            warmup: budget.warmup,
            iterations,
            seed: substream_seed(oracle_seed, doubling as u64),
        };
        let inference = invoke(&config)?;
        attempts += 1;

        validate_shape(&inference, parameter_names, iterations)?;

        last_min_ess = min_ess(&inference.draws, parameter_names.len());
        if last_min_ess >= target as f64 {
            let raw_len = inference.draws.len();
            let draws = thin(inference.draws, target);
            return Ok(ThinnedPosterior {
                draws,
                raw_len,
                min_ess: last_min_ess,
                attempts,
                divergences: inference.diagnostics.divergences,
            });
        }

        iterations *= 2;
    }

    Err(SimulationFailure::InsufficientEss {
        achieved: last_min_ess,
        target,
        // The last attempt ran at half the current (post-doubling) budget.
        iterations: iterations / 2,
    })
}

/// Thin a raw chain to exactly `target` draws.
///
/// `stride = floor(len / target)`; draws `0, stride, ..., (target-1)*stride`
/// are kept and the tail remainder is discarded. Requires `len >= target`,
/// which holds whenever ESS reached the target (ESS never exceeds the
/// chain length by more than sampling noise, and the loop also floors the
/// budget at `target`).
fn thin(raw: Vec<ParameterVector>, target: usize) -> Vec<ParameterVector> {
    let stride = (raw.len() / target).max(1);
    (0..target).map(|i| raw[i * stride].clone()).collect()
}

fn min_ess(draws: &[ParameterVector], n_params: usize) -> f64 {
    (0..n_params)
        .map(|k| {
            let chain: Vec<f64> = draws.iter().map(|d| d.value_at(k)).collect();
            effective_sample_size(&chain)
        })
        .fold(f64::INFINITY, f64::min)
}

fn validate_shape(
    inference: &Inference,
    parameter_names: &[String],
    expected_len: usize,
) -> Result<(), SimulationFailure> {
    if inference.draws.len() != expected_len {
        return Err(SimulationFailure::ShapeMismatch {
            message: format!(
                "oracle returned {} draws, expected {}",
                inference.draws.len(),
                expected_len
            ),
        });
    }
    // Checking the first draw is enough: oracles build every draw the same
    // way, and per-draw validation would dominate the rank computation.
    if let Some(first) = inference.draws.first() {
        if first.len() != parameter_names.len()
            || !first.names().eq(parameter_names.iter().map(|s| s.as_str()))
        {
            let got: Vec<_> = first.names().map(|s| s.to_string()).collect();
            return Err(SimulationFailure::ShapeMismatch {
                message: format!(
                    "oracle draw parameters {:?} do not match model parameters {:?}",
                    got, parameter_names
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleDiagnostics;
    use crate::rng::substream;
    use rand::Rng;

    fn names() -> Vec<String> {
        vec!["mu".to_string()]
    }

    fn budget(initial: usize, max_doublings: usize, target: usize) -> AdaptiveBudget {
        AdaptiveBudget {
            initial_iterations: initial,
            warmup: 0,
            max_doublings,
            target_draws: target,
        }
    }

    fn iid_inference(iterations: usize, seed: u64) -> Inference {
        let mut rng = substream(seed, 0);
        let draws = (0..iterations)
            .map(|_| ParameterVector::from_pairs(vec![("mu".to_string(), rng.gen::<f64>())]))
            .collect();
        Inference {
            draws,
            diagnostics: OracleDiagnostics::default(),
        }
    }

    #[test]
    fn test_iid_chain_accepted_on_first_attempt() {
        let result = run_adaptive_inference(&names(), &budget(256, 3, 100), 1, |cfg| {
            Ok(iid_inference(cfg.iterations, cfg.seed))
        })
        .unwrap();

        assert_eq!(result.draws.len(), 100);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.raw_len, 256);
        assert!(result.min_ess >= 100.0);
    }

    #[test]
    fn test_constant_chain_exhausts_doublings() {
        let mut budgets_seen = Vec::new();
        let result = run_adaptive_inference(&names(), &budget(100, 3, 100), 1, |cfg| {
            budgets_seen.push(cfg.iterations);
            let draws = (0..cfg.iterations)
                .map(|_| ParameterVector::from_pairs(vec![("mu".to_string(), 1.0)]))
                .collect();
            Ok(Inference {
                draws,
                diagnostics: OracleDiagnostics::default(),
            })
        });

        assert!(matches!(
            result,
            Err(SimulationFailure::InsufficientEss {
                achieved,
                target: 100,
                iterations: 800,
            }) if achieved == 0.0
        ));
        // Initial budget plus three doublings.
        assert_eq!(budgets_seen, vec![100, 200, 400, 800]);
    }

    #[test]
    fn test_attempt_seeds_differ() {
        let mut seeds = Vec::new();
        let _ = run_adaptive_inference(&names(), &budget(100, 1, 100), 42, |cfg| {
            seeds.push(cfg.seed);
            let draws = (0..cfg.iterations)
                .map(|_| ParameterVector::from_pairs(vec![("mu".to_string(), 0.0)]))
                .collect();
            Ok(Inference {
                draws,
                diagnostics: OracleDiagnostics::default(),
            })
        });
        assert_eq!(seeds.len(), 2);
        assert_ne!(seeds[0], seeds[1]);
    }

    #[test]
    fn test_shape_mismatch_detected() {
        let result = run_adaptive_inference(&names(), &budget(16, 0, 8), 1, |cfg| {
            let draws = (0..cfg.iterations)
                .map(|_| {
                    ParameterVector::from_pairs(vec![
                        ("alpha".to_string(), 0.0),
                        ("beta".to_string(), 1.0),
                    ])
                })
                .collect();
            Ok(Inference {
                draws,
                diagnostics: OracleDiagnostics::default(),
            })
        });

        assert!(matches!(
            result,
            Err(SimulationFailure::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_draw_count_detected() {
        let result = run_adaptive_inference(&names(), &budget(16, 0, 8), 1, |_| {
            Ok(iid_inference(5, 0))
        });
        assert!(matches!(
            result,
            Err(SimulationFailure::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_divergences_carried_through() {
        let result = run_adaptive_inference(&names(), &budget(512, 0, 64), 9, |cfg| {
            let mut inf = iid_inference(cfg.iterations, cfg.seed);
            inf.diagnostics.divergences = 3;
            Ok(inf)
        })
        .unwrap();
        assert_eq!(result.divergences, 3);
    }

    #[test]
    fn test_invoker_failure_propagates() {
        let result = run_adaptive_inference(&names(), &budget(16, 5, 8), 1, |_| {
            Err(SimulationFailure::OracleTimedOut { attempts: 2 })
        });
        assert!(matches!(
            result,
            Err(SimulationFailure::OracleTimedOut { attempts: 2 })
        ));
    }

    #[test]
    fn test_thinning_stride() {
        // 10 draws thinned to 4: stride 2, indices 0, 2, 4, 6.
        let raw: Vec<ParameterVector> = (0..10)
            .map(|i| ParameterVector::from_pairs(vec![("mu".to_string(), i as f64)]))
            .collect();
        let thinned = thin(raw, 4);
        let values: Vec<f64> = thinned.iter().map(|d| d.value_at(0)).collect();
        assert_eq!(values, vec![0.0, 2.0, 4.0, 6.0]);
    }
}
