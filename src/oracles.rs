//! Reference oracle implementations.
//!
//! These oracles make the harness testable end to end without an external
//! sampler. [`ConjugateNormalOracle`] draws from the exact analytic
//! posterior of the known-variance normal model and is therefore perfectly
//! calibrated; the wrappers around it deliberately break calibration or
//! chain independence in controlled ways.
//!
//! [`conjugate_normal_model`] builds the matching generative specification,
//! so a prior/oracle pair can be assembled in one call each.

use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::OracleError;
use crate::generative::{GenerationStep, GenerativeSpec};
use crate::oracle::{CancelToken, Inference, OracleConfig, OracleDiagnostics, PosteriorOracle};
use crate::types::{Dataset, ParameterVector};

/// How often draw loops poll the cancellation token.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Generative specification for the known-variance normal location model:
/// `mu ~ Normal(prior_mean, prior_sd)`, then `n_obs` observations
/// `y_i ~ Normal(mu, noise_sd)`.
pub fn conjugate_normal_model(
    prior_mean: f64,
    prior_sd: f64,
    noise_sd: f64,
    n_obs: usize,
) -> GenerativeSpec {
    let mut spec = GenerativeSpec::new().step(GenerationStep::parameter("mu", move |rng, _| {
        Normal::new(prior_mean, prior_sd)
            .map(|d| d.sample(rng))
            .unwrap_or(prior_mean)
    }));
    for i in 0..n_obs {
        spec = spec.step(
            GenerationStep::data(format!("y{}", i), move |rng, ctx| {
                Normal::new(ctx.value("mu"), noise_sd)
                    .map(|d| d.sample(rng))
                    .unwrap_or_else(|_| ctx.value("mu"))
            })
            .depends_on(&["mu"]),
        );
    }
    spec
}

/// Exact-posterior oracle for the known-variance normal location model.
///
/// Returns independent draws from the analytic posterior of `mu`, so the
/// rank statistics it produces are uniform by construction. The sampler
/// seed comes from [`OracleConfig::seed`], keeping runs reproducible.
#[derive(Debug, Clone)]
pub struct ConjugateNormalOracle {
    /// Prior mean of `mu`.
    pub prior_mean: f64,
    /// Prior standard deviation of `mu`.
    pub prior_sd: f64,
    /// Known observation noise standard deviation.
    pub noise_sd: f64,
}

impl ConjugateNormalOracle {
    /// Posterior mean and standard deviation given a dataset.
    fn posterior(&self, dataset: &Dataset) -> (f64, f64) {
        let n = dataset.len() as f64;
        let prior_prec = 1.0 / (self.prior_sd * self.prior_sd);
        let noise_prec = 1.0 / (self.noise_sd * self.noise_sd);
        let sum: f64 = dataset.values.iter().sum();

        let post_var = 1.0 / (prior_prec + n * noise_prec);
        let post_mean = post_var * (self.prior_mean * prior_prec + sum * noise_prec);
        (post_mean, post_var.sqrt())
    }
}

impl PosteriorOracle for ConjugateNormalOracle {
    fn infer(
        &self,
        dataset: &Dataset,
        config: &OracleConfig,
        cancel: &CancelToken,
    ) -> Result<Inference, OracleError> {
        let (post_mean, post_sd) = self.posterior(dataset);
        let dist = Normal::new(post_mean, post_sd).map_err(|e| OracleError::Failed {
            message: format!("degenerate posterior: {}", e),
        })?;

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        // Warmup is meaningless for iid draws but honoured for stream
        // compatibility with real samplers.
        for _ in 0..config.warmup {
            let _ = dist.sample(&mut rng);
        }

        let mut draws = Vec::with_capacity(config.iterations);
        for i in 0..config.iterations {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(OracleError::Cancelled);
            }
            let value = dist.sample(&mut rng);
            draws.push(ParameterVector::from_pairs(vec![(
                "mu".to_string(),
                value,
            )]));
        }

        Ok(Inference {
            draws,
            diagnostics: OracleDiagnostics::default(),
        })
    }

    fn name(&self) -> &str {
        "conjugate-normal"
    }
}

/// Wrapper that shifts every draw of every parameter by a constant offset.
///
/// Turns any calibrated oracle into a miscalibrated one with a known
/// defect; used to verify the harness actually rejects biased posteriors.
#[derive(Debug, Clone)]
pub struct BiasedOracle<O> {
    /// The wrapped oracle.
    pub inner: O,
    /// Offset added to every draw value.
    pub bias: f64,
}

impl<O: PosteriorOracle> PosteriorOracle for BiasedOracle<O> {
    fn infer(
        &self,
        dataset: &Dataset,
        config: &OracleConfig,
        cancel: &CancelToken,
    ) -> Result<Inference, OracleError> {
        let mut inference = self.inner.infer(dataset, config, cancel)?;
        for draw in &mut inference.draws {
            let shifted: Vec<(String, f64)> = draw
                .names()
                .zip(draw.values())
                .map(|(n, v)| (n.to_string(), v + self.bias))
                .collect();
            *draw = ParameterVector::from_pairs(shifted);
        }
        Ok(inference)
    }

    fn name(&self) -> &str {
        "biased"
    }
}

/// AR(1) variant of the conjugate oracle: marginally correct posterior,
/// heavily autocorrelated chain.
///
/// Exercises the adaptive doubling loop: with correlation `phi` the chain
/// is worth roughly `n * (1 - phi) / (1 + phi)` independent draws, so the
/// harness must grow the budget before thinning.
#[derive(Debug, Clone)]
pub struct CorrelatedNormalOracle {
    /// Exact-posterior parameters.
    pub base: ConjugateNormalOracle,
    /// Lag-1 autocorrelation of the returned chain, in `[0, 1)`.
    pub phi: f64,
}

impl PosteriorOracle for CorrelatedNormalOracle {
    fn infer(
        &self,
        dataset: &Dataset,
        config: &OracleConfig,
        cancel: &CancelToken,
    ) -> Result<Inference, OracleError> {
        let (post_mean, post_sd) = self.base.posterior(dataset);
        let innovation_sd = post_sd * (1.0 - self.phi * self.phi).sqrt();
        let innovation = Normal::new(0.0, innovation_sd).map_err(|e| OracleError::Failed {
            message: format!("degenerate posterior: {}", e),
        })?;

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        // Start the chain at a stationary draw so warmup is optional.
        let stationary = Normal::new(post_mean, post_sd).map_err(|e| OracleError::Failed {
            message: format!("degenerate posterior: {}", e),
        })?;
        let mut x = stationary.sample(&mut rng);
        for _ in 0..config.warmup {
            x = post_mean + self.phi * (x - post_mean) + innovation.sample(&mut rng);
        }

        let mut draws = Vec::with_capacity(config.iterations);
        for i in 0..config.iterations {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(OracleError::Cancelled);
            }
            x = post_mean + self.phi * (x - post_mean) + innovation.sample(&mut rng);
            draws.push(ParameterVector::from_pairs(vec![("mu".to_string(), x)]));
        }

        Ok(Inference {
            draws,
            diagnostics: OracleDiagnostics::default(),
        })
    }

    fn name(&self) -> &str {
        "correlated-normal"
    }
}

/// Oracle whose chain never decorrelates: every draw is the same value.
///
/// ESS is zero at any budget, so simulations driven by this oracle always
/// exhaust the doubling cap and fail. Useful for testing the harness's
/// partial-failure policy.
#[derive(Debug, Clone)]
pub struct ConstantOracle {
    /// The value returned for every parameter draw.
    pub value: f64,
    /// Parameter names to emit, in declaration order.
    pub parameters: Vec<String>,
}

impl PosteriorOracle for ConstantOracle {
    fn infer(
        &self,
        _dataset: &Dataset,
        config: &OracleConfig,
        cancel: &CancelToken,
    ) -> Result<Inference, OracleError> {
        if cancel.is_cancelled() {
            return Err(OracleError::Cancelled);
        }
        let draw = ParameterVector::from_pairs(
            self.parameters
                .iter()
                .map(|n| (n.clone(), self.value))
                .collect(),
        );
        Ok(Inference {
            draws: vec![draw; config.iterations],
            diagnostics: OracleDiagnostics::default(),
        })
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Wrapper that sleeps before delegating, polling the cancel token.
///
/// Simulates a slow external sampler for timeout and cancellation tests.
#[derive(Debug, Clone)]
pub struct SlowOracle<O> {
    /// The wrapped oracle.
    pub inner: O,
    /// Delay before delegation.
    pub delay: std::time::Duration,
}

impl<O: PosteriorOracle> PosteriorOracle for SlowOracle<O> {
    fn infer(
        &self,
        dataset: &Dataset,
        config: &OracleConfig,
        cancel: &CancelToken,
    ) -> Result<Inference, OracleError> {
        let start = std::time::Instant::now();
        // Sleep in short slices so cancellation is observed promptly.
        while start.elapsed() < self.delay {
            if cancel.is_cancelled() {
                return Err(OracleError::Cancelled);
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        self.inner.infer(dataset, config, cancel)
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Wrapper that injects a fixed divergence count into diagnostics.
#[derive(Debug, Clone)]
pub struct DivergentOracle<O> {
    /// The wrapped oracle.
    pub inner: O,
    /// Divergence count to report on every call.
    pub divergences: usize,
}

impl<O: PosteriorOracle> PosteriorOracle for DivergentOracle<O> {
    fn infer(
        &self,
        dataset: &Dataset,
        config: &OracleConfig,
        cancel: &CancelToken,
    ) -> Result<Inference, OracleError> {
        let mut inference = self.inner.infer(dataset, config, cancel)?;
        inference.diagnostics.divergences = self.divergences;
        Ok(inference)
    }

    fn name(&self) -> &str {
        "divergent"
    }
}
