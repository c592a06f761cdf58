//! Run orchestration: the worker pool that drives simulations end to end.
//!
//! The harness owns the full pipeline for each simulation index `n`:
//! derive the substream generator, draw (θ_sim, y_sim), run the adaptive
//! inference loop against the oracle under a per-call timeout, compute rank
//! statistics, and emit a terminal [`SimulationRecord`]. Records are merged
//! into a [`RankTable`] sorted by index, so the aggregate is identical for
//! any worker count.
//!
//! Failure containment: a failed or timed-out simulation is recorded and
//! the run continues. Only configuration and specification errors abort
//! before anything runs.

use std::cell::Cell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded};
use tracing::{debug, info, warn};

use crate::adaptive::{run_adaptive_inference, AdaptiveBudget};
use crate::config::SbcConfig;
use crate::error::{OracleError, SbcError, SimulationFailure};
use crate::generative::GenerativeSpec;
use crate::oracle::{CancelToken, Inference, OracleConfig, PosteriorOracle};
use crate::ranks::{bin_counts, expected_counts, rank_statistic};
use crate::report::{ParameterReport, RunCounts, SbcReport};
use crate::rng::{substream, substream_seed};
use crate::statistics::chi_square_uniformity;
use crate::types::{
    Dataset, RankRow, RankTable, SimulationRecord, SimulationStatus, SimulationWarning,
};

/// Domain separator so oracle seeds never collide with simulation
/// substreams derived from the same run seed.
const ORACLE_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

/// Simulation-based calibration harness.
///
/// Construct with [`SbcHarness::new`], adjust via the builder methods, then
/// call [`run`](SbcHarness::run) with a generative specification and an
/// oracle.
///
/// ```no_run
/// use std::sync::Arc;
/// use sbc_harness::{SbcHarness, ConjugateNormalOracle, conjugate_normal_model};
///
/// let model = conjugate_normal_model(0.0, 1.0, 0.5, 10);
/// let oracle = Arc::new(ConjugateNormalOracle {
///     prior_mean: 0.0,
///     prior_sd: 1.0,
///     noise_sd: 0.5,
/// });
/// let report = SbcHarness::new()
///     .simulations(200)
///     .posterior_draws(99)
///     .seed(42)
///     .run(&model, oracle)
///     .unwrap();
/// assert!(report.is_calibrated(0.05));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SbcHarness {
    config: SbcConfig,
}

impl SbcHarness {
    /// Create a harness with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a harness from an existing configuration.
    pub fn with_config(config: SbcConfig) -> Self {
        Self { config }
    }

    /// The current configuration.
    pub fn config(&self) -> &SbcConfig {
        &self.config
    }

    /// Set the number of simulations N.
    pub fn simulations(mut self, n: usize) -> Self {
        self.config.simulations = n;
        self
    }

    /// Set the thinning target M.
    pub fn posterior_draws(mut self, m: usize) -> Self {
        self.config.posterior_draws = m;
        self
    }

    /// Set the histogram bin count J.
    pub fn bins(mut self, j: usize) -> Self {
        self.config.bins = j;
        self
    }

    /// Set the first-attempt iteration budget.
    pub fn initial_iterations(mut self, iterations: usize) -> Self {
        self.config.initial_iterations = iterations;
        self
    }

    /// Set the warmup iterations forwarded on every oracle call.
    pub fn warmup(mut self, warmup: usize) -> Self {
        self.config.warmup = warmup;
        self
    }

    /// Set the doubling cap of the adaptive loop.
    pub fn max_doublings(mut self, cap: usize) -> Self {
        self.config.max_doublings = cap;
        self
    }

    /// Set the per-call oracle timeout.
    pub fn oracle_timeout(mut self, timeout: Duration) -> Self {
        self.config.oracle_timeout = timeout;
        self
    }

    /// Set the number of retries after a timed-out oracle call.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the run seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Set the worker thread count (`0` means one per available CPU).
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    /// Set the completion-rate warning threshold.
    pub fn completion_warn_ratio(mut self, ratio: f64) -> Self {
        self.config.completion_warn_ratio = ratio;
        self
    }

    /// Run the full calibration check.
    pub fn run(
        &self,
        spec: &GenerativeSpec,
        oracle: Arc<dyn PosteriorOracle>,
    ) -> Result<SbcReport, SbcError> {
        self.run_cancellable(spec, oracle, &CancelToken::new())
    }

    /// Run with an external cancellation token.
    ///
    /// Cancelling the token stops the run at the next safe point: pending
    /// simulations are skipped, in-flight oracle calls are signalled through
    /// a child token and their simulations recorded as failed. Completed
    /// work up to that point is still aggregated and reported.
    pub fn run_cancellable(
        &self,
        spec: &GenerativeSpec,
        oracle: Arc<dyn PosteriorOracle>,
        cancel: &CancelToken,
    ) -> Result<SbcReport, SbcError> {
        self.config.validate()?;
        spec.validate()?;

        let started = Instant::now();
        let n = self.config.simulations;
        let workers = self.worker_count();
        let parameter_names = spec.parameter_names();

        info!(
            simulations = n,
            posterior_draws = self.config.posterior_draws,
            bins = self.config.bins,
            workers,
            oracle = oracle.name(),
            "starting calibration run"
        );

        let (job_tx, job_rx) = unbounded::<usize>();
        let (record_tx, record_rx) = unbounded::<SimulationRecord>();
        for index in 0..n {
            // Both halves are held by this function; the channel cannot be
            // closed yet.
            let _ = job_tx.send(index);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let record_tx = record_tx.clone();
                let oracle = oracle.clone();
                let names = parameter_names.clone();
                scope.spawn(move || {
                    while let Ok(index) = job_rx.recv() {
                        let record = if cancel.is_cancelled() {
                            // Never started; stays pending and is counted as
                            // skipped.
                            SimulationRecord::new(index)
                        } else {
                            self.run_simulation(index, spec, &oracle, &names, cancel)
                        };
                        if record_tx.send(record).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(record_tx);

        let mut records: Vec<SimulationRecord> = record_rx.iter().collect();
        records.sort_by_key(|r| r.index);

        let report = self.aggregate(&parameter_names, records, started.elapsed(), cancel);
        info!(
            completed = report.counts.n_completed,
            failed = report.counts.n_failed,
            timed_out = report.counts.n_timed_out,
            skipped = report.counts.n_skipped,
            elapsed_s = report.elapsed.as_secs_f64(),
            "calibration run finished"
        );
        Ok(report)
    }

    fn worker_count(&self) -> usize {
        let requested = if self.config.threads == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1)
        } else {
            self.config.threads
        };
        requested.min(self.config.simulations).max(1)
    }

    /// Drive one simulation through its full lifecycle.
    fn run_simulation(
        &self,
        index: usize,
        spec: &GenerativeSpec,
        oracle: &Arc<dyn PosteriorOracle>,
        parameter_names: &[String],
        cancel: &CancelToken,
    ) -> SimulationRecord {
        let mut record = SimulationRecord::new(index);

        record.status = SimulationStatus::Simulating;
        let mut rng = substream(self.config.seed, index as u64);
        let (theta_sim, dataset) = spec.simulate(&mut rng);
        debug!(index, "simulated prior draw and dataset");
        record.theta_sim = theta_sim;
        record.dataset = dataset;

        record.status = SimulationStatus::Inferring;
        let budget = AdaptiveBudget {
            initial_iterations: self.config.initial_iterations,
            warmup: self.config.warmup,
            max_doublings: self.config.max_doublings,
            target_draws: self.config.posterior_draws,
        };
        let oracle_seed = substream_seed(self.config.seed ^ ORACLE_STREAM, index as u64);

        let attempts_made = Cell::new(0usize);
        let outcome = run_adaptive_inference(parameter_names, &budget, oracle_seed, |cfg| {
            self.invoke_with_timeout(oracle, &record.dataset, cfg, cancel, &attempts_made)
        });
        record.oracle_attempts = attempts_made.get();

        match outcome {
            Ok(thinned) => {
                record.status = SimulationStatus::Thinning;
                record.raw_draw_count = thinned.raw_len;
                if thinned.divergences > 0 {
                    record.warnings.push(SimulationWarning::DivergentInference {
                        count: thinned.divergences,
                    });
                }

                record.status = SimulationStatus::Ranking;
                record.ranks = rank_statistic(&thinned.draws, &record.theta_sim);
                record.thinned = thinned.draws;
                record.status = SimulationStatus::Done;
            }
            Err(failure) => {
                warn!(index, %failure, "simulation failed");
                record.status = match failure {
                    SimulationFailure::OracleTimedOut { .. } => SimulationStatus::TimedOut,
                    _ => SimulationStatus::Failed,
                };
                record.failure = Some(failure.to_string());
            }
        }

        record
    }

    /// One oracle call under the per-call timeout and retry policy.
    ///
    /// The call runs on a dedicated thread so the worker can enforce the
    /// deadline. On expiry the call's child token is cancelled; the
    /// straggler thread exits at the oracle's next checkpoint and its late
    /// result is dropped with the channel.
    fn invoke_with_timeout(
        &self,
        oracle: &Arc<dyn PosteriorOracle>,
        dataset: &Dataset,
        config: &OracleConfig,
        cancel: &CancelToken,
        attempts_made: &Cell<usize>,
    ) -> Result<Inference, SimulationFailure> {
        let mut timeouts = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SimulationFailure::Cancelled);
            }
            attempts_made.set(attempts_made.get() + 1);

            let call_token = cancel.child();
            let (result_tx, result_rx) = bounded(1);
            {
                let oracle = oracle.clone();
                let dataset = dataset.clone();
                let config = *config;
                let token = call_token.clone();
                std::thread::spawn(move || {
                    let result = oracle.infer(&dataset, &config, &token);
                    let _ = result_tx.send(result);
                });
            }

            let outcome = match result_rx.recv_timeout(self.config.oracle_timeout) {
                Ok(result) => result,
                Err(_) => {
                    call_token.cancel();
                    Err(OracleError::Timeout {
                        elapsed: self.config.oracle_timeout,
                    })
                }
            };

            match outcome {
                Ok(inference) => return Ok(inference),
                Err(OracleError::Timeout { elapsed }) => {
                    timeouts += 1;
                    warn!(
                        elapsed_s = elapsed.as_secs_f64(),
                        attempt = timeouts,
                        "oracle call timed out"
                    );
                    if timeouts > self.config.max_retries {
                        return Err(SimulationFailure::OracleTimedOut { attempts: timeouts });
                    }
                }
                Err(OracleError::Cancelled) => return Err(SimulationFailure::Cancelled),
                Err(OracleError::Failed { message }) => {
                    return Err(SimulationFailure::OracleFailed { message })
                }
            }
        }
    }

    /// Merge terminal records into the final report.
    fn aggregate(
        &self,
        parameter_names: &[String],
        records: Vec<SimulationRecord>,
        elapsed: Duration,
        cancel: &CancelToken,
    ) -> SbcReport {
        let m = self.config.posterior_draws;
        let j = self.config.bins;

        let mut counts = RunCounts {
            n_requested: self.config.simulations,
            n_completed: 0,
            n_failed: 0,
            n_timed_out: 0,
            n_skipped: 0,
        };
        let mut rank_table = RankTable::new(parameter_names.to_vec(), m);
        let mut divergent_simulations = 0usize;

        for record in &records {
            match record.status {
                SimulationStatus::Done => {
                    counts.n_completed += 1;
                    rank_table.insert(RankRow {
                        index: record.index,
                        ranks: record.ranks.clone(),
                    });
                    if !record.warnings.is_empty() {
                        divergent_simulations += 1;
                    }
                }
                SimulationStatus::Failed => counts.n_failed += 1,
                SimulationStatus::TimedOut => counts.n_timed_out += 1,
                // Cancellation skips jobs before they leave `Pending`.
                _ => counts.n_skipped += 1,
            }
        }

        let mut run_warnings = Vec::new();
        if counts.completion_ratio() < self.config.completion_warn_ratio {
            run_warnings.push(format!(
                "completion rate {:.1}% below threshold {:.1}%; surviving \
                 simulations may be a biased subset",
                counts.completion_ratio() * 100.0,
                self.config.completion_warn_ratio * 100.0
            ));
        }
        if divergent_simulations > 0 {
            run_warnings.push(format!(
                "{} completed simulations reported divergent transitions",
                divergent_simulations
            ));
        }

        let parameters = if counts.n_completed == 0 {
            run_warnings.push("no simulations completed; uniformity test skipped".to_string());
            Vec::new()
        } else {
            let expected = expected_counts(m, j, counts.n_completed);
            parameter_names
                .iter()
                .enumerate()
                .map(|(k, name)| {
                    let ranks = rank_table.column(k);
                    let observed = bin_counts(&ranks, m, j);
                    let result = chi_square_uniformity(name, &observed, &expected);
                    ParameterReport::from_test(
                        result,
                        ranks,
                        observed,
                        expected.clone(),
                        Vec::new(),
                    )
                })
                .collect()
        };

        SbcReport {
            parameters,
            counts,
            rank_table,
            posterior_draws: m,
            bins: j,
            warnings: run_warnings,
            elapsed,
            cancelled: cancel.is_cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracles::{conjugate_normal_model, ConjugateNormalOracle, ConstantOracle};

    fn unit_oracle() -> Arc<dyn PosteriorOracle> {
        Arc::new(ConjugateNormalOracle {
            prior_mean: 0.0,
            prior_sd: 1.0,
            noise_sd: 1.0,
        })
    }

    fn small_harness() -> SbcHarness {
        SbcHarness::new()
            .simulations(20)
            .posterior_draws(19)
            .bins(4)
            .initial_iterations(64)
            .warmup(0)
            .seed(11)
            .threads(2)
    }

    #[test]
    fn test_small_run_completes_every_simulation() {
        let model = conjugate_normal_model(0.0, 1.0, 1.0, 3);
        let report = small_harness().run(&model, unit_oracle()).unwrap();

        assert_eq!(report.counts.n_requested, 20);
        assert_eq!(report.counts.n_completed, 20);
        assert_eq!(report.counts.n_failed, 0);
        assert_eq!(report.rank_table.n_rows(), 20);
        assert_eq!(report.parameters.len(), 1);
        assert_eq!(report.parameters[0].parameter, "mu");
        assert!(!report.cancelled);
    }

    #[test]
    fn test_ranks_within_bounds() {
        let model = conjugate_normal_model(0.0, 1.0, 1.0, 3);
        let report = small_harness().run(&model, unit_oracle()).unwrap();
        for row in report.rank_table.rows() {
            assert!(row.ranks[0] <= report.rank_table.max_rank());
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_running() {
        let model = conjugate_normal_model(0.0, 1.0, 1.0, 3);
        let result = small_harness().bins(1).run(&model, unit_oracle());
        assert!(matches!(
            result,
            Err(SbcError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_invalid_spec_rejected_before_running() {
        let spec = GenerativeSpec::new();
        let result = small_harness().run(&spec, unit_oracle());
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_variance_oracle_fails_all_simulations() {
        let model = conjugate_normal_model(0.0, 1.0, 1.0, 3);
        let oracle = Arc::new(ConstantOracle {
            value: 0.0,
            parameters: vec!["mu".to_string()],
        });
        let report = small_harness()
            .max_doublings(2)
            .run(&model, oracle)
            .unwrap();

        assert_eq!(report.counts.n_completed, 0);
        assert_eq!(report.counts.n_failed, 20);
        assert!(report.parameters.is_empty());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("completion rate")));
    }

    #[test]
    fn test_cancel_before_run_skips_everything() {
        let model = conjugate_normal_model(0.0, 1.0, 1.0, 3);
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = small_harness()
            .run_cancellable(&model, unit_oracle(), &cancel)
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.counts.n_skipped, 20);
        assert_eq!(report.counts.n_completed, 0);
    }

    #[test]
    fn test_worker_count_capped_at_simulations() {
        let harness = SbcHarness::new().simulations(3).threads(16);
        assert_eq!(harness.worker_count(), 3);
    }
}
