//! Final run report: per-parameter uniformity results plus run-level counts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::statistics::UniformityResult;
use crate::types::RankTable;

/// Per-parameter section of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterReport {
    /// Parameter name.
    pub parameter: String,
    /// Rank sequence over completed simulations, in simulation-index order.
    pub ranks: Vec<usize>,
    /// Observed counts per bin.
    pub bin_counts: Vec<u64>,
    /// Expected counts per bin (bin-specific when `(M+1) % J != 0`).
    pub expected_counts: Vec<f64>,
    /// Chi-square statistic.
    pub chi_square: f64,
    /// Degrees of freedom (J − 1).
    pub dof: usize,
    /// Upper-tail p-value.
    pub p_value: f64,
    /// Parameter-level warnings (low expected counts, divergences, ...).
    pub warnings: Vec<String>,
}

impl ParameterReport {
    /// Assemble from a uniformity test result and its inputs.
    pub fn from_test(
        result: UniformityResult,
        ranks: Vec<usize>,
        bin_counts: Vec<u64>,
        expected_counts: Vec<f64>,
        mut warnings: Vec<String>,
    ) -> Self {
        if result.low_expected_count {
            warnings.push(format!(
                "some expected bin counts fall below 5; the chi-square \
                 approximation may be unreliable (parameter '{}')",
                result.parameter
            ));
        }
        Self {
            parameter: result.parameter,
            ranks,
            bin_counts,
            expected_counts,
            chi_square: result.statistic,
            dof: result.dof,
            p_value: result.p_value,
            warnings,
        }
    }
}

/// Run-level simulation counts.
///
/// Always present so silent partial failure is impossible to miss:
/// `n_completed + n_failed + n_timed_out + n_skipped == n_requested`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Simulations requested (N).
    pub n_requested: usize,
    /// Simulations that reached `done`.
    pub n_completed: usize,
    /// Simulations marked `failed`.
    pub n_failed: usize,
    /// Simulations marked `timed-out`.
    pub n_timed_out: usize,
    /// Simulations never started (whole-run cancellation).
    pub n_skipped: usize,
}

impl RunCounts {
    /// Fraction of requested simulations that completed.
    pub fn completion_ratio(&self) -> f64 {
        if self.n_requested == 0 {
            return 0.0;
        }
        self.n_completed as f64 / self.n_requested as f64
    }
}

/// Full output of one SBC run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SbcReport {
    /// Per-parameter results, in declaration order.
    pub parameters: Vec<ParameterReport>,
    /// Run-level counts.
    pub counts: RunCounts,
    /// The dense rank table over completed simulations.
    pub rank_table: RankTable,
    /// Thinning target M.
    pub posterior_draws: usize,
    /// Bin count J.
    pub bins: usize,
    /// Run-level warnings (completion rate, divergences across the run).
    pub warnings: Vec<String>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// True when the run was cancelled before all simulations started.
    pub cancelled: bool,
}

impl SbcReport {
    /// True when every parameter's p-value is at or above `alpha`.
    ///
    /// A low p-value means the rank histogram deviates from uniformity,
    /// i.e. the oracle's posteriors are miscalibrated for that parameter.
    pub fn is_calibrated(&self, alpha: f64) -> bool {
        self.parameters.iter().all(|p| p.p_value >= alpha)
    }

    /// Smallest per-parameter p-value, if any parameter was tested.
    pub fn min_p_value(&self) -> Option<f64> {
        self.parameters
            .iter()
            .map(|p| p.p_value)
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Serialize the full report to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render a markdown summary table.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Simulation-based calibration report\n\n");
        md.push_str(&format!(
            "{} of {} simulations completed ({} failed, {} timed out, {} skipped) \
             in {:.1}s\n\n",
            self.counts.n_completed,
            self.counts.n_requested,
            self.counts.n_failed,
            self.counts.n_timed_out,
            self.counts.n_skipped,
            self.elapsed.as_secs_f64()
        ));

        md.push_str("| Parameter | X² | dof | p-value |\n");
        md.push_str("|-|-|-|-|\n");
        for p in &self.parameters {
            md.push_str(&format!(
                "| {} | {:.2} | {} | {:.4} |\n",
                p.parameter, p.chi_square, p.dof, p.p_value
            ));
        }
        md.push('\n');

        let all_warnings: Vec<&String> = self
            .warnings
            .iter()
            .chain(self.parameters.iter().flat_map(|p| p.warnings.iter()))
            .collect();
        if !all_warnings.is_empty() {
            md.push_str("## Warnings\n\n");
            for w in all_warnings {
                md.push_str(&format!("- {}\n", w));
            }
            md.push('\n');
        }

        md
    }
}
