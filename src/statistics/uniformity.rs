//! Chi-square goodness-of-fit test for rank uniformity.
//!
//! Under a correctly calibrated oracle the rank statistics are uniform over
//! `[0, M]`, so binned counts follow a multinomial with known expected
//! counts. The test statistic `X² = Σ (b_j − e_j)² / e_j` is approximately
//! chi-square with `J − 1` degrees of freedom. The approximation is
//! considered valid when every expected count is at least 5; violations are
//! reported as a warning, never a failure.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::constants::MIN_EXPECTED_COUNT;

/// Outcome of the uniformity test for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformityResult {
    /// Parameter name.
    pub parameter: String,
    /// Chi-square statistic.
    pub statistic: f64,
    /// Degrees of freedom (J − 1).
    pub dof: usize,
    /// Upper-tail p-value of the chi-square(J − 1) distribution at the
    /// statistic.
    pub p_value: f64,
    /// True when some expected count fell below the validity threshold.
    pub low_expected_count: bool,
}

/// Run the chi-square uniformity test for one parameter.
///
/// `observed` and `expected` must have the same length J ≥ 2; expected
/// counts must be positive (guaranteed by the bin aggregator whenever
/// J ≤ M+1).
pub fn chi_square_uniformity(
    parameter: &str,
    observed: &[u64],
    expected: &[f64],
) -> UniformityResult {
    debug_assert_eq!(observed.len(), expected.len());
    debug_assert!(observed.len() >= 2);

    let statistic: f64 = observed
        .iter()
        .zip(expected.iter())
        .map(|(&b, &e)| {
            let diff = b as f64 - e;
            diff * diff / e
        })
        .sum();

    let dof = observed.len() - 1;
    let p_value = ChiSquared::new(dof as f64)
        .map(|dist| dist.sf(statistic))
        .unwrap_or(f64::NAN);

    let low_expected_count = expected.iter().any(|&e| e < MIN_EXPECTED_COUNT);

    UniformityResult {
        parameter: parameter.to_string(),
        statistic,
        dof,
        p_value,
        low_expected_count,
    }
}
