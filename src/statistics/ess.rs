//! Effective sample size estimation for correlated draw sequences.
//!
//! A Markov chain of length n is worth fewer than n independent draws when
//! consecutive draws are correlated. The estimate here is the standard
//! autocorrelation-based one: `ess = n / tau`, where `tau` is the
//! integrated autocorrelation time accumulated over Geyer's initial
//! positive sequence (paired lags `rho_{2t} + rho_{2t+1}` summed while the
//! pair stays positive). Pairing is what keeps the estimator stable: for a
//! genuine Markov chain the paired sums are provably nonnegative, so the
//! first nonpositive pair marks where noise has taken over.

const VARIANCE_EPSILON: f64 = 1e-12;

/// Compute the autocorrelation of `data` at a specific lag.
///
/// Uses the standard normalized form `ACF(k) = Cov(X_t, X_{t+k}) / Var(X)`
/// with the full-series mean and variance. Returns 0.0 for degenerate
/// inputs (series shorter than the lag, or zero variance).
pub fn autocorrelation(data: &[f64], lag: usize) -> f64 {
    if data.len() <= lag {
        return 0.0;
    }

    let n = data.len();
    let mean: f64 = data.iter().sum::<f64>() / n as f64;
    let variance: f64 = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

    if variance < VARIANCE_EPSILON {
        return 0.0;
    }

    let autocovariance: f64 = data
        .iter()
        .take(n - lag)
        .zip(data.iter().skip(lag))
        .map(|(x_t, x_t_k)| (x_t - mean) * (x_t_k - mean))
        .sum::<f64>()
        / n as f64;

    autocovariance / variance
}

/// Estimate the effective sample size of one parameter's draw sequence.
///
/// Degenerate input (length < 2, or zero variance) yields 0.0 rather than
/// an error: a constant chain carries no information, and the adaptive loop
/// treats ESS 0 as "keep doubling" until its cap trips.
pub fn effective_sample_size(chain: &[f64]) -> f64 {
    let n = chain.len();
    if n < 2 {
        return 0.0;
    }

    let mean: f64 = chain.iter().sum::<f64>() / n as f64;
    let variance: f64 = chain.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    if variance < VARIANCE_EPSILON {
        return 0.0;
    }

    // Geyer initial positive sequence over paired lags. The first pair is
    // rho_0 + rho_1 = 1 + rho_1; tau = -1 + 2 * sum of positive pairs.
    let mut paired_sum = 0.0;
    let mut t = 0;
    loop {
        let even = autocorrelation(chain, 2 * t);
        let odd = autocorrelation(chain, 2 * t + 1);
        let pair = even + odd;
        if pair <= 0.0 {
            break;
        }
        paired_sum += pair;
        t += 1;
        if 2 * t + 1 >= n {
            break;
        }
    }

    let tau = (2.0 * paired_sum - 1.0).max(1.0 / n as f64);
    n as f64 / tau
}
