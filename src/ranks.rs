//! Rank statistics and bin aggregation.
//!
//! For each parameter, the rank is the number of thinned posterior draws
//! strictly below the simulated truth. Ranks lie in `[0, M]` and, under a
//! calibrated oracle, are uniform over the M+1 possible values. Ranks are
//! then mapped into J bins via a fixed arithmetic rule for the uniformity
//! test.
//!
//! Ties (a draw exactly equal to the truth) do not count toward the rank:
//! the comparison is strict `<` with no tolerance. This matches the
//! reference definition; for continuous parameters ties have probability
//! zero anyway.

use crate::types::ParameterVector;

/// Compute per-parameter ranks of the simulated truth among thinned draws.
///
/// `thinned` draws must share the truth's parameter order (validated when
/// the oracle's first draw is accepted). The result is independent of the
/// order of the draws: it is a pure count of strict exceedances.
pub fn rank_statistic(thinned: &[ParameterVector], theta_sim: &ParameterVector) -> Vec<usize> {
    (0..theta_sim.len())
        .map(|k| {
            let truth = theta_sim.value_at(k);
            thinned
                .iter()
                .filter(|draw| draw.value_at(k) < truth)
                .count()
        })
        .collect()
}

/// Map a rank `r ∈ [0, M]` to its 1-based bin in `1..=J`.
///
/// `bin(r) = 1 + floor(r * J / (M + 1))`.
pub fn bin_index(rank: usize, max_rank: usize, bins: usize) -> usize {
    debug_assert!(rank <= max_rank);
    1 + rank * bins / (max_rank + 1)
}

/// Integer width of each bin: how many of the M+1 possible ranks land in it.
///
/// When `(M+1) % J == 0` all widths equal `(M+1)/J`; otherwise widths
/// differ by one and the uniformity test must use bin-specific expected
/// counts.
pub fn bin_widths(max_rank: usize, bins: usize) -> Vec<usize> {
    let total = max_rank + 1;
    (1..=bins)
        .map(|j| {
            // Ranks in bin j are [ceil((j-1)(M+1)/J), ceil(j(M+1)/J) - 1].
            let lower = ((j - 1) * total).div_ceil(bins);
            let upper = (j * total).div_ceil(bins);
            upper - lower
        })
        .collect()
}

/// Exact expected count per bin for `n_completed` simulations.
///
/// `e_j = width_j / (M+1) * n_completed`. Sums to `n_completed` exactly
/// (up to floating point) because the widths partition the M+1 ranks.
pub fn expected_counts(max_rank: usize, bins: usize, n_completed: usize) -> Vec<f64> {
    let total = (max_rank + 1) as f64;
    bin_widths(max_rank, bins)
        .into_iter()
        .map(|w| w as f64 / total * n_completed as f64)
        .collect()
}

/// Histogram ranks into J bins.
pub fn bin_counts(ranks: &[usize], max_rank: usize, bins: usize) -> Vec<u64> {
    let mut counts = vec![0u64; bins];
    for &r in ranks {
        counts[bin_index(r, max_rank, bins) - 1] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pv(pairs: &[(&str, f64)]) -> ParameterVector {
        ParameterVector::from_pairs(pairs.iter().map(|(n, v)| (n.to_string(), *v)).collect())
    }

    #[test]
    fn test_bin_arithmetic_reference_points() {
        // M = 999, J = 20: width-50 bins.
        assert_eq!(bin_index(0, 999, 20), 1);
        assert_eq!(bin_index(49, 999, 20), 1);
        assert_eq!(bin_index(50, 999, 20), 2);
        assert_eq!(bin_index(999, 999, 20), 20);
    }

    #[test]
    fn test_bin_index_covers_all_bins() {
        let m = 99;
        let j = 20;
        let mut seen = vec![false; j];
        for r in 0..=m {
            let b = bin_index(r, m, j);
            assert!((1..=j).contains(&b), "rank {} mapped to bin {}", r, b);
            seen[b - 1] = true;
        }
        assert!(seen.iter().all(|&s| s), "every bin should be reachable");
    }

    #[test]
    fn test_worked_example_ranks() {
        // theta_sim = (mu=1.01, sigma=0.23); four posterior draws.
        let theta = pv(&[("mu", 1.01), ("sigma", 0.23)]);
        let thinned = vec![
            pv(&[("mu", 1.07), ("sigma", 0.33)]),
            pv(&[("mu", -0.32), ("sigma", 0.14)]),
            pv(&[("mu", -0.99), ("sigma", 0.26)]),
            pv(&[("mu", 1.51), ("sigma", 0.31)]),
        ];

        let ranks = rank_statistic(&thinned, &theta);
        assert_eq!(ranks, vec![2, 1]);
    }

    #[test]
    fn test_rank_is_order_independent() {
        let theta = pv(&[("mu", 0.5)]);
        let base: Vec<f64> = vec![0.1, 0.9, 0.4, 0.6, 0.3, 0.7];

        let rank_of = |order: &[usize]| {
            let draws: Vec<_> = order.iter().map(|&i| pv(&[("mu", base[i])])).collect();
            rank_statistic(&draws, &theta)[0]
        };

        let reference = rank_of(&[0, 1, 2, 3, 4, 5]);
        assert_eq!(reference, 3);
        assert_eq!(rank_of(&[5, 4, 3, 2, 1, 0]), reference);
        assert_eq!(rank_of(&[2, 0, 4, 1, 5, 3]), reference);
    }

    #[test]
    fn test_ties_do_not_count() {
        let theta = pv(&[("mu", 1.0)]);
        let thinned = vec![
            pv(&[("mu", 1.0)]),
            pv(&[("mu", 1.0)]),
            pv(&[("mu", 0.5)]),
        ];
        assert_eq!(rank_statistic(&thinned, &theta), vec![1]);
    }

    #[test]
    fn test_rank_bounds() {
        let theta = pv(&[("mu", 0.0)]);
        let all_above: Vec<_> = (0..10).map(|i| pv(&[("mu", 1.0 + i as f64)])).collect();
        let all_below: Vec<_> = (0..10).map(|i| pv(&[("mu", -1.0 - i as f64)])).collect();

        assert_eq!(rank_statistic(&all_above, &theta), vec![0]);
        assert_eq!(rank_statistic(&all_below, &theta), vec![10]);
    }

    #[test]
    fn test_uniform_bin_widths() {
        let widths = bin_widths(999, 20);
        assert_eq!(widths.len(), 20);
        assert!(widths.iter().all(|&w| w == 50));
    }

    #[test]
    fn test_unequal_bin_widths_partition_ranks() {
        // M+1 = 10, J = 3: widths 4, 3, 3.
        let widths = bin_widths(9, 3);
        assert_eq!(widths, vec![4, 3, 3]);
        assert_eq!(widths.iter().sum::<usize>(), 10);

        // Widths must agree with the bin_index rule exactly.
        let mut counted = vec![0usize; 3];
        for r in 0..=9 {
            counted[bin_index(r, 9, 3) - 1] += 1;
        }
        assert_eq!(counted, widths);
    }

    #[test]
    fn test_expected_counts_sum_to_n_completed() {
        // Non-dividing configuration: expected counts are bin-specific.
        let expected = expected_counts(9, 3, 470);
        assert_eq!(expected.len(), 3);
        let sum: f64 = expected.iter().sum();
        assert!((sum - 470.0).abs() < 1e-9);
        assert!((expected[0] - 188.0).abs() < 1e-9); // 4/10 * 470
        assert!((expected[1] - 141.0).abs() < 1e-9); // 3/10 * 470
    }

    #[test]
    fn test_bin_counts_histogram() {
        let ranks = vec![0, 49, 50, 999];
        let counts = bin_counts(&ranks, 999, 20);
        assert_eq!(counts[0], 2);
        assert_eq!(counts[1], 1);
        assert_eq!(counts[19], 1);
        assert_eq!(counts.iter().sum::<u64>(), 4);
    }
}
