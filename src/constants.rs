//! Shared constants.

/// Default seed for reproducible runs when the caller does not provide one.
pub const DEFAULT_SEED: u64 = 0x5bc5_eed0_1234_abcd;

/// Minimum expected count per bin for the chi-square approximation to hold.
///
/// Bins with a lower expected count trigger a warning (not a failure) in the
/// uniformity test.
pub const MIN_EXPECTED_COUNT: f64 = 5.0;
