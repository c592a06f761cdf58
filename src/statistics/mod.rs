//! Statistical building blocks: effective sample size estimation and the
//! chi-square uniformity test.

mod ess;
mod uniformity;

pub use ess::{autocorrelation, effective_sample_size};
pub use uniformity::{chi_square_uniformity, UniformityResult};
