//! End-to-end calibration checks against reference oracles with known
//! behavior: the exact conjugate posterior must pass, and deliberately
//! broken oracles must fail in their characteristic ways.

use std::sync::Arc;

use sbc_harness::{
    assert_calibrated, assert_miscalibrated, conjugate_normal_model, BiasedOracle,
    ConjugateNormalOracle, SbcHarness,
};
use sbc_harness::oracles::{ConstantOracle, CorrelatedNormalOracle, DivergentOracle};

fn unit_oracle() -> ConjugateNormalOracle {
    ConjugateNormalOracle {
        prior_mean: 0.0,
        prior_sd: 1.0,
        noise_sd: 1.0,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn harness() -> SbcHarness {
    SbcHarness::new()
        .simulations(300)
        .posterior_draws(19)
        .bins(4)
        .initial_iterations(64)
        .warmup(0)
        .seed(2024)
        .threads(2)
}

#[test]
fn exact_posterior_oracle_passes() {
    init_tracing();
    let model = conjugate_normal_model(0.0, 1.0, 1.0, 5);
    let report = SbcHarness::new()
        .simulations(500)
        .posterior_draws(99)
        .bins(10)
        .initial_iterations(128)
        .warmup(0)
        .seed(2024)
        .threads(2)
        .run(&model, Arc::new(unit_oracle()))
        .unwrap();

    assert_eq!(report.counts.n_completed, 500);
    assert_eq!(report.parameters.len(), 1);
    // The p-value under the null is uniform; at this fixed seed a value
    // this small would indicate a real bug, not bad luck.
    assert!(
        report.parameters[0].p_value > 1e-3,
        "exact posterior should look uniform, p = {}",
        report.parameters[0].p_value
    );
    assert_calibrated!(report, 1e-3);
}

#[test]
fn biased_oracle_fails() {
    let model = conjugate_normal_model(0.0, 1.0, 1.0, 5);
    let oracle = Arc::new(BiasedOracle {
        inner: unit_oracle(),
        bias: 2.0,
    });
    let report = harness().run(&model, oracle).unwrap();

    assert_eq!(report.counts.n_completed, 300);
    // Shifting every draw up pushes the truth's rank toward 0; the
    // histogram piles into the low bins.
    assert!(
        report.parameters[0].p_value < 1e-6,
        "biased posterior should be rejected, p = {}",
        report.parameters[0].p_value
    );
    assert_miscalibrated!(report);
}

#[test]
fn overdispersed_oracle_fails() {
    // Doubling the posterior spread concentrates ranks in the middle bins.
    struct Overdispersed(ConjugateNormalOracle);
    impl sbc_harness::PosteriorOracle for Overdispersed {
        fn infer(
            &self,
            dataset: &sbc_harness::Dataset,
            config: &sbc_harness::OracleConfig,
            cancel: &sbc_harness::CancelToken,
        ) -> Result<sbc_harness::Inference, sbc_harness::OracleError> {
            let mut inference = self.0.infer(dataset, config, cancel)?;
            let mean: f64 = inference
                .draws
                .iter()
                .map(|d| d.value_at(0))
                .sum::<f64>()
                / inference.draws.len() as f64;
            for draw in &mut inference.draws {
                let stretched = mean + 3.0 * (draw.value_at(0) - mean);
                *draw = sbc_harness::ParameterVector::from_pairs(vec![(
                    "mu".to_string(),
                    stretched,
                )]);
            }
            Ok(inference)
        }
    }

    let model = conjugate_normal_model(0.0, 1.0, 1.0, 5);
    let report = harness()
        .run(&model, Arc::new(Overdispersed(unit_oracle())))
        .unwrap();

    assert!(
        report.parameters[0].p_value < 1e-6,
        "overdispersed posterior should be rejected, p = {}",
        report.parameters[0].p_value
    );
}

#[test]
fn autocorrelated_oracle_passes_after_doubling() {
    // Marginally correct but sticky chain: the adaptive loop must grow the
    // budget before thinning, after which calibration holds.
    let model = conjugate_normal_model(0.0, 1.0, 1.0, 5);
    let oracle = Arc::new(CorrelatedNormalOracle {
        base: unit_oracle(),
        phi: 0.9,
    });
    let report = SbcHarness::new()
        .simulations(200)
        .posterior_draws(19)
        .bins(4)
        .initial_iterations(64)
        .warmup(50)
        .max_doublings(6)
        .seed(5)
        .threads(2)
        .run(&model, oracle)
        .unwrap();

    assert_eq!(
        report.counts.n_completed, 200,
        "doubling should rescue the sticky chain: {:?}",
        report.counts
    );
    assert!(
        report.parameters[0].p_value > 1e-3,
        "thinned sticky chain should still be calibrated, p = {}",
        report.parameters[0].p_value
    );
}

#[test]
fn zero_variance_oracle_exhausts_doublings() {
    let model = conjugate_normal_model(0.0, 1.0, 1.0, 3);
    let oracle = Arc::new(ConstantOracle {
        value: 0.0,
        parameters: vec!["mu".to_string()],
    });
    let report = SbcHarness::new()
        .simulations(10)
        .posterior_draws(19)
        .bins(4)
        .initial_iterations(32)
        .warmup(0)
        .max_doublings(2)
        .seed(1)
        .run(&model, oracle)
        .unwrap();

    assert_eq!(report.counts.n_completed, 0);
    assert_eq!(report.counts.n_failed, 10);
    assert!(report.parameters.is_empty());
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("no simulations completed")));
}

#[test]
fn wrong_draw_shape_fails_simulations() {
    // The oracle emits "mu" but the model declares a second parameter, so
    // every accepted inference is rejected at shape validation.
    let model = conjugate_normal_model(0.0, 1.0, 1.0, 3).step(
        sbc_harness::GenerationStep::parameter("sigma", |_, _| 1.0),
    );
    let report = SbcHarness::new()
        .simulations(5)
        .posterior_draws(9)
        .bins(2)
        .initial_iterations(32)
        .warmup(0)
        .seed(3)
        .run(&model, Arc::new(unit_oracle()))
        .unwrap();

    assert_eq!(report.counts.n_completed, 0);
    assert_eq!(report.counts.n_failed, 5);
}

#[test]
fn divergences_surface_as_warnings() {
    let model = conjugate_normal_model(0.0, 1.0, 1.0, 3);
    let oracle = Arc::new(DivergentOracle {
        inner: unit_oracle(),
        divergences: 2,
    });
    let report = SbcHarness::new()
        .simulations(10)
        .posterior_draws(19)
        .bins(4)
        .initial_iterations(64)
        .warmup(0)
        .seed(8)
        .run(&model, oracle)
        .unwrap();

    // Divergent transitions do not fail simulations, only annotate them.
    assert_eq!(report.counts.n_completed, 10);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("divergent transitions")));
}
