//! Fail-fast validation: bad configurations and malformed generative
//! specifications must abort before any simulation runs.

use std::sync::Arc;

use sbc_harness::{
    conjugate_normal_model, ConjugateNormalOracle, GenerationStep, GenerativeSpec, SbcError,
    SbcHarness,
};

fn unit_oracle() -> Arc<ConjugateNormalOracle> {
    Arc::new(ConjugateNormalOracle {
        prior_mean: 0.0,
        prior_sd: 1.0,
        noise_sd: 1.0,
    })
}

#[test]
fn zero_simulations_rejected() {
    let model = conjugate_normal_model(0.0, 1.0, 1.0, 3);
    let result = SbcHarness::new()
        .simulations(0)
        .run(&model, unit_oracle());
    assert!(matches!(
        result,
        Err(SbcError::InvalidConfiguration { .. })
    ));
}

#[test]
fn degenerate_bins_rejected() {
    let model = conjugate_normal_model(0.0, 1.0, 1.0, 3);
    let result = SbcHarness::new().bins(1).run(&model, unit_oracle());
    assert!(matches!(
        result,
        Err(SbcError::InvalidConfiguration { .. })
    ));
}

#[test]
fn more_bins_than_possible_ranks_rejected() {
    let model = conjugate_normal_model(0.0, 1.0, 1.0, 3);
    let result = SbcHarness::new()
        .posterior_draws(9)
        .bins(11)
        .run(&model, unit_oracle());
    assert!(result.is_err());
}

#[test]
fn out_of_order_dependency_rejected_before_any_simulation() {
    // "y" reads "mu" but is declared first; validation must catch this
    // up front rather than panicking inside a worker.
    let spec = GenerativeSpec::new()
        .step(GenerationStep::data("y", |_, ctx| ctx.value("mu")).depends_on(&["mu"]))
        .step(GenerationStep::parameter("mu", |_, _| 0.0));

    let result = SbcHarness::new().run(&spec, unit_oracle());
    assert!(matches!(
        result,
        Err(SbcError::DependencyOrder { step, missing })
            if step == "y" && missing == "mu"
    ));
}

#[test]
fn duplicate_step_names_rejected() {
    let spec = GenerativeSpec::new()
        .step(GenerationStep::parameter("mu", |_, _| 0.0))
        .step(GenerationStep::parameter("mu", |_, _| 1.0));

    let result = SbcHarness::new().run(&spec, unit_oracle());
    assert!(matches!(
        result,
        Err(SbcError::DuplicateStep { name }) if name == "mu"
    ));
}

#[test]
fn parameterless_spec_rejected() {
    let spec = GenerativeSpec::new().step(GenerationStep::data("y", |_, _| 0.0));
    let result = SbcHarness::new().run(&spec, unit_oracle());
    assert!(matches!(
        result,
        Err(SbcError::InvalidConfiguration { .. })
    ));
}
