//! Generative model specification and prior/likelihood simulation.
//!
//! A model is expressed as an ordered list of generation steps, each drawing
//! one scalar from a distribution that may be parameterized by previously
//! generated values. Steps carry a role: `Parameter` steps form the
//! simulated truth θ_sim, `Data` steps form the simulated dataset y_sim.
//!
//! The list must be topologically ordered: a step may only depend on names
//! produced by earlier steps. [`GenerativeSpec::validate`] enforces this
//! before any simulation runs.
//!
//! Distribution families are closed over a single capability,
//! `sample(rng, upstream) -> value`, carried as a boxed closure on each
//! step. New families are new steps, not subclasses.

use rand::RngCore;

use crate::error::SbcError;
use crate::types::{Dataset, ParameterVector};

/// Sampling function of one generation step.
///
/// Receives the simulation's substream generator and read-only access to all
/// previously generated values. Must only read names declared in the step's
/// `depends_on` list; validation guarantees those exist by the time the step
/// runs.
pub type SampleFn = Box<dyn Fn(&mut dyn RngCore, &StepContext<'_>) -> f64 + Send + Sync>;

/// Whether a step contributes to the parameter vector or the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRole {
    /// Contributes to θ_sim; ranked against posterior draws.
    Parameter,
    /// Contributes to y_sim; handed to the oracle.
    Data,
}

/// One named generation step.
pub struct GenerationStep {
    name: String,
    role: StepRole,
    depends_on: Vec<String>,
    sample: SampleFn,
}

impl GenerationStep {
    /// Create a parameter-role step drawing from a fixed or conditional
    /// distribution.
    pub fn parameter(
        name: impl Into<String>,
        sample: impl Fn(&mut dyn RngCore, &StepContext<'_>) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            role: StepRole::Parameter,
            depends_on: Vec::new(),
            sample: Box::new(sample),
        }
    }

    /// Create a data-role step.
    pub fn data(
        name: impl Into<String>,
        sample: impl Fn(&mut dyn RngCore, &StepContext<'_>) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            role: StepRole::Data,
            depends_on: Vec::new(),
            sample: Box::new(sample),
        }
    }

    /// Declare the upstream names this step reads.
    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| (*d).to_string()).collect();
        self
    }

    /// Step name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step role.
    pub fn role(&self) -> StepRole {
        self.role
    }
}

impl std::fmt::Debug for GenerationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStep")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// Read-only view of previously generated values, passed to sample closures.
pub struct StepContext<'a> {
    values: &'a [(String, f64)],
}

impl StepContext<'_> {
    /// Value of an upstream step.
    ///
    /// # Panics
    ///
    /// Panics if `name` has not been generated yet. Closures that stick to
    /// their declared `depends_on` names never hit this: validation rejects
    /// specifications whose declared dependencies are out of order.
    pub fn value(&self, name: &str) -> f64 {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .unwrap_or_else(|| panic!("generation step read undeclared upstream value '{}'", name))
    }
}

/// Ordered generative model specification.
#[derive(Debug, Default)]
pub struct GenerativeSpec {
    steps: Vec<GenerationStep>,
}

impl GenerativeSpec {
    /// Create an empty specification.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step (builder style).
    pub fn step(mut self, step: GenerationStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if no steps are declared.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of parameter-role steps, in declaration order.
    pub fn parameter_names(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.role == StepRole::Parameter)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Validate name uniqueness and dependency order.
    ///
    /// Fails fast with [`SbcError::DependencyOrder`] when a step's declared
    /// dependency has not been produced by an earlier step, and with
    /// [`SbcError::DuplicateStep`] on name collisions.
    pub fn validate(&self) -> Result<(), SbcError> {
        if self.steps.is_empty() {
            return Err(SbcError::InvalidConfiguration {
                message: "generative specification has no steps".to_string(),
            });
        }
        if !self.steps.iter().any(|s| s.role == StepRole::Parameter) {
            return Err(SbcError::InvalidConfiguration {
                message: "generative specification has no parameter steps".to_string(),
            });
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            if seen.contains(&step.name.as_str()) {
                return Err(SbcError::DuplicateStep {
                    name: step.name.clone(),
                });
            }
            for dep in &step.depends_on {
                if !seen.contains(&dep.as_str()) {
                    return Err(SbcError::DependencyOrder {
                        step: step.name.clone(),
                        missing: dep.clone(),
                    });
                }
            }
            seen.push(&step.name);
        }
        Ok(())
    }

    /// Draw one (θ_sim, y_sim) pair from the joint prior × likelihood.
    ///
    /// Steps run in declaration order, each seeing all values produced so
    /// far. The same generator drives every step, so a fixed seed fixes the
    /// whole simulation.
    pub fn simulate(&self, rng: &mut dyn RngCore) -> (ParameterVector, Dataset) {
        let mut produced: Vec<(String, f64)> = Vec::with_capacity(self.steps.len());
        let mut theta = ParameterVector::new();
        let mut data = Vec::new();

        for step in &self.steps {
            let ctx = StepContext { values: &produced };
            let value = (step.sample)(rng, &ctx);
            match step.role {
                StepRole::Parameter => theta.push(step.name.clone(), value),
                StepRole::Data => data.push(value),
            }
            produced.push((step.name.clone(), value));
        }

        (theta, Dataset::new(data))
    }
}
