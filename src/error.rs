//! Error types for the calibration harness.
//!
//! Two families of errors exist with very different blast radii:
//!
//! - [`SbcError`]: fatal configuration or model-specification errors. These
//!   surface before any simulation runs and abort the whole run.
//! - [`SimulationFailure`]: per-simulation errors. These are contained: the
//!   affected simulation is marked `failed` or `timed-out` and the run
//!   continues with the remaining simulations.
//!
//! Oracle implementations report problems through [`OracleError`], which the
//! harness translates into a `SimulationFailure` (with retries for timeouts).

use std::time::Duration;

/// Fatal error that aborts a run before any simulation executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SbcError {
    /// A generation step references a value that has not been produced yet.
    ///
    /// The generative specification must be topologically ordered: every
    /// `depends_on` entry of a step must name an earlier step.
    DependencyOrder {
        /// The step whose dependency is unsatisfied.
        step: String,
        /// The name that was referenced but not yet generated.
        missing: String,
    },

    /// Two generation steps share the same name.
    DuplicateStep {
        /// The duplicated step name.
        name: String,
    },

    /// The run configuration is invalid (e.g. zero simulations or bins).
    InvalidConfiguration {
        /// Human-readable description of the violated constraint.
        message: String,
    },
}

impl std::fmt::Display for SbcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DependencyOrder { step, missing } => write!(
                f,
                "generation step '{}' depends on '{}' which is not produced by any earlier step",
                step, missing
            ),
            Self::DuplicateStep { name } => {
                write!(f, "generation step '{}' is declared more than once", name)
            }
            Self::InvalidConfiguration { message } => {
                write!(f, "invalid configuration: {}", message)
            }
        }
    }
}

impl std::error::Error for SbcError {}

/// Error returned by a [`PosteriorOracle`](crate::PosteriorOracle) call.
///
/// The oracle is an opaque external collaborator; these variants are the
/// entire vocabulary it has for reporting problems to the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The oracle detected that it exceeded its time allowance and stopped
    /// at a checkpoint. The harness also enforces timeouts externally, so
    /// self-reporting is optional but produces cleaner shutdowns.
    Timeout {
        /// Time spent before giving up.
        elapsed: Duration,
    },

    /// The oracle observed the cancellation token and stopped early.
    Cancelled,

    /// The inference itself failed (e.g. the sampler blew up).
    Failed {
        /// Oracle-provided description.
        message: String,
    },
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { elapsed } => {
                write!(f, "oracle timed out after {:.1}s", elapsed.as_secs_f64())
            }
            Self::Cancelled => write!(f, "oracle cancelled"),
            Self::Failed { message } => write!(f, "oracle failed: {}", message),
        }
    }
}

impl std::error::Error for OracleError {}

/// Terminal failure of a single simulation.
///
/// None of these abort the run; the orchestrator records the failure on the
/// simulation and moves on. The final report counts them.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationFailure {
    /// The doubling cap was reached without every parameter's effective
    /// sample size meeting the thinning target.
    InsufficientEss {
        /// Worst per-parameter ESS at the final budget.
        achieved: f64,
        /// Required ESS (the thinning target M).
        target: usize,
        /// Iteration budget of the final attempt.
        iterations: usize,
    },

    /// The oracle exceeded its per-call timeout on every allowed attempt.
    OracleTimedOut {
        /// Total attempts made (1 + retries).
        attempts: usize,
    },

    /// The oracle reported a hard failure. Not retried.
    OracleFailed {
        /// Oracle-provided description.
        message: String,
    },

    /// The oracle returned draws whose parameters do not match the
    /// generative specification (wrong names, order, or arity).
    ShapeMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// The run was cancelled while this simulation was in flight.
    Cancelled,
}

impl std::fmt::Display for SimulationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientEss {
                achieved,
                target,
                iterations,
            } => write!(
                f,
                "effective sample size {:.1} below target {} after {} iterations at the doubling cap",
                achieved, target, iterations
            ),
            Self::OracleTimedOut { attempts } => {
                write!(f, "oracle timed out on all {} attempts", attempts)
            }
            Self::OracleFailed { message } => write!(f, "oracle failed: {}", message),
            Self::ShapeMismatch { message } => write!(f, "draw shape mismatch: {}", message),
            Self::Cancelled => write!(f, "run cancelled"),
        }
    }
}

impl std::error::Error for SimulationFailure {}
