//! Core data types shared across the harness.

use serde::{Deserialize, Serialize};

// ============================================================================
// Parameter vectors and datasets
// ============================================================================

/// Ordered sequence of named scalar parameter values.
///
/// Insertion order is declaration order and is significant: ranks, bin
/// counts, and reports are all keyed by position. Names are unique within a
/// vector (enforced upstream by generative-specification validation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    entries: Vec<(String, f64)>,
}

impl ParameterVector {
    /// Create an empty vector.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Create from `(name, value)` pairs, preserving order.
    pub fn from_pairs(entries: Vec<(String, f64)>) -> Self {
        Self { entries }
    }

    /// Append a named value.
    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.entries.push((name.into(), value));
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the vector holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Value at a declaration-order position.
    pub fn value_at(&self, k: usize) -> f64 {
        self.entries[k].1
    }

    /// Name at a declaration-order position.
    pub fn name_at(&self, k: usize) -> &str {
        &self.entries[k].0
    }

    /// Iterate over parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Iterate over values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }
}

impl Default for ParameterVector {
    fn default() -> Self {
        Self::new()
    }
}

/// A simulated dataset: the observation values produced by the data-role
/// steps of the generative specification, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Observation values.
    pub values: Vec<f64>,
}

impl Dataset {
    /// Create from observation values.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Simulation lifecycle
// ============================================================================

/// Lifecycle state of a single simulation.
///
/// `pending → simulating → inferring → thinning → ranking → done`, with the
/// terminal `failed` / `timed-out` branches reachable from `inferring` or
/// `thinning`. A record never changes once it reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationStatus {
    /// Queued but not started.
    Pending,
    /// Drawing parameters and data from the joint prior.
    Simulating,
    /// Waiting on the posterior oracle.
    Inferring,
    /// Driving the adaptive ESS/thinning loop.
    Thinning,
    /// Computing rank statistics.
    Ranking,
    /// Completed successfully; ranks are available.
    Done,
    /// Failed (insufficient ESS, oracle failure, or cancellation).
    Failed,
    /// Oracle exceeded its timeout on every allowed attempt.
    TimedOut,
}

impl SimulationStatus {
    /// True for `Done`, `Failed`, and `TimedOut`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::TimedOut)
    }
}

impl std::fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Simulating => "simulating",
            Self::Inferring => "inferring",
            Self::Thinning => "thinning",
            Self::Ranking => "ranking",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

/// Non-fatal annotation attached to a completed simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationWarning {
    /// The oracle reported divergent transitions. The record still counts as
    /// `done`, but divergences undermine trust in the posterior geometry and
    /// are surfaced in the report.
    DivergentInference {
        /// Number of divergent transitions reported by the oracle.
        count: usize,
    },
}

impl SimulationWarning {
    /// Human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::DivergentInference { count } => {
                format!("oracle reported {} divergent transitions", count)
            }
        }
    }
}

/// Full record of one simulate/infer/rank cycle.
///
/// Mutated through the lifecycle stages by the worker that owns it, then
/// immutable once `status` is terminal. Raw draws are not retained after
/// thinning (only their count), so memory stays bounded by `N * M` instead
/// of `N * iterations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRecord {
    /// Simulation index `n` in `0..N`. Preserved for audit logs; irrelevant
    /// to the final statistic.
    pub index: usize,
    /// Parameters drawn from the prior (the "truth" for this simulation).
    pub theta_sim: ParameterVector,
    /// Dataset simulated from the likelihood at `theta_sim`.
    pub dataset: Dataset,
    /// Length of the raw draw sequence accepted by the adaptive loop.
    pub raw_draw_count: usize,
    /// Thinned posterior draws (exactly M vectors when `Done`).
    pub thinned: Vec<ParameterVector>,
    /// Per-parameter ranks in declaration order (empty unless `Done`).
    pub ranks: Vec<usize>,
    /// Lifecycle state.
    pub status: SimulationStatus,
    /// Non-fatal annotations.
    pub warnings: Vec<SimulationWarning>,
    /// Oracle calls made (doublings plus timeout retries).
    pub oracle_attempts: usize,
    /// Failure description for `Failed` / `TimedOut` records.
    pub failure: Option<String>,
}

impl SimulationRecord {
    /// Create a fresh `Pending` record for simulation `index`.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            theta_sim: ParameterVector::new(),
            dataset: Dataset::new(Vec::new()),
            raw_draw_count: 0,
            thinned: Vec::new(),
            ranks: Vec::new(),
            status: SimulationStatus::Pending,
            warnings: Vec::new(),
            oracle_attempts: 0,
            failure: None,
        }
    }
}

// ============================================================================
// Rank table
// ============================================================================

/// One row of the rank table: the per-parameter ranks of one completed
/// simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRow {
    /// Simulation index.
    pub index: usize,
    /// Ranks in parameter declaration order, each in `[0, M]`.
    pub ranks: Vec<usize>,
}

/// Dense table of rank statistics over all completed simulations.
///
/// Rows exist only for `done` simulations; failed simulations are excluded,
/// never zero-filled. Rows are kept sorted by simulation index so that the
/// table is identical regardless of worker scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankTable {
    parameters: Vec<String>,
    /// Maximum possible rank (the thinning target M).
    max_rank: usize,
    rows: Vec<RankRow>,
}

impl RankTable {
    /// Create an empty table for the given parameters and thinning target.
    pub fn new(parameters: Vec<String>, max_rank: usize) -> Self {
        Self {
            parameters,
            max_rank,
            rows: Vec::new(),
        }
    }

    /// Parameter names in declaration order.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Maximum possible rank (M).
    pub fn max_rank(&self) -> usize {
        self.max_rank
    }

    /// Number of completed simulations in the table.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// All rows, sorted by simulation index.
    pub fn rows(&self) -> &[RankRow] {
        &self.rows
    }

    /// Append a row, keeping rows sorted by simulation index.
    ///
    /// Aggregation is an order-independent merge: rows may arrive in any
    /// order from the worker pool.
    pub fn insert(&mut self, row: RankRow) {
        debug_assert_eq!(row.ranks.len(), self.parameters.len());
        let pos = self
            .rows
            .partition_point(|existing| existing.index < row.index);
        self.rows.insert(pos, row);
    }

    /// Rank sequence for one parameter (by declaration-order position).
    pub fn column(&self, k: usize) -> Vec<usize> {
        self.rows.iter().map(|row| row.ranks[k]).collect()
    }
}
