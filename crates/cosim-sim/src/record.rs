//! Per-timestep results and where they go.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::scheduler::ControlIterationState;

/// Accepted timestep, converged or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 0-based timestep index.
    pub step: usize,
    /// Simulation time (s since start).
    pub time_s: f64,
    pub date_time: NaiveDateTime,
    pub converged: bool,
    pub iterations: usize,
    pub max_residual: f64,
}

impl StepRecord {
    pub fn new(
        step: usize,
        time_s: f64,
        date_time: NaiveDateTime,
        state: &ControlIterationState,
    ) -> Self {
        Self {
            step,
            time_s,
            date_time,
            converged: state.converged,
            iterations: state.iteration_count,
            max_residual: state.max_residual,
        }
    }
}

/// Receives every accepted timestep.
pub trait ResultSink {
    fn record(&mut self, step: &StepRecord) -> SimResult<()>;
}

/// In-memory record of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimRecord {
    pub steps: Vec<StepRecord>,
}

impl SimRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Timesteps accepted without converging.
    pub fn non_converged(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| !s.converged)
    }

    pub fn total_iterations(&self) -> usize {
        self.steps.iter().map(|s| s.iterations).sum()
    }
}

impl ResultSink for SimRecord {
    fn record(&mut self, step: &StepRecord) -> SimResult<()> {
        self.steps.push(step.clone());
        Ok(())
    }
}
