//! Time-series runner over the simulation horizon.

use cosim_circuit::PowerFlowSolver;
use cosim_core::units::{Time, s, seconds_of};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{SimError, SimResult};
use crate::record::{ResultSink, SimRecord, StepRecord};
use crate::registry::ControllerRegistry;
use crate::scheduler::{ControlIterationScheduler, SchedulerConfig};

/// Options for simulation runs.
#[derive(Clone, Debug)]
pub struct SimOptions {
    /// Fixed timestep.
    pub step: Time,
    /// Horizon length; timesteps sit at `0, step, 2*step, ...` below it.
    pub duration: Time,
    /// Maximum number of timesteps (safety limit)
    pub max_steps: usize,
    pub scheduler: SchedulerConfig,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            step: s(1.0),
            duration: s(60.0),
            max_steps: 1_000_000,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SimOptions {
    pub fn validate(&self) -> SimResult<()> {
        let step = seconds_of(self.step);
        let duration = seconds_of(self.duration);
        if !step.is_finite() || step <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "step must be positive",
            });
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "duration must be positive",
            });
        }
        if self.max_steps == 0 {
            return Err(SimError::InvalidArg {
                what: "max_steps must be positive",
            });
        }
        self.scheduler.validate()
    }

    /// Number of timesteps in the horizon, capped by `max_steps`.
    pub fn step_count(&self) -> usize {
        let ratio = seconds_of(self.duration) / seconds_of(self.step);
        let n = (ratio - 1e-9).ceil().max(1.0) as usize;
        n.min(self.max_steps)
    }
}

/// Progress snapshot emitted after every accepted timestep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimProgress {
    pub step: usize,
    pub total_steps: usize,
    pub sim_time_s: f64,
    pub fraction_complete: f64,
    pub non_converged: usize,
}

/// Totals of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub steps: usize,
    pub non_converged: usize,
    pub total_iterations: usize,
}

/// Steps the solver through the horizon, settling each timestep with the
/// control-iteration scheduler.
#[derive(Debug, Clone)]
pub struct SimulationDriver {
    options: SimOptions,
    scheduler: ControlIterationScheduler,
}

impl SimulationDriver {
    pub fn new(options: SimOptions) -> SimResult<Self> {
        options.validate()?;
        let scheduler = ControlIterationScheduler::new(options.scheduler)?;
        Ok(Self { options, scheduler })
    }

    pub fn options(&self) -> &SimOptions {
        &self.options
    }

    /// Run the whole horizon, keeping every step in memory.
    pub fn run(
        &self,
        solver: &mut dyn PowerFlowSolver,
        registry: &mut ControllerRegistry,
    ) -> SimResult<SimRecord> {
        let mut record = SimRecord::new();
        self.run_with_progress(solver, registry, &mut record, None)?;
        Ok(record)
    }

    /// Run the whole horizon, streaming steps to `sink` and progress to `progress_cb`.
    ///
    /// Non-converged timesteps are accepted and logged. Solver failures and
    /// controller errors stop the run.
    pub fn run_with_progress(
        &self,
        solver: &mut dyn PowerFlowSolver,
        registry: &mut ControllerRegistry,
        sink: &mut dyn ResultSink,
        mut progress_cb: Option<&mut dyn FnMut(SimProgress)>,
    ) -> SimResult<RunSummary> {
        let step_s = seconds_of(self.options.step);
        let total_steps = self.options.step_count();
        solver.set_control_mode(self.options.scheduler.control_mode);
        info!(
            steps = total_steps,
            step_s,
            controllers = registry.len(),
            start = %solver.date_time(),
            "simulation started"
        );

        let mut summary = RunSummary::default();
        for step in 0..total_steps {
            if step > 0 {
                solver.advance_time(step_s)?;
            }
            let time = solver.total_seconds();
            if !solver.solve()? {
                return Err(SimError::SolverDiverged {
                    stage: "timestep solve",
                    time_s: time,
                });
            }

            let state = self.scheduler.run_timestep(solver, registry, time)?;
            let date_time = solver.date_time();
            if !state.converged {
                summary.non_converged += 1;
                warn!(
                    step,
                    time_s = time,
                    timestamp = %date_time,
                    iterations = state.iteration_count,
                    max_residual = state.max_residual,
                    "control iterations did not converge; accepting timestep"
                );
            }
            sink.record(&StepRecord::new(step, time, date_time, &state))?;
            summary.steps += 1;
            summary.total_iterations += state.iteration_count;

            if let Some(cb) = progress_cb.as_deref_mut() {
                cb(SimProgress {
                    step: step + 1,
                    total_steps,
                    sim_time_s: time,
                    fraction_complete: (step + 1) as f64 / total_steps as f64,
                    non_converged: summary.non_converged,
                });
            }
        }

        info!(
            steps = summary.steps,
            non_converged = summary.non_converged,
            iterations = summary.total_iterations,
            "simulation finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_options_defaults() {
        let opts = SimOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.step_count(), 60);
    }

    #[test]
    fn step_count_rounds_partial_steps_up() {
        let opts = SimOptions {
            step: s(0.25),
            duration: s(1.0),
            ..SimOptions::default()
        };
        assert_eq!(opts.step_count(), 4);
        let opts = SimOptions {
            step: s(0.3),
            duration: s(1.0),
            ..SimOptions::default()
        };
        assert_eq!(opts.step_count(), 4);
        let capped = SimOptions {
            max_steps: 3,
            ..opts
        };
        assert_eq!(capped.step_count(), 3);
    }

    #[test]
    fn sim_options_invalid() {
        let zero_step = SimOptions {
            step: s(0.0),
            ..SimOptions::default()
        };
        assert!(SimulationDriver::new(zero_step).is_err());
        let no_steps = SimOptions {
            max_steps: 0,
            ..SimOptions::default()
        };
        assert!(no_steps.validate().is_err());
    }
}
