//! Fixed-point control iteration for one timestep.
//!
//! One control iteration runs every priority pass in ascending order, with a
//! network-only re-solve after each pass, so priority `p + 1` controllers see
//! the solved effect of the setpoints written in pass `p`. Controllers inside
//! one pass all read the same solved state. The timestep is accepted once the
//! largest residual of an iteration is within tolerance, or when the
//! iteration budget runs out (flagged as non-converged).

use cosim_circuit::{ControlMode, PowerFlowSolver};
use cosim_core::ensure_residual;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::registry::ControllerRegistry;

/// Loop bound, acceptance threshold and native control mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub max_control_iterations: usize,
    pub error_tolerance: f64,
    pub control_mode: ControlMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_control_iterations: 10,
            error_tolerance: 1e-3,
            control_mode: ControlMode::Static,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.max_control_iterations == 0 {
            return Err(SimError::InvalidArg {
                what: "max_control_iterations must be at least 1",
            });
        }
        if !self.error_tolerance.is_finite() || self.error_tolerance < 0.0 {
            return Err(SimError::InvalidArg {
                what: "error_tolerance must be finite and non-negative",
            });
        }
        Ok(())
    }
}

/// Outcome of settling one timestep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlIterationState {
    /// Control iterations run, `1..=max_control_iterations`.
    pub iteration_count: usize,
    /// Largest residual of the last iteration.
    pub max_residual: f64,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct ControlIterationScheduler {
    config: SchedulerConfig,
}

impl ControlIterationScheduler {
    pub fn new(config: SchedulerConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Iterate controllers and re-solves until the timestep settles.
    ///
    /// The solver must already hold a solved state for `time`. Solver failures
    /// and controller errors abort; exhausting the budget does not.
    pub fn run_timestep(
        &self,
        solver: &mut dyn PowerFlowSolver,
        registry: &mut ControllerRegistry,
        time: f64,
    ) -> SimResult<ControlIterationState> {
        let classes = registry.priority_classes();
        let mut state = ControlIterationState::default();

        loop {
            let update_results = state.iteration_count == 0;
            let mut max_residual: f64 = 0.0;

            for priority in 0..classes {
                if priority > 0 {
                    resolve(solver, time)?;
                }
                for controller in registry.at_priority_mut(priority) {
                    let raw = controller.update(solver, priority, time, update_results)?;
                    let residual = ensure_residual(raw, "control residual").map_err(|_| {
                        SimError::InvalidResidual {
                            controller: controller.name().to_string(),
                            value: raw,
                            time_s: time,
                        }
                    })?;
                    max_residual = max_residual.max(residual);
                }
            }

            resolve(solver, time)?;
            state.iteration_count += 1;
            state.max_residual = max_residual;
            debug!(
                time,
                iteration = state.iteration_count,
                max_residual,
                "control iteration"
            );

            if max_residual <= self.config.error_tolerance {
                state.converged = true;
                break;
            }
            if state.iteration_count >= self.config.max_control_iterations {
                state.converged = false;
                break;
            }
        }
        Ok(state)
    }
}

fn resolve(solver: &mut dyn PowerFlowSolver, time: f64) -> SimResult<()> {
    if solver.solve_no_control()? {
        Ok(())
    } else {
        Err(SimError::SolverDiverged {
            stage: "control re-solve",
            time_s: time,
        })
    }
}
