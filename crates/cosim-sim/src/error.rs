//! Error types for scheduling and simulation runs.

use cosim_circuit::CircuitError;
use cosim_controls::ControlError;
use thiserror::Error;

/// Errors that stop a simulation run.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Controller {name} is already registered")]
    DuplicateController { name: String },

    #[error("Controller {name} declares {count} priority passes (expected 1..={max})")]
    InvalidPriorityCount {
        name: String,
        count: usize,
        max: usize,
    },

    /// A controller broke the residual contract (negative or non-finite).
    #[error("Controller {controller} returned invalid residual {value} at t={time_s}s")]
    InvalidResidual {
        controller: String,
        value: f64,
        time_s: f64,
    },

    /// The power-flow solver reported that it did not converge.
    #[error("Power flow did not converge during {stage} at t={time_s}s")]
    SolverDiverged { stage: &'static str, time_s: f64 },

    /// A result sink could not store a step.
    #[error("Result sink failed at step {step}: {reason}")]
    Sink { step: usize, reason: String },

    #[error("Controller error: {0}")]
    Control(#[from] ControlError),

    #[error("Circuit error: {0}")]
    Circuit(#[from] CircuitError),
}

pub type SimResult<T> = Result<T, SimError>;
