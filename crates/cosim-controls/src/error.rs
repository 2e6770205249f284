//! Error types for controller construction and updates.

use cosim_circuit::CircuitError;
use cosim_core::ElementId;
use thiserror::Error;

/// Result type for controller operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors raised while building or updating controllers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Settings record failed to deserialize or validate.
    #[error("Invalid settings for {controller} on {element}: {reason}")]
    InvalidSettings {
        controller: String,
        element: ElementId,
        reason: String,
    },

    /// No constructor registered for the type tag.
    #[error("Unknown controller type '{tag}'")]
    UnknownType { tag: String },

    /// The element to bind does not exist in the circuit.
    #[error("Element not found: {element}")]
    ElementNotFound { element: ElementId },

    /// The element exists but is of a class the controller cannot drive.
    #[error("{controller} cannot control {element}: expected class {expected}")]
    WrongElementClass {
        controller: String,
        element: ElementId,
        expected: &'static str,
    },

    /// A controller-internal network re-solve did not converge.
    #[error("Inner re-solve of {controller} did not converge")]
    InnerSolveFailed { controller: String },

    #[error("Circuit error: {0}")]
    Circuit(#[from] CircuitError),
}
