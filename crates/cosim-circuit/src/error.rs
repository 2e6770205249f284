//! Error types for circuit operations.

use cosim_core::{CoreError, ElementId};
use thiserror::Error;

/// Errors raised by a circuit model or its elements.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CircuitError {
    #[error("Element not found: {id}")]
    UnknownElement { id: String },

    #[error("Bus not found: {bus}")]
    UnknownBus { bus: String },

    #[error("Unknown parameter '{name}' on {element}")]
    UnknownParameter { element: ElementId, name: String },

    #[error("Unknown variable '{name}' on {element}")]
    UnknownVariable { element: ElementId, name: String },

    #[error("Invalid value for {element}.{name}: {reason}")]
    InvalidValue {
        element: ElementId,
        name: String,
        reason: String,
    },

    #[error("Duplicate element: {id}")]
    DuplicateElement { id: ElementId },

    #[error("Invalid topology: {what}")]
    Topology { what: String },

    #[error("Singular network matrix: {what}")]
    Singular { what: String },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type CircuitResult<T> = Result<T, CircuitError>;
