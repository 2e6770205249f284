//! Error types for the cosim-app service layer.

use std::path::PathBuf;

/// Application error type wrapping the backend crates' errors behind one
/// interface for the CLI.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Project error: {0}")]
    Project(String),

    #[error("Failed to read project file: {path}")]
    ProjectFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Project validation failed: {0}")]
    Validation(String),

    #[error("Circuit build failed: {0}")]
    Circuit(String),

    #[error("Controller on {element} could not be created: {message}")]
    Controller { element: String, message: String },

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("Results error: {0}")]
    Results(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cosim-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<cosim_project::ProjectError> for AppError {
    fn from(err: cosim_project::ProjectError) -> Self {
        match err {
            cosim_project::ProjectError::Validation(e) => AppError::Validation(e.to_string()),
            other => AppError::Project(other.to_string()),
        }
    }
}

impl From<cosim_project::ValidationError> for AppError {
    fn from(err: cosim_project::ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<cosim_circuit::CircuitError> for AppError {
    fn from(err: cosim_circuit::CircuitError) -> Self {
        AppError::Circuit(err.to_string())
    }
}

impl From<cosim_sim::SimError> for AppError {
    fn from(err: cosim_sim::SimError) -> Self {
        AppError::Simulation(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Results(err.to_string())
    }
}
