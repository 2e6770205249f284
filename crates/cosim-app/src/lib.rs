//! Shared application service layer for cosim.
//!
//! Loads scenario files, compiles them into a network plus controller
//! registry, and runs them with progress reporting. The CLI is a thin shell
//! over this crate.

pub mod compile;
pub mod error;
pub mod progress;
pub mod project_service;
pub mod run_service;
pub mod sink;

pub use compile::{CompiledScenario, build_network, build_registry, compile_project, sim_options};
pub use error::{AppError, AppResult};
pub use progress::{RunProgressEvent, RunStage};
pub use project_service::{
    ControllerSummary, list_controllers, load_project, save_project, validate_project,
};
pub use run_service::{
    RunOverrides, RunReport, RunRequest, RunResponse, RunTimingSummary, run_loaded_project,
    run_project, run_project_with_progress, save_record,
};
pub use sink::JsonLinesSink;
