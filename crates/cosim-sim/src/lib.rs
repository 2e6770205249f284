//! Control-iteration scheduling and time-series simulation.
//!
//! Provides:
//! - `ControllerRegistry` owning the controller population, grouped by priority class
//! - `ControlIterationScheduler` settling one timestep by fixed-point iteration
//! - `SimulationDriver` stepping the solver over the horizon and recording every step

pub mod driver;
pub mod error;
pub mod record;
pub mod registry;
pub mod scheduler;

pub use driver::{RunSummary, SimOptions, SimProgress, SimulationDriver};
pub use error::{SimError, SimResult};
pub use record::{ResultSink, SimRecord, StepRecord};
pub use registry::ControllerRegistry;
pub use scheduler::{ControlIterationScheduler, ControlIterationState, SchedulerConfig};
