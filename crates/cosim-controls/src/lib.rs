//! Feedback controllers bound to circuit elements.
//!
//! Every controller implements [`Controller`]: it reads the latest solved
//! circuit state through a borrowed [`PowerFlowSolver`], writes new setpoints
//! onto its element and reports a residual. Controllers never run a full
//! solve; the scheduler owns the control-iteration loop.
//!
//! Controllers are built from a type tag plus a flat settings record through
//! [`ControllerFactory`]. Settings are validated once, at construction.
//!
//! [`PowerFlowSolver`]: cosim_circuit::PowerFlowSolver

pub mod controller;
pub mod error;
pub mod factory;
pub mod fault;
pub mod marker;
pub mod motor_stall;
pub mod ramp;
pub mod ride_through;
pub mod settings;
pub mod storage;
pub mod volt_var;

pub use controller::{Controller, bind_element};
pub use error::{ControlError, ControlResult};
pub use factory::{ControllerConstructor, ControllerFactory};
pub use fault::{FaultController, FaultSettings};
pub use marker::UpdateMarker;
pub use motor_stall::{MotorStallController, MotorStallSettings, MotorState};
pub use ramp::{PowerRamp, RampState};
pub use ride_through::{
    MayTripOperation, Region, RegionMap, RideThroughCategory, RideThroughController,
    RideThroughSettings, RideThroughState,
};
pub use settings::{ControllerSettings, SettingsRecord, parse_settings};
pub use storage::{StorageController, StorageControlMode, StorageSettings, StorageState};
pub use volt_var::{VoltVarController, VoltVarSettings};
