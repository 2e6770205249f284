//! Circuit-side interfaces for the co-simulation scheduler.
//!
//! The scheduler and the controllers only ever talk to a circuit through two
//! traits:
//! - [`PowerFlowSolver`]: solve / re-solve / advance time / element registry
//! - [`CircuitElement`]: string-keyed parameters and post-solve variables
//!
//! A small balanced [`Network`] model implements both so that scenarios can be
//! run end to end without an external engine.

pub mod error;
pub mod network;
pub mod shape;
pub mod traits;
pub mod value;

pub use error::{CircuitError, CircuitResult};
pub use network::{
    FaultSpec, LineSpec, LoadSpec, Network, NetworkElement, NetworkOptions, PvSpec, RegControlSpec,
    StorageMode, StorageSpec, VsourceSpec,
};
pub use shape::LoadShape;
pub use traits::{CircuitElement, ControlMode, PowerFlowSolver};
pub use value::ParamValue;
