//! cosim-core: stable foundation for the co-simulation workspace.
//!
//! Contains:
//! - ids (compact handles + circuit element identities)
//! - numeric (Real + float helpers)
//! - units (uom time, power and energy + constructors)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod units;

pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use units::*;
