//! Solver and element interfaces consumed by controllers and the scheduler.

use chrono::NaiveDateTime;
use cosim_core::{ElementHandle, ElementId};
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, CircuitResult};
use crate::value::ParamValue;

/// How solver-native control devices settle during [`PowerFlowSolver::solve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlMode {
    /// Native controls act without delay and settle within one solve.
    #[default]
    Static,
    /// Native controls are time-delayed: at most one action per solve.
    Time,
}

/// A named device inside the circuit model.
///
/// Parameter writes take effect at the next solve; variables always reflect
/// the most recent solve.
pub trait CircuitElement {
    /// Identity `(class, name)` of the element.
    fn id(&self) -> &ElementId;

    /// Read a device property such as `kW` or `State`.
    fn parameter(&self, name: &str) -> CircuitResult<ParamValue>;

    /// Write a device property. Electrical results are not refreshed until
    /// the next solve.
    fn set_parameter(&mut self, name: &str, value: ParamValue) -> CircuitResult<()>;

    /// Read a post-solve quantity (`Powers`, `VoltagesMagAng`, `puVmagAngle`,
    /// `CurrentsMagAng`). Complex values are interleaved magnitude/angle or
    /// real/imaginary pairs.
    fn variable(&self, name: &str) -> CircuitResult<Vec<f64>>;

    /// Numeric view of a parameter.
    fn number(&self, name: &str) -> CircuitResult<f64> {
        let value = self.parameter(name)?;
        value.as_f64().ok_or_else(|| CircuitError::InvalidValue {
            element: self.id().clone(),
            name: name.to_string(),
            reason: format!("'{value}' is not numeric"),
        })
    }

    /// Total active power into the element (sum over terminal 1 pairs), kW.
    fn active_power_kw(&self) -> CircuitResult<f64> {
        let powers = self.variable("Powers")?;
        Ok(powers.first().copied().unwrap_or(0.0))
    }

    /// Terminal voltage magnitude in per unit.
    fn voltage_pu(&self) -> CircuitResult<f64> {
        let v = self.variable("puVmagAngle")?;
        Ok(v.first().copied().unwrap_or(0.0))
    }
}

/// The external power-flow engine as seen by the scheduler.
///
/// The solver owns every circuit element. Controllers hold
/// [`ElementHandle`]s and borrow the solver for the duration of one update.
pub trait PowerFlowSolver {
    /// Full solve including solver-native control devices.
    ///
    /// `Ok(false)` means the network equations did not converge.
    fn solve(&mut self) -> CircuitResult<bool>;

    /// Solve the network equations only, skipping native controls.
    fn solve_no_control(&mut self) -> CircuitResult<bool>;

    /// Commit the solved state and advance the simulation clock.
    fn advance_time(&mut self, step_s: f64) -> CircuitResult<()>;

    /// Seconds elapsed since the simulation start.
    fn total_seconds(&self) -> f64;

    /// Wall-clock timestamp of the current simulation time.
    fn date_time(&self) -> NaiveDateTime;

    fn control_mode(&self) -> ControlMode;

    fn set_control_mode(&mut self, mode: ControlMode);

    /// Resolve an element identity to a handle.
    fn find_element(&self, id: &ElementId) -> Option<ElementHandle>;

    fn element(&self, handle: ElementHandle) -> CircuitResult<&dyn CircuitElement>;

    fn element_mut(&mut self, handle: ElementHandle) -> CircuitResult<&mut dyn CircuitElement>;

    /// Identities of every element, in registration order.
    fn element_ids(&self) -> Vec<ElementId>;

    /// Power delivered by the circuit sources `[kW, kvar]`.
    fn total_power(&self) -> [f64; 2];

    /// Voltage magnitude of a bus in per unit.
    fn bus_voltage_pu(&self, bus: &str) -> CircuitResult<f64>;

    /// Resolve an identity or fail with [`CircuitError::UnknownElement`].
    fn require_element(&self, id: &ElementId) -> CircuitResult<ElementHandle> {
        self.find_element(id)
            .ok_or_else(|| CircuitError::UnknownElement { id: id.to_string() })
    }
}
