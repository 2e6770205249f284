//! The controller abstraction driven by the control-iteration scheduler.

use cosim_circuit::PowerFlowSolver;
use cosim_core::{ElementHandle, ElementId};

use crate::error::{ControlError, ControlResult};

/// A stateful feedback process bound to exactly one circuit element.
///
/// # Update contract
///
/// - `update` may be called several times with the same `(priority, time)`
///   during one timestep. Time-based accumulators must only advance when
///   `time` changes (see [`UpdateMarker`](crate::UpdateMarker)).
/// - `update` must not call [`PowerFlowSolver::solve`]. A controller whose
///   control law depends on its own effect on the local voltage may run a
///   bounded inner loop of [`PowerFlowSolver::solve_no_control`].
/// - The returned residual is finite and non-negative, and zero only when the
///   controller is at equilibrium for the current circuit state.
pub trait Controller {
    /// Human-readable name, `tag@class.element`.
    fn name(&self) -> &str;

    /// Identity of the bound element.
    fn controlled_element(&self) -> &ElementId;

    /// Number of priority passes (1..=3) the controller takes part in.
    fn priority_count(&self) -> usize {
        1
    }

    /// Read the circuit, write new setpoints, report the residual.
    ///
    /// `update_results` is true on the first control iteration of a timestep.
    fn update(
        &mut self,
        solver: &mut dyn PowerFlowSolver,
        priority: usize,
        time: f64,
        update_results: bool,
    ) -> ControlResult<f64>;
}

impl std::fmt::Debug for dyn Controller + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Resolve `element` and check its class (case-insensitive).
pub fn bind_element(
    solver: &dyn PowerFlowSolver,
    controller: &str,
    element: &ElementId,
    expected_class: &'static str,
) -> ControlResult<ElementHandle> {
    if !element.is_class(expected_class) {
        return Err(ControlError::WrongElementClass {
            controller: controller.to_string(),
            element: element.clone(),
            expected: expected_class,
        });
    }
    solver
        .find_element(element)
        .ok_or_else(|| ControlError::ElementNotFound {
            element: element.clone(),
        })
}

pub(crate) fn controller_name(tag: &str, element: &ElementId) -> String {
    format!("{tag}@{element}")
}
