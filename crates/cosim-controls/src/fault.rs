//! Timed fault injection.

use cosim_circuit::{ParamValue, PowerFlowSolver};
use cosim_core::{ElementHandle, ElementId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::{Controller, bind_element, controller_name};
use crate::error::ControlResult;
use crate::settings::{
    ControllerSettings, SettingsRecord, parse_settings, require_non_negative, require_positive,
};

pub const TAG: &str = "FaultController";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaultSettings {
    /// Simulation time (s) at which the fault is applied.
    #[serde(rename = "StartTime")]
    pub start_time: f64,
    /// How long (s) the fault stays applied.
    #[serde(rename = "Duration")]
    pub duration: f64,
    /// Optional fault resistance (ohm) written at construction.
    #[serde(rename = "Resistance")]
    pub resistance: Option<f64>,
}

impl Default for FaultSettings {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            duration: 1.0,
            resistance: None,
        }
    }
}

impl ControllerSettings for FaultSettings {
    fn validate(&self) -> Result<(), String> {
        require_non_negative(self.start_time, "StartTime")?;
        require_non_negative(self.duration, "Duration")?;
        if let Some(r) = self.resistance {
            require_positive(r, "Resistance")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FaultController {
    name: String,
    element: ElementId,
    handle: ElementHandle,
    settings: FaultSettings,
    applied: bool,
}

impl FaultController {
    pub fn new(
        element: ElementId,
        settings: FaultSettings,
        solver: &mut dyn PowerFlowSolver,
    ) -> ControlResult<Self> {
        let handle = bind_element(solver, TAG, &element, "Fault")?;
        let el = solver.element_mut(handle)?;
        if let Some(r) = settings.resistance {
            el.set_parameter("r", ParamValue::from(r))?;
        }
        let applied = el.parameter("enabled")?.as_bool().unwrap_or(false);
        Ok(Self {
            name: controller_name(TAG, &element),
            element,
            handle,
            settings,
            applied,
        })
    }

    /// Factory entry point.
    pub fn from_record(
        element: ElementId,
        record: &SettingsRecord,
        solver: &mut dyn PowerFlowSolver,
    ) -> ControlResult<Box<dyn Controller>> {
        let settings = parse_settings(TAG, &element, record)?;
        Ok(Box::new(Self::new(element, settings, solver)?))
    }

    /// Whether the fault should be applied at `time`.
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.settings.start_time && time < self.settings.start_time + self.settings.duration
    }

    pub fn applied(&self) -> bool {
        self.applied
    }
}

impl Controller for FaultController {
    fn name(&self) -> &str {
        &self.name
    }

    fn controlled_element(&self) -> &ElementId {
        &self.element
    }

    fn update(
        &mut self,
        solver: &mut dyn PowerFlowSolver,
        _priority: usize,
        time: f64,
        _update_results: bool,
    ) -> ControlResult<f64> {
        let active = self.is_active_at(time);
        if active == self.applied {
            return Ok(0.0);
        }
        solver
            .element_mut(self.handle)?
            .set_parameter("enabled", ParamValue::from(active))?;
        info!(controller = %self.name, time, active, "fault toggled");
        self.applied = active;
        Ok(1.0)
    }
}
