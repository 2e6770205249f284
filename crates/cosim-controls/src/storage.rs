//! Peak-shaving storage dispatch.
//!
//! The controller watches the power through a measurement point (the circuit
//! total or an upstream element) and keeps it inside `[PS_lb, PS_ub]`:
//! discharging above the upper bound, charging below the lower bound and
//! idling in between. The setpoint moves by `DampCoef` of the remaining error
//! on every update.

use cosim_circuit::{ParamValue, PowerFlowSolver};
use cosim_core::{ElementHandle, ElementId, percent_of_rating};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::{Controller, bind_element, controller_name};
use crate::error::{ControlError, ControlResult};
use crate::settings::{ControllerSettings, SettingsRecord, parse_settings, require_positive};

pub const TAG: &str = "StorageController";

/// `Control1` dispatch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageControlMode {
    /// Keep the measured power inside `[PS_lb, PS_ub]`.
    #[default]
    #[serde(rename = "PS", alias = "PeakShaving")]
    PeakShaving,
    /// Hold the unit idle.
    #[serde(rename = "None")]
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSettings {
    #[serde(rename = "Control1")]
    pub control: StorageControlMode,
    /// Upper bound of the measured power (kW).
    #[serde(rename = "PS_ub")]
    pub ps_ub: f64,
    /// Lower bound of the measured power (kW).
    #[serde(rename = "PS_lb")]
    pub ps_lb: f64,
    #[serde(rename = "DampCoef")]
    pub damp_coef: f64,
    /// `Total` or an element name such as `Line.feeder`.
    #[serde(rename = "PowerMeaElem")]
    pub power_mea_elem: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            control: StorageControlMode::PeakShaving,
            ps_ub: 1000.0,
            ps_lb: 0.0,
            damp_coef: 0.8,
            power_mea_elem: "Total".to_string(),
        }
    }
}

impl ControllerSettings for StorageSettings {
    fn validate(&self) -> Result<(), String> {
        if !self.ps_ub.is_finite() || !self.ps_lb.is_finite() {
            return Err("PS_ub and PS_lb must be finite".to_string());
        }
        if self.ps_lb > self.ps_ub {
            return Err(format!(
                "PS_lb ({}) must not exceed PS_ub ({})",
                self.ps_lb, self.ps_ub
            ));
        }
        require_positive(self.damp_coef, "DampCoef")?;
        if self.damp_coef > 1.0 {
            return Err(format!("DampCoef must be at most 1, got {}", self.damp_coef));
        }
        if self.power_mea_elem.trim().is_empty() {
            return Err("PowerMeaElem must not be empty".to_string());
        }
        Ok(())
    }
}

/// Dispatch state written to the element's `State` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageState {
    #[default]
    Idle,
    Charging,
    Discharging,
}

impl StorageState {
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Idle => "IDLING",
            Self::Charging => "CHARGING",
            Self::Discharging => "DISCHARGING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Measurement {
    Total,
    Element(ElementHandle),
}

/// Desired storage output (kW, discharge positive) for an uncompensated
/// measured power `p_native`, limited to the rating.
pub fn dispatch_target(p_native: f64, settings: &StorageSettings, kw_rated: f64) -> f64 {
    let target = match settings.control {
        StorageControlMode::Idle => 0.0,
        StorageControlMode::PeakShaving if p_native > settings.ps_ub => p_native - settings.ps_ub,
        StorageControlMode::PeakShaving if p_native < settings.ps_lb => p_native - settings.ps_lb,
        StorageControlMode::PeakShaving => 0.0,
    };
    target.clamp(-kw_rated, kw_rated)
}

/// One damped dispatch move from `previous` toward `target`.
///
/// The state comes from the band decision, not from the damped setpoint: a
/// zero target drops the unit to idle at once, and a damped move never
/// crosses zero against the band.
pub fn dispatch_step(previous: f64, target: f64, damp_coef: f64) -> (StorageState, f64) {
    if target > 0.0 {
        let next = previous + damp_coef * (target - previous);
        (StorageState::Discharging, next.max(0.0))
    } else if target < 0.0 {
        let next = previous + damp_coef * (target - previous);
        (StorageState::Charging, next.min(0.0))
    } else {
        (StorageState::Idle, 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct StorageController {
    name: String,
    element: ElementId,
    handle: ElementHandle,
    measurement: Measurement,
    settings: StorageSettings,
    kw_rated: f64,
    setpoint_kw: f64,
    state: StorageState,
}

impl StorageController {
    pub fn new(
        element: ElementId,
        settings: StorageSettings,
        solver: &dyn PowerFlowSolver,
    ) -> ControlResult<Self> {
        let name = controller_name(TAG, &element);
        let handle = bind_element(solver, TAG, &element, "Storage")?;
        let invalid = |reason: String| ControlError::InvalidSettings {
            controller: TAG.to_string(),
            element: element.clone(),
            reason,
        };

        let measurement = if settings.power_mea_elem.trim().eq_ignore_ascii_case("total") {
            Measurement::Total
        } else {
            let id: ElementId = settings
                .power_mea_elem
                .parse()
                .map_err(|e: cosim_core::CoreError| invalid(format!("PowerMeaElem: {e}")))?;
            let h = solver
                .find_element(&id)
                .ok_or(ControlError::ElementNotFound { element: id })?;
            Measurement::Element(h)
        };

        let kw_rated = solver.element(handle)?.number("kWrated")?;
        if !kw_rated.is_finite() || kw_rated <= 0.0 {
            return Err(invalid(format!("element kWrated must be positive, got {kw_rated}")));
        }

        Ok(Self {
            name,
            element,
            handle,
            measurement,
            settings,
            kw_rated,
            setpoint_kw: 0.0,
            state: StorageState::Idle,
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

    pub fn state(&self) -> StorageState {
        self.state
    }

    /// Commanded output in kW, discharge positive.
    pub fn setpoint_kw(&self) -> f64 {
        self.setpoint_kw
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    fn measured_kw(&self, solver: &dyn PowerFlowSolver) -> ControlResult<f64> {
        match self.measurement {
            Measurement::Total => Ok(solver.total_power()[0]),
            Measurement::Element(h) => Ok(solver.element(h)?.active_power_kw()?),
        }
    }
}

impl Controller for StorageController {
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
        _time: f64,
        _update_results: bool,
    ) -> ControlResult<f64> {
        let measured = self.measured_kw(solver)?;
        // Terminal power is negative while discharging; add it back to see the
        // demand the unit is shaving.
        let own = solver.element(self.handle)?.active_power_kw()?;
        let p_native = measured - own;

        let target = dispatch_target(p_native, &self.settings, self.kw_rated);
        let previous = self.setpoint_kw;
        let (state, next) = dispatch_step(previous, target, self.settings.damp_coef);
        let percent = percent_of_rating(next, self.kw_rated);
        let (discharge, charge) = match state {
            StorageState::Discharging => (percent, 0.0),
            StorageState::Charging => (0.0, percent),
            StorageState::Idle => (0.0, 0.0),
        };

        let el = solver.element_mut(self.handle)?;
        el.set_parameter("State", ParamValue::from(state.as_param()))?;
        el.set_parameter("%Discharge", ParamValue::from(discharge))?;
        el.set_parameter("%Charge", ParamValue::from(charge))?;

        if state != self.state {
            debug!(
                controller = %self.name,
                from = self.state.as_param(),
                to = state.as_param(),
                measured_kw = measured,
                "storage state change"
            );
        }
        self.state = state;
        self.setpoint_kw = next;
        Ok((next - previous).abs() / self.kw_rated)
    }
}
