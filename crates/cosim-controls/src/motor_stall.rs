//! Induction-motor stall model for load elements.
//!
//! A running motor stalls when its terminal voltage drops below `Vstall` and
//! draws a multiple of its rated power. Protection disconnects a stalled
//! motor after `Tprotection` seconds; it reconnects once `Treconnect` seconds
//! have passed and the voltage has recovered above `Vstall`.

use cosim_circuit::{ParamValue, PowerFlowSolver};
use cosim_core::{ElementHandle, ElementId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::{Controller, bind_element, controller_name};
use crate::error::ControlResult;
use crate::settings::{
    ControllerSettings, SettingsRecord, parse_settings, require_non_negative, require_positive,
};

pub const TAG: &str = "MotorStall";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotorStallSettings {
    /// Stall voltage threshold (pu).
    #[serde(rename = "Vstall")]
    pub v_stall: f64,
    /// Time a stalled motor stays connected before protection trips (s).
    #[serde(rename = "Tprotection")]
    pub t_protection: f64,
    /// Minimum disconnected time before reconnection (s).
    #[serde(rename = "Treconnect")]
    pub t_reconnect: f64,
    /// Active power drawn while stalled, as a multiple of rated kW.
    #[serde(rename = "Pfault")]
    pub p_fault: f64,
    /// Reactive power drawn while stalled, as a multiple of rated kW.
    #[serde(rename = "Qfault")]
    pub q_fault: f64,
}

impl Default for MotorStallSettings {
    fn default() -> Self {
        Self {
            v_stall: 0.55,
            t_protection: 10.0,
            t_reconnect: 30.0,
            p_fault: 3.0,
            q_fault: 5.0,
        }
    }
}

impl ControllerSettings for MotorStallSettings {
    fn validate(&self) -> Result<(), String> {
        require_positive(self.v_stall, "Vstall")?;
        require_non_negative(self.t_protection, "Tprotection")?;
        require_non_negative(self.t_reconnect, "Treconnect")?;
        require_non_negative(self.p_fault, "Pfault")?;
        require_non_negative(self.q_fault, "Qfault")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotorState {
    #[default]
    Running,
    Stalled,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct MotorStallController {
    name: String,
    element: ElementId,
    handle: ElementHandle,
    settings: MotorStallSettings,
    rated_kw: f64,
    rated_kvar: f64,
    state: MotorState,
    /// Time of the latest state transition.
    since: f64,
}

impl MotorStallController {
    pub fn new(
        element: ElementId,
        settings: MotorStallSettings,
        solver: &dyn PowerFlowSolver,
    ) -> ControlResult<Self> {
        let handle = bind_element(solver, TAG, &element, "Load")?;
        let el = solver.element(handle)?;
        let rated_kw = el.number("kW")?;
        let rated_kvar = el.number("kvar")?;
        Ok(Self {
            name: controller_name(TAG, &element),
            element,
            handle,
            settings,
            rated_kw,
            rated_kvar,
            state: MotorState::Running,
            since: 0.0,
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

    pub fn state(&self) -> MotorState {
        self.state
    }

    /// Time of the latest state transition (s).
    pub fn since(&self) -> f64 {
        self.since
    }

    /// State after observing `v_pu` at `time`.
    pub fn next_state(&self, v_pu: f64, time: f64) -> MotorState {
        let s = &self.settings;
        let held = time - self.since;
        match self.state {
            MotorState::Running if v_pu < s.v_stall => MotorState::Stalled,
            MotorState::Stalled if held >= s.t_protection => MotorState::Disconnected,
            MotorState::Disconnected if held >= s.t_reconnect && v_pu > s.v_stall => {
                MotorState::Running
            }
            other => other,
        }
    }

    fn demand(&self, state: MotorState) -> (f64, f64) {
        match state {
            MotorState::Running => (self.rated_kw, self.rated_kvar),
            MotorState::Stalled => (
                self.rated_kw * self.settings.p_fault,
                self.rated_kw * self.settings.q_fault,
            ),
            MotorState::Disconnected => (0.0, 0.0),
        }
    }
}

impl Controller for MotorStallController {
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
        let v_pu = solver.element(self.handle)?.voltage_pu()?;
        let next = self.next_state(v_pu, time);
        let (kw_old, kvar_old) = self.demand(self.state);
        let (kw, kvar) = self.demand(next);

        if next != self.state {
            info!(
                controller = %self.name,
                from = ?self.state,
                to = ?next,
                time,
                v_pu,
                "motor state change"
            );
            self.state = next;
            self.since = time;
        }

        let el = solver.element_mut(self.handle)?;
        el.set_parameter("kW", ParamValue::from(kw))?;
        el.set_parameter("kvar", ParamValue::from(kvar))?;

        let scale = self.rated_kw.abs().max(1.0);
        Ok(((kw - kw_old).abs() + (kvar - kvar_old).abs()) / scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(settings: MotorStallSettings) -> MotorStallController {
        MotorStallController {
            name: "MotorStall@load.m1".to_string(),
            element: ElementId::new("Load", "m1"),
            handle: cosim_core::Id::from_index(0),
            settings,
            rated_kw: 50.0,
            rated_kvar: 20.0,
            state: MotorState::Running,
            since: 0.0,
        }
    }

    #[test]
    fn stays_running_at_nominal_voltage() {
        let c = controller(MotorStallSettings::default());
        assert_eq!(c.next_state(1.0, 5.0), MotorState::Running);
        assert_eq!(c.next_state(0.56, 5.0), MotorState::Running);
        assert_eq!(c.next_state(0.54, 5.0), MotorState::Stalled);
    }

    #[test]
    fn stalled_demand_scales_with_rating() {
        let c = controller(MotorStallSettings::default());
        assert_eq!(c.demand(MotorState::Stalled), (150.0, 250.0));
        assert_eq!(c.demand(MotorState::Disconnected), (0.0, 0.0));
        assert_eq!(c.demand(MotorState::Running), (50.0, 20.0));
    }

    #[test]
    fn negative_times_rejected() {
        let s = MotorStallSettings {
            t_protection: -1.0,
            ..MotorStallSettings::default()
        };
        assert!(s.validate().is_err());
    }
}
