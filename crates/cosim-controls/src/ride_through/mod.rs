//! Voltage ride-through for inverter-based PV.
//!
//! The controller tracks how long the terminal voltage has been outside the
//! continuous-operation band and looks the `(duration, voltage)` point up in
//! the category's [`RegionMap`]. Depending on the region the inverter keeps
//! full output, limits its current, ceases to energize, or trips. A tripped
//! unit waits out the reconnect dead time, then ramps back to rated output.

mod region;

pub use region::{Polygon, Region, RegionMap, RideThroughCategory, T_MAX, V_MAX};

use cosim_circuit::{ParamValue, PowerFlowSolver};
use cosim_core::{ElementHandle, ElementId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::controller::{Controller, bind_element, controller_name};
use crate::error::ControlResult;
use crate::marker::UpdateMarker;
use crate::ramp::{PowerRamp, RampState};
use crate::settings::{ControllerSettings, SettingsRecord, parse_settings, require_non_negative};

pub const TAG: &str = "PvVoltageRideThru";

/// What to do inside the may-trip region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MayTripOperation {
    #[default]
    Trip,
    #[serde(rename = "Ride through", alias = "RideThrough")]
    RideThrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RideThroughSettings {
    #[serde(rename = "Category")]
    pub category: RideThroughCategory,
    /// Minimum time (s) between a trip and reconnection.
    #[serde(rename = "ReconnectDeadtime")]
    pub reconnect_deadtime: f64,
    /// Time (s) to ramp from zero to rated output after reconnection.
    #[serde(rename = "ReconnectRampTime")]
    pub reconnect_ramp_time: f64,
    #[serde(rename = "MayTripOperation")]
    pub may_trip: MayTripOperation,
}

impl Default for RideThroughSettings {
    fn default() -> Self {
        Self {
            category: RideThroughCategory::II,
            reconnect_deadtime: 300.0,
            reconnect_ramp_time: 300.0,
            may_trip: MayTripOperation::Trip,
        }
    }
}

impl ControllerSettings for RideThroughSettings {
    fn validate(&self) -> Result<(), String> {
        require_non_negative(self.reconnect_deadtime, "ReconnectDeadtime")?;
        require_non_negative(self.reconnect_ramp_time, "ReconnectRampTime")
    }
}

/// Inverter behavior, least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum RideThroughState {
    #[default]
    Connected,
    Curtailed,
    Ceased,
    Tripped,
}

#[derive(Debug, Clone)]
pub struct RideThroughController {
    name: String,
    element: ElementId,
    handle: ElementHandle,
    settings: RideThroughSettings,
    regions: RegionMap,
    ramp: PowerRamp,
    ramp_state: RampState,
    state: RideThroughState,
    entered_at: f64,
    trip_time: Option<f64>,
    violation_s: f64,
    marker: UpdateMarker,
    applied: (bool, f64),
}

impl RideThroughController {
    pub fn new(
        element: ElementId,
        settings: RideThroughSettings,
        solver: &dyn PowerFlowSolver,
    ) -> ControlResult<Self> {
        let handle = bind_element(solver, TAG, &element, "PVSystem")?;
        let el = solver.element(handle)?;
        let enabled = el.parameter("enabled")?.as_bool().unwrap_or(true);
        let pct_pmpp = el.number("%Pmpp")?;
        let ramp = PowerRamp::new(settings.reconnect_ramp_time)?;
        Ok(Self {
            name: controller_name(TAG, &element),
            element,
            handle,
            regions: RegionMap::for_category(settings.category),
            settings,
            ramp,
            ramp_state: RampState::default(),
            state: RideThroughState::Connected,
            entered_at: f64::NEG_INFINITY,
            trip_time: None,
            violation_s: 0.0,
            marker: UpdateMarker::new(),
            applied: (enabled, pct_pmpp),
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

    pub fn state(&self) -> RideThroughState {
        self.state
    }

    /// Accumulated time outside the continuous band (s).
    pub fn violation_time(&self) -> f64 {
        self.violation_s
    }

    pub fn trip_time(&self) -> Option<f64> {
        self.trip_time
    }

    /// Permitted output as a fraction of rated.
    pub fn ramp_fraction(&self) -> f64 {
        self.ramp_state.fraction
    }

    fn state_for(&self, region: Region) -> RideThroughState {
        match region {
            Region::ContinuousOperation => RideThroughState::Connected,
            Region::CurrentLimited => RideThroughState::Curtailed,
            Region::MomentaryCessation => RideThroughState::Ceased,
            Region::MayTrip => match self.settings.may_trip {
                MayTripOperation::Trip => RideThroughState::Tripped,
                MayTripOperation::RideThrough => RideThroughState::Curtailed,
            },
            Region::MustTrip => RideThroughState::Tripped,
        }
    }

    fn next_state(&self, v_pu: f64, time: f64) -> RideThroughState {
        if self.state == RideThroughState::Tripped {
            let waited = self.trip_time.map_or(f64::INFINITY, |t| time - t);
            if waited >= self.settings.reconnect_deadtime && self.regions.is_continuous(v_pu) {
                return RideThroughState::Connected;
            }
            return RideThroughState::Tripped;
        }
        let region = self.regions.classify(self.violation_s, v_pu);
        let wanted = self.state_for(region);
        // Relaxing a restriction waits for the next timestep.
        if wanted < self.state && time <= self.entered_at {
            return self.state;
        }
        wanted
    }

    fn setpoint(&self, v_pu: f64) -> (bool, f64) {
        let full = 100.0 * self.ramp_state.fraction;
        match self.state {
            RideThroughState::Connected => (true, full),
            RideThroughState::Curtailed => (true, full.min(100.0 * v_pu.clamp(0.0, 1.0))),
            RideThroughState::Ceased => (true, 0.0),
            RideThroughState::Tripped => (false, 0.0),
        }
    }
}

impl Controller for RideThroughController {
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

        let dt = self.marker.advance(time);
        if self.regions.is_continuous(v_pu) {
            self.violation_s = 0.0;
        } else {
            self.violation_s += dt;
        }

        let next = self.next_state(v_pu, time);
        let changed = next != self.state;
        if changed {
            info!(
                controller = %self.name,
                from = ?self.state,
                to = ?next,
                time,
                v_pu,
                violation_s = self.violation_s,
                "ride-through state change"
            );
            match next {
                RideThroughState::Tripped => self.trip_time = Some(time),
                RideThroughState::Connected if self.state == RideThroughState::Tripped => {
                    self.ramp_state = RampState { fraction: 0.0 };
                    self.violation_s = 0.0;
                }
                _ => {}
            }
            self.state = next;
            self.entered_at = time;
        }
        if !changed && self.state != RideThroughState::Tripped {
            self.ramp_state = self.ramp.step(&self.ramp_state, dt, 1.0);
        }

        let (enabled, pct) = self.setpoint(v_pu);
        let el = solver.element_mut(self.handle)?;
        el.set_parameter("enabled", ParamValue::from(enabled))?;
        el.set_parameter("%Pmpp", ParamValue::from(pct))?;

        let (was_enabled, was_pct) = self.applied;
        self.applied = (enabled, pct);
        let residual = (pct - was_pct).abs() / 100.0 + if enabled != was_enabled { 1.0 } else { 0.0 };
        debug!(controller = %self.name, v_pu, pct, residual, "ride-through update");
        Ok(residual)
    }
}
