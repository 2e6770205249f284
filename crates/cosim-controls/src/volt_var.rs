//! Smart-inverter volt/var and volt-watt control for PV.
//!
//! Priority 0 sets reactive power from the volt/var curve. Because the
//! inverter's own kvar moves its terminal voltage, the setpoint is settled in
//! a short inner loop of network-only re-solves. Priority 1 curtails active
//! power from the volt-watt curve using the voltage produced by pass 0.

use cosim_circuit::{ParamValue, PowerFlowSolver};
use cosim_core::{ElementHandle, ElementId, interp_linear};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::{Controller, bind_element, controller_name};
use crate::error::{ControlError, ControlResult};
use crate::settings::{
    ControllerSettings, SettingsRecord, parse_settings, require_curve, require_positive,
};

pub const TAG: &str = "PvController";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VoltVarSettings {
    #[serde(rename = "VVarEnabled")]
    pub volt_var: bool,
    #[serde(rename = "VWattEnabled")]
    pub volt_watt: bool,
    /// `(v_pu, kvar as % of kVA)` points, injection positive.
    #[serde(rename = "VV_curve")]
    pub vv_curve: Vec<(f64, f64)>,
    /// `(v_pu, % of Pmpp)` points.
    #[serde(rename = "VW_curve")]
    pub vw_curve: Vec<(f64, f64)>,
    #[serde(rename = "DampCoef")]
    pub damp_coef: f64,
    #[serde(rename = "MaxInnerIterations")]
    pub max_inner_iterations: usize,
    /// Inner loop stops when the kvar step falls below this fraction of kVA.
    #[serde(rename = "InnerTolerance")]
    pub inner_tolerance: f64,
}

impl Default for VoltVarSettings {
    fn default() -> Self {
        Self {
            volt_var: true,
            volt_watt: true,
            vv_curve: vec![(0.92, 44.0), (0.98, 0.0), (1.02, 0.0), (1.08, -44.0)],
            vw_curve: vec![(1.06, 100.0), (1.10, 20.0)],
            damp_coef: 0.8,
            max_inner_iterations: 10,
            inner_tolerance: 1e-4,
        }
    }
}

impl ControllerSettings for VoltVarSettings {
    fn validate(&self) -> Result<(), String> {
        require_curve(&self.vv_curve, "VV_curve")?;
        require_curve(&self.vw_curve, "VW_curve")?;
        require_positive(self.damp_coef, "DampCoef")?;
        require_positive(self.inner_tolerance, "InnerTolerance")?;
        if self.damp_coef > 1.0 {
            return Err(format!("DampCoef must be at most 1, got {}", self.damp_coef));
        }
        if self.max_inner_iterations == 0 {
            return Err("MaxInnerIterations must be at least 1".to_string());
        }
        if self.vw_curve.iter().any(|&(_, p)| !(0.0..=100.0).contains(&p)) {
            return Err("VW_curve power must be within [0, 100] %".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct VoltVarController {
    name: String,
    element: ElementId,
    handle: ElementHandle,
    settings: VoltVarSettings,
    kva: f64,
    kvar: f64,
    pct_pmpp: f64,
    inner_solves: usize,
}

impl VoltVarController {
    pub fn new(
        element: ElementId,
        settings: VoltVarSettings,
        solver: &dyn PowerFlowSolver,
    ) -> ControlResult<Self> {
        let handle = bind_element(solver, TAG, &element, "PVSystem")?;
        let el = solver.element(handle)?;
        let kva = el.number("kVA")?;
        if !kva.is_finite() || kva <= 0.0 {
            return Err(ControlError::InvalidSettings {
                controller: TAG.to_string(),
                element,
                reason: format!("element kVA must be positive, got {kva}"),
            });
        }
        let kvar = el.number("kvar")?;
        let pct_pmpp = el.number("%Pmpp")?;
        Ok(Self {
            name: controller_name(TAG, &element),
            element,
            handle,
            settings,
            kva,
            kvar,
            pct_pmpp,
            inner_solves: 0,
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

    pub fn kvar(&self) -> f64 {
        self.kvar
    }

    pub fn pct_pmpp(&self) -> f64 {
        self.pct_pmpp
    }

    /// Network-only re-solves issued by the volt/var inner loop so far.
    pub fn inner_solves(&self) -> usize {
        self.inner_solves
    }

    fn volt_var(&mut self, solver: &mut dyn PowerFlowSolver) -> ControlResult<f64> {
        let start = self.kvar;
        for i in 0..self.settings.max_inner_iterations {
            let v = solver.element(self.handle)?.voltage_pu()?;
            let target = interp_linear(&self.settings.vv_curve, v) * self.kva / 100.0;
            let next = self.kvar + self.settings.damp_coef * (target - self.kvar);
            let step = (next - self.kvar).abs() / self.kva;
            self.kvar = next;
            solver
                .element_mut(self.handle)?
                .set_parameter("kvar", ParamValue::from(next))?;
            if step < self.settings.inner_tolerance {
                break;
            }
            if i + 1 < self.settings.max_inner_iterations {
                self.inner_solves += 1;
                if !solver.solve_no_control()? {
                    return Err(ControlError::InnerSolveFailed {
                        controller: self.name.clone(),
                    });
                }
            }
        }
        Ok((self.kvar - start).abs() / self.kva)
    }

    fn volt_watt(&mut self, solver: &mut dyn PowerFlowSolver) -> ControlResult<f64> {
        let v = solver.element(self.handle)?.voltage_pu()?;
        let pct = interp_linear(&self.settings.vw_curve, v).clamp(0.0, 100.0);
        let previous = self.pct_pmpp;
        self.pct_pmpp = pct;
        solver
            .element_mut(self.handle)?
            .set_parameter("%Pmpp", ParamValue::from(pct))?;
        Ok((pct - previous).abs() / 100.0)
    }
}

impl Controller for VoltVarController {
    fn name(&self) -> &str {
        &self.name
    }

    fn controlled_element(&self) -> &ElementId {
        &self.element
    }

    fn priority_count(&self) -> usize {
        2
    }

    fn update(
        &mut self,
        solver: &mut dyn PowerFlowSolver,
        priority: usize,
        _time: f64,
        _update_results: bool,
    ) -> ControlResult<f64> {
        let residual = match priority {
            0 if self.settings.volt_var => self.volt_var(solver)?,
            1 if self.settings.volt_watt => self.volt_watt(solver)?,
            _ => 0.0,
        };
        debug!(
            controller = %self.name,
            priority,
            kvar = self.kvar,
            pct_pmpp = self.pct_pmpp,
            residual,
            "volt/var update"
        );
        Ok(residual)
    }
}
