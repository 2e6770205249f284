//! Solver and controller doubles for scheduler tests.

#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use cosim_circuit::{
    CircuitElement, CircuitError, CircuitResult, ControlMode, ParamValue, PowerFlowSolver,
};
use cosim_controls::{ControlResult, Controller};
use cosim_core::{ElementHandle, ElementId, Id};

/// Element whose `Powers` variable mirrors its `kW` parameter after a solve.
pub struct LoopElement {
    id: ElementId,
    params: HashMap<String, f64>,
    powers: f64,
}

impl CircuitElement for LoopElement {
    fn id(&self) -> &ElementId {
        &self.id
    }

    fn parameter(&self, name: &str) -> CircuitResult<ParamValue> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(|v| ParamValue::from(*v))
            .ok_or_else(|| CircuitError::UnknownParameter {
                element: self.id.clone(),
                name: name.to_string(),
            })
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> CircuitResult<()> {
        let v = value.as_f64().ok_or_else(|| CircuitError::InvalidValue {
            element: self.id.clone(),
            name: name.to_string(),
            reason: "expected a number".to_string(),
        })?;
        self.params.insert(name.to_ascii_lowercase(), v);
        Ok(())
    }

    fn variable(&self, name: &str) -> CircuitResult<Vec<f64>> {
        match name.to_ascii_lowercase().as_str() {
            "powers" => Ok(vec![self.powers, 0.0]),
            _ => Err(CircuitError::UnknownVariable {
                element: self.id.clone(),
                name: name.to_string(),
            }),
        }
    }
}

/// What the solver double was asked to do, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Solve,
    SolveNoControl,
    Advance,
}

/// Solver double: a "solve" copies each element's `kW` into its `Powers`.
pub struct LoopbackSolver {
    pub elements: Vec<LoopElement>,
    pub calls: Vec<Call>,
    pub time_s: f64,
    pub mode: ControlMode,
    /// Report divergence from the n-th `solve_no_control` (1-based).
    pub diverge_no_control_at: Option<usize>,
    /// Report divergence from the n-th full `solve` (1-based).
    pub diverge_solve_at: Option<usize>,
    /// Fail the n-th `solve_no_control` with an error.
    pub error_no_control_at: Option<usize>,
}

impl LoopbackSolver {
    pub fn new(names: &[&str]) -> Self {
        let elements = names
            .iter()
            .map(|n| LoopElement {
                id: n.parse().unwrap(),
                params: HashMap::from([("kw".to_string(), 0.0)]),
                powers: 0.0,
            })
            .collect();
        Self {
            elements,
            calls: Vec::new(),
            time_s: 0.0,
            mode: ControlMode::Static,
            diverge_no_control_at: None,
            diverge_solve_at: None,
            error_no_control_at: None,
        }
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn propagate(&mut self) {
        for el in &mut self.elements {
            el.powers = el.params.get("kw").copied().unwrap_or(0.0);
        }
    }
}

impl PowerFlowSolver for LoopbackSolver {
    fn solve(&mut self) -> CircuitResult<bool> {
        self.calls.push(Call::Solve);
        if self.diverge_solve_at == Some(self.count(Call::Solve)) {
            return Ok(false);
        }
        self.propagate();
        Ok(true)
    }

    fn solve_no_control(&mut self) -> CircuitResult<bool> {
        self.calls.push(Call::SolveNoControl);
        let n = self.count(Call::SolveNoControl);
        if self.error_no_control_at == Some(n) {
            return Err(CircuitError::Singular {
                what: "scripted failure".to_string(),
            });
        }
        if self.diverge_no_control_at == Some(n) {
            return Ok(false);
        }
        self.propagate();
        Ok(true)
    }

    fn advance_time(&mut self, step_s: f64) -> CircuitResult<()> {
        self.calls.push(Call::Advance);
        self.time_s += step_s;
        Ok(())
    }

    fn total_seconds(&self) -> f64 {
        self.time_s
    }

    fn date_time(&self) -> NaiveDateTime {
        let start = NaiveDate::from_ymd_opt(2024, 7, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        start + Duration::milliseconds((self.time_s * 1000.0).round() as i64)
    }

    fn control_mode(&self) -> ControlMode {
        self.mode
    }

    fn set_control_mode(&mut self, mode: ControlMode) {
        self.mode = mode;
    }

    fn find_element(&self, id: &ElementId) -> Option<ElementHandle> {
        self.elements
            .iter()
            .position(|e| &e.id == id)
            .map(|i| Id::from_index(i as u32))
    }

    fn element(&self, handle: ElementHandle) -> CircuitResult<&dyn CircuitElement> {
        self.elements
            .get(handle.slot())
            .map(|e| e as &dyn CircuitElement)
            .ok_or_else(|| CircuitError::UnknownElement {
                id: handle.to_string(),
            })
    }

    fn element_mut(&mut self, handle: ElementHandle) -> CircuitResult<&mut dyn CircuitElement> {
        self.elements
            .get_mut(handle.slot())
            .map(|e| e as &mut dyn CircuitElement)
            .ok_or_else(|| CircuitError::UnknownElement {
                id: handle.to_string(),
            })
    }

    fn element_ids(&self) -> Vec<ElementId> {
        self.elements.iter().map(|e| e.id.clone()).collect()
    }

    fn total_power(&self) -> [f64; 2] {
        [self.elements.iter().map(|e| e.powers).sum(), 0.0]
    }

    fn bus_voltage_pu(&self, bus: &str) -> CircuitResult<f64> {
        Err(CircuitError::UnknownBus {
            bus: bus.to_string(),
        })
    }
}

type UpdateFn = Box<dyn FnMut(&mut dyn PowerFlowSolver, usize, f64, bool) -> ControlResult<f64>>;

/// Controller whose update is a closure.
pub struct FnController {
    name: String,
    element: ElementId,
    priorities: usize,
    update: UpdateFn,
}

impl FnController {
    pub fn boxed(
        name: &str,
        element: &str,
        priorities: usize,
        update: impl FnMut(&mut dyn PowerFlowSolver, usize, f64, bool) -> ControlResult<f64> + 'static,
    ) -> Box<dyn Controller> {
        Box::new(Self {
            name: name.to_string(),
            element: element.parse().unwrap(),
            priorities,
            update: Box::new(update),
        })
    }

    /// Residual sequence `start/2, start/4, ...`.
    pub fn halving(name: &str, element: &str, start: f64) -> Box<dyn Controller> {
        let mut residual = start;
        Self::boxed(name, element, 1, move |_, _, _, _| {
            residual /= 2.0;
            Ok(residual)
        })
    }

    pub fn constant(name: &str, element: &str, residual: f64) -> Box<dyn Controller> {
        Self::boxed(name, element, 1, move |_, _, _, _| Ok(residual))
    }
}

impl Controller for FnController {
    fn name(&self) -> &str {
        &self.name
    }

    fn controlled_element(&self) -> &ElementId {
        &self.element
    }

    fn priority_count(&self) -> usize {
        self.priorities
    }

    fn update(
        &mut self,
        solver: &mut dyn PowerFlowSolver,
        priority: usize,
        time: f64,
        update_results: bool,
    ) -> ControlResult<f64> {
        (self.update)(solver, priority, time, update_results)
    }
}

pub fn write_kw(solver: &mut dyn PowerFlowSolver, element: &str, kw: f64) -> ControlResult<()> {
    let id: ElementId = element.parse().unwrap();
    let handle = solver.require_element(&id)?;
    solver
        .element_mut(handle)?
        .set_parameter("kW", ParamValue::from(kw))?;
    Ok(())
}

pub fn read_powers(solver: &dyn PowerFlowSolver, element: &str) -> f64 {
    let id: ElementId = element.parse().unwrap();
    let handle = solver.require_element(&id).unwrap();
    solver.element(handle).unwrap().active_power_kw().unwrap()
}
