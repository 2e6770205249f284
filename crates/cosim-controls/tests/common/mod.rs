//! In-memory solver double with scripted element variables.

#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use cosim_circuit::{
    CircuitElement, CircuitError, CircuitResult, ControlMode, ParamValue, PowerFlowSolver,
};
use cosim_core::{ElementHandle, ElementId, Id};

pub struct FakeElement {
    id: ElementId,
    params: HashMap<String, ParamValue>,
    variables: HashMap<String, Vec<f64>>,
}

impl FakeElement {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.parse().unwrap(),
            params: HashMap::new(),
            variables: HashMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_voltage(mut self, v_pu: f64) -> Self {
        self.set_voltage(v_pu);
        self
    }

    pub fn set_voltage(&mut self, v_pu: f64) {
        self.variables
            .insert("puvmagangle".to_string(), vec![v_pu, 0.0]);
    }
}

impl CircuitElement for FakeElement {
    fn id(&self) -> &ElementId {
        &self.id
    }

    fn parameter(&self, name: &str) -> CircuitResult<ParamValue> {
        self.params
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| CircuitError::UnknownParameter {
                element: self.id.clone(),
                name: name.to_string(),
            })
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> CircuitResult<()> {
        self.params.insert(name.to_ascii_lowercase(), value);
        Ok(())
    }

    fn variable(&self, name: &str) -> CircuitResult<Vec<f64>> {
        self.variables
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| CircuitError::UnknownVariable {
                element: self.id.clone(),
                name: name.to_string(),
            })
    }
}

/// Solver whose "network" is whatever the test writes into element variables.
pub struct FakeSolver {
    pub elements: Vec<FakeElement>,
    pub total: [f64; 2],
    pub time_s: f64,
    pub solves: usize,
    pub no_control_solves: usize,
    pub mode: ControlMode,
}

impl FakeSolver {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        Self {
            elements,
            total: [0.0; 2],
            time_s: 0.0,
            solves: 0,
            no_control_solves: 0,
            mode: ControlMode::Static,
        }
    }

    pub fn get(&mut self, id: &str) -> &mut FakeElement {
        let id: ElementId = id.parse().unwrap();
        self.elements.iter_mut().find(|e| e.id == id).unwrap()
    }

    pub fn param(&self, id: &str, name: &str) -> ParamValue {
        let id: ElementId = id.parse().unwrap();
        let el = self.elements.iter().find(|e| e.id == id).unwrap();
        el.parameter(name).unwrap()
    }
}

impl PowerFlowSolver for FakeSolver {
    fn solve(&mut self) -> CircuitResult<bool> {
        self.solves += 1;
        Ok(true)
    }

    fn solve_no_control(&mut self) -> CircuitResult<bool> {
        self.no_control_solves += 1;
        Ok(true)
    }

    fn advance_time(&mut self, step_s: f64) -> CircuitResult<()> {
        self.time_s += step_s;
        Ok(())
    }

    fn total_seconds(&self) -> f64 {
        self.time_s
    }

    fn date_time(&self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
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
        self.total
    }

    fn bus_voltage_pu(&self, bus: &str) -> CircuitResult<f64> {
        Err(CircuitError::UnknownBus {
            bus: bus.to_string(),
        })
    }
}
