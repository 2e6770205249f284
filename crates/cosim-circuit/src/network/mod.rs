//! Balanced positive-sequence reference network.
//!
//! Good enough to exercise controllers end to end: one voltage source, series
//! lines, constant-power loads, PV, storage, bolted/resistive faults and a
//! source-side tap regulator as the native control device.

mod element;
mod flow;
mod spec;

use std::collections::HashMap;

use chrono::NaiveDateTime;
use cosim_core::{BusId, ElementHandle, ElementId, Id};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CircuitError, CircuitResult};
use crate::shape::LoadShape;
use crate::traits::{CircuitElement, ControlMode, PowerFlowSolver};

pub use element::{NetworkElement, StorageMode};
pub use spec::{FaultSpec, LineSpec, LoadSpec, PvSpec, RegControlSpec, StorageSpec, VsourceSpec};

use element::{BASE_KVA, C64, ElementKind, StorageState, TerminalResult};

/// Numerical settings of the network solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOptions {
    /// Fixed-point iterations per network solve.
    pub max_iterations: usize,
    /// Convergence threshold on the largest voltage update (pu).
    pub tolerance: f64,
    /// Native control rounds per [`PowerFlowSolver::solve`] in static mode.
    pub max_control_rounds: usize,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-9,
            max_control_rounds: 40,
        }
    }
}

/// In-memory circuit owning every element.
#[derive(Debug, Clone)]
pub struct Network {
    name: String,
    base_kv: f64,
    start: NaiveDateTime,
    pub(crate) options: NetworkOptions,
    pub(crate) buses: Vec<String>,
    bus_index: HashMap<String, BusId>,
    pub(crate) elements: Vec<NetworkElement>,
    index: HashMap<ElementId, ElementHandle>,
    shapes: HashMap<String, LoadShape>,
    pub(crate) last_voltages: Option<Vec<C64>>,
    total_power: [f64; 2],
    elapsed_s: f64,
    control_mode: ControlMode,
    last_iterations: usize,
}

impl Network {
    /// Empty network at nominal line-to-line voltage `base_kv`.
    pub fn new(
        name: impl Into<String>,
        base_kv: f64,
        start: NaiveDateTime,
        options: NetworkOptions,
    ) -> CircuitResult<Self> {
        if !base_kv.is_finite() || base_kv <= 0.0 {
            return Err(CircuitError::Topology {
                what: format!("base voltage must be positive, got {base_kv} kV"),
            });
        }
        if options.max_iterations == 0 || options.tolerance.is_nan() || options.tolerance <= 0.0 {
            return Err(CircuitError::Topology {
                what: "solver options need max_iterations > 0 and tolerance > 0".to_string(),
            });
        }
        Ok(Self {
            name: name.into(),
            base_kv,
            start,
            options,
            buses: Vec::new(),
            bus_index: HashMap::new(),
            elements: Vec::new(),
            index: HashMap::new(),
            shapes: HashMap::new(),
            last_voltages: None,
            total_power: [0.0; 2],
            elapsed_s: 0.0,
            control_mode: ControlMode::Static,
            last_iterations: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_kv(&self) -> f64 {
        self.base_kv
    }

    pub fn bus_names(&self) -> &[String] {
        &self.buses
    }

    /// Fixed-point iterations used by the latest network solve.
    pub fn last_iterations(&self) -> usize {
        self.last_iterations
    }

    /// Register a bus, returning the existing id when already known.
    pub fn add_bus(&mut self, name: &str) -> CircuitResult<BusId> {
        let key = name.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(CircuitError::Topology {
                what: "bus name must not be empty".to_string(),
            });
        }
        if let Some(id) = self.bus_index.get(&key) {
            return Ok(*id);
        }
        let id = Id::from_index(self.buses.len() as u32);
        self.buses.push(key.clone());
        self.bus_index.insert(key, id);
        Ok(id)
    }

    pub fn add_shape(&mut self, shape: LoadShape) -> CircuitResult<()> {
        let key = shape.name.trim().to_ascii_lowercase();
        if self.shapes.contains_key(&key) {
            return Err(CircuitError::Topology {
                what: format!("duplicate loadshape '{key}'"),
            });
        }
        self.shapes.insert(key, shape);
        Ok(())
    }

    pub fn add_vsource(&mut self, name: &str, spec: &VsourceSpec) -> CircuitResult<ElementHandle> {
        check_values(&[("pu", spec.pu), ("r1", spec.r1), ("x1", spec.x1)])?;
        if spec.r1.hypot(spec.x1) <= 0.0 {
            return Err(CircuitError::Topology {
                what: format!("vsource '{name}' needs a non-zero impedance"),
            });
        }
        let kind = ElementKind::Vsource {
            pu: spec.pu,
            r1: spec.r1,
            x1: spec.x1,
        };
        self.insert("Vsource", name, &spec.bus, None, kind)
    }

    pub fn add_line(&mut self, name: &str, spec: &LineSpec) -> CircuitResult<ElementHandle> {
        check_values(&[("r1", spec.r1), ("x1", spec.x1)])?;
        if spec.r1.hypot(spec.x1) <= 0.0 {
            return Err(CircuitError::Topology {
                what: format!("line '{name}' needs a non-zero impedance"),
            });
        }
        if spec.bus1.trim().eq_ignore_ascii_case(spec.bus2.trim()) {
            return Err(CircuitError::Topology {
                what: format!("line '{name}' connects bus '{}' to itself", spec.bus1),
            });
        }
        let kind = ElementKind::Line {
            r1: spec.r1,
            x1: spec.x1,
        };
        self.insert("Line", name, &spec.bus1, Some(&spec.bus2), kind)
    }

    pub fn add_load(&mut self, name: &str, spec: &LoadSpec) -> CircuitResult<ElementHandle> {
        check_values(&[("kw", spec.kw), ("kvar", spec.kvar)])?;
        let daily = self.shape_ref(spec.daily.as_deref())?;
        let kind = ElementKind::Load {
            kw: spec.kw,
            kvar: spec.kvar,
            daily,
            mult: 1.0,
        };
        let handle = self.insert("Load", name, &spec.bus, None, kind)?;
        self.apply_shape(handle);
        Ok(handle)
    }

    pub fn add_pv(&mut self, name: &str, spec: &PvSpec) -> CircuitResult<ElementHandle> {
        check_values(&[
            ("pmpp", spec.pmpp),
            ("kva", spec.kva),
            ("irradiance", spec.irradiance),
            ("kvar", spec.kvar),
        ])?;
        check_percent("%pmpp", spec.pct_pmpp)?;
        let daily = self.shape_ref(spec.daily.as_deref())?;
        let kind = ElementKind::PvSystem {
            pmpp: spec.pmpp,
            kva: spec.kva,
            irradiance: spec.irradiance,
            kvar: spec.kvar,
            pct_pmpp: spec.pct_pmpp,
            daily,
            mult: 1.0,
        };
        let handle = self.insert("PVSystem", name, &spec.bus, None, kind)?;
        self.apply_shape(handle);
        Ok(handle)
    }

    pub fn add_storage(&mut self, name: &str, spec: &StorageSpec) -> CircuitResult<ElementHandle> {
        check_values(&[("kwrated", spec.kw_rated), ("kwhrated", spec.kwh_rated)])?;
        for (what, v) in [
            ("%stored", spec.pct_stored),
            ("%reserve", spec.pct_reserve),
            ("%effcharge", spec.pct_eff_charge),
            ("%effdischarge", spec.pct_eff_discharge),
        ] {
            check_percent(what, v)?;
        }
        if spec.kw_rated <= 0.0 || spec.kwh_rated <= 0.0 {
            return Err(CircuitError::Topology {
                what: format!("storage '{name}' needs positive kW and kWh ratings"),
            });
        }
        let kind = ElementKind::Storage(StorageState {
            kw_rated: spec.kw_rated,
            kwh_rated: spec.kwh_rated,
            kwh_stored: spec.kwh_rated * spec.pct_stored / 100.0,
            pct_reserve: spec.pct_reserve,
            pct_charge: 0.0,
            pct_discharge: 0.0,
            mode: StorageMode::Idling,
            eff_charge: spec.pct_eff_charge / 100.0,
            eff_discharge: spec.pct_eff_discharge / 100.0,
        });
        self.insert("Storage", name, &spec.bus, None, kind)
    }

    pub fn add_fault(&mut self, name: &str, spec: &FaultSpec) -> CircuitResult<ElementHandle> {
        check_values(&[("r", spec.r)])?;
        if spec.r <= 0.0 {
            return Err(CircuitError::Topology {
                what: format!("fault '{name}' needs a positive resistance"),
            });
        }
        let handle = self.insert("Fault", name, &spec.bus, None, ElementKind::Fault { r: spec.r })?;
        self.elements[handle.slot()].enabled = spec.enabled;
        Ok(handle)
    }

    pub fn add_regcontrol(
        &mut self,
        name: &str,
        spec: &RegControlSpec,
    ) -> CircuitResult<ElementHandle> {
        check_values(&[
            ("vreg", spec.vreg),
            ("band", spec.band),
            ("tapstep", spec.tap_step),
        ])?;
        if spec.max_tap < 0 {
            return Err(CircuitError::Topology {
                what: format!("regcontrol '{name}' max_tap must be non-negative"),
            });
        }
        let kind = ElementKind::RegControl {
            vreg: spec.vreg,
            band: spec.band,
            tap_step: spec.tap_step,
            max_tap: spec.max_tap,
            tap: 0,
        };
        self.insert("RegControl", name, &spec.bus, None, kind)
    }

    fn insert(
        &mut self,
        class: &str,
        name: &str,
        bus1: &str,
        bus2: Option<&str>,
        kind: ElementKind,
    ) -> CircuitResult<ElementHandle> {
        let id = ElementId::new(class, name);
        if id.name().is_empty() {
            return Err(CircuitError::Topology {
                what: format!("{class} needs a name"),
            });
        }
        if self.index.contains_key(&id) {
            return Err(CircuitError::DuplicateElement { id });
        }
        let b1 = self.add_bus(bus1)?;
        let b2 = bus2.map(|b| self.add_bus(b)).transpose()?;
        let handle = Id::from_index(self.elements.len() as u32);
        self.elements.push(NetworkElement {
            id: id.clone(),
            bus1: b1,
            bus2: b2,
            bus_names: [
                self.buses[b1.slot()].clone(),
                b2.map(|b| self.buses[b.slot()].clone()).unwrap_or_default(),
            ],
            enabled: true,
            kind,
            result: TerminalResult::default(),
            base_kv: self.base_kv,
        });
        self.index.insert(id, handle);
        Ok(handle)
    }

    fn shape_ref(&self, name: Option<&str>) -> CircuitResult<Option<String>> {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        let key = name.to_ascii_lowercase();
        if !self.shapes.contains_key(&key) {
            return Err(CircuitError::Topology {
                what: format!("unknown loadshape '{name}'"),
            });
        }
        Ok(Some(key))
    }

    fn apply_shape(&mut self, handle: ElementHandle) {
        let t = self.elapsed_s;
        let Some(el) = self.elements.get_mut(handle.slot()) else {
            return;
        };
        let mult = el
            .daily_shape()
            .and_then(|name| self.shapes.get(&name.to_ascii_lowercase()))
            .map_or(1.0, |shape| shape.at(t));
        el.set_shape_mult(mult);
    }

    pub(crate) fn node_of_from(&self, el: &NetworkElement) -> usize {
        match el.kind {
            ElementKind::Vsource { .. } => 0,
            _ => el.bus1.slot() + 1,
        }
    }

    pub(crate) fn node_of_to(&self, el: &NetworkElement) -> usize {
        match el.kind {
            ElementKind::Vsource { .. } => el.bus1.slot() + 1,
            _ => el.bus2.unwrap_or(el.bus1).slot() + 1,
        }
    }

    /// Internal source voltage including regulator taps.
    pub(crate) fn slack_voltage(&self) -> CircuitResult<C64> {
        let pu = self
            .elements
            .iter()
            .filter(|e| e.enabled)
            .find_map(|e| match e.kind {
                ElementKind::Vsource { pu, .. } => Some(pu),
                _ => None,
            })
            .ok_or_else(|| CircuitError::Topology {
                what: "network has no enabled voltage source".to_string(),
            })?;
        let boost: f64 = self
            .elements
            .iter()
            .filter(|e| e.enabled)
            .map(|e| match e.kind {
                ElementKind::RegControl { tap, tap_step, .. } => f64::from(tap) * tap_step,
                _ => 0.0,
            })
            .sum();
        Ok(C64::new(pu * (1.0 + boost), 0.0))
    }

    fn run_flow(&mut self) -> CircuitResult<bool> {
        let outcome = flow::solve_network(self)?;
        self.last_iterations = outcome.iterations;
        self.store_solution(&outcome.voltages, outcome.slack_current);
        if !outcome.converged {
            debug!(
                network = %self.name,
                iterations = outcome.iterations,
                "network solve did not converge"
            );
        }
        Ok(outcome.converged)
    }

    fn store_solution(&mut self, voltages: &[C64], slack_current: C64) {
        let s_source = voltages[0] * slack_current.conj();
        self.total_power = [s_source.re * BASE_KVA, s_source.im * BASE_KVA];

        let nodes: Vec<(usize, usize)> = self
            .elements
            .iter()
            .map(|e| (self.node_of_from(e), self.node_of_to(e)))
            .collect();
        for (el, (a, b)) in self.elements.iter_mut().zip(nodes) {
            let mut r = TerminalResult::default();
            match el.kind {
                ElementKind::Vsource { .. } => {
                    let vb = voltages[b];
                    r.v[0] = vb;
                    let y = el.series_admittance().unwrap_or_default();
                    // Current flows out of the source terminal into the bus.
                    r.i = -(voltages[a] - vb) * y;
                    r.s[0] = vb * r.i.conj();
                }
                ElementKind::Line { .. } => {
                    let (va, vb) = (voltages[a], voltages[b]);
                    r.v = [va, vb];
                    let y = el.series_admittance().unwrap_or_default();
                    r.i = (va - vb) * y;
                    r.s = [va * r.i.conj(), -(vb * r.i.conj())];
                }
                _ => {
                    let v = voltages[a];
                    r.v[0] = v;
                    let mut s = el.demand().unwrap_or_default();
                    if v.norm() < 0.7 {
                        s *= v.norm_sqr() / 0.49;
                    }
                    if let Some(y) = el.shunt_admittance() {
                        s += v * (v * y).conj();
                    }
                    if v.norm() > 0.0 {
                        r.i = (s / v).conj();
                    }
                    r.s[0] = s;
                }
            }
            el.result = r;
        }
        self.last_voltages = Some(voltages.to_vec());
    }

    /// One round of regulator action. Returns true when any tap moved.
    fn step_regulators(&mut self) -> bool {
        let Some(voltages) = self.last_voltages.clone() else {
            return false;
        };
        let mut moved = false;
        for el in self.elements.iter_mut().filter(|e| e.enabled) {
            let node = el.bus1.slot() + 1;
            if let ElementKind::RegControl {
                vreg,
                band,
                max_tap,
                tap,
                ..
            } = &mut el.kind
            {
                let v = voltages[node].norm();
                let half = *band / 2.0;
                let next = if v < *vreg - half && *tap < *max_tap {
                    *tap + 1
                } else if v > *vreg + half && *tap > -*max_tap {
                    *tap - 1
                } else {
                    continue;
                };
                debug!(regulator = %el.id, from = *tap, to = next, v_pu = v, "tap change");
                *tap = next;
                moved = true;
            }
        }
        moved
    }

    fn element_slot(&self, handle: ElementHandle) -> CircuitResult<usize> {
        let slot = handle.slot();
        if slot >= self.elements.len() {
            return Err(CircuitError::UnknownElement {
                id: format!("handle {handle}"),
            });
        }
        Ok(slot)
    }
}

fn check_values(values: &[(&'static str, f64)]) -> CircuitResult<()> {
    for &(what, v) in values {
        cosim_core::ensure_finite(v, what)?;
    }
    Ok(())
}

fn check_percent(what: &'static str, v: f64) -> CircuitResult<()> {
    cosim_core::ensure_finite(v, what)?;
    if !(0.0..=100.0).contains(&v) {
        return Err(CircuitError::Core(cosim_core::CoreError::InvalidArg { what }));
    }
    Ok(())
}

impl PowerFlowSolver for Network {
    fn solve(&mut self) -> CircuitResult<bool> {
        let mut converged = self.run_flow()?;
        let rounds = match self.control_mode {
            ControlMode::Static => self.options.max_control_rounds,
            ControlMode::Time => 1,
        };
        for _ in 0..rounds {
            if !converged || !self.step_regulators() {
                break;
            }
            converged = self.run_flow()?;
        }
        Ok(converged)
    }

    fn solve_no_control(&mut self) -> CircuitResult<bool> {
        self.run_flow()
    }

    fn advance_time(&mut self, step_s: f64) -> CircuitResult<()> {
        if !step_s.is_finite() || step_s < 0.0 {
            return Err(CircuitError::Core(cosim_core::CoreError::NonFinite {
                what: "step_s",
                value: step_s,
            }));
        }
        for el in &mut self.elements {
            if let ElementKind::Storage(st) = &mut el.kind {
                if el.enabled {
                    st.integrate(step_s);
                }
            }
        }
        self.elapsed_s += step_s;
        for slot in 0..self.elements.len() {
            self.apply_shape(Id::from_index(slot as u32));
        }
        Ok(())
    }

    fn total_seconds(&self) -> f64 {
        self.elapsed_s
    }

    fn date_time(&self) -> NaiveDateTime {
        let ms = (self.elapsed_s * 1000.0).round() as i64;
        self.start + chrono::Duration::milliseconds(ms)
    }

    fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    fn set_control_mode(&mut self, mode: ControlMode) {
        if mode != self.control_mode {
            debug!(network = %self.name, ?mode, "native control mode changed");
        }
        self.control_mode = mode;
    }

    fn find_element(&self, id: &ElementId) -> Option<ElementHandle> {
        self.index.get(id).copied()
    }

    fn element(&self, handle: ElementHandle) -> CircuitResult<&dyn CircuitElement> {
        let slot = self.element_slot(handle)?;
        Ok(&self.elements[slot])
    }

    fn element_mut(&mut self, handle: ElementHandle) -> CircuitResult<&mut dyn CircuitElement> {
        let slot = self.element_slot(handle)?;
        Ok(&mut self.elements[slot])
    }

    fn element_ids(&self) -> Vec<ElementId> {
        self.elements.iter().map(|e| e.id.clone()).collect()
    }

    fn total_power(&self) -> [f64; 2] {
        self.total_power
    }

    fn bus_voltage_pu(&self, bus: &str) -> CircuitResult<f64> {
        let id = self
            .bus_index
            .get(&bus.trim().to_ascii_lowercase())
            .ok_or_else(|| CircuitError::UnknownBus {
                bus: bus.to_string(),
            })?;
        Ok(self
            .last_voltages
            .as_ref()
            .and_then(|v| v.get(id.slot() + 1))
            .map_or(0.0, |v| v.norm()))
    }
}
