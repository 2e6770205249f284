//! Scenario file schema.
//!
//! A scenario names a circuit, the controllers to attach to its elements and
//! the run horizon. Controller settings stay an untyped key/value record: the
//! controller factory owns their validation.

use chrono::NaiveDateTime;
use cosim_circuit::{
    ControlMode, FaultSpec, LineSpec, LoadShape, LoadSpec, NetworkOptions, PvSpec, RegControlSpec,
    StorageSpec, VsourceSpec,
};
use serde::{Deserialize, Serialize};

/// Latest scenario format version understood by this crate.
pub const LATEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub version: u32,
    pub name: String,
    pub circuit: CircuitDef,
    #[serde(default)]
    pub controllers: Vec<ControllerDef>,
    #[serde(default)]
    pub simulation: SimulationDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitDef {
    pub name: String,
    /// Line-to-line base voltage (kV).
    pub base_kv: f64,
    #[serde(default)]
    pub options: NetworkOptions,
    #[serde(default)]
    pub shapes: Vec<LoadShape>,
    pub elements: Vec<ElementDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDef {
    pub name: String,
    pub kind: ElementKindDef,
}

impl ElementDef {
    /// `Class.name` form used by controller references.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.kind.class(), self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum ElementKindDef {
    Vsource(VsourceSpec),
    Line(LineSpec),
    Load(LoadSpec),
    #[serde(rename = "PVSystem")]
    PvSystem(PvSpec),
    Storage(StorageSpec),
    Fault(FaultSpec),
    RegControl(RegControlSpec),
}

impl ElementKindDef {
    pub fn class(&self) -> &'static str {
        match self {
            ElementKindDef::Vsource(_) => "Vsource",
            ElementKindDef::Line(_) => "Line",
            ElementKindDef::Load(_) => "Load",
            ElementKindDef::PvSystem(_) => "PVSystem",
            ElementKindDef::Storage(_) => "Storage",
            ElementKindDef::Fault(_) => "Fault",
            ElementKindDef::RegControl(_) => "RegControl",
        }
    }

    /// Load shape the element follows, if any.
    pub fn daily(&self) -> Option<&str> {
        match self {
            ElementKindDef::Load(spec) => spec.daily.as_deref(),
            ElementKindDef::PvSystem(spec) => spec.daily.as_deref(),
            _ => None,
        }
    }
}

/// One controller attached to a circuit element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDef {
    /// Controlled element as `Class.name`.
    pub element: String,
    /// Controller type tag, e.g. `StorageController`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

/// Run horizon and control-iteration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationDef {
    pub start: NaiveDateTime,
    pub step_s: f64,
    pub duration_s: f64,
    pub max_steps: usize,
    pub max_control_iterations: usize,
    pub error_tolerance: f64,
    pub control_mode: ControlMode,
}

impl Default for SimulationDef {
    fn default() -> Self {
        Self {
            start: NaiveDateTime::default(),
            step_s: 1.0,
            duration_s: 60.0,
            max_steps: 1_000_000,
            max_control_iterations: 10,
            error_tolerance: 1e-3,
            control_mode: ControlMode::Static,
        }
    }
}
