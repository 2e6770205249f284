//! Turn a validated scenario into a runnable network and controller registry.

use chrono::NaiveDateTime;
use cosim_circuit::{Network, PowerFlowSolver};
use cosim_controls::ControllerFactory;
use cosim_core::ElementId;
use cosim_core::units::s;
use cosim_project::{CircuitDef, ControllerDef, ElementKindDef, Project, SimulationDef};
use cosim_sim::{ControllerRegistry, SchedulerConfig, SimOptions};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::progress::RunStage;

/// Everything a run needs, built from one scenario.
#[derive(Debug)]
pub struct CompiledScenario {
    pub network: Network,
    pub registry: ControllerRegistry,
    pub options: SimOptions,
}

/// Build the network: shapes first, then elements in file order.
pub fn build_network(circuit: &CircuitDef, start: NaiveDateTime) -> AppResult<Network> {
    let mut network = Network::new(&circuit.name, circuit.base_kv, start, circuit.options)?;
    for shape in &circuit.shapes {
        network.add_shape(shape.clone())?;
    }
    for element in &circuit.elements {
        let name = element.name.as_str();
        match &element.kind {
            ElementKindDef::Vsource(spec) => network.add_vsource(name, spec)?,
            ElementKindDef::Line(spec) => network.add_line(name, spec)?,
            ElementKindDef::Load(spec) => network.add_load(name, spec)?,
            ElementKindDef::PvSystem(spec) => network.add_pv(name, spec)?,
            ElementKindDef::Storage(spec) => network.add_storage(name, spec)?,
            ElementKindDef::Fault(spec) => network.add_fault(name, spec)?,
            ElementKindDef::RegControl(spec) => network.add_regcontrol(name, spec)?,
        };
    }
    debug!(
        circuit = %circuit.name,
        elements = circuit.elements.len(),
        "network built"
    );
    Ok(network)
}

/// Create every controller through `factory` and register it.
///
/// Unknown types, missing elements and bad settings fail here, before any
/// timestep runs.
pub fn build_registry(
    controllers: &[ControllerDef],
    solver: &mut dyn PowerFlowSolver,
    factory: &ControllerFactory,
) -> AppResult<ControllerRegistry> {
    let mut registry = ControllerRegistry::new();
    for def in controllers {
        let element: ElementId = def.element.parse().map_err(|e| AppError::Controller {
            element: def.element.clone(),
            message: format!("{e}"),
        })?;
        let controller = factory
            .create(element, &def.kind, &def.settings, solver)
            .map_err(|e| AppError::Controller {
                element: def.element.clone(),
                message: e.to_string(),
            })?;
        registry.add(controller)?;
    }
    Ok(registry)
}

pub fn sim_options(sim: &SimulationDef) -> SimOptions {
    SimOptions {
        step: s(sim.step_s),
        duration: s(sim.duration_s),
        max_steps: sim.max_steps,
        scheduler: SchedulerConfig {
            max_control_iterations: sim.max_control_iterations,
            error_tolerance: sim.error_tolerance,
            control_mode: sim.control_mode,
        },
    }
}

pub fn compile_project(
    project: &Project,
    factory: &ControllerFactory,
) -> AppResult<CompiledScenario> {
    compile_project_staged(project, factory, |_| {})
}

/// [`compile_project`] that reports `BuildingCircuit` and
/// `CreatingControllers` to `on_stage` as it enters each.
pub fn compile_project_staged(
    project: &Project,
    factory: &ControllerFactory,
    mut on_stage: impl FnMut(RunStage),
) -> AppResult<CompiledScenario> {
    on_stage(RunStage::BuildingCircuit);
    cosim_project::validate_project(project)?;
    let mut network = build_network(&project.circuit, project.simulation.start)?;

    on_stage(RunStage::CreatingControllers);
    let registry = build_registry(&project.controllers, &mut network, factory)?;
    let options = sim_options(&project.simulation);
    options.validate()?;
    Ok(CompiledScenario {
        network,
        registry,
        options,
    })
}
