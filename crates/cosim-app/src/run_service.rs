//! Run execution service.

use std::path::Path;
use std::time::Instant;

use cosim_circuit::ControlMode;
use cosim_controls::ControllerFactory;
use cosim_project::Project;
use cosim_sim::{ResultSink, RunSummary, SimProgress, SimRecord, SimulationDriver};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compile;
use crate::error::{AppError, AppResult};
use crate::progress::{RunProgressEvent, RunStage};
use crate::project_service;
use crate::sink::Tee;

/// Command-line or caller overrides applied on top of the scenario file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub max_control_iterations: Option<usize>,
    pub error_tolerance: Option<f64>,
    pub duration_s: Option<f64>,
    pub control_mode: Option<ControlMode>,
}

impl RunOverrides {
    pub fn apply(&self, project: &mut Project) {
        let sim = &mut project.simulation;
        if let Some(n) = self.max_control_iterations {
            sim.max_control_iterations = n;
        }
        if let Some(tol) = self.error_tolerance {
            sim.error_tolerance = tol;
        }
        if let Some(d) = self.duration_s {
            sim.duration_s = d;
        }
        if let Some(mode) = self.control_mode {
            sim.control_mode = mode;
        }
    }
}

/// Request to execute a run.
pub struct RunRequest<'a> {
    pub project_path: &'a Path,
    pub overrides: RunOverrides,
}

#[derive(Debug, Clone, Default)]
pub struct RunTimingSummary {
    pub compile_time_s: f64,
    pub simulate_time_s: f64,
    pub total_time_s: f64,
}

/// Serializable outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub project: String,
    pub controllers: usize,
    pub summary: RunSummary,
    /// Simulation times (s) of the steps accepted without convergence.
    pub non_converged_times_s: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct RunResponse {
    pub report: RunReport,
    pub record: SimRecord,
    pub timing: RunTimingSummary,
}

fn emit_progress(
    progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    stage: RunStage,
    started: Instant,
    message: &str,
) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(RunProgressEvent::stage(
            stage,
            started.elapsed().as_secs_f64(),
            Some(message.to_string()),
        ));
    }
}

/// Load, compile and run a scenario file.
pub fn run_project(request: &RunRequest) -> AppResult<RunResponse> {
    run_project_with_progress(request, None, None)
}

/// Load, compile and run a scenario file, streaming progress events and
/// forwarding every step to `step_sink` when given.
pub fn run_project_with_progress(
    request: &RunRequest,
    mut progress_cb: Option<&mut dyn FnMut(RunProgressEvent)>,
    step_sink: Option<&mut dyn ResultSink>,
) -> AppResult<RunResponse> {
    let started = Instant::now();
    emit_progress(
        &mut progress_cb,
        RunStage::LoadingProject,
        started,
        "Loading project",
    );
    let mut project = project_service::load_project(request.project_path)?;
    request.overrides.apply(&mut project);
    run_loaded_project(&project, progress_cb, step_sink, started)
}

/// Compile and run an in-memory project.
pub fn run_loaded_project(
    project: &Project,
    mut progress_cb: Option<&mut dyn FnMut(RunProgressEvent)>,
    step_sink: Option<&mut dyn ResultSink>,
    started: Instant,
) -> AppResult<RunResponse> {
    let mut timing = RunTimingSummary::default();
    let compile_started = Instant::now();

    let compile::CompiledScenario {
        mut network,
        mut registry,
        options,
    } = compile::compile_project_staged(project, &ControllerFactory::default(), |stage| {
        let message = match stage {
            RunStage::BuildingCircuit => "Building circuit",
            RunStage::CreatingControllers => "Creating controllers",
            _ => stage.label(),
        };
        emit_progress(&mut progress_cb, stage, started, message);
    })?;
    let driver = SimulationDriver::new(options)?;
    timing.compile_time_s = compile_started.elapsed().as_secs_f64();

    info!(
        project = %project.name,
        controllers = registry.len(),
        steps = driver.options().step_count(),
        "running scenario"
    );
    emit_progress(&mut progress_cb, RunStage::Simulating, started, "Simulating");

    let simulate_started = Instant::now();
    let mut record = SimRecord::new();
    let summary = {
        let mut tee = Tee {
            record: &mut record,
            extra: step_sink,
        };
        let mut forward = |p: SimProgress| {
            if let Some(cb) = progress_cb.as_deref_mut() {
                cb(RunProgressEvent {
                    stage: RunStage::Simulating,
                    elapsed_wall_s: started.elapsed().as_secs_f64(),
                    message: None,
                    sim: Some(p),
                });
            }
        };
        driver.run_with_progress(&mut network, &mut registry, &mut tee, Some(&mut forward))?
    };
    timing.simulate_time_s = simulate_started.elapsed().as_secs_f64();

    emit_progress(&mut progress_cb, RunStage::Completed, started, "Run complete");
    timing.total_time_s = started.elapsed().as_secs_f64();

    let report = RunReport {
        project: project.name.clone(),
        controllers: registry.len(),
        summary,
        non_converged_times_s: record.non_converged().map(|s| s.time_s).collect(),
    };
    Ok(RunResponse {
        report,
        record,
        timing,
    })
}

/// Write the full step record as pretty JSON.
pub fn save_record(path: &Path, record: &SimRecord) -> AppResult<()> {
    let content = serde_json::to_string_pretty(record)?;
    std::fs::write(path, content).map_err(AppError::Io)
}
