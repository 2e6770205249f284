//! Timestep loop: call order, recording and failure handling.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{Call, FnController, LoopbackSolver};
use cosim_circuit::ControlMode;
use cosim_core::units::s;
use cosim_sim::{
    ControllerRegistry, ResultSink, SchedulerConfig, SimError, SimOptions, SimProgress, SimRecord,
    SimResult, SimulationDriver, StepRecord,
};

fn options(steps: usize, max_control_iterations: usize) -> SimOptions {
    SimOptions {
        step: s(1.0),
        duration: s(steps as f64),
        scheduler: SchedulerConfig {
            max_control_iterations,
            error_tolerance: 1e-3,
            control_mode: ControlMode::Time,
        },
        ..SimOptions::default()
    }
}

#[test]
fn advances_then_solves_each_timestep() {
    let mut solver = LoopbackSolver::new(&["Load.a"]);
    let mut reg = ControllerRegistry::new();
    let times = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&times);
    reg.add(FnController::boxed("a", "Load.a", 1, move |_, _, t, first| {
        if first {
            log.borrow_mut().push(t);
        }
        Ok(0.0)
    }))
    .unwrap();

    let driver = SimulationDriver::new(options(3, 10)).unwrap();
    let record = driver.run(&mut solver, &mut reg).unwrap();

    assert_eq!(solver.mode, ControlMode::Time, "control mode forwarded");
    assert_eq!(
        solver.calls,
        vec![
            Call::Solve,
            Call::SolveNoControl,
            Call::Advance,
            Call::Solve,
            Call::SolveNoControl,
            Call::Advance,
            Call::Solve,
            Call::SolveNoControl,
        ]
    );
    assert_eq!(*times.borrow(), vec![0.0, 1.0, 2.0]);
    assert_eq!(record.len(), 3);
    assert!(record.steps.iter().all(|s| s.converged && s.iterations == 1));
    assert_eq!(record.steps[2].time_s, 2.0);
    assert_eq!(
        record.steps[1].date_time.format("%H:%M:%S").to_string(),
        "00:00:01"
    );
}

#[test]
fn non_converged_steps_are_recorded_and_run_continues() {
    let mut solver = LoopbackSolver::new(&["Load.a"]);
    let mut reg = ControllerRegistry::new();
    // Stubborn during t = 1 only.
    reg.add(FnController::boxed("a", "Load.a", 1, |_, _, t, _| {
        Ok(if t == 1.0 { 1.0 } else { 0.0 })
    }))
    .unwrap();

    let driver = SimulationDriver::new(options(4, 5)).unwrap();
    let mut record = SimRecord::new();
    let mut events: Vec<SimProgress> = Vec::new();
    let mut on_progress = |p: SimProgress| events.push(p);
    let summary = driver
        .run_with_progress(&mut solver, &mut reg, &mut record, Some(&mut on_progress))
        .unwrap();

    assert_eq!(summary.steps, 4);
    assert_eq!(summary.non_converged, 1);
    assert_eq!(summary.total_iterations, 1 + 5 + 1 + 1);

    let bad: Vec<&StepRecord> = record.non_converged().collect();
    assert_eq!(bad.len(), 1);
    assert_eq!(bad[0].step, 1);
    assert_eq!(bad[0].iterations, 5);
    assert_eq!(bad[0].max_residual, 1.0);

    assert_eq!(events.len(), 4);
    assert_eq!(events[0].non_converged, 0);
    assert_eq!(events[1].non_converged, 1);
    let last = events.last().unwrap();
    assert_eq!(last.step, 4);
    assert_eq!(last.total_steps, 4);
    assert_eq!(last.fraction_complete, 1.0);
}

#[test]
fn controllers_keep_state_across_timesteps() {
    let mut solver = LoopbackSolver::new(&["Load.a"]);
    let mut reg = ControllerRegistry::new();
    let mut calls = 0usize;
    let total = Rc::new(RefCell::new(0usize));
    let seen = Rc::clone(&total);
    reg.add(FnController::boxed("a", "Load.a", 1, move |_, _, _, _| {
        calls += 1;
        *seen.borrow_mut() = calls;
        Ok(0.0)
    }))
    .unwrap();

    SimulationDriver::new(options(5, 10))
        .unwrap()
        .run(&mut solver, &mut reg)
        .unwrap();
    assert_eq!(*total.borrow(), 5);
}

#[test]
fn full_solve_divergence_stops_the_run() {
    let mut solver = LoopbackSolver::new(&["Load.a"]);
    solver.diverge_solve_at = Some(3);
    let mut reg = ControllerRegistry::new();
    reg.add(FnController::constant("a", "Load.a", 0.0)).unwrap();

    let driver = SimulationDriver::new(options(5, 10)).unwrap();
    let mut record = SimRecord::new();
    let err = driver
        .run_with_progress(&mut solver, &mut reg, &mut record, None)
        .unwrap_err();
    assert!(
        matches!(err, SimError::SolverDiverged { stage: "timestep solve", time_s } if time_s == 2.0),
        "{err}"
    );
    assert_eq!(record.len(), 2, "steps before the failure were committed");
}

struct FailingSink {
    accepted: usize,
}

impl ResultSink for FailingSink {
    fn record(&mut self, step: &StepRecord) -> SimResult<()> {
        if self.accepted == 1 {
            return Err(SimError::Sink {
                step: step.step,
                reason: "sink is full".to_string(),
            });
        }
        self.accepted += 1;
        Ok(())
    }
}

#[test]
fn sink_errors_stop_the_run() {
    let mut solver = LoopbackSolver::new(&["Load.a"]);
    let mut reg = ControllerRegistry::new();
    let driver = SimulationDriver::new(options(3, 10)).unwrap();
    let mut sink = FailingSink { accepted: 0 };
    let err = driver
        .run_with_progress(&mut solver, &mut reg, &mut sink, None)
        .unwrap_err();
    assert!(matches!(err, SimError::Sink { step: 1, .. }), "{err}");
    assert_eq!(solver.count(Call::Solve), 2);
}
