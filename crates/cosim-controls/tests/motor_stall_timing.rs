//! Motor stall state machine against scripted terminal voltages.

mod common;

use common::{FakeElement, FakeSolver};
use cosim_controls::{Controller, MotorStallController, MotorStallSettings, MotorState};
use cosim_core::ElementId;

const T_PROTECTION: f64 = 3.0;
const T_RECONNECT: f64 = 5.0;

fn setup() -> (FakeSolver, MotorStallController) {
    let solver = FakeSolver::new(vec![
        FakeElement::new("Load.motor1")
            .with_param("kW", 50.0)
            .with_param("kvar", 20.0)
            .with_voltage(1.0),
    ]);
    let settings = MotorStallSettings {
        v_stall: 0.55,
        t_protection: T_PROTECTION,
        t_reconnect: T_RECONNECT,
        ..MotorStallSettings::default()
    };
    let ctl = MotorStallController::new(ElementId::new("Load", "motor1"), settings, &solver)
        .unwrap();
    (solver, ctl)
}

fn step(solver: &mut FakeSolver, ctl: &mut MotorStallController, t: f64, v: f64) -> f64 {
    solver.get("Load.motor1").set_voltage(v);
    ctl.update(solver, 0, t, true).unwrap()
}

#[test]
fn stall_protection_and_reconnect_timing() {
    let (mut solver, mut ctl) = setup();

    // Sag at t=0, held until t_protection + 1.
    let r = step(&mut solver, &mut ctl, 0.0, 0.4);
    assert_eq!(ctl.state(), MotorState::Stalled);
    assert!(r > 0.0);
    assert_eq!(solver.param("Load.motor1", "kW").as_f64(), Some(150.0));

    for t in [1.0, 2.0] {
        step(&mut solver, &mut ctl, t, 0.4);
        assert_eq!(ctl.state(), MotorState::Stalled, "t={t}");
    }

    step(&mut solver, &mut ctl, T_PROTECTION, 0.4);
    assert_eq!(ctl.state(), MotorState::Disconnected);
    assert_eq!(ctl.since(), T_PROTECTION);
    assert_eq!(solver.param("Load.motor1", "kW").as_f64(), Some(0.0));

    step(&mut solver, &mut ctl, T_PROTECTION + 1.0, 0.4);
    assert_eq!(ctl.state(), MotorState::Disconnected);

    // Voltage recovers, but reconnection waits for t_protection + t_reconnect.
    for t in [5.0, 6.0, 7.0] {
        step(&mut solver, &mut ctl, t, 1.0);
        assert_eq!(ctl.state(), MotorState::Disconnected, "t={t}");
    }
    step(&mut solver, &mut ctl, T_PROTECTION + T_RECONNECT, 1.0);
    assert_eq!(ctl.state(), MotorState::Running);
    assert_eq!(solver.param("Load.motor1", "kW").as_f64(), Some(50.0));
    assert_eq!(solver.param("Load.motor1", "kvar").as_f64(), Some(20.0));
}

#[test]
fn reconnection_requires_recovered_voltage() {
    let (mut solver, mut ctl) = setup();
    step(&mut solver, &mut ctl, 0.0, 0.4);
    step(&mut solver, &mut ctl, T_PROTECTION, 0.4);
    assert_eq!(ctl.state(), MotorState::Disconnected);

    step(&mut solver, &mut ctl, T_PROTECTION + T_RECONNECT, 0.5);
    assert_eq!(ctl.state(), MotorState::Disconnected, "still below Vstall");
    step(&mut solver, &mut ctl, 20.0, 0.9);
    assert_eq!(ctl.state(), MotorState::Running);
}

#[test]
fn repeated_updates_at_one_time_are_stable() {
    let (mut solver, mut ctl) = setup();
    let first = step(&mut solver, &mut ctl, 0.0, 0.4);
    let again = step(&mut solver, &mut ctl, 0.0, 0.4);
    assert!(first > 0.0);
    assert_eq!(again, 0.0, "no further change once stalled");
    assert_eq!(ctl.state(), MotorState::Stalled);
}
