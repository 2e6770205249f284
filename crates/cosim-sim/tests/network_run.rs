//! End-to-end runs of factory-built controllers on the reference network.

use chrono::NaiveDate;
use cosim_circuit::{
    CircuitElement, LineSpec, LoadShape, LoadSpec, Network, NetworkOptions, PowerFlowSolver,
    StorageSpec, VsourceSpec,
};
use cosim_controls::{ControllerFactory, SettingsRecord};
use cosim_core::ElementId;
use cosim_core::units::s;
use cosim_sim::{ControllerRegistry, SchedulerConfig, SimOptions, SimRecord, SimulationDriver};
use serde_json::json;

fn id(name: &str) -> ElementId {
    name.parse().unwrap()
}

/// 1.7 MW block load following a 1 s shape: normal, peak, valley, normal.
fn network() -> Network {
    let start = NaiveDate::from_ymd_opt(2024, 8, 1)
        .unwrap()
        .and_hms_opt(17, 0, 0)
        .unwrap();
    let mut net = Network::new("shaving", 12.47, start, NetworkOptions::default()).unwrap();
    net.add_shape(LoadShape::new("evening", 1.0, vec![1.0, 1.35, 0.6, 1.0]).unwrap())
        .unwrap();
    net.add_vsource("source", &VsourceSpec::default()).unwrap();
    net.add_line(
        "feeder",
        &LineSpec {
            bus1: "sourcebus".to_string(),
            bus2: "loadbus".to_string(),
            ..LineSpec::default()
        },
    )
    .unwrap();
    net.add_load(
        "block",
        &LoadSpec {
            bus: "loadbus".to_string(),
            kw: 1700.0,
            kvar: 300.0,
            daily: Some("evening".to_string()),
        },
    )
    .unwrap();
    net.add_storage(
        "bess",
        &StorageSpec {
            bus: "loadbus".to_string(),
            kw_rated: 500.0,
            kwh_rated: 2000.0,
            pct_stored: 60.0,
            ..StorageSpec::default()
        },
    )
    .unwrap();
    net
}

fn run_for(steps: usize) -> (Network, SimRecord) {
    run_shaving(
        steps,
        json!({
            "Control1": "PS",
            "PS_ub": 2100.0,
            "PS_lb": 1500.0,
            "DampCoef": 1.0,
        }),
        SchedulerConfig {
            max_control_iterations: 30,
            error_tolerance: 1e-4,
            ..SchedulerConfig::default()
        },
    )
}

fn run_shaving(
    steps: usize,
    settings: serde_json::Value,
    scheduler: SchedulerConfig,
) -> (Network, SimRecord) {
    let mut net = network();
    let settings: SettingsRecord = match settings {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    let controller = ControllerFactory::default()
        .create(id("Storage.bess"), "StorageController", &settings, &mut net)
        .unwrap();
    let mut reg = ControllerRegistry::new();
    reg.add(controller).unwrap();

    let driver = SimulationDriver::new(SimOptions {
        step: s(1.0),
        duration: s(steps as f64),
        scheduler,
        ..SimOptions::default()
    })
    .unwrap();
    let record = driver.run(&mut net, &mut reg).unwrap();
    (net, record)
}

fn storage_state(net: &Network) -> String {
    let handle = net.require_element(&id("Storage.bess")).unwrap();
    net.element(handle)
        .unwrap()
        .parameter("State")
        .unwrap()
        .to_string()
}

#[test]
fn peak_shaving_follows_the_load_shape() {
    let (net, record) = run_for(1);
    assert_eq!(storage_state(&net), "IDLING");
    assert_eq!(record.len(), 1);

    let (net, record) = run_for(2);
    assert_eq!(storage_state(&net), "DISCHARGING");
    assert!(record.steps[1].iterations > 1, "dispatch needs a settling iteration");
    assert!(net.total_power()[0] < 2110.0);

    let (net, _) = run_for(3);
    assert_eq!(storage_state(&net), "CHARGING");

    let (net, record) = run_for(4);
    assert_eq!(storage_state(&net), "IDLING");
    assert_eq!(record.non_converged().count(), 0);
    assert_eq!(
        record.steps[3].date_time,
        NaiveDate::from_ymd_opt(2024, 8, 1)
            .unwrap()
            .and_hms_opt(17, 0, 3)
            .unwrap()
    );
}

fn storage_number(net: &Network, name: &str) -> f64 {
    let handle = net.require_element(&id("Storage.bess")).unwrap();
    net.element(handle).unwrap().number(name).unwrap()
}

#[test]
fn default_damping_returns_to_idle_inside_the_band() {
    let settings = json!({ "PS_ub": 2100.0, "PS_lb": 1500.0 });

    let (net, _) = run_shaving(3, settings.clone(), SchedulerConfig::default());
    assert_eq!(storage_state(&net), "CHARGING");
    assert!(storage_number(&net, "%Charge") > 0.0);

    // Back to the nominal load after the valley.
    let (net, record) = run_shaving(4, settings.clone(), SchedulerConfig::default());
    assert_eq!(storage_state(&net), "IDLING");
    assert_eq!(storage_number(&net, "%Charge"), 0.0);
    assert_eq!(storage_number(&net, "%Discharge"), 0.0);
    assert!(record.steps[3].converged);

    let (net, _) = run_shaving(5, settings, SchedulerConfig::default());
    assert_eq!(storage_state(&net), "IDLING");
}

#[test]
fn tight_budget_flags_without_failing() {
    let mut net = network();
    let settings: SettingsRecord = match json!({ "PS_ub": 2100.0, "PS_lb": 1500.0, "DampCoef": 0.1 }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    let mut reg = ControllerRegistry::new();
    reg.add(
        ControllerFactory::default()
            .create(id("Storage.bess"), "StorageController", &settings, &mut net)
            .unwrap(),
    )
    .unwrap();

    let driver = SimulationDriver::new(SimOptions {
        step: s(1.0),
        duration: s(2.0),
        scheduler: SchedulerConfig {
            max_control_iterations: 2,
            error_tolerance: 1e-6,
            ..SchedulerConfig::default()
        },
        ..SimOptions::default()
    })
    .unwrap();
    let record = driver.run(&mut net, &mut reg).unwrap();
    let flagged: Vec<usize> = record.non_converged().map(|s| s.step).collect();
    assert_eq!(flagged, vec![1]);
    assert_eq!(record.steps[1].iterations, 2);
}
