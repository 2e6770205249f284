use cosim_circuit::{LoadSpec, VsourceSpec};
use cosim_project::*;

fn base() -> Project {
    Project {
        version: 1,
        name: "v".to_string(),
        circuit: CircuitDef {
            name: "v".to_string(),
            base_kv: 12.47,
            options: Default::default(),
            shapes: vec![],
            elements: vec![
                ElementDef {
                    name: "source".to_string(),
                    kind: ElementKindDef::Vsource(VsourceSpec::default()),
                },
                ElementDef {
                    name: "motor".to_string(),
                    kind: ElementKindDef::Load(LoadSpec {
                        bus: "sourcebus".to_string(),
                        kw: 20.0,
                        ..LoadSpec::default()
                    }),
                },
            ],
        },
        controllers: vec![ControllerDef {
            element: "Load.motor".to_string(),
            kind: "MotorStall".to_string(),
            settings: Default::default(),
        }],
        simulation: SimulationDef::default(),
    }
}

#[test]
fn base_project_validates() {
    validate_project(&base()).unwrap();
}

#[test]
fn future_version_is_unsupported() {
    let mut p = base();
    p.version = LATEST_VERSION + 1;
    assert!(matches!(
        validate_project(&p),
        Err(ValidationError::UnsupportedVersion { version }) if version == LATEST_VERSION + 1
    ));
}

#[test]
fn controller_element_must_exist() {
    let mut p = base();
    p.controllers[0].element = "Load.pump".to_string();
    assert!(matches!(
        validate_project(&p),
        Err(ValidationError::MissingReference { ref id, .. }) if id == "Load.pump"
    ));
}

#[test]
fn controller_element_lookup_ignores_case() {
    let mut p = base();
    p.controllers[0].element = "LOAD.Motor".to_string();
    validate_project(&p).unwrap();
}

#[test]
fn controller_element_needs_a_class() {
    let mut p = base();
    p.controllers[0].element = "motor".to_string();
    assert!(matches!(
        validate_project(&p),
        Err(ValidationError::InvalidValue { ref field, .. }) if field == "controllers[0].element"
    ));
}

#[test]
fn same_controller_type_twice_on_one_element_is_rejected() {
    let mut p = base();
    let again = p.controllers[0].clone();
    p.controllers.push(again);
    assert!(matches!(
        validate_project(&p),
        Err(ValidationError::DuplicateId { .. })
    ));
}

#[test]
fn duplicate_element_names_within_a_class() {
    let mut p = base();
    let dup = p.circuit.elements[1].clone();
    p.circuit.elements.push(dup);
    assert!(matches!(
        validate_project(&p),
        Err(ValidationError::DuplicateId { ref id, .. }) if id == "Load.motor"
    ));
}

#[test]
fn circuit_needs_a_source() {
    let mut p = base();
    p.circuit.elements.remove(0);
    assert!(matches!(
        validate_project(&p),
        Err(ValidationError::InvalidValue { ref reason, .. }) if reason == "needs a Vsource"
    ));
}

#[test]
fn daily_shape_must_be_declared() {
    let mut p = base();
    if let ElementKindDef::Load(spec) = &mut p.circuit.elements[1].kind {
        spec.daily = Some("weekday".to_string());
    }
    assert!(matches!(
        validate_project(&p),
        Err(ValidationError::MissingReference { ref id, .. }) if id == "weekday"
    ));
}

#[test]
fn simulation_ranges() {
    let mut p = base();
    p.simulation.step_s = 0.0;
    assert!(validate_project(&p).is_err());

    let mut p = base();
    p.simulation.max_control_iterations = 0;
    assert!(validate_project(&p).is_err());

    let mut p = base();
    p.simulation.error_tolerance = f64::NAN;
    assert!(validate_project(&p).is_err());

    let mut p = base();
    p.simulation.error_tolerance = 0.0;
    validate_project(&p).unwrap();
}
