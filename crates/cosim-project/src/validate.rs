//! Scenario validation logic.
//!
//! Structural checks only. Element electrical limits are enforced when the
//! network is built and controller settings when the factory creates them.

use std::collections::HashSet;

use cosim_core::ElementId;

use crate::schema::{CircuitDef, ElementKindDef, LATEST_VERSION, Project, SimulationDef};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_project(project: &Project) -> Result<(), ValidationError> {
    if project.version == 0 || project.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: project.version,
        });
    }

    validate_simulation(&project.simulation)?;
    let elements = validate_circuit(&project.circuit)?;

    let mut attached = HashSet::new();
    for (i, controller) in project.controllers.iter().enumerate() {
        let context = format!("controllers[{i}]");
        if controller.kind.trim().is_empty() {
            return Err(invalid(&format!("{context}.type"), "", "must not be empty"));
        }
        let id: ElementId =
            controller
                .element
                .parse()
                .map_err(|_| ValidationError::InvalidValue {
                    field: format!("{context}.element"),
                    value: controller.element.clone(),
                    reason: "expected Class.name".to_string(),
                })?;
        if !elements.contains(&id) {
            return Err(ValidationError::MissingReference {
                id: controller.element.clone(),
                context,
            });
        }
        if !attached.insert((id, controller.kind.to_ascii_lowercase())) {
            return Err(ValidationError::DuplicateId {
                id: format!("{} on {}", controller.kind, controller.element),
                context: "controllers".to_string(),
            });
        }
    }

    Ok(())
}

fn validate_simulation(sim: &SimulationDef) -> Result<(), ValidationError> {
    positive("simulation.step_s", sim.step_s)?;
    positive("simulation.duration_s", sim.duration_s)?;
    if sim.max_steps == 0 {
        return Err(invalid("simulation.max_steps", "0", "must be at least 1"));
    }
    if sim.max_control_iterations == 0 {
        return Err(invalid(
            "simulation.max_control_iterations",
            "0",
            "must be at least 1",
        ));
    }
    if !sim.error_tolerance.is_finite() || sim.error_tolerance < 0.0 {
        return Err(invalid(
            "simulation.error_tolerance",
            &sim.error_tolerance.to_string(),
            "must be finite and non-negative",
        ));
    }
    Ok(())
}

/// Returns the ids of every declared element.
fn validate_circuit(circuit: &CircuitDef) -> Result<HashSet<ElementId>, ValidationError> {
    positive("circuit.base_kv", circuit.base_kv)?;

    let mut shapes = HashSet::new();
    for shape in &circuit.shapes {
        if !shapes.insert(shape.name.to_ascii_lowercase()) {
            return Err(ValidationError::DuplicateId {
                id: shape.name.clone(),
                context: "circuit.shapes".to_string(),
            });
        }
        positive(&format!("shape '{}'.interval_s", shape.name), shape.interval_s)?;
        if shape.mult.is_empty() {
            return Err(invalid(
                &format!("shape '{}'.mult", shape.name),
                "[]",
                "needs at least one multiplier",
            ));
        }
        if let Some(bad) = shape.mult.iter().find(|m| !m.is_finite()) {
            return Err(invalid(
                &format!("shape '{}'.mult", shape.name),
                &bad.to_string(),
                "multipliers must be finite",
            ));
        }
    }

    let mut ids = HashSet::new();
    for element in &circuit.elements {
        if element.name.trim().is_empty() || element.name.contains('.') {
            return Err(invalid(
                "circuit.elements.name",
                &element.name,
                "must be non-empty and contain no '.'",
            ));
        }
        if !ids.insert(ElementId::new(element.kind.class(), &element.name)) {
            return Err(ValidationError::DuplicateId {
                id: element.full_name(),
                context: "circuit.elements".to_string(),
            });
        }
        if let Some(shape) = element.kind.daily() {
            if !shapes.contains(&shape.to_ascii_lowercase()) {
                return Err(ValidationError::MissingReference {
                    id: shape.to_string(),
                    context: format!("{} daily", element.full_name()),
                });
            }
        }
    }

    if !circuit
        .elements
        .iter()
        .any(|e| matches!(e.kind, ElementKindDef::Vsource(_)))
    {
        return Err(invalid(
            "circuit.elements",
            &circuit.elements.len().to_string(),
            "needs a Vsource",
        ));
    }

    Ok(ids)
}

fn positive(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, &value.to_string(), "must be positive"))
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
