//! Flat key/value settings records and their typed views.
//!
//! Every controller owns a fresh settings struct deserialized from its own
//! record. Missing keys fall back to the struct's `Default`; unknown keys and
//! malformed values are rejected with [`ControlError::InvalidSettings`].

use cosim_core::ElementId;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ControlError, ControlResult};

/// Settings record as read from a scenario file.
pub type SettingsRecord = Map<String, Value>;

/// Typed controller settings.
pub trait ControllerSettings: DeserializeOwned {
    /// Semantic checks that serde cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Deserialize and validate the settings of controller `tag` on `element`.
pub fn parse_settings<T: ControllerSettings>(
    tag: &str,
    element: &ElementId,
    record: &SettingsRecord,
) -> ControlResult<T> {
    let invalid = |reason: String| ControlError::InvalidSettings {
        controller: tag.to_string(),
        element: element.clone(),
        reason,
    };
    let settings: T =
        serde_json::from_value(Value::Object(record.clone())).map_err(|e| invalid(e.to_string()))?;
    settings.validate().map_err(invalid)?;
    Ok(settings)
}

pub(crate) fn require_positive(value: f64, what: &str) -> Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{what} must be positive, got {value}"))
    }
}

pub(crate) fn require_non_negative(value: f64, what: &str) -> Result<(), String> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(format!("{what} must be non-negative, got {value}"))
    }
}

/// Curve points must be finite with strictly increasing abscissae.
pub(crate) fn require_curve(points: &[(f64, f64)], what: &str) -> Result<(), String> {
    if points.len() < 2 {
        return Err(format!("{what} needs at least two points"));
    }
    if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return Err(format!("{what} has non-finite points"));
    }
    if points.windows(2).any(|w| w[1].0 <= w[0].0) {
        return Err(format!("{what} voltages must be strictly increasing"));
    }
    Ok(())
}
