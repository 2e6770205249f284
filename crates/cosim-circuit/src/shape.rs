//! Cyclic multiplier profiles applied to loads and PV irradiance.

use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, CircuitResult};

/// Fixed-interval multiplier profile that wraps around at its end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadShape {
    pub name: String,
    /// Spacing between multipliers (seconds).
    pub interval_s: f64,
    pub mult: Vec<f64>,
}

impl LoadShape {
    pub fn new(name: impl Into<String>, interval_s: f64, mult: Vec<f64>) -> CircuitResult<Self> {
        let name = name.into();
        if interval_s.is_nan() || interval_s <= 0.0 {
            return Err(CircuitError::Topology {
                what: format!("loadshape '{name}' interval must be positive"),
            });
        }
        if mult.is_empty() {
            return Err(CircuitError::Topology {
                what: format!("loadshape '{name}' has no multipliers"),
            });
        }
        Ok(Self {
            name,
            interval_s,
            mult,
        })
    }

    /// Multiplier in effect at `t` seconds (zero-order hold, cyclic).
    pub fn at(&self, t: f64) -> f64 {
        let n = self.mult.len();
        let slot = (t.max(0.0) / self.interval_s + 1e-9).floor() as usize;
        self.mult[slot % n]
    }
}
