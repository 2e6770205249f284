//! Construction parameters for network elements.
//!
//! Impedances are in ohms, powers in kW/kvar/kVA, energies in kWh.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VsourceSpec {
    pub bus: String,
    /// Source voltage magnitude (pu).
    pub pu: f64,
    pub r1: f64,
    pub x1: f64,
}

impl Default for VsourceSpec {
    fn default() -> Self {
        Self {
            bus: "sourcebus".to_string(),
            pu: 1.0,
            r1: 0.05,
            x1: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LineSpec {
    pub bus1: String,
    pub bus2: String,
    pub r1: f64,
    pub x1: f64,
}

impl Default for LineSpec {
    fn default() -> Self {
        Self {
            bus1: String::new(),
            bus2: String::new(),
            r1: 0.3,
            x1: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadSpec {
    pub bus: String,
    pub kw: f64,
    pub kvar: f64,
    /// Name of a load shape scaling `kw`/`kvar` over time.
    pub daily: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PvSpec {
    pub bus: String,
    pub pmpp: f64,
    pub kva: f64,
    pub irradiance: f64,
    pub kvar: f64,
    pub pct_pmpp: f64,
    /// Name of a load shape scaling irradiance over time.
    pub daily: Option<String>,
}

impl Default for PvSpec {
    fn default() -> Self {
        Self {
            bus: String::new(),
            pmpp: 100.0,
            kva: 110.0,
            irradiance: 1.0,
            kvar: 0.0,
            pct_pmpp: 100.0,
            daily: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSpec {
    pub bus: String,
    pub kw_rated: f64,
    pub kwh_rated: f64,
    pub pct_stored: f64,
    pub pct_reserve: f64,
    pub pct_eff_charge: f64,
    pub pct_eff_discharge: f64,
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self {
            bus: String::new(),
            kw_rated: 100.0,
            kwh_rated: 400.0,
            pct_stored: 50.0,
            pct_reserve: 20.0,
            pct_eff_charge: 90.0,
            pct_eff_discharge: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaultSpec {
    pub bus: String,
    /// Fault resistance to ground.
    pub r: f64,
    pub enabled: bool,
}

impl Default for FaultSpec {
    fn default() -> Self {
        Self {
            bus: String::new(),
            r: 0.5,
            enabled: false,
        }
    }
}

/// Tap-changing regulator acting on the source voltage, sensing `bus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegControlSpec {
    pub bus: String,
    pub vreg: f64,
    /// Full bandwidth (pu) centred on `vreg`.
    pub band: f64,
    pub tap_step: f64,
    pub max_tap: i32,
}

impl Default for RegControlSpec {
    fn default() -> Self {
        Self {
            bus: String::new(),
            vreg: 1.0,
            band: 0.02,
            tap_step: 0.00625,
            max_tap: 16,
        }
    }
}
