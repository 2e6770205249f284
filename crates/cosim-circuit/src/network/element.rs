//! Element models of the reference network and their property protocol.

use cosim_core::{BusId, ElementId, energy_over, kw, kwh_of, s};
use nalgebra::Complex;

use crate::error::{CircuitError, CircuitResult};
use crate::traits::CircuitElement;
use crate::value::ParamValue;

pub(crate) type C64 = Complex<f64>;

/// System power base (kVA) for per-unit quantities.
pub(crate) const BASE_KVA: f64 = 1000.0;

/// Line-to-line over line-to-neutral voltage ratio.
pub(crate) const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Operating mode of a storage element (`State` property).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    #[default]
    Idling,
    Charging,
    Discharging,
}

impl StorageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idling => "IDLING",
            Self::Charging => "CHARGING",
            Self::Discharging => "DISCHARGING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IDLING" | "IDLE" => Some(Self::Idling),
            "CHARGING" | "CHARGE" => Some(Self::Charging),
            "DISCHARGING" | "DISCHARGE" => Some(Self::Discharging),
            _ => None,
        }
    }
}

/// Internal state of a storage element.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StorageState {
    pub kw_rated: f64,
    pub kwh_rated: f64,
    pub kwh_stored: f64,
    pub pct_reserve: f64,
    pub pct_charge: f64,
    pub pct_discharge: f64,
    pub mode: StorageMode,
    pub eff_charge: f64,
    pub eff_discharge: f64,
}

impl StorageState {
    pub fn pct_stored(&self) -> f64 {
        if self.kwh_rated <= 0.0 {
            return 0.0;
        }
        self.kwh_stored / self.kwh_rated * 100.0
    }

    /// Present output in kW, positive while discharging.
    pub fn output_kw(&self) -> f64 {
        const EPS: f64 = 1e-9;
        match self.mode {
            StorageMode::Discharging if self.pct_stored() > self.pct_reserve + EPS => {
                self.kw_rated * self.pct_discharge / 100.0
            }
            StorageMode::Charging if self.pct_stored() < 100.0 - EPS => {
                -self.kw_rated * self.pct_charge / 100.0
            }
            _ => 0.0,
        }
    }

    /// Integrate stored energy over `dt_s` at the present output.
    pub fn integrate(&mut self, dt_s: f64) {
        let p = self.output_kw();
        let moved_kwh = kwh_of(energy_over(kw(p.abs()), s(dt_s)));
        let reserve_kwh = self.kwh_rated * self.pct_reserve / 100.0;
        if p > 0.0 {
            let drawn = moved_kwh / self.eff_discharge.max(1e-6);
            self.kwh_stored = (self.kwh_stored - drawn).max(reserve_kwh.min(self.kwh_stored));
        } else if p < 0.0 {
            let stored = moved_kwh * self.eff_charge;
            self.kwh_stored = (self.kwh_stored + stored).min(self.kwh_rated);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ElementKind {
    Vsource {
        pu: f64,
        r1: f64,
        x1: f64,
    },
    Line {
        r1: f64,
        x1: f64,
    },
    Load {
        kw: f64,
        kvar: f64,
        daily: Option<String>,
        mult: f64,
    },
    PvSystem {
        pmpp: f64,
        kva: f64,
        irradiance: f64,
        kvar: f64,
        pct_pmpp: f64,
        daily: Option<String>,
        mult: f64,
    },
    Storage(StorageState),
    Fault {
        r: f64,
    },
    RegControl {
        vreg: f64,
        band: f64,
        tap_step: f64,
        max_tap: i32,
        tap: i32,
    },
}

/// Post-solve terminal quantities, per unit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct TerminalResult {
    pub v: [C64; 2],
    /// Current into terminal 1.
    pub i: C64,
    /// Complex power into each terminal.
    pub s: [C64; 2],
}

/// One device of the reference network.
#[derive(Debug, Clone)]
pub struct NetworkElement {
    pub(crate) id: ElementId,
    pub(crate) bus1: BusId,
    pub(crate) bus2: Option<BusId>,
    pub(crate) bus_names: [String; 2],
    pub(crate) enabled: bool,
    pub(crate) kind: ElementKind,
    pub(crate) result: TerminalResult,
    pub(crate) base_kv: f64,
}

impl NetworkElement {
    pub(crate) fn z_base(&self) -> f64 {
        self.base_kv * self.base_kv * 1000.0 / BASE_KVA
    }

    /// Admittance (pu) of a two-terminal series branch.
    pub(crate) fn series_admittance(&self) -> Option<C64> {
        if !self.enabled {
            return None;
        }
        let (r, x) = match &self.kind {
            ElementKind::Vsource { r1, x1, .. } | ElementKind::Line { r1, x1 } => (*r1, *x1),
            _ => return None,
        };
        let z = C64::new(r, x) / self.z_base();
        if z.norm() <= 0.0 {
            return None;
        }
        Some(z.inv())
    }

    /// Shunt admittance (pu) at bus1.
    pub(crate) fn shunt_admittance(&self) -> Option<C64> {
        match &self.kind {
            ElementKind::Fault { r } if self.enabled && *r > 0.0 => {
                Some(C64::new(self.z_base() / *r, 0.0))
            }
            _ => None,
        }
    }

    /// Constant-power demand (pu, consumption positive) at bus1.
    pub(crate) fn demand(&self) -> Option<C64> {
        if !self.enabled {
            return None;
        }
        let (p_kw, q_kvar) = match &self.kind {
            ElementKind::Load {
                kw, kvar, mult, ..
            } => (*kw * *mult, *kvar * *mult),
            ElementKind::PvSystem { .. } => {
                let (p, q) = self.pv_output();
                (-p, -q)
            }
            ElementKind::Storage(st) => (-st.output_kw(), 0.0),
            _ => return None,
        };
        Some(C64::new(p_kw, q_kvar) / BASE_KVA)
    }

    /// PV active/reactive output (kW, kvar), generation positive.
    pub(crate) fn pv_output(&self) -> (f64, f64) {
        match &self.kind {
            ElementKind::PvSystem {
                pmpp,
                kva,
                irradiance,
                kvar,
                pct_pmpp,
                mult,
                ..
            } => {
                let available = pmpp * irradiance * mult;
                let p = available.min(pmpp * pct_pmpp / 100.0).clamp(0.0, *kva);
                let q_max = (kva * kva - p * p).max(0.0).sqrt();
                (p, kvar.clamp(-q_max, q_max))
            }
            _ => (0.0, 0.0),
        }
    }

    pub(crate) fn is_two_terminal(&self) -> bool {
        matches!(self.kind, ElementKind::Line { .. })
    }

    pub(crate) fn daily_shape(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Load { daily, .. } | ElementKind::PvSystem { daily, .. } => {
                daily.as_deref()
            }
            _ => None,
        }
    }

    pub(crate) fn set_shape_mult(&mut self, value: f64) {
        if let ElementKind::Load { mult, .. } | ElementKind::PvSystem { mult, .. } =
            &mut self.kind
        {
            *mult = value;
        }
    }

    fn unknown_parameter(&self, name: &str) -> CircuitError {
        CircuitError::UnknownParameter {
            element: self.id.clone(),
            name: name.to_string(),
        }
    }

    fn invalid(&self, name: &str, reason: impl Into<String>) -> CircuitError {
        CircuitError::InvalidValue {
            element: self.id.clone(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    fn finite(&self, name: &str, value: &ParamValue) -> CircuitResult<f64> {
        match value.as_f64() {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(self.invalid(name, format!("'{value}' is not a finite number"))),
        }
    }

    fn percent(&self, name: &str, value: &ParamValue) -> CircuitResult<f64> {
        let v = self.finite(name, value)?;
        if !(0.0..=100.0).contains(&v) {
            return Err(self.invalid(name, format!("{v} is outside [0, 100]")));
        }
        Ok(v)
    }

    fn non_negative(&self, name: &str, value: &ParamValue) -> CircuitResult<f64> {
        let v = self.finite(name, value)?;
        if v < 0.0 {
            return Err(self.invalid(name, format!("{v} must be non-negative")));
        }
        Ok(v)
    }

    fn v_base_ln_volts(&self) -> f64 {
        self.base_kv * 1000.0 / SQRT_3
    }

    fn i_base_amps(&self) -> f64 {
        BASE_KVA / (SQRT_3 * self.base_kv)
    }

    fn terminal_count(&self) -> usize {
        if self.is_two_terminal() { 2 } else { 1 }
    }
}

fn mag_deg(c: C64, scale: f64) -> [f64; 2] {
    [c.norm() * scale, c.arg().to_degrees()]
}

impl CircuitElement for NetworkElement {
    fn id(&self) -> &ElementId {
        &self.id
    }

    fn parameter(&self, name: &str) -> CircuitResult<ParamValue> {
        let key = name.trim().to_ascii_lowercase();
        match key.as_str() {
            "bus1" => return Ok(ParamValue::Text(self.bus_names[0].clone())),
            "bus2" if self.bus2.is_some() => {
                return Ok(ParamValue::Text(self.bus_names[1].clone()));
            }
            "enabled" => return Ok(ParamValue::Flag(self.enabled)),
            _ => {}
        }
        let value = match (&self.kind, key.as_str()) {
            (ElementKind::Vsource { pu, .. }, "pu") => ParamValue::Number(*pu),
            (ElementKind::Vsource { r1, .. } | ElementKind::Line { r1, .. }, "r1") => {
                ParamValue::Number(*r1)
            }
            (ElementKind::Vsource { x1, .. } | ElementKind::Line { x1, .. }, "x1") => {
                ParamValue::Number(*x1)
            }
            (ElementKind::Load { kw, .. }, "kw") => ParamValue::Number(*kw),
            (ElementKind::Load { kvar, .. }, "kvar") => ParamValue::Number(*kvar),
            (ElementKind::Load { mult, .. } | ElementKind::PvSystem { mult, .. }, "mult") => {
                ParamValue::Number(*mult)
            }
            (
                ElementKind::Load { daily, .. } | ElementKind::PvSystem { daily, .. },
                "daily",
            ) => ParamValue::Text(daily.clone().unwrap_or_default()),
            (ElementKind::PvSystem { pmpp, .. }, "pmpp") => ParamValue::Number(*pmpp),
            (ElementKind::PvSystem { kva, .. }, "kva") => ParamValue::Number(*kva),
            (ElementKind::PvSystem { irradiance, .. }, "irradiance") => {
                ParamValue::Number(*irradiance)
            }
            (ElementKind::PvSystem { kvar, .. }, "kvar") => ParamValue::Number(*kvar),
            (ElementKind::PvSystem { pct_pmpp, .. }, "%pmpp") => ParamValue::Number(*pct_pmpp),
            (ElementKind::PvSystem { .. }, "kw") => ParamValue::Number(self.pv_output().0),
            (ElementKind::Storage(st), "kwrated") => ParamValue::Number(st.kw_rated),
            (ElementKind::Storage(st), "kwhrated") => ParamValue::Number(st.kwh_rated),
            (ElementKind::Storage(st), "kwhstored") => ParamValue::Number(st.kwh_stored),
            (ElementKind::Storage(st), "%stored") => ParamValue::Number(st.pct_stored()),
            (ElementKind::Storage(st), "%reserve") => ParamValue::Number(st.pct_reserve),
            (ElementKind::Storage(st), "%charge") => ParamValue::Number(st.pct_charge),
            (ElementKind::Storage(st), "%discharge") => ParamValue::Number(st.pct_discharge),
            (ElementKind::Storage(st), "%effcharge") => ParamValue::Number(st.eff_charge * 100.0),
            (ElementKind::Storage(st), "%effdischarge") => {
                ParamValue::Number(st.eff_discharge * 100.0)
            }
            (ElementKind::Storage(st), "state") => ParamValue::Text(st.mode.as_str().to_string()),
            (ElementKind::Storage(st), "kw") => ParamValue::Number(st.output_kw()),
            (ElementKind::Fault { r }, "r") => ParamValue::Number(*r),
            (ElementKind::RegControl { vreg, .. }, "vreg") => ParamValue::Number(*vreg),
            (ElementKind::RegControl { band, .. }, "band") => ParamValue::Number(*band),
            (ElementKind::RegControl { tap_step, .. }, "tapstep") => ParamValue::Number(*tap_step),
            (ElementKind::RegControl { max_tap, .. }, "maxtap") => {
                ParamValue::Number(f64::from(*max_tap))
            }
            (ElementKind::RegControl { tap, .. }, "tap") => ParamValue::Number(f64::from(*tap)),
            _ => return Err(self.unknown_parameter(name)),
        };
        Ok(value)
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> CircuitResult<()> {
        let key = name.trim().to_ascii_lowercase();
        if key == "enabled" {
            self.enabled = value
                .as_bool()
                .ok_or_else(|| self.invalid(name, format!("'{value}' is not a flag")))?;
            return Ok(());
        }
        match key.as_str() {
            "kw" | "kvar" | "pu" | "r1" | "x1" | "pmpp" | "kva" | "irradiance" | "r"
            | "kwrated" | "kwhrated" | "vreg" | "band" | "tapstep" | "tap" | "maxtap"
            | "%pmpp" | "%stored" | "%reserve" | "%charge" | "%discharge" | "%effcharge"
            | "%effdischarge" | "state" | "daily" => {}
            _ => return Err(self.unknown_parameter(name)),
        }

        let number = |s: &Self| s.finite(name, &value);
        let non_negative = |s: &Self| s.non_negative(name, &value);
        let percent = |s: &Self| s.percent(name, &value);

        // Validate before borrowing the kind mutably.
        let parsed: ParsedValue = match (&self.kind, key.as_str()) {
            (ElementKind::Load { .. }, "kw" | "kvar")
            | (ElementKind::PvSystem { .. }, "kvar")
            | (ElementKind::RegControl { .. }, "tap") => ParsedValue::Number(number(self)?),
            (ElementKind::Vsource { .. }, "pu")
            | (ElementKind::Vsource { .. } | ElementKind::Line { .. }, "r1" | "x1")
            | (ElementKind::PvSystem { .. }, "pmpp" | "kva" | "irradiance")
            | (ElementKind::Storage(_), "kwrated" | "kwhrated")
            | (ElementKind::Fault { .. }, "r")
            | (ElementKind::RegControl { .. }, "vreg" | "band" | "tapstep" | "maxtap") => {
                ParsedValue::Number(non_negative(self)?)
            }
            (ElementKind::PvSystem { .. }, "%pmpp")
            | (
                ElementKind::Storage(_),
                "%stored" | "%reserve" | "%charge" | "%discharge" | "%effcharge"
                | "%effdischarge",
            ) => ParsedValue::Number(percent(self)?),
            (ElementKind::Storage(_), "state") => {
                let text = value.as_text().unwrap_or_default();
                let mode = StorageMode::parse(text)
                    .ok_or_else(|| self.invalid(name, format!("unknown state '{value}'")))?;
                ParsedValue::Mode(mode)
            }
            (ElementKind::Load { .. } | ElementKind::PvSystem { .. }, "daily") => {
                let text = value.to_string();
                ParsedValue::Text((!text.trim().is_empty()).then(|| text.trim().to_string()))
            }
            _ => return Err(self.unknown_parameter(name)),
        };

        match (&mut self.kind, key.as_str(), parsed) {
            (ElementKind::Vsource { pu, .. }, "pu", ParsedValue::Number(v)) => *pu = v,
            (
                ElementKind::Vsource { r1, .. } | ElementKind::Line { r1, .. },
                "r1",
                ParsedValue::Number(v),
            ) => *r1 = v,
            (
                ElementKind::Vsource { x1, .. } | ElementKind::Line { x1, .. },
                "x1",
                ParsedValue::Number(v),
            ) => *x1 = v,
            (ElementKind::Load { kw, .. }, "kw", ParsedValue::Number(v)) => *kw = v,
            (ElementKind::Load { kvar, .. }, "kvar", ParsedValue::Number(v)) => *kvar = v,
            (
                ElementKind::Load { daily, .. } | ElementKind::PvSystem { daily, .. },
                "daily",
                ParsedValue::Text(v),
            ) => *daily = v,
            (ElementKind::PvSystem { pmpp, .. }, "pmpp", ParsedValue::Number(v)) => *pmpp = v,
            (ElementKind::PvSystem { kva, .. }, "kva", ParsedValue::Number(v)) => *kva = v,
            (ElementKind::PvSystem { irradiance, .. }, "irradiance", ParsedValue::Number(v)) => {
                *irradiance = v
            }
            (ElementKind::PvSystem { kvar, .. }, "kvar", ParsedValue::Number(v)) => *kvar = v,
            (ElementKind::PvSystem { pct_pmpp, .. }, "%pmpp", ParsedValue::Number(v)) => {
                *pct_pmpp = v
            }
            (ElementKind::Storage(st), "kwrated", ParsedValue::Number(v)) => st.kw_rated = v,
            (ElementKind::Storage(st), "kwhrated", ParsedValue::Number(v)) => {
                st.kwh_rated = v;
                st.kwh_stored = st.kwh_stored.min(v);
            }
            (ElementKind::Storage(st), "%stored", ParsedValue::Number(v)) => {
                st.kwh_stored = st.kwh_rated * v / 100.0
            }
            (ElementKind::Storage(st), "%reserve", ParsedValue::Number(v)) => st.pct_reserve = v,
            (ElementKind::Storage(st), "%charge", ParsedValue::Number(v)) => st.pct_charge = v,
            (ElementKind::Storage(st), "%discharge", ParsedValue::Number(v)) => {
                st.pct_discharge = v
            }
            (ElementKind::Storage(st), "%effcharge", ParsedValue::Number(v)) => {
                st.eff_charge = v / 100.0
            }
            (ElementKind::Storage(st), "%effdischarge", ParsedValue::Number(v)) => {
                st.eff_discharge = v / 100.0
            }
            (ElementKind::Storage(st), "state", ParsedValue::Mode(mode)) => st.mode = mode,
            (ElementKind::Fault { r }, "r", ParsedValue::Number(v)) => *r = v,
            (ElementKind::RegControl { vreg, .. }, "vreg", ParsedValue::Number(v)) => *vreg = v,
            (ElementKind::RegControl { band, .. }, "band", ParsedValue::Number(v)) => *band = v,
            (ElementKind::RegControl { tap_step, .. }, "tapstep", ParsedValue::Number(v)) => {
                *tap_step = v
            }
            (ElementKind::RegControl { max_tap, tap, .. }, "maxtap", ParsedValue::Number(v)) => {
                *max_tap = v.round() as i32;
                *tap = (*tap).clamp(-*max_tap, *max_tap);
            }
            (ElementKind::RegControl { max_tap, tap, .. }, "tap", ParsedValue::Number(v)) => {
                *tap = (v.round() as i32).clamp(-*max_tap, *max_tap)
            }
            _ => return Err(self.unknown_parameter(name)),
        }
        Ok(())
    }

    fn variable(&self, name: &str) -> CircuitResult<Vec<f64>> {
        let terminals = self.terminal_count();
        let r = &self.result;
        let mut out = Vec::with_capacity(2 * terminals);
        match name.trim().to_ascii_lowercase().as_str() {
            "powers" => {
                for s in &r.s[..terminals] {
                    out.push(s.re * BASE_KVA);
                    out.push(s.im * BASE_KVA);
                }
            }
            "voltagesmagang" => {
                let base = self.v_base_ln_volts();
                for v in &r.v[..terminals] {
                    out.extend(mag_deg(*v, base));
                }
            }
            "puvmagangle" => {
                for v in &r.v[..terminals] {
                    out.extend(mag_deg(*v, 1.0));
                }
            }
            "currentsmagang" => {
                let base = self.i_base_amps();
                out.extend(mag_deg(r.i, base));
                if terminals == 2 {
                    out.extend(mag_deg(-r.i, base));
                }
            }
            _ => {
                return Err(CircuitError::UnknownVariable {
                    element: self.id.clone(),
                    name: name.to_string(),
                });
            }
        }
        Ok(out)
    }
}

enum ParsedValue {
    Number(f64),
    Mode(StorageMode),
    Text(Option<String>),
}
