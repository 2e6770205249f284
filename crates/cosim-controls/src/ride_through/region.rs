//! Ride-through regions of the (time in violation, voltage) plane.
//!
//! Each IEEE 1547-2018 abnormal-performance category is described by a set of
//! closed polygons. Classification walks the region kinds in precedence order
//! (continuous, must trip, mandatory operation, momentary cessation); a point
//! inside none of them lies in the may-trip zone.

use serde::{Deserialize, Serialize};

/// Upper bound of the time axis (s); longer violations are clamped to it.
pub const T_MAX: f64 = 1.0e4;
/// Upper bound of the voltage axis (pu).
pub const V_MAX: f64 = 2.0;

/// Operating region of a DER terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    ContinuousOperation,
    /// Mandatory operation; output is current-limited.
    CurrentLimited,
    MomentaryCessation,
    MayTrip,
    MustTrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RideThroughCategory {
    #[serde(rename = "I", alias = "Category I")]
    I,
    #[default]
    #[serde(rename = "II", alias = "Category II")]
    II,
    #[serde(rename = "III", alias = "Category III")]
    III,
}

/// Closed polygon with vertices as `(t, v)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn new(vertices: Vec<(f64, f64)>) -> Self {
        Self { vertices }
    }

    pub fn rect(t0: f64, t1: f64, v0: f64, v1: f64) -> Self {
        Self::new(vec![(t0, v0), (t1, v0), (t1, v1), (t0, v1)])
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Point-in-polygon by ray casting; points on an edge are inside.
    pub fn contains(&self, t: f64, v: f64) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (ti, vi) = self.vertices[i];
            let (tj, vj) = self.vertices[j];
            if on_segment((ti, vi), (tj, vj), (t, v)) {
                return true;
            }
            if (vi > v) != (vj > v) {
                let t_cross = ti + (v - vi) * (tj - ti) / (vj - vi);
                if t < t_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    const EPS: f64 = 1e-12;
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    if cross.abs() > EPS * (1.0 + (b.0 - a.0).abs() + (b.1 - a.1).abs()) {
        return false;
    }
    p.0 >= a.0.min(b.0) - EPS
        && p.0 <= a.0.max(b.0) + EPS
        && p.1 >= a.1.min(b.1) - EPS
        && p.1 <= a.1.max(b.1) + EPS
}

/// Region polygons of one category.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMap {
    category: RideThroughCategory,
    continuous: (f64, f64),
    polygons: Vec<(Region, Polygon)>,
}

impl RegionMap {
    pub fn for_category(category: RideThroughCategory) -> Self {
        use Region::*;

        let t = T_MAX;
        let polygons = match category {
            RideThroughCategory::I => vec![
                (MustTrip, Polygon::rect(2.0, t, 0.0, 0.70)),
                (MustTrip, Polygon::rect(0.16, t, 0.0, 0.45)),
                (MustTrip, Polygon::rect(2.0, t, 1.10, 1.20)),
                (MustTrip, Polygon::rect(0.16, t, 1.20, V_MAX)),
                (
                    CurrentLimited,
                    Polygon::new(vec![(0.0, 0.70), (0.7, 0.70), (1.42, 0.88), (0.0, 0.88)]),
                ),
                (MomentaryCessation, Polygon::rect(0.0, 0.16, 0.0, 0.50)),
                (MomentaryCessation, Polygon::rect(0.0, 0.16, 1.20, V_MAX)),
            ],
            RideThroughCategory::II => vec![
                (MustTrip, Polygon::rect(10.0, t, 0.0, 0.70)),
                (MustTrip, Polygon::rect(0.16, t, 0.0, 0.45)),
                (MustTrip, Polygon::rect(2.0, t, 1.10, 1.20)),
                (MustTrip, Polygon::rect(0.16, t, 1.20, V_MAX)),
                (
                    CurrentLimited,
                    Polygon::new(vec![(0.0, 0.65), (3.0, 0.65), (5.0, 0.88), (0.0, 0.88)]),
                ),
                (MomentaryCessation, Polygon::rect(0.0, 0.16, 0.0, 0.30)),
                (MomentaryCessation, Polygon::rect(0.0, 0.16, 1.20, V_MAX)),
            ],
            RideThroughCategory::III => vec![
                (MustTrip, Polygon::rect(21.0, t, 0.0, 0.88)),
                (MustTrip, Polygon::rect(2.0, t, 0.0, 0.50)),
                (MustTrip, Polygon::rect(13.0, t, 1.10, 1.20)),
                (MustTrip, Polygon::rect(0.16, t, 1.20, V_MAX)),
                (CurrentLimited, Polygon::rect(0.0, 20.0, 0.70, 0.88)),
                (CurrentLimited, Polygon::rect(0.0, 10.0, 0.50, 0.70)),
                (MomentaryCessation, Polygon::rect(0.0, 1.0, 0.0, 0.50)),
                (MomentaryCessation, Polygon::rect(0.0, 0.16, 1.20, V_MAX)),
            ],
        };
        Self {
            category,
            continuous: (0.88, 1.10),
            polygons,
        }
    }

    pub fn category(&self) -> RideThroughCategory {
        self.category
    }

    /// Voltage band (pu) of continuous operation.
    pub fn continuous_band(&self) -> (f64, f64) {
        self.continuous
    }

    pub fn is_continuous(&self, v: f64) -> bool {
        v >= self.continuous.0 && v <= self.continuous.1
    }

    pub fn polygons(&self) -> impl Iterator<Item = &(Region, Polygon)> {
        self.polygons.iter()
    }

    /// Region of `(t, v)`; inputs are clamped to the plane.
    pub fn classify(&self, t: f64, v: f64) -> Region {
        if self.is_continuous(v) {
            return Region::ContinuousOperation;
        }
        let t = t.clamp(0.0, T_MAX);
        let v = v.clamp(0.0, V_MAX);
        for kind in [
            Region::MustTrip,
            Region::CurrentLimited,
            Region::MomentaryCessation,
        ] {
            let hit = self
                .polygons
                .iter()
                .any(|(k, poly)| *k == kind && poly.contains(t, v));
            if hit {
                return kind;
            }
        }
        Region::MayTrip
    }
}
