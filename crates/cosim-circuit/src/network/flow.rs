//! Fixed-point power flow on the per-unit admittance matrix.
//!
//! Node 0 is the internal slack node behind the source impedance; bus `k`
//! maps to node `k + 1`. Shunt devices are modelled as constant-power current
//! injections, falling back to constant impedance below `v_min` so that deep
//! sags (faults, stalled motors) still converge.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::Network;
use super::element::C64;
use crate::error::{CircuitError, CircuitResult};

/// Result of one network solve.
#[derive(Debug, Clone)]
pub(crate) struct FlowOutcome {
    pub converged: bool,
    pub iterations: usize,
    /// Node voltages (pu), slack node first.
    pub voltages: Vec<C64>,
    pub slack_current: C64,
}

/// Below this magnitude (pu) constant-power demand is converted to constant Z.
const V_MIN: f64 = 0.7;

pub(crate) fn solve_network(net: &Network) -> CircuitResult<FlowOutcome> {
    let n = net.buses.len() + 1;
    if net.buses.is_empty() {
        return Err(CircuitError::Topology {
            what: "network has no buses".to_string(),
        });
    }
    let v_slack = net.slack_voltage()?;

    let mut y = DMatrix::<C64>::zeros(n, n);
    let mut demand = vec![C64::new(0.0, 0.0); n];
    for el in &net.elements {
        if let Some(y_series) = el.series_admittance() {
            let a = net.node_of_from(el);
            let b = net.node_of_to(el);
            y[(a, a)] += y_series;
            y[(b, b)] += y_series;
            y[(a, b)] -= y_series;
            y[(b, a)] -= y_series;
        }
        if let Some(y_shunt) = el.shunt_admittance() {
            let a = el.bus1.slot() + 1;
            y[(a, a)] += y_shunt;
        }
        if let Some(s) = el.demand() {
            demand[el.bus1.slot() + 1] += s;
        }
    }

    for k in 1..n {
        if y[(k, k)].norm() == 0.0 {
            return Err(CircuitError::Singular {
                what: format!("bus '{}' is isolated", net.buses[k - 1]),
            });
        }
    }

    let m = n - 1;
    let y_nn = y.view((1, 1), (m, m)).clone_owned();
    let y_ns = DVector::from_iterator(m, (1..n).map(|i| y[(i, 0)]));
    let lu = y_nn.lu();

    let mut v: DVector<C64> = match &net.last_voltages {
        Some(prev) if prev.len() == n => DVector::from_iterator(m, prev[1..].iter().copied()),
        _ => DVector::from_element(m, v_slack),
    };

    let mut converged = false;
    let mut iterations = 0;
    for iter in 1..=net.options.max_iterations {
        iterations = iter;
        let mut rhs = DVector::<C64>::zeros(m);
        for i in 0..m {
            let s = demand[i + 1];
            let vi = v[i];
            let injection = if vi.norm() >= V_MIN {
                -(s / vi).conj()
            } else {
                -(s.conj() / (V_MIN * V_MIN)) * vi
            };
            rhs[i] = injection - y_ns[i] * v_slack;
        }
        let v_new = lu.solve(&rhs).ok_or_else(|| CircuitError::Singular {
            what: "admittance matrix could not be factorised".to_string(),
        })?;
        let delta = (&v_new - &v).iter().map(|d| d.norm()).fold(0.0_f64, f64::max);
        v = v_new;
        if !delta.is_finite() {
            break;
        }
        if delta < net.options.tolerance {
            converged = true;
            break;
        }
    }
    debug!(iterations, converged, "network solve");

    let mut voltages = Vec::with_capacity(n);
    voltages.push(v_slack);
    voltages.extend(v.iter().copied());

    let slack_current = (0..n).map(|j| y[(0, j)] * voltages[j]).sum();

    Ok(FlowOutcome {
        converged,
        iterations,
        voltages,
        slack_current,
    })
}
