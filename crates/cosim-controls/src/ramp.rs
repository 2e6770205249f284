//! Rate-limited output ramp.
//!
//! Used after a reconnection: the permitted output fraction rises linearly
//! from 0 to 1 over `ramp_time`, tracking the command but never faster than
//! `1 / ramp_time` per second.

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Ramp position in `[0, 1]` (fraction of rated output).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RampState {
    pub fraction: f64,
}

impl Default for RampState {
    fn default() -> Self {
        Self { fraction: 1.0 }
    }
}

/// Linear ramp with a fixed full-scale time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerRamp {
    /// Time (seconds) to move from 0 to full output.
    pub ramp_time: f64,
}

impl PowerRamp {
    pub fn new(ramp_time: f64) -> ControlResult<Self> {
        if !ramp_time.is_finite() || ramp_time < 0.0 {
            return Err(ControlError::InvalidArg {
                what: "ramp_time must be non-negative",
            });
        }
        Ok(Self { ramp_time })
    }

    /// Maximum change of the fraction per second.
    pub fn rate_limit(&self) -> f64 {
        if self.ramp_time > 0.0 {
            1.0 / self.ramp_time
        } else {
            f64::INFINITY
        }
    }

    /// Move toward `command` over `dt` seconds.
    pub fn step(&self, state: &RampState, dt: f64, command: f64) -> RampState {
        if dt.is_nan() || dt <= 0.0 {
            return *state;
        }
        let command = command.clamp(0.0, 1.0);
        let max_move = self.rate_limit() * dt;
        let delta = (command - state.fraction).clamp(-max_move, max_move);
        RampState {
            fraction: (state.fraction + delta).clamp(0.0, 1.0),
        }
    }
}
