//! Bookkeeping for repeated updates within one timestep.
//!
//! The scheduler calls a controller once per control iteration, so the same
//! `time` is seen several times per timestep. Anything that integrates over
//! time must advance only when `time` moves.

/// Remembers the last time advanced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateMarker {
    last_time: Option<f64>,
}

impl UpdateMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds elapsed since the previous distinct `time`.
    ///
    /// Returns 0 on the first call and on repeated calls at the same time.
    pub fn advance(&mut self, time: f64) -> f64 {
        let dt = match self.last_time {
            Some(last) if time > last => time - last,
            _ => 0.0,
        };
        if self.last_time.is_none_or(|last| time > last) {
            self.last_time = Some(time);
        }
        dt
    }

    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }
}
