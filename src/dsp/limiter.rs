//! Master limiter: a lightweight de-clipper.
//!
//! Tracks the rolling peak of the bus and divides by `limit * 0.75 + 0.25`.
//! The held peak drains linearly, so a full-scale peak releases in about
//! two seconds. There is no lookahead; the engine hard-clamps afterwards.

/// A stereo peak-following limiter.
#[derive(Debug, Clone)]
pub struct Limiter {
    /// Held peak, never negative.
    limit: f64,
    decay: f64,
}

impl Limiter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            limit: 0.0,
            decay: 1.0 / (2.0 * sample_rate),
        }
    }

    /// Change the release slope without dropping the held peak.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.decay = 1.0 / (2.0 * sample_rate);
    }

    /// Process a stereo sample pair.
    #[inline]
    pub fn process(&mut self, left: f64, right: f64) -> (f64, f64) {
        let peak = left.abs().max(right.abs());
        self.limit = peak.max(self.limit - self.decay);
        let gain = 1.0 / (self.limit * 0.75 + 0.25);
        (left * gain, right * gain)
    }

    /// Current held peak (for metering).
    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn reset(&mut self) {
        self.limit = 0.0;
    }
}
