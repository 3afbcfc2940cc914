//! Reverb effect: a four-line feedback delay network.
//!
//! All four delay lines share one 16384-sample ring. Each tap is read at a
//! fixed offset from the write head, the taps are mixed through a Hadamard
//! matrix, and every feedback line is smoothed by a one-pole lowpass before
//! it is written back. Line lengths are 3041, 3385, 4481 and 5477 samples.

use crate::config::REVERB_RANGE;

const RING_LENGTH: usize = 1 << 14;
const RING_MASK: usize = RING_LENGTH - 1;

/// Read offsets of the four taps from the write head. Consecutive offsets
/// differ by the line lengths; the last line wraps round the ring.
const TAPS: [usize; 4] = [0, 3041, 6426, 10907];

/// One-pole smoothing applied to every feedback line.
const FEEDBACK_SMOOTHING: f64 = 0.5;

/// Linear feedback gain for a song reverb setting.
pub fn reverb_amount(setting: u32) -> f64 {
    let setting = setting.min(REVERB_RANGE - 1) as f64;
    (setting / REVERB_RANGE as f64).powf(0.667) * 0.425
}

/// A stereo feedback delay network reverb.
#[derive(Debug, Clone)]
pub struct Reverb {
    ring: Vec<f64>,
    position: usize,
    feedback: [f64; 4],
    /// Feedback gain. Zero leaves the dry signal untouched once the ring
    /// has drained.
    pub amount: f64,
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Reverb {
    pub fn new() -> Self {
        Self {
            ring: vec![0.0; RING_LENGTH],
            position: 0,
            feedback: [0.0; 4],
            amount: 0.0,
        }
    }

    /// Set the feedback gain from a song reverb setting (0..=7).
    pub fn set_level(&mut self, setting: u32) {
        self.amount = reverb_amount(setting);
    }

    /// Process one stereo frame, returning dry plus wet.
    #[inline]
    pub fn process(&mut self, left: f64, right: f64) -> (f64, f64) {
        let p = self.position;
        let t0 = self.ring[p];
        let t1 = self.ring[(p + TAPS[1]) & RING_MASK];
        let t2 = self.ring[(p + TAPS[2]) & RING_MASK];
        let t3 = self.ring[(p + TAPS[3]) & RING_MASK];

        let a = -(t0 + left) + t1;
        let b = -(t0 + left) - t1;
        let c = -(t2 + right) + t3;
        let d = -(t2 + right) - t3;

        let mixed = [a + c, b + d, a - c, b - d];
        for (state, input) in self.feedback.iter_mut().zip(mixed) {
            *state += (input * self.amount - *state) * FEEDBACK_SMOOTHING;
        }

        self.ring[(p + TAPS[1]) & RING_MASK] = self.feedback[0];
        self.ring[(p + TAPS[2]) & RING_MASK] = self.feedback[1];
        self.ring[(p + TAPS[3]) & RING_MASK] = self.feedback[2];
        self.ring[p] = self.feedback[3];
        self.position = (p + 1) & RING_MASK;

        (left + t1 + t2 + t3, right + t0 + t2 - t3)
    }

    /// Clear the ring and the feedback filters.
    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.feedback = [0.0; 4];
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_curve() {
        assert_eq!(reverb_amount(0), 0.0);
        assert!(reverb_amount(3) < reverb_amount(4));
        assert!(reverb_amount(7) < 0.5, "loop gain must stay below one");
        assert_eq!(reverb_amount(99), reverb_amount(7), "setting is clamped");
    }

    #[test]
    fn test_reverb_passthrough_when_dry() {
        let mut reverb = Reverb::new();
        for i in 0..20000 {
            let x = ((i % 100) as f64 / 50.0) - 1.0;
            let (l, r) = reverb.process(x, -x);
            assert_eq!(l, x, "dry left at sample {i}");
            assert_eq!(r, -x, "dry right at sample {i}");
        }
    }

    #[test]
    fn test_reverb_produces_tail() {
        let mut reverb = Reverb::new();
        reverb.set_level(5);
        reverb.process(1.0, 1.0);

        let mut first_echo = None;
        for i in 1..8000 {
            let (l, r) = reverb.process(0.0, 0.0);
            if l.abs() > 1e-4 || r.abs() > 1e-4 {
                first_echo = Some(i);
                break;
            }
        }
        let first_echo = first_echo.expect("reverb should echo an impulse");
        assert!(first_echo >= 3000, "first echo arrived after {first_echo} samples");
    }

    #[test]
    fn test_reverb_decays() {
        let mut reverb = Reverb::new();
        reverb.set_level(7);
        reverb.process(1.0, 1.0);

        let mut early = 0.0f64;
        for _ in 0..20000 {
            let (l, r) = reverb.process(0.0, 0.0);
            early = early.max(l.abs().max(r.abs()));
        }
        for _ in 0..200_000 {
            reverb.process(0.0, 0.0);
        }
        let mut late = 0.0f64;
        for _ in 0..20000 {
            let (l, r) = reverb.process(0.0, 0.0);
            late = late.max(l.abs().max(r.abs()));
        }
        assert!(early > 0.0, "reverb should have some output");
        assert!(late < early * 0.01, "tail should decay: early {early}, late {late}");
    }

    #[test]
    fn test_clear_silences_tail() {
        let mut reverb = Reverb::new();
        reverb.set_level(6);
        for _ in 0..1000 {
            reverb.process(0.5, -0.5);
        }
        reverb.clear();
        for _ in 0..RING_LENGTH {
            assert_eq!(reverb.process(0.0, 0.0), (0.0, 0.0));
        }
    }
}
