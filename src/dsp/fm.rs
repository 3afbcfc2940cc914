//! Four-operator FM rendering.
//!
//! Operators are evaluated from the highest index down to zero so that every
//! modulator has already produced its output for the current sample when the
//! operator it feeds reads it. Feedback paths read the previous sample's
//! outputs instead.

use super::voice::ChannelVoice;
use crate::config::{ALGORITHMS, FEEDBACKS, OPERATOR_COUNT, SINE_WAVE_LENGTH, sine_wave};

/// Phase offset, in cycles, produced by a modulator at full amplitude.
const MODULATION_DEPTH: f64 = 1.0;
/// Feedback is gentler than forward modulation; full feedback turns to noise.
const FEEDBACK_DEPTH: f64 = 0.3;

/// Linearly interpolated table sine of a phase in cycles.
#[inline]
pub fn sine(table: &[f64], phase: f64) -> f64 {
    let wrapped = phase - phase.floor();
    let position = wrapped * SINE_WAVE_LENGTH as f64;
    let index = (position as usize).min(SINE_WAVE_LENGTH - 1);
    let fraction = position - index as f64;
    table[index] + (table[index + 1] - table[index]) * fraction
}

pub(crate) fn render(voice: &mut ChannelVoice, left: &mut [f64], right: &mut [f64]) {
    let table = sine_wave();
    let algorithm = ALGORITHMS[voice.algorithm.min(ALGORITHMS.len() - 1)];
    let feedback = FEEDBACKS[voice.feedback_type.min(FEEDBACKS.len() - 1)];
    let carrier_gain = 1.0 / algorithm.carrier_count as f64;
    let (pan_l, pan_r) = voice.pan;

    for (l, r) in left.iter_mut().zip(right.iter_mut()) {
        let mut output = [0.0; OPERATOR_COUNT];
        for op in (0..OPERATOR_COUNT).rev() {
            let mut modulation = 0.0;
            for &source in algorithm.modulated_by[op] {
                modulation += output[source] * MODULATION_DEPTH;
            }
            for &source in feedback.indices[op] {
                modulation += voice.feedback_output[source] * voice.feedback_amplitude * FEEDBACK_DEPTH;
            }
            output[op] = sine(table, voice.phase[op] + modulation) * voice.operator_amplitude[op];
        }
        voice.feedback_output = output;

        let carriers: f64 = output[..algorithm.carrier_count].iter().sum();
        let out = carriers * carrier_gain * voice.volume;
        *l += out * pan_l;
        *r += out * pan_r;

        for op in 0..OPERATOR_COUNT {
            voice.phase[op] += voice.phase_delta[op];
            voice.phase[op] -= voice.phase[op].floor();
            voice.operator_amplitude[op] += voice.operator_amplitude_delta[op];
        }
        voice.feedback_amplitude += voice.feedback_delta;
        voice.advance_ramps();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::voice::{TickParams, VoiceKind};

    fn fm_voice(algorithm: usize, amplitudes: [f64; OPERATOR_COUNT], feedback: f64) -> ChannelVoice {
        let delta = 440.0 / 44100.0;
        let deltas = [delta, delta * 2.0, delta, delta];
        let mut voice = ChannelVoice::new();
        voice.set_kind(VoiceKind::Fm);
        voice.begin_tick(
            &TickParams {
                reset_phase: true,
                volume_start: 1.0,
                volume_end: 1.0,
                phase_delta_start: deltas,
                phase_delta_end: deltas,
                operator_amplitude_start: amplitudes,
                operator_amplitude_end: amplitudes,
                feedback_start: feedback,
                feedback_end: feedback,
                filter: 1.0,
                filter_scale: 1.0,
                pan: (1.0, 1.0),
                algorithm,
                ..TickParams::default()
            },
            4410,
        );
        voice
    }

    fn render(voice: &mut ChannelVoice, frames: usize) -> Vec<f64> {
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        voice.render(&mut l, &mut r);
        l
    }

    #[test]
    fn test_sine_table_lookup() {
        let table = sine_wave();
        assert!(sine(table, 0.0).abs() < 1e-12);
        assert!((sine(table, 0.25) - 1.0).abs() < 1e-9);
        assert!((sine(table, 1.75) + 1.0).abs() < 1e-9, "phase wraps");
        assert!((sine(table, 0.1) - (0.2 * std::f64::consts::PI).sin()).abs() < 1e-3);
    }

    #[test]
    fn test_single_carrier_is_a_sine() {
        let mut voice = fm_voice(0, [1.0, 0.0, 0.0, 0.0], 0.0);
        let out = render(&mut voice, 400);
        for (i, &s) in out.iter().enumerate() {
            let expected = (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 44100.0).sin();
            assert!((s - expected).abs() < 1e-3, "sample {i}: {s} vs {expected}");
        }
    }

    #[test]
    fn test_modulator_changes_timbre() {
        let mut plain = fm_voice(0, [1.0, 0.0, 0.0, 0.0], 0.0);
        let mut modulated = fm_voice(0, [1.0, 0.8, 0.0, 0.0], 0.0);
        let a = render(&mut plain, 400);
        let b = render(&mut modulated, 400);
        let difference: f64 = a.iter().zip(&b).map(|(x, y)| (x - y).abs()).sum();
        assert!(difference > 1.0, "modulation should alter the waveform");
        assert!(b.iter().all(|s| s.abs() <= 1.0 + 1e-9), "carrier amplitude bounds output");
    }

    #[test]
    fn test_silent_modulator_has_no_effect() {
        let mut plain = fm_voice(4, [1.0, 0.0, 0.0, 0.0], 0.0);
        let mut other = fm_voice(4, [1.0, 0.0, 0.0, 0.0], 0.0);
        assert_eq!(render(&mut plain, 256), render(&mut other, 256));
    }

    #[test]
    fn test_feedback_uses_previous_output() {
        let mut voice = fm_voice(0, [1.0, 0.0, 0.0, 0.0], 1.0);
        let out = render(&mut voice, 2);
        // First sample: no previous output, phase 0.
        assert!(out[0].abs() < 1e-12);
        assert_eq!(voice.feedback_output[1], 0.0);
        assert!(voice.feedback_output[0] != 0.0);
    }

    #[test]
    fn test_carriers_are_averaged() {
        let mut voice = fm_voice(12, [1.0, 1.0, 1.0, 1.0], 0.0);
        let out = render(&mut voice, 1000);
        assert!(out.iter().all(|s| s.abs() <= 1.0 + 1e-9));
    }
}
