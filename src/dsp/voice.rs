//! Per-channel voice state and the chip, pulse-width and noise renderers.
//!
//! There is one voice per channel, not per note. At every tick boundary the
//! engine hands the voice a [`TickParams`] describing where volume, pitch and
//! filter should be at the start and end of the tick; the voice ramps between
//! the two sample by sample. Oscillator phases, FM feedback and the one-pole
//! `sample` state persist across ticks and only reset when a note asks for it.

use super::fm;
use crate::config::{CHIP_WAVES, NOISE_WAVE_LENGTH, OPERATOR_COUNT, noise_wave};
use crate::song::{Instrument, InstrumentType};

/// Which renderer a channel uses for the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceKind {
    #[default]
    Silent,
    Chip,
    PulseWidth,
    Noise,
    Fm,
}

impl VoiceKind {
    pub fn for_instrument(instrument: &Instrument) -> Self {
        if instrument.muted {
            return VoiceKind::Silent;
        }
        match instrument.kind {
            InstrumentType::Chip => VoiceKind::Chip,
            InstrumentType::Fm => VoiceKind::Fm,
            InstrumentType::Noise => VoiceKind::Noise,
            InstrumentType::PulseWidth => VoiceKind::PulseWidth,
        }
    }
}

/// Targets for one tick of one channel, computed by the engine.
///
/// Phase deltas are in cycles per sample, except for noise where they are
/// in wave samples per output sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickParams {
    pub reset_phase: bool,
    pub volume_start: f64,
    pub volume_end: f64,
    pub phase_delta_start: [f64; OPERATOR_COUNT],
    pub phase_delta_end: [f64; OPERATOR_COUNT],
    pub operator_amplitude_start: [f64; OPERATOR_COUNT],
    pub operator_amplitude_end: [f64; OPERATOR_COUNT],
    pub feedback_start: f64,
    pub feedback_end: f64,
    /// One-pole coefficient at the tick start, in `(0, 1]`.
    pub filter: f64,
    /// Per-sample multiplier applied to the filter coefficient.
    pub filter_scale: f64,
    pub wave: usize,
    pub pulse_duty: f64,
    /// Sign of the second chip oscillator.
    pub chorus_sign: f64,
    pub pan: (f64, f64),
    pub algorithm: usize,
    pub feedback_type: usize,
}

/// Rolling synthesis state of one channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelVoice {
    pub kind: VoiceKind,

    pub(crate) phase: [f64; OPERATOR_COUNT],
    pub(crate) feedback_output: [f64; OPERATOR_COUNT],
    /// One-pole filter state. Never reset, so a phase reset cannot click.
    pub(crate) sample: f64,

    pub(crate) volume: f64,
    pub(crate) volume_delta: f64,
    volume_end: f64,
    pub(crate) phase_delta: [f64; OPERATOR_COUNT],
    pub(crate) phase_delta_scale: [f64; OPERATOR_COUNT],
    phase_delta_end: [f64; OPERATOR_COUNT],
    pub(crate) operator_amplitude: [f64; OPERATOR_COUNT],
    pub(crate) operator_amplitude_delta: [f64; OPERATOR_COUNT],
    operator_amplitude_end: [f64; OPERATOR_COUNT],
    pub(crate) feedback_amplitude: f64,
    pub(crate) feedback_delta: f64,
    feedback_end: f64,
    pub(crate) filter: f64,
    pub(crate) filter_scale: f64,

    pub(crate) wave: usize,
    pub(crate) pulse_duty: f64,
    pub(crate) chorus_sign: f64,
    pub(crate) pan: (f64, f64),
    pub(crate) algorithm: usize,
    pub(crate) feedback_type: usize,
}

impl ChannelVoice {
    pub fn new() -> Self {
        Self {
            filter: 1.0,
            filter_scale: 1.0,
            phase_delta_scale: [1.0; OPERATOR_COUNT],
            pan: (1.0, 1.0),
            ..Self::default()
        }
    }

    /// Switch renderer at a bar boundary. Oscillator state from a different
    /// renderer means nothing to the new one, so phases start over.
    pub fn set_kind(&mut self, kind: VoiceKind) {
        if kind != self.kind {
            self.kind = kind;
            self.phase = [0.0; OPERATOR_COUNT];
            self.feedback_output = [0.0; OPERATOR_COUNT];
        }
    }

    /// Load the ramps for a tick of `samples` samples.
    pub fn begin_tick(&mut self, params: &TickParams, samples: usize) {
        let n = samples.max(1) as f64;
        if params.reset_phase {
            self.phase = [0.0; OPERATOR_COUNT];
            self.feedback_output = [0.0; OPERATOR_COUNT];
        }

        self.volume = params.volume_start;
        self.volume_end = params.volume_end;
        self.volume_delta = (params.volume_end - params.volume_start) / n;

        for i in 0..OPERATOR_COUNT {
            let (start, end) = (params.phase_delta_start[i], params.phase_delta_end[i]);
            self.phase_delta[i] = start;
            self.phase_delta_end[i] = end;
            self.phase_delta_scale[i] = if start > 0.0 && end > 0.0 {
                (end / start).powf(1.0 / n)
            } else {
                1.0
            };

            let (start, end) = (
                params.operator_amplitude_start[i],
                params.operator_amplitude_end[i],
            );
            self.operator_amplitude[i] = start;
            self.operator_amplitude_end[i] = end;
            self.operator_amplitude_delta[i] = (end - start) / n;
        }

        self.feedback_amplitude = params.feedback_start;
        self.feedback_end = params.feedback_end;
        self.feedback_delta = (params.feedback_end - params.feedback_start) / n;

        self.filter = params.filter;
        self.filter_scale = params.filter_scale;
        self.wave = params.wave;
        self.pulse_duty = params.pulse_duty;
        self.chorus_sign = params.chorus_sign;
        self.pan = params.pan;
        self.algorithm = params.algorithm;
        self.feedback_type = params.feedback_type;
    }

    /// Fade to silence over the tick, leaving pitch and timbre as they were.
    pub fn silence_tick(&mut self, samples: usize) {
        let n = samples.max(1) as f64;
        self.volume_end = 0.0;
        self.volume_delta = -self.volume / n;
        self.phase_delta_scale = [1.0; OPERATOR_COUNT];
        self.phase_delta_end = self.phase_delta;
        self.operator_amplitude_delta = [0.0; OPERATOR_COUNT];
        self.operator_amplitude_end = self.operator_amplitude;
        self.feedback_delta = 0.0;
        self.feedback_end = self.feedback_amplitude;
    }

    /// Snap every ramp to its end value once a tick has fully played.
    pub fn finish_tick(&mut self) {
        self.volume = self.volume_end;
        self.volume_delta = 0.0;
        self.phase_delta = self.phase_delta_end;
        self.operator_amplitude = self.operator_amplitude_end;
        self.operator_amplitude_delta = [0.0; OPERATOR_COUNT];
        self.feedback_amplitude = self.feedback_end;
        self.feedback_delta = 0.0;
    }

    pub fn is_audible(&self) -> bool {
        self.kind != VoiceKind::Silent && (self.volume != 0.0 || self.volume_end != 0.0)
    }

    /// Add this voice's output for the next `left.len()` samples into the bus.
    pub fn render(&mut self, left: &mut [f64], right: &mut [f64]) {
        if !self.is_audible() {
            return;
        }
        match self.kind {
            VoiceKind::Silent => {}
            VoiceKind::Chip => self.render_chip(left, right),
            VoiceKind::PulseWidth => self.render_pulse(left, right),
            VoiceKind::Noise => self.render_noise(left, right),
            VoiceKind::Fm => fm::render(self, left, right),
        }
    }

    #[inline]
    pub(crate) fn advance_ramps(&mut self) {
        self.volume += self.volume_delta;
        self.filter *= self.filter_scale;
        for i in 0..OPERATOR_COUNT {
            self.phase_delta[i] *= self.phase_delta_scale[i];
        }
    }

    fn render_chip(&mut self, left: &mut [f64], right: &mut [f64]) {
        let wave = CHIP_WAVES[self.wave.min(CHIP_WAVES.len() - 1)].samples;
        let len = wave.len() as f64;
        let (pan_l, pan_r) = self.pan;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let a = wave[(self.phase[0] * len) as usize % wave.len()];
            let b = wave[(self.phase[1] * len) as usize % wave.len()];
            let raw = a + b * self.chorus_sign;
            self.sample += (raw - self.sample) * self.filter;
            let out = self.sample * self.volume;
            *l += out * pan_l;
            *r += out * pan_r;

            for i in 0..2 {
                self.phase[i] += self.phase_delta[i];
                self.phase[i] -= self.phase[i].floor();
            }
            self.advance_ramps();
        }
    }

    fn render_pulse(&mut self, left: &mut [f64], right: &mut [f64]) {
        let (pan_l, pan_r) = self.pan;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let raw = if self.phase[0] < self.pulse_duty { 1.0 } else { -1.0 };
            self.sample += (raw - self.sample) * self.filter;
            let out = self.sample * self.volume;
            *l += out * pan_l;
            *r += out * pan_r;

            self.phase[0] += self.phase_delta[0];
            self.phase[0] -= self.phase[0].floor();
            self.advance_ramps();
        }
    }

    fn render_noise(&mut self, left: &mut [f64], right: &mut [f64]) {
        let wave = noise_wave(self.wave);
        let wrap = NOISE_WAVE_LENGTH as f64;
        let (pan_l, pan_r) = self.pan;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let raw = wave[self.phase[0] as usize & (NOISE_WAVE_LENGTH - 1)];
            self.sample += (raw - self.sample) * self.filter;
            let out = self.sample * self.volume;
            *l += out * pan_l;
            *r += out * pan_r;

            self.phase[0] += self.phase_delta[0];
            if self.phase[0] >= wrap {
                self.phase[0] -= wrap;
            }
            self.advance_ramps();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip_params(freq: f64, sample_rate: f64, volume: f64) -> TickParams {
        let delta = freq / sample_rate;
        TickParams {
            reset_phase: true,
            volume_start: volume,
            volume_end: volume,
            phase_delta_start: [delta, delta, 0.0, 0.0],
            phase_delta_end: [delta, delta, 0.0, 0.0],
            filter: 1.0,
            filter_scale: 1.0,
            wave: 1,
            chorus_sign: 1.0,
            pan: (1.0, 1.0),
            ..TickParams::default()
        }
    }

    #[test]
    fn test_kind_follows_instrument() {
        let mut inst = Instrument::new(false);
        assert_eq!(VoiceKind::for_instrument(&inst), VoiceKind::Chip);
        inst.kind = InstrumentType::Fm;
        assert_eq!(VoiceKind::for_instrument(&inst), VoiceKind::Fm);
        inst.muted = true;
        assert_eq!(VoiceKind::for_instrument(&inst), VoiceKind::Silent);
        assert_eq!(VoiceKind::for_instrument(&Instrument::new(true)), VoiceKind::Noise);
    }

    #[test]
    fn test_volume_ramp_lands_on_target() {
        let mut voice = ChannelVoice::new();
        voice.set_kind(VoiceKind::Chip);
        let mut params = chip_params(440.0, 44100.0, 0.8);
        params.volume_end = 0.2;
        voice.begin_tick(&params, 100);

        let mut l = vec![0.0; 100];
        let mut r = vec![0.0; 100];
        voice.render(&mut l, &mut r);
        assert!((voice.volume - 0.2).abs() < 1e-9, "ramped to {}", voice.volume);
        voice.finish_tick();
        assert_eq!(voice.volume, 0.2);
    }

    #[test]
    fn test_silence_tick_fades_out() {
        let mut voice = ChannelVoice::new();
        voice.set_kind(VoiceKind::Chip);
        voice.begin_tick(&chip_params(220.0, 44100.0, 0.5), 64);
        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        voice.render(&mut l, &mut r);
        voice.finish_tick();

        voice.silence_tick(64);
        voice.render(&mut l, &mut r);
        voice.finish_tick();
        assert_eq!(voice.volume, 0.0);
        assert!(!voice.is_audible());

        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        voice.render(&mut l, &mut r);
        assert!(l.iter().chain(r.iter()).all(|&s| s == 0.0), "silent voice adds nothing");
    }

    #[test]
    fn test_phase_reset_only_when_requested() {
        let mut voice = ChannelVoice::new();
        voice.set_kind(VoiceKind::Chip);
        let mut params = chip_params(300.0, 44100.0, 0.5);
        voice.begin_tick(&params, 50);
        let mut l = vec![0.0; 50];
        let mut r = vec![0.0; 50];
        voice.render(&mut l, &mut r);
        voice.finish_tick();
        let phase = voice.phase[0];
        assert!(phase > 0.0);

        params.reset_phase = false;
        voice.begin_tick(&params, 50);
        assert_eq!(voice.phase[0], phase, "continuing note keeps its phase");

        params.reset_phase = true;
        voice.begin_tick(&params, 50);
        assert_eq!(voice.phase[0], 0.0);
    }

    #[test]
    fn test_filter_state_survives_phase_reset() {
        let mut voice = ChannelVoice::new();
        voice.set_kind(VoiceKind::Chip);
        let mut params = chip_params(300.0, 44100.0, 0.5);
        params.filter = 0.1;
        voice.begin_tick(&params, 50);
        let mut l = vec![0.0; 50];
        let mut r = vec![0.0; 50];
        voice.render(&mut l, &mut r);
        let sample = voice.sample;
        assert!(sample != 0.0);
        voice.begin_tick(&params, 50);
        assert_eq!(voice.sample, sample);
    }

    #[test]
    fn test_noise_phase_wraps() {
        let mut voice = ChannelVoice::new();
        voice.set_kind(VoiceKind::Noise);
        let delta = 3.0;
        let params = TickParams {
            volume_start: 1.0,
            volume_end: 1.0,
            phase_delta_start: [delta, 0.0, 0.0, 0.0],
            phase_delta_end: [delta, 0.0, 0.0, 0.0],
            filter: 1.0,
            filter_scale: 1.0,
            pan: (1.0, 0.0),
            ..TickParams::default()
        };
        voice.begin_tick(&params, 20000);
        let mut l = vec![0.0; 20000];
        let mut r = vec![0.0; 20000];
        voice.render(&mut l, &mut r);
        assert!(voice.phase[0] < NOISE_WAVE_LENGTH as f64);
        assert!(l.iter().any(|&s| s != 0.0));
        assert!(r.iter().all(|&s| s == 0.0), "hard-left pan");
    }
}
