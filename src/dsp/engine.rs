//! Sample-accurate playback of a [`Song`].
//!
//! [`Synth`] owns the transport (bar, beat, part and one of four ticks per
//! part), one [`ChannelVoice`] per channel, and the master bus: reverb, blend,
//! muff, limiter. The host pulls audio through [`Synth::synthesize`]; the
//! song is passed in on every call so it may be edited between callbacks.
//!
//! Work is split at tick boundaries. At the start of a tick every channel
//! locates its note and computes where volume, pitch and filter should be at
//! both ends of the tick; the voices then ramp between those values per
//! sample. Nothing is allocated or logged inside the sample loops, and
//! splitting a render into differently sized buffers yields identical audio.

use std::f64::consts::PI;

use log::{debug, trace};

use super::limiter::Limiter;
use super::reverb::Reverb;
use super::voice::{ChannelVoice, TickParams, VoiceKind};
use crate::config::{
    BLEND_RANGE, CHIP_WAVES, CHORUSES, DETUNE_CENTER, DRUM_COUNT, EFFECTS, FILTERS, FilterPreset,
    MIX_STYLES, NOISE_SAMPLES_PER_CYCLE, NOISE_WAVES, NOTE_VOLUME_MAX, OPERATOR_FREQUENCIES,
    SAMPLE_RATES, TICKS_PER_PART, TRANSITIONS, TREMOLO_HZ, VIBRATO_HZ, frequency_from_pitch,
    noise_wave, operator_amplitude_curve, operator_envelope, pan_gains, pulse_width_ratio,
    sine_wave, volume_multiplier,
};
use crate::song::{Note, Pattern, Song};

/// Headroom per channel so a full song rarely needs the limiter.
const CHANNEL_GAIN: f64 = 0.15;
const PULSE_VOLUME: f64 = 0.5;
const FM_VOLUME: f64 = 0.6;
/// Semitones between adjacent drum pitches.
const NOISE_PITCH_STEP: f64 = 6.0;
/// Semitones per song detune step.
const DETUNE_STEP: f64 = 0.25;
/// Ticks each chord pitch is held while arpeggiating, by riff setting.
const ARPEGGIO_TICKS: [u32; 4] = [4, 3, 2, 1];
/// Master lowpass coefficient by muff setting.
const MUFF_COEFFICIENTS: [f64; 4] = [1.0, 0.5, 0.25, 0.125];
/// Cross-feed at the top blend setting.
const BLEND_MAX: f64 = 0.5;
/// Longest run rendered between bus flushes.
const MIX_CAPACITY: usize = 4096;
const RENDER_CHUNK: usize = 4096;

/// Runtime configuration of a [`Synth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthConfig {
    /// Output rate used when the song defers to the host.
    pub host_sample_rate: u32,
    /// Jump back to the loop start at the end of the loop region.
    pub loop_enabled: bool,
    pub reverb_enabled: bool,
    pub limiter_enabled: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            host_sample_rate: 44100,
            loop_enabled: true,
            reverb_enabled: true,
            limiter_enabled: true,
        }
    }
}

/// Where the transport is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackPosition {
    pub bar: usize,
    pub beat: u32,
    pub part: u32,
    pub tick: u32,
}

/// Note-relative values at one edge of a tick.
#[derive(Debug, Clone, Copy)]
struct Moment {
    interval: f64,
    /// Pin volume with transition and tremolo applied, in `[0, 1]`.
    envelope: f64,
    seconds: f64,
    /// Raw pin volume in `[0, 1]`, for custom FM envelopes.
    pin_volume: f64,
}

/// The song synthesizer.
#[derive(Debug, Clone)]
pub struct Synth {
    config: SynthConfig,
    sample_rate: f64,
    position: PlaybackPosition,
    /// The bar played immediately before the current one.
    previous_bar: Option<usize>,
    /// Ticks since playback started, drives chord arpeggiation.
    arpeggio: u32,
    samples_left_in_tick: usize,
    /// Remaining passes through the loop region for offline renders.
    loops_remaining: Option<u32>,
    finished: bool,
    resolved_bar: Option<usize>,
    voices: Vec<ChannelVoice>,
    reverb: Reverb,
    limiter: Limiter,
    muff: [f64; 2],
    mix_left: Vec<f64>,
    mix_right: Vec<f64>,
}

impl Synth {
    pub fn new(config: SynthConfig) -> Self {
        // Build the lazily generated wave tables now rather than inside the
        // first audio callback.
        sine_wave();
        for index in 0..NOISE_WAVES.len() {
            noise_wave(index);
        }

        let sample_rate = config.host_sample_rate.max(1) as f64;
        debug!(
            "Synth created at {sample_rate} Hz (loop: {}, reverb: {}, limiter: {})",
            config.loop_enabled, config.reverb_enabled, config.limiter_enabled
        );
        Self {
            config,
            sample_rate,
            position: PlaybackPosition::default(),
            previous_bar: None,
            arpeggio: 0,
            samples_left_in_tick: 0,
            loops_remaining: None,
            finished: false,
            resolved_bar: None,
            voices: Vec::new(),
            reverb: Reverb::new(),
            limiter: Limiter::new(sample_rate),
            muff: [0.0; 2],
            mix_left: Vec::with_capacity(MIX_CAPACITY),
            mix_right: Vec::with_capacity(MIX_CAPACITY),
        }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Rate of the most recent render.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn position(&self) -> PlaybackPosition {
        self.position
    }

    /// True once a non-looping playback has run past the last bar.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The song's own output rate, or `host` when it defers.
    pub fn resolve_sample_rate(song: &Song, host: u32) -> u32 {
        SAMPLE_RATES
            .get(song.sample_rate)
            .and_then(|mode| mode.hz)
            .unwrap_or(host)
            .max(1)
    }

    pub fn samples_per_tick(song: &Song, sample_rate: f64) -> usize {
        let ticks_per_minute =
            song.beats_per_minute() * song.parts_per_beat() as f64 * TICKS_PER_PART as f64;
        ((sample_rate * 60.0 / ticks_per_minute).round() as usize).max(1)
    }

    /// Frames in an offline render: intro, `loops` passes through the loop
    /// region, then whatever follows it.
    pub fn song_frame_count(song: &Song, sample_rate: f64, loops: u32) -> usize {
        let loops = loops.max(1) as usize;
        let loop_end = song.loop_start() + song.loop_length();
        let outro = song.bar_count().saturating_sub(loop_end);
        let bars = song.loop_start() + song.loop_length() * loops + outro;
        let ticks_per_bar = song.bar_length() as usize * TICKS_PER_PART as usize;
        bars * ticks_per_bar * Self::samples_per_tick(song, sample_rate)
    }

    /// Move the transport to the start of `bar`. Voices keep ringing.
    pub fn seek(&mut self, bar: usize) {
        self.position = PlaybackPosition { bar, ..PlaybackPosition::default() };
        self.previous_bar = bar.checked_sub(1);
        self.samples_left_in_tick = 0;
        self.finished = false;
        self.resolved_bar = None;
    }

    /// Return to the song start and clear every voice and effect tail.
    pub fn reset(&mut self) {
        self.seek(0);
        self.arpeggio = 0;
        self.loops_remaining = None;
        self.voices.clear();
        self.reverb.clear();
        self.limiter.reset();
        self.muff = [0.0; 2];
    }

    /// Fill `frames` samples of `left` and `right`.
    ///
    /// When `playing` is false the transport holds still, voices fade out
    /// and effect tails keep rendering.
    pub fn synthesize(
        &mut self,
        song: &Song,
        left: &mut [f32],
        right: &mut [f32],
        frames: usize,
        playing: bool,
    ) {
        let frames = frames.min(left.len()).min(right.len());
        self.update_sample_rate(song);
        self.reverb.set_level(song.reverb);

        let mut offset = 0;
        while offset < frames {
            let advancing = playing && !self.finished;
            if advancing && self.samples_left_in_tick == 0 {
                self.start_tick(song);
            }
            let mut run = (frames - offset).min(MIX_CAPACITY);
            if advancing {
                run = run.min(self.samples_left_in_tick);
            } else {
                for voice in &mut self.voices {
                    if voice.is_audible() {
                        voice.silence_tick(run);
                    }
                }
            }

            self.mix_left.clear();
            self.mix_left.resize(run, 0.0);
            self.mix_right.clear();
            self.mix_right.resize(run, 0.0);
            for voice in &mut self.voices {
                voice.render(&mut self.mix_left, &mut self.mix_right);
            }

            if advancing {
                self.samples_left_in_tick -= run;
                if self.samples_left_in_tick == 0 {
                    for voice in &mut self.voices {
                        voice.finish_tick();
                    }
                    self.advance_tick(song);
                }
            } else {
                for voice in &mut self.voices {
                    voice.finish_tick();
                }
                // Resume from the start of the interrupted tick.
                self.samples_left_in_tick = 0;
            }

            self.mix_down(song, &mut left[offset..offset + run], &mut right[offset..offset + run]);
            offset += run;
        }
    }

    /// Render the whole song offline as interleaved stereo.
    pub fn render_song(&mut self, song: &Song, loops: u32) -> Vec<f32> {
        self.reset();
        self.update_sample_rate(song);
        let frames = Self::song_frame_count(song, self.sample_rate, loops);
        self.loops_remaining = Some(loops.max(1));
        debug!("Rendering {frames} frames ({loops} loops) at {} Hz", self.sample_rate);

        let mut output = Vec::with_capacity(frames * 2);
        let mut left = vec![0.0f32; RENDER_CHUNK];
        let mut right = vec![0.0f32; RENDER_CHUNK];
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(RENDER_CHUNK);
            self.synthesize(song, &mut left, &mut right, n, true);
            for (l, r) in left[..n].iter().zip(&right[..n]) {
                output.push(*l);
                output.push(*r);
            }
            remaining -= n;
        }
        self.loops_remaining = None;
        output
    }

    fn update_sample_rate(&mut self, song: &Song) {
        let rate = Self::resolve_sample_rate(song, self.config.host_sample_rate) as f64;
        if rate != self.sample_rate {
            debug!("Output rate changed from {} Hz to {rate} Hz", self.sample_rate);
            self.sample_rate = rate;
            self.limiter.set_sample_rate(rate);
            self.samples_left_in_tick = 0;
        }
    }

    // ── Transport ───────────────────────────────────────────

    fn start_tick(&mut self, song: &Song) {
        if self.position.bar >= song.bar_count() {
            self.position = PlaybackPosition {
                bar: song.loop_start().min(song.bar_count().saturating_sub(1)),
                ..PlaybackPosition::default()
            };
            self.previous_bar = None;
        }
        self.position.beat = self.position.beat.min(song.beats_per_bar().saturating_sub(1));
        self.position.part = self.position.part.min(song.parts_per_beat().saturating_sub(1));

        let channel_count = song.channel_count();
        if self.voices.len() != channel_count {
            self.voices.resize_with(channel_count, ChannelVoice::new);
            self.resolved_bar = None;
        }
        if self.resolved_bar != Some(self.position.bar) {
            self.resolve_bar(song);
        }

        let samples = Self::samples_per_tick(song, self.sample_rate);
        for channel in 0..channel_count {
            match self.tick_params(song, channel, samples) {
                Some(params) => self.voices[channel].begin_tick(&params, samples),
                None => self.voices[channel].silence_tick(samples),
            }
        }
        self.samples_left_in_tick = samples;
    }

    /// Pick each channel's renderer for the current bar.
    fn resolve_bar(&mut self, song: &Song) {
        let bar = self.position.bar;
        for (channel, voice) in self.voices.iter_mut().enumerate() {
            let kind = match (song.pattern_at(channel, bar), song.instrument_for(channel, bar)) {
                (Some(_), Some(instrument)) => VoiceKind::for_instrument(instrument),
                _ => VoiceKind::Silent,
            };
            voice.set_kind(kind);
        }
        trace!("Bar {bar} resolved for {} channels", self.voices.len());
        self.resolved_bar = Some(bar);
    }

    fn advance_tick(&mut self, song: &Song) {
        self.arpeggio = self.arpeggio.wrapping_add(1);
        let pos = &mut self.position;
        pos.tick += 1;
        if pos.tick < TICKS_PER_PART {
            return;
        }
        pos.tick = 0;
        pos.part += 1;
        if pos.part < song.parts_per_beat() {
            return;
        }
        pos.part = 0;
        pos.beat += 1;
        if pos.beat < song.beats_per_bar() {
            return;
        }
        pos.beat = 0;
        self.advance_bar(song);
    }

    fn advance_bar(&mut self, song: &Song) {
        let current = self.position.bar;
        match self.following_bar(song) {
            Some(bar) => {
                if self.at_loop_end(song) {
                    trace!("Looping back to bar {bar}");
                    if let Some(remaining) = &mut self.loops_remaining {
                        *remaining -= 1;
                    }
                }
                self.previous_bar = Some(current);
                self.position.bar = bar;
            }
            None => {
                debug!("Playback reached the end of the song");
                self.position.bar = 0;
                self.previous_bar = None;
                self.finished = true;
            }
        }
    }

    /// The bar that plays after the current one, or `None` when playback
    /// stops there.
    fn following_bar(&self, song: &Song) -> Option<usize> {
        let next = self.position.bar + 1;
        if self.at_loop_end(song) {
            Some(song.loop_start())
        } else if next >= song.bar_count() {
            (self.loops_remaining.is_none() && self.config.loop_enabled).then(|| song.loop_start())
        } else {
            Some(next)
        }
    }

    /// True when the current bar closes the loop region and another pass
    /// through it is due.
    fn at_loop_end(&self, song: &Song) -> bool {
        let wants_loop = match self.loops_remaining {
            Some(remaining) => remaining > 1,
            None => self.config.loop_enabled,
        };
        wants_loop && self.position.bar + 1 == song.loop_start() + song.loop_length()
    }

    // ── Tone computation ────────────────────────────────────

    /// Targets for `channel` over the current tick, or `None` when it is
    /// between notes.
    fn tick_params(&self, song: &Song, channel: usize, samples: usize) -> Option<TickParams> {
        let kind = self.voices.get(channel)?.kind;
        if kind == VoiceKind::Silent {
            return None;
        }
        let bar = self.position.bar;
        let pattern = song.pattern_at(channel, bar)?;
        let instrument = song.instrument_for(channel, bar)?;

        let ticks_per_part = TICKS_PER_PART as f64;
        let part = self.position.beat * song.parts_per_beat() + self.position.part;
        let time = part as f64 + self.position.tick as f64 / ticks_per_part;
        let (index, note) = pattern.note_at(time)?;
        if note.pitches.is_empty() {
            return None;
        }

        let prev = previous_note(song, channel, self.previous_bar, pattern, index);
        let next = next_note(song, channel, self.following_bar(song), pattern, index);
        let transition = TRANSITIONS[instrument.transition.min(TRANSITIONS.len() - 1)];
        let seamless_prev = transition.is_seamless && prev.is_some();
        let seamless_next = transition.is_seamless && next.is_some();

        let effect = EFFECTS[instrument.effect.min(EFFECTS.len() - 1)];
        let chorus = CHORUSES[instrument.chorus.min(CHORUSES.len() - 1)];
        let is_drum = song.is_drum_channel(channel);
        let seconds_per_tick = samples as f64 / self.sample_rate;
        let note_length = note.length() as f64;
        let t_start = time - note.start as f64;
        let t_end = t_start + 1.0 / ticks_per_part;

        let riff = (song.riff as usize).min(ARPEGGIO_TICKS.len() - 1);
        let step = (self.arpeggio / ARPEGGIO_TICKS[riff]) as usize;
        let harmony = chorus.harmonizes && kind == VoiceKind::Chip && note.pitches.len() > 1;
        let (pitch_a, pitch_b) = if harmony {
            (note.pitches[0], note.pitches[1 + step % (note.pitches.len() - 1)])
        } else {
            let pitch = note.pitches[step % note.pitches.len()];
            (pitch, pitch)
        };

        let slide_from = match prev {
            Some(p) if transition.slides => {
                Some((p.pitches[0] + p.end_interval() - note.pitches[0]) as f64)
            }
            _ => None,
        };

        let moment = |t: f64| {
            let (mut interval, pin_volume) = note.envelope_at(t);
            if let Some(distance) = slide_from {
                interval += distance * (1.0 - t).max(0.0);
            }
            let seconds = t * ticks_per_part * seconds_per_tick;
            if t >= effect.vibrato_delay as f64 {
                interval += effect.vibrato * (2.0 * PI * VIBRATO_HZ * seconds).sin();
            }
            let attack = if seamless_prev || transition.attack_ticks == 0 {
                1.0
            } else {
                (t * ticks_per_part / transition.attack_ticks as f64).min(1.0)
            };
            let release = if seamless_next || transition.release_ticks == 0 {
                1.0
            } else {
                ((note_length - t) * ticks_per_part / transition.release_ticks as f64).clamp(0.0, 1.0)
            };
            let tremolo = 1.0 - effect.tremolo * (0.5 - 0.5 * (2.0 * PI * TREMOLO_HZ * seconds).cos());
            let pin_volume = pin_volume / NOTE_VOLUME_MAX as f64;
            Moment { interval, envelope: pin_volume * attack * release * tremolo, seconds, pin_volume }
        };
        let start = moment(t_start);
        let end = moment(t_end);

        let pitch_offset = song.key_offset() as f64
            + 12.0
            + (song.detune as f64 - DETUNE_CENTER as f64) * DETUNE_STEP;
        let midi = |pitch: i32, m: &Moment| pitch as f64 + m.interval + pitch_offset;
        let rate = self.sample_rate;

        let mut params = TickParams {
            reset_phase: t_start == 0.0 && !seamless_prev,
            filter: 1.0,
            filter_scale: 1.0,
            pan: pan_gains(instrument.pan),
            ..TickParams::default()
        };

        let timbre_gain = match kind {
            VoiceKind::Silent => return None,
            VoiceKind::Chip => {
                let wave = CHIP_WAVES[instrument.wave.min(CHIP_WAVES.len() - 1)];
                let filter = FILTERS[instrument.filter.min(FILTERS.len() - 1)];
                let spread = |pitch: i32, m: &Moment, sign: f64| {
                    frequency_from_pitch(midi(pitch, m) + chorus.offset + sign * chorus.interval)
                };
                let (a0, a1) = (spread(pitch_a, &start, 1.0), spread(pitch_a, &end, 1.0));
                let (b0, b1) = (spread(pitch_b, &start, -1.0), spread(pitch_b, &end, -1.0));
                params.phase_delta_start = [a0 / rate, b0 / rate, 0.0, 0.0];
                params.phase_delta_end = [a1 / rate, b1 / rate, 0.0, 0.0];
                set_chip_filter(&mut params, &filter, a0, start.seconds, rate);
                params.wave = instrument.wave;
                params.chorus_sign = chorus.sign;
                wave.volume * filter.volume * chorus.volume
            }
            VoiceKind::PulseWidth => {
                let filter = FILTERS[instrument.filter.min(FILTERS.len() - 1)];
                let f0 = frequency_from_pitch(midi(pitch_a, &start));
                let f1 = frequency_from_pitch(midi(pitch_a, &end));
                params.phase_delta_start[0] = f0 / rate;
                params.phase_delta_end[0] = f1 / rate;
                set_chip_filter(&mut params, &filter, f0, start.seconds, rate);
                params.pulse_duty = pulse_width_ratio(instrument.pulse_width);
                PULSE_VOLUME * filter.volume
            }
            VoiceKind::Noise => {
                let noise = NOISE_WAVES[instrument.wave.min(NOISE_WAVES.len() - 1)];
                // Drum pitches are steps relative to the top drum, which
                // plays the wave at its base pitch.
                let drum_pitch = |m: &Moment| {
                    let steps = pitch_a as f64 + m.interval - (DRUM_COUNT - 1) as f64;
                    noise.base_pitch + steps * NOISE_PITCH_STEP
                };
                let f0 = frequency_from_pitch(drum_pitch(&start));
                let f1 = frequency_from_pitch(drum_pitch(&end));
                params.phase_delta_start[0] = f0 * NOISE_SAMPLES_PER_CYCLE / rate;
                params.phase_delta_end[0] = f1 * NOISE_SAMPLES_PER_CYCLE / rate;
                if noise.is_soft {
                    params.filter = (f0 * noise.pitch_filter_mult / rate).min(1.0);
                }
                params.wave = instrument.wave;
                noise.volume
            }
            VoiceKind::Fm => {
                let f0 = frequency_from_pitch(midi(pitch_a, &start));
                let f1 = frequency_from_pitch(midi(pitch_a, &end));
                let beats_per_second = song.beats_per_minute() / 60.0;
                let envelope = |env: usize, m: &Moment| {
                    operator_envelope(env, m.seconds, m.seconds * beats_per_second, m.pin_volume)
                };
                for (i, operator) in instrument.operators.iter().enumerate() {
                    let freq = OPERATOR_FREQUENCIES[operator.frequency.min(OPERATOR_FREQUENCIES.len() - 1)];
                    params.phase_delta_start[i] = (f0 * freq.mult + freq.hz_offset).max(0.0) / rate;
                    params.phase_delta_end[i] = (f1 * freq.mult + freq.hz_offset).max(0.0) / rate;
                    let amplitude = operator_amplitude_curve(operator.amplitude) * freq.amplitude_sign;
                    params.operator_amplitude_start[i] = amplitude * envelope(operator.envelope, &start);
                    params.operator_amplitude_end[i] = amplitude * envelope(operator.envelope, &end);
                }
                let feedback = operator_amplitude_curve(instrument.feedback_amplitude);
                params.feedback_start = feedback * envelope(instrument.feedback_envelope, &start);
                params.feedback_end = feedback * envelope(instrument.feedback_envelope, &end);
                params.algorithm = instrument.algorithm;
                params.feedback_type = instrument.feedback_type;
                FM_VOLUME
            }
        };

        let mix_gain = if is_drum {
            MIX_STYLES[song.mix.min(MIX_STYLES.len() - 1)].drum_gain
        } else {
            1.0
        };
        let gain = timbre_gain * volume_multiplier(instrument.volume) * mix_gain * CHANNEL_GAIN;
        params.volume_start = start.envelope * gain;
        params.volume_end = end.envelope * gain;
        Some(params)
    }

    // ── Master bus ──────────────────────────────────────────

    fn mix_down(&mut self, song: &Song, left: &mut [f32], right: &mut [f32]) {
        let bus_gain = MIX_STYLES[song.mix.min(MIX_STYLES.len() - 1)].bus_gain;
        let blend = song.blend.min(BLEND_RANGE - 1) as f64 / (BLEND_RANGE - 1) as f64 * BLEND_MAX;
        let muff = MUFF_COEFFICIENTS[(song.muff as usize).min(MUFF_COEFFICIENTS.len() - 1)];

        for (i, (out_l, out_r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let mut l = self.mix_left[i] * bus_gain;
            let mut r = self.mix_right[i] * bus_gain;
            if self.config.reverb_enabled {
                (l, r) = self.reverb.process(l, r);
            }
            if blend > 0.0 {
                (l, r) = (l + (r - l) * blend, r + (l - r) * blend);
            }
            if muff < 1.0 {
                self.muff[0] += (l - self.muff[0]) * muff;
                self.muff[1] += (r - self.muff[1]) * muff;
                (l, r) = (self.muff[0], self.muff[1]);
            }
            if self.config.limiter_enabled {
                (l, r) = self.limiter.process(l, r);
            }
            *out_l = l.clamp(-1.0, 1.0) as f32;
            *out_r = r.clamp(-1.0, 1.0) as f32;
        }
    }
}

/// Lowpass coefficient for chip and pulse voices: the cutoff sits
/// `6 - base` octaves above the note and halves `decay` times per second.
fn set_chip_filter(params: &mut TickParams, filter: &FilterPreset, freq: f64, seconds: f64, rate: f64) {
    let cutoff = freq * 2.0_f64.powf(6.0 - filter.base);
    let initial = (2.0 * PI * cutoff / rate).min(1.0);
    params.filter = initial * 0.5_f64.powf(filter.decay * seconds);
    params.filter_scale = 0.5_f64.powf(filter.decay / rate);
}

/// The note ending exactly where `pattern.notes[index]` starts, looking
/// into `previous_bar` (the bar played before this one) when the note
/// opens its bar.
fn previous_note<'a>(
    song: &'a Song,
    channel: usize,
    previous_bar: Option<usize>,
    pattern: &'a Pattern,
    index: usize,
) -> Option<&'a Note> {
    let note = &pattern.notes[index];
    if index > 0 {
        let prev = &pattern.notes[index - 1];
        return (prev.end == note.start).then_some(prev);
    }
    if note.start != 0 {
        return None;
    }
    let last = song.pattern_at(channel, previous_bar?)?.notes.last()?;
    (last.end == song.bar_length()).then_some(last)
}

/// The note starting exactly where `pattern.notes[index]` ends, looking
/// into `next_bar` (the bar played after this one, which is the loop start
/// at the loop end) when the note closes its bar.
fn next_note<'a>(
    song: &'a Song,
    channel: usize,
    next_bar: Option<usize>,
    pattern: &'a Pattern,
    index: usize,
) -> Option<&'a Note> {
    let note = &pattern.notes[index];
    if let Some(next) = pattern.notes.get(index + 1) {
        return (next.start == note.end).then_some(next);
    }
    if note.end != song.bar_length() {
        return None;
    }
    let first = song.pattern_at(channel, next_bar?)?.notes.first()?;
    (first.start == 0).then_some(first)
}
