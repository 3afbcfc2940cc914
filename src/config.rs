//! Parameter table: the static tunables shared by the score model, the
//! codec, and the synthesis engine.
//!
//! Tables are indexed by the small integers stored in the song string, so
//! their ORDER is part of the wire format: entries may be appended, never
//! reordered or removed.

use std::f64::consts::PI;
use std::sync::OnceLock;

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

// ── Song structure limits ───────────────────────────────────

pub const PITCH_CHANNEL_COUNT_MIN: usize = 1;
pub const PITCH_CHANNEL_COUNT_MAX: usize = 6;
pub const DRUM_CHANNEL_COUNT_MIN: usize = 0;
pub const DRUM_CHANNEL_COUNT_MAX: usize = 2;
pub const BEATS_PER_BAR_MIN: u32 = 3;
pub const BEATS_PER_BAR_MAX: u32 = 16;
pub const BAR_COUNT_MIN: usize = 1;
pub const BAR_COUNT_MAX: usize = 128;
pub const PATTERNS_PER_CHANNEL_MIN: usize = 1;
pub const PATTERNS_PER_CHANNEL_MAX: usize = 64;
pub const INSTRUMENTS_PER_CHANNEL_MIN: usize = 1;
pub const INSTRUMENTS_PER_CHANNEL_MAX: usize = 10;

/// Allowed parts-per-beat values, in wire order.
pub const PARTS_PER_BEAT: [u32; 10] = [3, 4, 6, 8, 16, 12, 9, 5, 50, 24];

/// Octave scroll offset per channel.
pub const OCTAVE_MAX: u32 = 5;
/// Highest storable pitch on a pitch channel (seven octaves).
pub const MAX_PITCH: i32 = 84;
/// Drum channels address twelve noise pitches.
pub const DRUM_COUNT: i32 = 12;
pub const NOTE_VOLUME_MAX: u32 = 3;
pub const MAX_CHORD_SIZE: usize = 4;
/// Arpeggio sub-ticks per part.
pub const TICKS_PER_PART: u32 = 4;

pub const TEMPO_STEPS: u32 = 25;
pub const DEFAULT_TEMPO: u32 = 7;
/// Tempo steps addressable by the oldest song strings.
pub const OLD_TEMPOS: [u32; 4] = [4, 7, 10, 13];

pub const REVERB_RANGE: u32 = 8;
pub const BLEND_RANGE: u32 = 4;
pub const RIFF_RANGE: u32 = 4;
pub const DETUNE_RANGE: u32 = 9;
pub const DETUNE_CENTER: u32 = 4;
pub const MUFF_RANGE: u32 = 4;

pub const VOLUME_RANGE: u32 = 8;
pub const PAN_RANGE: u32 = 9;
pub const PAN_CENTER: u32 = 4;
pub const PULSE_WIDTH_RANGE: u32 = 8;

pub const OPERATOR_COUNT: usize = 4;
pub const OPERATOR_AMPLITUDE_MAX: u32 = 15;

/// Capacity of the shape history used by the note codec.
pub const RECENT_SHAPE_CAPACITY: usize = 10;
/// Capacity of the pitch history used by the note codec.
pub const RECENT_PITCH_CAPACITY: usize = 8;

/// Tempo step → beats per minute. Step 7 is exactly 120 BPM.
pub fn beats_per_minute(tempo: u32) -> f64 {
    (120.0 * 2.0_f64.powf((tempo as f64 - DEFAULT_TEMPO as f64) / 9.0)).round()
}

/// Inverse of [`beats_per_minute`], clamped to the tempo range.
pub fn tempo_from_bpm(bpm: f64) -> u32 {
    if !bpm.is_finite() || bpm <= 0.0 {
        return DEFAULT_TEMPO;
    }
    let step = DEFAULT_TEMPO as f64 + 9.0 * (bpm / 120.0).log2();
    step.round().clamp(0.0, (TEMPO_STEPS - 1) as f64) as u32
}

/// Equal-tempered frequency anchored at MIDI 69 = 440 Hz.
pub fn frequency_from_pitch(pitch: f64) -> f64 {
    440.0 * 2.0_f64.powf((pitch - 69.0) / 12.0)
}

/// Index of `parts` in [`PARTS_PER_BEAT`], or of the closest allowed value.
pub fn parts_per_beat_index(parts: u32) -> usize {
    PARTS_PER_BEAT
        .iter()
        .enumerate()
        .min_by_key(|&(_, &p)| p.abs_diff(parts))
        .map(|(i, _)| i)
        .unwrap_or(1)
}

/// Find a table entry by name.
pub fn index_by_name<T>(table: &[T], name: &str, get: impl Fn(&T) -> &str) -> Option<usize> {
    table.iter().position(|entry| get(entry) == name)
}

// ── Scales and keys ─────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Scale {
    pub name: &'static str,
    pub flags: [bool; 12],
}

const T: bool = true;
const F: bool = false;

pub const SCALES: &[Scale] = &[
    Scale { name: "easy :)", flags: [T, F, T, F, T, F, F, T, F, T, F, F] },
    Scale { name: "easy :(", flags: [T, F, F, T, F, T, F, T, F, F, T, F] },
    Scale { name: "island :)", flags: [T, F, F, F, T, T, F, T, F, F, F, T] },
    Scale { name: "island :(", flags: [T, T, F, T, F, F, F, T, T, F, F, F] },
    Scale { name: "blues :)", flags: [T, F, T, T, T, F, F, T, F, T, F, F] },
    Scale { name: "blues :(", flags: [T, F, F, T, F, T, T, T, F, F, T, F] },
    Scale { name: "normal :)", flags: [T, F, T, F, T, T, F, T, F, T, F, T] },
    Scale { name: "normal :(", flags: [T, F, T, T, F, T, F, T, T, F, T, F] },
    Scale { name: "dbl harmonic :)", flags: [T, T, F, F, T, T, F, T, T, F, F, T] },
    Scale { name: "dbl harmonic :(", flags: [T, F, T, T, F, F, T, T, T, F, F, T] },
    Scale { name: "strange", flags: [T, F, T, F, T, F, T, F, T, F, T, F] },
    Scale { name: "expert", flags: [T; 12] },
];
pub const DEFAULT_SCALE: usize = 11;

#[derive(Debug, Clone, Copy)]
pub struct Key {
    pub name: &'static str,
    /// Semitones above C.
    pub offset: i32,
}

pub const KEYS: &[Key] = &[
    Key { name: "C", offset: 0 },
    Key { name: "C♯", offset: 1 },
    Key { name: "D", offset: 2 },
    Key { name: "D♯", offset: 3 },
    Key { name: "E", offset: 4 },
    Key { name: "F", offset: 5 },
    Key { name: "F♯", offset: 6 },
    Key { name: "G", offset: 7 },
    Key { name: "G♯", offset: 8 },
    Key { name: "A", offset: 9 },
    Key { name: "A♯", offset: 10 },
    Key { name: "B", offset: 11 },
];

// ── Mixing and output rate ──────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct MixStyle {
    pub name: &'static str,
    /// Gain applied to the summed bus before reverb.
    pub bus_gain: f64,
    /// Extra gain for drum channels.
    pub drum_gain: f64,
}

pub const MIX_STYLES: &[MixStyle] = &[
    MixStyle { name: "standard", bus_gain: 1.0, drum_gain: 1.0 },
    MixStyle { name: "loud", bus_gain: 1.5, drum_gain: 1.2 },
    MixStyle { name: "soft", bus_gain: 0.6, drum_gain: 0.8 },
];

#[derive(Debug, Clone, Copy)]
pub struct SampleRateMode {
    pub name: &'static str,
    /// `None` defers to the host's rate.
    pub hz: Option<u32>,
}

pub const SAMPLE_RATES: &[SampleRateMode] = &[
    SampleRateMode { name: "host", hz: None },
    SampleRateMode { name: "44100", hz: Some(44100) },
    SampleRateMode { name: "48000", hz: Some(48000) },
    SampleRateMode { name: "22050", hz: Some(22050) },
    SampleRateMode { name: "11025", hz: Some(11025) },
];

// ── Instrument tables ───────────────────────────────────────

pub const INSTRUMENT_TYPE_NAMES: [&str; 4] = ["chip", "FM", "noise", "PWM"];

#[derive(Debug, Clone, Copy)]
pub struct ChipWave {
    pub name: &'static str,
    pub volume: f64,
    pub samples: &'static [f64],
}

const TRIANGLE: [f64; 32] = {
    let mut wave = [0.0; 32];
    let mut i = 0;
    while i < 8 {
        let v = (2 * i + 1) as f64 / 15.0;
        wave[i] = v;
        wave[15 - i] = v;
        wave[16 + i] = -v;
        wave[31 - i] = -v;
        i += 1;
    }
    wave
};

const SAWTOOTH: [f64; 32] = {
    let mut wave = [0.0; 32];
    let mut i = 0;
    while i < 32 {
        wave[i] = (2 * i as i32 - 31) as f64 / 31.0;
        i += 1;
    }
    wave
};

pub const CHIP_WAVES: &[ChipWave] = &[
    ChipWave { name: "triangle", volume: 1.0, samples: &TRIANGLE },
    ChipWave { name: "square", volume: 0.5, samples: &[1.0, -1.0] },
    ChipWave { name: "pulse wide", volume: 0.5, samples: &[1.0, -1.0, -1.0, -1.0] },
    ChipWave { name: "pulse narrow", volume: 0.5, samples: &[1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0] },
    ChipWave { name: "sawtooth", volume: 0.65, samples: &SAWTOOTH },
    ChipWave {
        name: "double saw",
        volume: 0.5,
        samples: &[0.0, -0.2, -0.4, -0.6, -0.8, -1.0, 1.0, -0.8, -0.6, -0.4, -0.2, 1.0, 0.8, 0.6, 0.4, 0.2],
    },
    ChipWave {
        name: "double pulse",
        volume: 0.4,
        samples: &[1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0],
    },
    ChipWave { name: "spiky", volume: 0.4, samples: &[1.0, -1.0, 1.0, -1.0, 1.0, 0.0] },
];

#[derive(Debug, Clone, Copy)]
pub struct NoiseWave {
    pub name: &'static str,
    pub volume: f64,
    /// Pitch at which the wave plays at its native rate.
    pub base_pitch: f64,
    pub pitch_filter_mult: f64,
    /// Soft noises follow a pitch-dependent lowpass; hard ones are unfiltered.
    pub is_soft: bool,
}

pub const NOISE_WAVES: &[NoiseWave] = &[
    NoiseWave { name: "retro", volume: 0.25, base_pitch: 69.0, pitch_filter_mult: 1024.0, is_soft: false },
    NoiseWave { name: "white", volume: 1.0, base_pitch: 69.0, pitch_filter_mult: 8.0, is_soft: true },
    NoiseWave { name: "clang", volume: 0.4, base_pitch: 69.0, pitch_filter_mult: 1024.0, is_soft: false },
    NoiseWave { name: "buzz", volume: 0.3, base_pitch: 69.0, pitch_filter_mult: 1024.0, is_soft: false },
    NoiseWave { name: "hollow", volume: 1.5, base_pitch: 96.0, pitch_filter_mult: 1.0, is_soft: true },
];

pub const NOISE_WAVE_LENGTH: usize = 1 << 15;
/// Noise samples consumed per oscillator cycle.
pub const NOISE_SAMPLES_PER_CYCLE: f64 = 64.0;

#[derive(Debug, Clone, Copy)]
pub struct FilterPreset {
    pub name: &'static str,
    /// Octaves the cutoff sits below six octaves above the note.
    pub base: f64,
    /// Cutoff halvings per second.
    pub decay: f64,
    pub volume: f64,
}

pub const FILTERS: &[FilterPreset] = &[
    FilterPreset { name: "sustain sharp", base: 2.0, decay: 0.0, volume: 0.4 },
    FilterPreset { name: "sustain medium", base: 3.5, decay: 0.0, volume: 0.7 },
    FilterPreset { name: "sustain soft", base: 5.0, decay: 0.0, volume: 1.0 },
    FilterPreset { name: "decay sharp", base: 2.0, decay: 10.0, volume: 0.5 },
    FilterPreset { name: "decay medium", base: 3.5, decay: 7.0, volume: 0.8 },
    FilterPreset { name: "decay soft", base: 5.0, decay: 4.0, volume: 1.0 },
];

#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub name: &'static str,
    /// Continues phase and volume into an abutting note.
    pub is_seamless: bool,
    /// Glides pitch from the previous note over the first part.
    pub slides: bool,
    /// Ticks spent fading in from silence.
    pub attack_ticks: u32,
    /// Ticks spent fading out to silence.
    pub release_ticks: u32,
}

pub const TRANSITIONS: &[Transition] = &[
    Transition { name: "seamless", is_seamless: true, slides: false, attack_ticks: 0, release_ticks: 1 },
    Transition { name: "sudden", is_seamless: false, slides: false, attack_ticks: 0, release_ticks: 1 },
    Transition { name: "smooth", is_seamless: false, slides: false, attack_ticks: 4, release_ticks: 2 },
    Transition { name: "slide", is_seamless: true, slides: true, attack_ticks: 0, release_ticks: 1 },
];
pub const DEFAULT_TRANSITION: usize = 1;

#[derive(Debug, Clone, Copy)]
pub struct Effect {
    pub name: &'static str,
    /// Vibrato depth in semitones.
    pub vibrato: f64,
    pub tremolo: f64,
    /// Parts before vibrato kicks in.
    pub vibrato_delay: u32,
}

pub const EFFECTS: &[Effect] = &[
    Effect { name: "none", vibrato: 0.0, tremolo: 0.0, vibrato_delay: 0 },
    Effect { name: "vibrato light", vibrato: 0.15, tremolo: 0.0, vibrato_delay: 0 },
    Effect { name: "vibrato delayed", vibrato: 0.3, tremolo: 0.0, vibrato_delay: 3 },
    Effect { name: "vibrato heavy", vibrato: 0.45, tremolo: 0.0, vibrato_delay: 0 },
    Effect { name: "tremolo light", vibrato: 0.0, tremolo: 0.25, vibrato_delay: 0 },
    Effect { name: "tremolo heavy", vibrato: 0.0, tremolo: 0.5, vibrato_delay: 0 },
];

/// Legacy effect digit → current effect index.
pub const LEGACY_EFFECT_MAP: [usize; 6] = [0, 1, 3, 4, 5, 2];

pub const VIBRATO_HZ: f64 = 6.0;
pub const TREMOLO_HZ: f64 = 4.0;

#[derive(Debug, Clone, Copy)]
pub struct Chorus {
    pub name: &'static str,
    /// Semitone spread between the two oscillators.
    pub interval: f64,
    /// Shared semitone offset.
    pub offset: f64,
    pub volume: f64,
    pub sign: f64,
    /// The second oscillator plays the next chord pitch instead of a detuned copy.
    pub harmonizes: bool,
}

pub const CHORUSES: &[Chorus] = &[
    Chorus { name: "union", interval: 0.0, offset: 0.0, volume: 0.7, sign: 1.0, harmonizes: false },
    Chorus { name: "shimmer", interval: 0.02, offset: 0.0, volume: 0.8, sign: 1.0, harmonizes: false },
    Chorus { name: "hum", interval: 0.05, offset: 0.0, volume: 1.0, sign: 1.0, harmonizes: false },
    Chorus { name: "honky tonk", interval: 0.1, offset: 0.1, volume: 1.0, sign: 1.0, harmonizes: false },
    Chorus { name: "dissonant", interval: 0.25, offset: 0.0, volume: 0.9, sign: -1.0, harmonizes: false },
    Chorus { name: "fifths", interval: 3.5, offset: 3.5, volume: 0.9, sign: 1.0, harmonizes: false },
    Chorus { name: "octaves", interval: 6.0, offset: 6.0, volume: 0.8, sign: 1.0, harmonizes: false },
    Chorus { name: "bowed", interval: 0.02, offset: 0.0, volume: 1.0, sign: -1.0, harmonizes: false },
    Chorus { name: "harmony", interval: 0.05, offset: 0.0, volume: 1.0, sign: 1.0, harmonizes: true },
];

/// Pulse duty cycle for a pulse-width setting (0.5 at the top of the range).
pub fn pulse_width_ratio(setting: u32) -> f64 {
    let steps = (PULSE_WIDTH_RANGE - 1).saturating_sub(setting.min(PULSE_WIDTH_RANGE - 1));
    0.5 * 0.5_f64.powf(steps as f64 * 0.5)
}

/// Instrument volume attenuation step → linear gain; the last step is silent.
pub fn volume_multiplier(volume: u32) -> f64 {
    if volume >= VOLUME_RANGE - 1 {
        0.0
    } else {
        0.5_f64.powf(volume as f64 * 0.5)
    }
}

/// Pan setting → (left, right) gain.
pub fn pan_gains(pan: u32) -> (f64, f64) {
    let pan = pan.min(PAN_RANGE - 1) as f64;
    let center = PAN_CENTER as f64;
    (
        ((2.0 * center - pan) / center).min(1.0),
        (pan / center).min(1.0),
    )
}

// ── FM tables ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Algorithm {
    pub name: &'static str,
    pub carrier_count: usize,
    /// Zero-based operators modulating each operator. Modulators always
    /// have a higher index than what they modulate.
    pub modulated_by: [&'static [usize]; OPERATOR_COUNT],
}

pub const ALGORITHMS: &[Algorithm] = &[
    Algorithm { name: "1←(2 3 4)", carrier_count: 1, modulated_by: [&[1, 2, 3], &[], &[], &[]] },
    Algorithm { name: "1←(2 3←4)", carrier_count: 1, modulated_by: [&[1, 2], &[], &[3], &[]] },
    Algorithm { name: "1←2←(3 4)", carrier_count: 1, modulated_by: [&[1], &[2, 3], &[], &[]] },
    Algorithm { name: "1←(2 3)←4", carrier_count: 1, modulated_by: [&[1, 2], &[3], &[3], &[]] },
    Algorithm { name: "1←2←3←4", carrier_count: 1, modulated_by: [&[1], &[2], &[3], &[]] },
    Algorithm { name: "1←3 2←4", carrier_count: 2, modulated_by: [&[2], &[3], &[], &[]] },
    Algorithm { name: "1 2←(3 4)", carrier_count: 2, modulated_by: [&[], &[2, 3], &[], &[]] },
    Algorithm { name: "1 2←3←4", carrier_count: 2, modulated_by: [&[], &[2], &[3], &[]] },
    Algorithm { name: "(1 2)←3←4", carrier_count: 2, modulated_by: [&[2], &[2], &[3], &[]] },
    Algorithm { name: "(1 2)←(3 4)", carrier_count: 2, modulated_by: [&[2, 3], &[2, 3], &[], &[]] },
    Algorithm { name: "1 2 3←4", carrier_count: 3, modulated_by: [&[], &[], &[3], &[]] },
    Algorithm { name: "(1 2 3)←4", carrier_count: 3, modulated_by: [&[3], &[3], &[3], &[]] },
    Algorithm { name: "1 2 3 4", carrier_count: 4, modulated_by: [&[], &[], &[], &[]] },
];

#[derive(Debug, Clone, Copy)]
pub struct Feedback {
    pub name: &'static str,
    /// Zero-based operators whose previous output feeds each operator.
    pub indices: [&'static [usize]; OPERATOR_COUNT],
}

pub const FEEDBACKS: &[Feedback] = &[
    Feedback { name: "1⟲", indices: [&[0], &[], &[], &[]] },
    Feedback { name: "2⟲", indices: [&[], &[1], &[], &[]] },
    Feedback { name: "3⟲", indices: [&[], &[], &[2], &[]] },
    Feedback { name: "4⟲", indices: [&[], &[], &[], &[3]] },
    Feedback { name: "1⟲ 2⟲", indices: [&[0], &[1], &[], &[]] },
    Feedback { name: "3⟲ 4⟲", indices: [&[], &[], &[2], &[3]] },
    Feedback { name: "1⟲ 2⟲ 3⟲", indices: [&[0], &[1], &[2], &[]] },
    Feedback { name: "2⟲ 3⟲ 4⟲", indices: [&[], &[1], &[2], &[3]] },
    Feedback { name: "1⟲ 2⟲ 3⟲ 4⟲", indices: [&[0], &[1], &[2], &[3]] },
    Feedback { name: "1→2", indices: [&[], &[0], &[], &[]] },
    Feedback { name: "1→3", indices: [&[], &[], &[0], &[]] },
    Feedback { name: "1→4", indices: [&[], &[], &[], &[0]] },
    Feedback { name: "2→3", indices: [&[], &[], &[1], &[]] },
    Feedback { name: "2→4", indices: [&[], &[], &[], &[1]] },
    Feedback { name: "3→4", indices: [&[], &[], &[], &[2]] },
    Feedback { name: "1→3 2→4", indices: [&[], &[], &[0], &[1]] },
    Feedback { name: "1→4 2→3", indices: [&[], &[], &[1], &[0]] },
    Feedback { name: "1→2→3→4", indices: [&[], &[0], &[1], &[2]] },
];

#[derive(Debug, Clone, Copy)]
pub struct OperatorFrequency {
    pub name: &'static str,
    pub mult: f64,
    pub hz_offset: f64,
    pub amplitude_sign: f64,
}

pub const OPERATOR_FREQUENCIES: &[OperatorFrequency] = &[
    OperatorFrequency { name: "1×", mult: 1.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "~1×", mult: 1.0, hz_offset: 1.5, amplitude_sign: -1.0 },
    OperatorFrequency { name: "2×", mult: 2.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "~2×", mult: 2.0, hz_offset: -1.3, amplitude_sign: -1.0 },
    OperatorFrequency { name: "3×", mult: 3.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "4×", mult: 4.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "5×", mult: 5.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "6×", mult: 6.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "7×", mult: 7.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "8×", mult: 8.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "9×", mult: 9.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "11×", mult: 11.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "13×", mult: 13.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "16×", mult: 16.0, hz_offset: 0.0, amplitude_sign: 1.0 },
    OperatorFrequency { name: "20×", mult: 20.0, hz_offset: 0.0, amplitude_sign: 1.0 },
];

/// Closed-form operator envelope families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeCurve {
    /// Follows the note's own pin volume.
    Custom,
    Steady,
    Punch,
    Flare,
    Pluck,
    Swell,
    Tremolo,
    LinearDecay,
    Flute,
}

#[derive(Debug, Clone, Copy)]
pub struct OperatorEnvelope {
    pub name: &'static str,
    pub curve: EnvelopeCurve,
    pub speed: f64,
}

pub const OPERATOR_ENVELOPES: &[OperatorEnvelope] = &[
    OperatorEnvelope { name: "custom", curve: EnvelopeCurve::Custom, speed: 0.0 },
    OperatorEnvelope { name: "steady", curve: EnvelopeCurve::Steady, speed: 0.0 },
    OperatorEnvelope { name: "punch", curve: EnvelopeCurve::Punch, speed: 0.0 },
    OperatorEnvelope { name: "flare 1", curve: EnvelopeCurve::Flare, speed: 32.0 },
    OperatorEnvelope { name: "flare 2", curve: EnvelopeCurve::Flare, speed: 8.0 },
    OperatorEnvelope { name: "flare 3", curve: EnvelopeCurve::Flare, speed: 2.0 },
    OperatorEnvelope { name: "pluck 1", curve: EnvelopeCurve::Pluck, speed: 32.0 },
    OperatorEnvelope { name: "pluck 2", curve: EnvelopeCurve::Pluck, speed: 8.0 },
    OperatorEnvelope { name: "pluck 3", curve: EnvelopeCurve::Pluck, speed: 2.0 },
    OperatorEnvelope { name: "swell 1", curve: EnvelopeCurve::Swell, speed: 32.0 },
    OperatorEnvelope { name: "swell 2", curve: EnvelopeCurve::Swell, speed: 8.0 },
    OperatorEnvelope { name: "swell 3", curve: EnvelopeCurve::Swell, speed: 2.0 },
    OperatorEnvelope { name: "tremolo 1", curve: EnvelopeCurve::Tremolo, speed: 1.0 },
    OperatorEnvelope { name: "tremolo 2", curve: EnvelopeCurve::Tremolo, speed: 2.0 },
    OperatorEnvelope { name: "tremolo 3", curve: EnvelopeCurve::Tremolo, speed: 4.0 },
    OperatorEnvelope { name: "decay 1", curve: EnvelopeCurve::LinearDecay, speed: 2.0 },
    OperatorEnvelope { name: "decay 2", curve: EnvelopeCurve::LinearDecay, speed: 1.0 },
    OperatorEnvelope { name: "decay 3", curve: EnvelopeCurve::LinearDecay, speed: 0.5 },
    OperatorEnvelope { name: "flute", curve: EnvelopeCurve::Flute, speed: 5.0 },
];

/// Operator amplitude setting → linear amplitude, 0 → 0 and 15 → 1.
pub fn operator_amplitude_curve(amplitude: u32) -> f64 {
    (16.0_f64.powf(amplitude.min(OPERATOR_AMPLITUDE_MAX) as f64 / 15.0) - 1.0) / 15.0
}

/// Evaluate an operator envelope.
///
/// `seconds` and `beats` are measured from the note start; `custom_volume` is
/// the note's pin volume in `[0, 1]`.
pub fn operator_envelope(envelope: usize, seconds: f64, beats: f64, custom_volume: f64) -> f64 {
    let env = OPERATOR_ENVELOPES[envelope.min(OPERATOR_ENVELOPES.len() - 1)];
    match env.curve {
        EnvelopeCurve::Custom => custom_volume,
        EnvelopeCurve::Steady => 1.0,
        EnvelopeCurve::Punch => (2.0 - seconds * 10.0).max(1.0),
        EnvelopeCurve::Flare => {
            let attack = 0.25 / env.speed.sqrt();
            if seconds < attack {
                seconds / attack
            } else {
                1.0 / (1.0 + (seconds - attack) * env.speed)
            }
        }
        EnvelopeCurve::Pluck => 1.0 / (1.0 + seconds * env.speed),
        EnvelopeCurve::Swell => 1.0 - 1.0 / (1.0 + seconds * env.speed),
        EnvelopeCurve::Tremolo => 0.5 - (beats * 2.0 * PI * env.speed).cos() * 0.5,
        EnvelopeCurve::LinearDecay => (1.0 - seconds * env.speed).max(0.0),
        EnvelopeCurve::Flute => (seconds * 8.0).min(1.0) * (0.9 + 0.1 * (seconds * 2.0 * PI * env.speed).sin()),
    }
}

/// Sine table with one guard sample for linear interpolation.
pub const SINE_WAVE_LENGTH: usize = 256;

pub fn sine_wave() -> &'static [f64] {
    static SINE: OnceLock<Vec<f64>> = OnceLock::new();
    SINE.get_or_init(|| {
        (0..=SINE_WAVE_LENGTH)
            .map(|i| (i as f64 * 2.0 * PI / SINE_WAVE_LENGTH as f64).sin())
            .collect()
    })
}

// ── Noise waves ─────────────────────────────────────────────

/// Lazily generated sample buffer for a noise wave.
pub fn noise_wave(index: usize) -> &'static [f64] {
    static WAVES: OnceLock<Vec<Vec<f64>>> = OnceLock::new();
    let waves = WAVES.get_or_init(|| (0..NOISE_WAVES.len()).map(generate_noise_wave).collect());
    &waves[index.min(waves.len() - 1)]
}

fn generate_noise_wave(index: usize) -> Vec<f64> {
    let mut wave = vec![0.0; NOISE_WAVE_LENGTH];
    match index {
        1 => {
            let mut rng = fastrand::Rng::with_seed(0x5eed_0001);
            for sample in wave.iter_mut() {
                *sample = rng.f64() * 2.0 - 1.0;
            }
        }
        4 => {
            let retro = lfsr_wave(1 << 14);
            let mut spectrum = vec![Complex::new(0.0, 0.0); NOISE_WAVE_LENGTH];
            draw_noise_spectrum(&mut spectrum, &retro, 10.0, 11.0, 1.0, 1.0, 0.0);
            draw_noise_spectrum(&mut spectrum, &retro, 11.0, 14.0, -2.0, -2.0, 0.0);
            inverse_real_fourier_transform(&mut spectrum);
            let scale = 1.0 / (NOISE_WAVE_LENGTH as f64).sqrt();
            for (sample, bin) in wave.iter_mut().zip(&spectrum) {
                *sample = bin.re * scale;
            }
        }
        _ => {
            let feedback = match index {
                2 => 2 << 14,
                3 => 10 << 2,
                _ => 1 << 14,
            };
            wave = lfsr_wave(feedback);
        }
    }
    wave
}

/// 15-bit linear feedback shift register noise.
fn lfsr_wave(feedback: u32) -> Vec<f64> {
    let mut wave = vec![0.0; NOISE_WAVE_LENGTH];
    let mut register: u32 = 1;
    for sample in wave.iter_mut() {
        *sample = if register & 1 == 1 { 1.0 } else { -1.0 };
        let mut next = register >> 1;
        if (register + next) & 1 == 1 {
            next += feedback;
        }
        register = next;
    }
    wave
}

/// Paint a band of randomly-phased partials into a conjugate-symmetric spectrum.
fn draw_noise_spectrum(
    spectrum: &mut [Complex<f64>],
    amplitudes: &[f64],
    low_octave: f64,
    high_octave: f64,
    low_power: f64,
    high_power: f64,
    overall_slope: f64,
) -> f64 {
    let len = spectrum.len();
    let reference_index = (1 << 11) as f64;
    let low_index = 2.0_f64.powf(low_octave) as usize;
    let high_index = (len >> 1).min(2.0_f64.powf(high_octave) as usize);
    let mut combined = 0.0;
    for i in low_index.max(1)..high_index {
        let lerped = low_power + (high_power - low_power) * ((i as f64).log2() - low_octave) / (high_octave - low_octave);
        let mut amplitude = 2.0_f64.powf((lerped - 1.0) * 7.0 + 1.0) * lerped;
        amplitude *= (i as f64 / reference_index).powf(overall_slope);
        combined += amplitude;
        amplitude *= amplitudes[i % amplitudes.len()];
        let radians = 0.618_033_988_75 * (i * i) as f64 * PI * 2.0;
        spectrum[i] = Complex::new(radians.cos() * amplitude, radians.sin() * amplitude);
        spectrum[len - i] = spectrum[i].conj();
    }
    combined
}

/// In-place inverse FFT of a conjugate-symmetric spectrum.
///
/// # Panics
/// The length must be a power of two between 4 and 2^16. Only internal
/// constants reach this, so a violation is a programming error.
pub fn inverse_real_fourier_transform(spectrum: &mut [Complex<f64>]) {
    let len = spectrum.len();
    assert!(len.is_power_of_two(), "FFT length {len} is not a power of two");
    assert!(len >= 4, "FFT length {len} is below the minimum of 4");
    assert!(len <= 1 << 16, "FFT length {len} exceeds 2^16");
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_inverse(len);
    fft.process(spectrum);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tempo_is_120_bpm() {
        assert_eq!(beats_per_minute(DEFAULT_TEMPO), 120.0);
        assert_eq!(tempo_from_bpm(120.0), DEFAULT_TEMPO);
        assert!(beats_per_minute(0) < beats_per_minute(24));
    }

    #[test]
    fn tempo_round_trips_through_bpm() {
        for tempo in 0..TEMPO_STEPS {
            assert_eq!(tempo_from_bpm(beats_per_minute(tempo)), tempo, "tempo step {tempo}");
        }
    }

    #[test]
    fn a4_is_440() {
        assert_eq!(frequency_from_pitch(69.0), 440.0);
        assert!((frequency_from_pitch(81.0) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn parts_per_beat_lookup_snaps_to_nearest() {
        assert_eq!(PARTS_PER_BEAT[parts_per_beat_index(4)], 4);
        assert_eq!(PARTS_PER_BEAT[parts_per_beat_index(24)], 24);
        assert_eq!(PARTS_PER_BEAT[parts_per_beat_index(7)], 6);
    }

    #[test]
    fn waves_are_bounded() {
        for wave in CHIP_WAVES {
            assert!(wave.samples.iter().all(|s| s.abs() <= 1.0), "{} out of range", wave.name);
        }
        assert_eq!(TRIANGLE[7], 1.0);
        assert_eq!(TRIANGLE[16], -1.0 / 15.0);
        assert_eq!(SAWTOOTH[0], -1.0);
        assert_eq!(SAWTOOTH[31], 1.0);
    }

    #[test]
    fn noise_waves_are_generated_and_finite() {
        for i in 0..NOISE_WAVES.len() {
            let wave = noise_wave(i);
            assert_eq!(wave.len(), NOISE_WAVE_LENGTH);
            assert!(wave.iter().all(|s| s.is_finite()));
            assert!(wave.iter().any(|&s| s != wave[0]), "noise wave {i} is constant");
        }
    }

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn inverse_fft_rejects_odd_lengths() {
        let mut spectrum = vec![Complex::new(0.0, 0.0); 12];
        inverse_real_fourier_transform(&mut spectrum);
    }

    #[test]
    #[should_panic(expected = "minimum")]
    fn inverse_fft_rejects_tiny_lengths() {
        let mut spectrum = vec![Complex::new(0.0, 0.0); 2];
        inverse_real_fourier_transform(&mut spectrum);
    }

    #[test]
    fn algorithms_only_modulate_downward() {
        for algorithm in ALGORITHMS {
            for (op, mods) in algorithm.modulated_by.iter().enumerate() {
                assert!(mods.iter().all(|&m| m > op), "{} routes upward", algorithm.name);
            }
        }
    }

    #[test]
    fn operator_envelopes_stay_in_range() {
        for index in 0..OPERATOR_ENVELOPES.len() {
            for step in 0..100 {
                let t = step as f64 * 0.05;
                let v = operator_envelope(index, t, t * 2.0, 0.5);
                assert!((0.0..=2.0).contains(&v), "envelope {index} gave {v} at {t}s");
            }
        }
        assert_eq!(operator_envelope(0, 1.0, 1.0, 0.25), 0.25);
        assert_eq!(operator_envelope(15, 10.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn amplitude_curve_endpoints() {
        assert_eq!(operator_amplitude_curve(0), 0.0);
        assert!((operator_amplitude_curve(15) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pan_center_is_unity() {
        assert_eq!(pan_gains(PAN_CENTER), (1.0, 1.0));
        assert_eq!(pan_gains(0), (1.0, 0.0));
        assert_eq!(pan_gains(8), (0.0, 1.0));
    }

    #[test]
    fn pulse_width_tops_out_at_square() {
        assert_eq!(pulse_width_ratio(PULSE_WIDTH_RANGE - 1), 0.5);
        assert!(pulse_width_ratio(0) < 0.1);
    }
}
