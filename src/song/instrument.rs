//! Instruments and FM operators.

use crate::config::{
    ALGORITHMS, CHIP_WAVES, CHORUSES, DEFAULT_TRANSITION, EFFECTS, FEEDBACKS, FILTERS,
    INSTRUMENT_TYPE_NAMES, NOISE_WAVES, OPERATOR_AMPLITUDE_MAX, OPERATOR_COUNT,
    OPERATOR_ENVELOPES, OPERATOR_FREQUENCIES, PAN_CENTER, PAN_RANGE, PULSE_WIDTH_RANGE,
    TRANSITIONS, VOLUME_RANGE,
};

/// The voice kind an instrument synthesizes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstrumentType {
    #[default]
    Chip,
    Fm,
    Noise,
    PulseWidth,
}

impl InstrumentType {
    pub const ALL: [InstrumentType; 4] = [
        InstrumentType::Chip,
        InstrumentType::Fm,
        InstrumentType::Noise,
        InstrumentType::PulseWidth,
    ];

    pub fn index(self) -> u32 {
        match self {
            InstrumentType::Chip => 0,
            InstrumentType::Fm => 1,
            InstrumentType::Noise => 2,
            InstrumentType::PulseWidth => 3,
        }
    }

    pub fn from_index(index: u32) -> Self {
        Self::ALL[(index as usize).min(Self::ALL.len() - 1)]
    }

    pub fn name(self) -> &'static str {
        INSTRUMENT_TYPE_NAMES[self.index() as usize]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        INSTRUMENT_TYPE_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| Self::from_index(i as u32))
    }

    /// Drum channels only host noise; pitch channels never do.
    pub fn allowed_on(self, is_drum: bool) -> Self {
        match (self, is_drum) {
            (_, true) => InstrumentType::Noise,
            (InstrumentType::Noise, false) => InstrumentType::Chip,
            (kind, false) => kind,
        }
    }
}

/// One stage of a 4-operator FM voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    /// Index into the operator frequency table.
    pub frequency: usize,
    /// 0..=15.
    pub amplitude: u32,
    /// Index into the operator envelope table.
    pub envelope: usize,
}

impl Operator {
    pub fn new(index: usize) -> Self {
        Operator {
            frequency: 0,
            amplitude: if index == 0 { OPERATOR_AMPLITUDE_MAX } else { 0 },
            envelope: 1,
        }
    }
}

/// Timbre settings for one instrument slot of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub kind: InstrumentType,
    /// Chip wave index, or noise wave index for noise instruments.
    pub wave: usize,
    pub pulse_width: u32,
    pub filter: usize,
    pub transition: usize,
    pub effect: usize,
    pub chorus: usize,
    /// Attenuation step; the top of the range is silent.
    pub volume: u32,
    pub pan: u32,
    pub muted: bool,
    pub algorithm: usize,
    pub feedback_type: usize,
    pub feedback_amplitude: u32,
    pub feedback_envelope: usize,
    pub operators: [Operator; OPERATOR_COUNT],
}

impl Instrument {
    pub fn new(is_drum: bool) -> Self {
        let kind = if is_drum { InstrumentType::Noise } else { InstrumentType::Chip };
        Instrument {
            kind,
            wave: 1,
            pulse_width: PULSE_WIDTH_RANGE - 1,
            filter: 1,
            transition: DEFAULT_TRANSITION,
            effect: 0,
            chorus: 0,
            volume: 0,
            pan: PAN_CENTER,
            muted: false,
            algorithm: 0,
            feedback_type: 0,
            feedback_amplitude: 0,
            feedback_envelope: 1,
            operators: std::array::from_fn(Operator::new),
        }
    }

    /// Switch voice kind, resetting the kind-specific defaults.
    pub fn set_type_and_reset(&mut self, kind: InstrumentType, is_drum: bool) {
        *self = Instrument {
            kind: kind.allowed_on(is_drum),
            ..Instrument::new(is_drum)
        };
    }

    /// Clamp every index into its table.
    pub fn clamp(&mut self, is_drum: bool) {
        self.kind = self.kind.allowed_on(is_drum);
        let wave_count = if self.kind == InstrumentType::Noise { NOISE_WAVES.len() } else { CHIP_WAVES.len() };
        self.wave = self.wave.min(wave_count - 1);
        self.pulse_width = self.pulse_width.min(PULSE_WIDTH_RANGE - 1);
        self.filter = self.filter.min(FILTERS.len() - 1);
        self.transition = self.transition.min(TRANSITIONS.len() - 1);
        self.effect = self.effect.min(EFFECTS.len() - 1);
        self.chorus = self.chorus.min(CHORUSES.len() - 1);
        self.volume = self.volume.min(VOLUME_RANGE - 1);
        self.pan = self.pan.min(PAN_RANGE - 1);
        self.algorithm = self.algorithm.min(ALGORITHMS.len() - 1);
        self.feedback_type = self.feedback_type.min(FEEDBACKS.len() - 1);
        self.feedback_amplitude = self.feedback_amplitude.min(OPERATOR_AMPLITUDE_MAX);
        self.feedback_envelope = self.feedback_envelope.min(OPERATOR_ENVELOPES.len() - 1);
        for op in &mut self.operators {
            op.frequency = op.frequency.min(OPERATOR_FREQUENCIES.len() - 1);
            op.amplitude = op.amplitude.min(OPERATOR_AMPLITUDE_MAX);
            op.envelope = op.envelope.min(OPERATOR_ENVELOPES.len() - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drum_instruments_are_noise() {
        assert_eq!(Instrument::new(true).kind, InstrumentType::Noise);
        assert_eq!(InstrumentType::Fm.allowed_on(true), InstrumentType::Noise);
        assert_eq!(InstrumentType::Noise.allowed_on(false), InstrumentType::Chip);
        assert_eq!(InstrumentType::PulseWidth.allowed_on(false), InstrumentType::PulseWidth);
    }

    #[test]
    fn type_names_round_trip() {
        for kind in InstrumentType::ALL {
            assert_eq!(InstrumentType::from_name(kind.name()), Some(kind));
            assert_eq!(InstrumentType::from_index(kind.index()), kind);
        }
        assert_eq!(InstrumentType::from_index(99), InstrumentType::PulseWidth);
    }

    #[test]
    fn clamp_pulls_indices_into_tables() {
        let mut inst = Instrument::new(false);
        inst.wave = 99;
        inst.volume = 42;
        inst.operators[2].envelope = 500;
        inst.clamp(false);
        assert_eq!(inst.wave, CHIP_WAVES.len() - 1);
        assert_eq!(inst.volume, VOLUME_RANGE - 1);
        assert_eq!(inst.operators[2].envelope, OPERATOR_ENVELOPES.len() - 1);
    }

    #[test]
    fn first_operator_is_the_audible_default() {
        let inst = Instrument::new(false);
        assert_eq!(inst.operators[0].amplitude, OPERATOR_AMPLITUDE_MAX);
        assert!(inst.operators[1..].iter().all(|op| op.amplitude == 0));
    }
}
