//! Score codec: the versioned song string.
//!
//! Layout: a family/version header, single-character tags each followed by
//! one or more base64 digits, then the bar table and the note stream as
//! bit-packed payloads. The decoder keeps every historical branch:
//!
//! - the predecessor family, whose header is a bare version digit (2..=5)
//!   with a fixed 3+1 channel layout;
//! - its oldest versions (below 3), with per-channel tag payloads;
//! - versions 1 and 2 of the current family.
//!
//! Only an empty string or an unknown header is an error. Past the header,
//! out-of-range values are clamped and an unknown tag stops the parse with
//! everything read so far kept.

pub mod json;
mod notes;

use log::{debug, warn};

use crate::bitstream::{BitReader, BitWriter, base64_to_int, bits_for, int_to_base64};
use crate::config::{
    self, LEGACY_EFFECT_MAP, OLD_TEMPOS, OPERATOR_COUNT, PAN_RANGE, REVERB_RANGE,
};
use crate::error::CodecError;
use crate::song::{InstrumentType, Song};

/// Variant character of the current family.
pub const VARIANT: char = 'n';
/// Version written by the encoder.
pub const LATEST_VERSION: u32 = 3;
const OLDEST_VERSION: u32 = 1;
const LEGACY_OLDEST_VERSION: u32 = 2;
const LEGACY_LATEST_VERSION: u32 = 5;

impl Song {
    /// Encode to the current song-string version.
    pub fn to_base64_string(&self) -> String {
        encode(self)
    }

    /// Decode any supported song-string version.
    pub fn from_base64_string(text: &str) -> Result<Song, CodecError> {
        decode(text)
    }
}

// ── Encoder ─────────────────────────────────────────────────

pub fn encode(song: &Song) -> String {
    let mut out = String::with_capacity(256);
    out.push(VARIANT);
    out.push(int_to_base64(LATEST_VERSION));
    push_digit(&mut out, song.pitch_channel_count() as u32);
    push_digit(&mut out, song.drum_channel_count() as u32);

    let theme: Vec<u32> = song
        .theme
        .chars()
        .map(|c| c as u32)
        .filter(|&c| c < 4096)
        .take(4095)
        .collect();
    out.push('O');
    push_digits2(&mut out, theme.len() as u32);
    for c in theme {
        push_digits2(&mut out, c);
    }

    out.push('s');
    push_digit(&mut out, song.scale as u32);
    out.push('k');
    push_digit(&mut out, song.key as u32);
    out.push('l');
    push_digits2(&mut out, song.loop_start() as u32);
    out.push('e');
    push_digits2(&mut out, song.loop_length() as u32 - 1);
    out.push('t');
    push_digit(&mut out, song.tempo);
    out.push('m');
    push_digit(&mut out, song.reverb);
    out.push('x');
    push_digit(&mut out, song.mix as u32);
    out.push('S');
    push_digit(&mut out, song.sample_rate as u32);
    out.push('B');
    push_digit(&mut out, song.blend);
    out.push('R');
    push_digit(&mut out, song.riff);
    out.push('D');
    push_digit(&mut out, song.detune);
    out.push('M');
    push_digit(&mut out, song.muff);
    out.push('a');
    push_digit(&mut out, song.beats_per_bar() - 1);
    out.push('g');
    push_digits2(&mut out, song.bar_count() as u32 - 1);
    out.push('j');
    push_digit(&mut out, song.patterns_per_channel() as u32 - 1);
    out.push('i');
    push_digit(&mut out, song.instruments_per_channel() as u32 - 1);
    out.push('r');
    push_digit(&mut out, config::parts_per_beat_index(song.parts_per_beat()) as u32);

    out.push('o');
    for channel in song.channels() {
        push_digit(&mut out, channel.octave);
    }

    for &(tag, field) in INSTRUMENT_FIELDS {
        out.push(tag);
        for channel in song.channels() {
            for instrument in channel.instruments() {
                push_digit(&mut out, field.get(instrument));
            }
        }
    }
    for &(tag, field) in OPERATOR_FIELDS {
        out.push(tag);
        for channel in song.channels() {
            for instrument in channel.instruments() {
                for op in &instrument.operators {
                    push_digit(&mut out, field.get(op));
                }
            }
        }
    }

    let bar_bits = bits_for(song.patterns_per_channel() + 1);
    let mut bars = BitWriter::new();
    for channel in song.channels() {
        for &bar in channel.bars() {
            bars.write(bar_bits, bar as u32);
        }
    }
    out.push('b');
    bars.encode_base64(&mut out);

    let instrument_bits = bits_for(song.instruments_per_channel());
    let bar_length = song.bar_length();
    let mut stream = BitWriter::new();
    for (i, channel) in song.channels().iter().enumerate() {
        notes::encode_channel(&mut stream, channel, song.is_drum_channel(i), bar_length, instrument_bits);
    }
    let length = stream.length_base64();
    let mut length_digits = Vec::new();
    let mut remaining = length;
    loop {
        length_digits.push(int_to_base64(remaining as u32));
        remaining >>= 6;
        if remaining == 0 {
            break;
        }
    }
    out.push('p');
    push_digit(&mut out, length_digits.len() as u32);
    out.extend(length_digits.iter().rev());
    stream.encode_base64(&mut out);
    out
}

fn push_digit(out: &mut String, value: u32) {
    out.push(int_to_base64(value.min(63)));
}

fn push_digits2(out: &mut String, value: u32) {
    let value = value.min(4095);
    out.push(int_to_base64(value >> 6));
    out.push(int_to_base64(value));
}

// ── Per-instrument fields ───────────────────────────────────

/// One digit per instrument, channel-major, in tag order.
#[derive(Debug, Clone, Copy)]
enum InstrumentField {
    Kind,
    Wave,
    PulseWidth,
    Filter,
    Transition,
    Effect,
    Chorus,
    Volume,
    Pan,
    Muted,
    Algorithm,
    FeedbackType,
    FeedbackAmplitude,
    FeedbackEnvelope,
}

const INSTRUMENT_FIELDS: &[(char, InstrumentField)] = &[
    ('T', InstrumentField::Kind),
    ('w', InstrumentField::Wave),
    ('W', InstrumentField::PulseWidth),
    ('f', InstrumentField::Filter),
    ('d', InstrumentField::Transition),
    ('c', InstrumentField::Effect),
    ('h', InstrumentField::Chorus),
    ('v', InstrumentField::Volume),
    ('L', InstrumentField::Pan),
    ('u', InstrumentField::Muted),
    ('A', InstrumentField::Algorithm),
    ('F', InstrumentField::FeedbackType),
    ('K', InstrumentField::FeedbackAmplitude),
    ('V', InstrumentField::FeedbackEnvelope),
];

impl InstrumentField {
    fn from_tag(tag: char) -> Option<Self> {
        INSTRUMENT_FIELDS.iter().find(|(t, _)| *t == tag).map(|&(_, f)| f)
    }

    fn get(self, inst: &crate::song::Instrument) -> u32 {
        match self {
            InstrumentField::Kind => inst.kind.index(),
            InstrumentField::Wave => inst.wave as u32,
            InstrumentField::PulseWidth => inst.pulse_width,
            InstrumentField::Filter => inst.filter as u32,
            InstrumentField::Transition => inst.transition as u32,
            InstrumentField::Effect => inst.effect as u32,
            InstrumentField::Chorus => inst.chorus as u32,
            InstrumentField::Volume => inst.volume,
            InstrumentField::Pan => inst.pan,
            InstrumentField::Muted => inst.muted as u32,
            InstrumentField::Algorithm => inst.algorithm as u32,
            InstrumentField::FeedbackType => inst.feedback_type as u32,
            InstrumentField::FeedbackAmplitude => inst.feedback_amplitude,
            InstrumentField::FeedbackEnvelope => inst.feedback_envelope as u32,
        }
    }

    fn set(self, inst: &mut crate::song::Instrument, value: u32, is_drum: bool) {
        match self {
            InstrumentField::Kind => {
                inst.set_type_and_reset(InstrumentType::from_index(value), is_drum)
            }
            InstrumentField::Wave => inst.wave = value as usize,
            InstrumentField::PulseWidth => inst.pulse_width = value,
            InstrumentField::Filter => inst.filter = value as usize,
            InstrumentField::Transition => inst.transition = value as usize,
            InstrumentField::Effect => inst.effect = value as usize,
            InstrumentField::Chorus => inst.chorus = value as usize,
            InstrumentField::Volume => inst.volume = value,
            InstrumentField::Pan => inst.pan = value,
            InstrumentField::Muted => inst.muted = value != 0,
            InstrumentField::Algorithm => inst.algorithm = value as usize,
            InstrumentField::FeedbackType => inst.feedback_type = value as usize,
            InstrumentField::FeedbackAmplitude => inst.feedback_amplitude = value,
            InstrumentField::FeedbackEnvelope => inst.feedback_envelope = value as usize,
        }
    }
}

/// Four digits per instrument, one per operator.
#[derive(Debug, Clone, Copy)]
enum OperatorField {
    Frequency,
    Amplitude,
    Envelope,
}

const OPERATOR_FIELDS: &[(char, OperatorField)] = &[
    ('q', OperatorField::Frequency),
    ('P', OperatorField::Amplitude),
    ('E', OperatorField::Envelope),
];

impl OperatorField {
    fn from_tag(tag: char) -> Option<Self> {
        OPERATOR_FIELDS.iter().find(|(t, _)| *t == tag).map(|&(_, f)| f)
    }

    fn get(self, op: &crate::song::Operator) -> u32 {
        match self {
            OperatorField::Frequency => op.frequency as u32,
            OperatorField::Amplitude => op.amplitude,
            OperatorField::Envelope => op.envelope as u32,
        }
    }

    fn set(self, op: &mut crate::song::Operator, value: u32) {
        match self {
            OperatorField::Frequency => op.frequency = value as usize,
            OperatorField::Amplitude => op.amplitude = value,
            OperatorField::Envelope => op.envelope = value as usize,
        }
    }
}

// ── Decoder ─────────────────────────────────────────────────

pub fn decode(text: &str) -> Result<Song, CodecError> {
    let text = text.trim();
    let text = text.strip_prefix('#').unwrap_or(text);
    let mut decoder = Decoder::new(text.as_bytes())?;
    let mut song = Song::new();
    decoder.run(&mut song);
    Ok(song)
}

struct Decoder<'a> {
    src: &'a [u8],
    pos: usize,
    version: u32,
    /// Predecessor family.
    legacy: bool,
    /// Predecessor family below version 3.
    before_three: bool,
    loop_start: usize,
    loop_length: usize,
}

impl<'a> Decoder<'a> {
    fn new(src: &'a [u8]) -> Result<Self, CodecError> {
        let Some(&first) = src.first() else {
            return Err(CodecError::Empty);
        };
        let mut decoder = Decoder {
            src,
            pos: 1,
            version: 0,
            legacy: false,
            before_three: false,
            loop_start: 0,
            loop_length: 4,
        };
        if first == VARIANT as u8 {
            decoder.version = decoder.digit();
            if !(OLDEST_VERSION..=LATEST_VERSION).contains(&decoder.version) {
                return Err(CodecError::UnsupportedVersion {
                    variant: VARIANT,
                    version: decoder.version,
                });
            }
        } else {
            let version = (first as char).to_digit(10).unwrap_or(0);
            if !(LEGACY_OLDEST_VERSION..=LEGACY_LATEST_VERSION).contains(&version) {
                return Err(CodecError::UnsupportedVersion {
                    variant: first as char,
                    version,
                });
            }
            decoder.version = version;
            decoder.legacy = true;
            decoder.before_three = version < 3;
        }
        debug!(
            "decoding song string: {} version {}",
            if decoder.legacy { "legacy" } else { "current" },
            decoder.version
        );
        Ok(decoder)
    }

    /// Next base64 digit; the end of input reads as 0.
    fn digit(&mut self) -> u32 {
        let value = self.src.get(self.pos).map_or(0, |&c| base64_to_int(c));
        self.pos += 1;
        value
    }

    fn digits2(&mut self) -> u32 {
        (self.digit() << 6) | self.digit()
    }

    fn run(&mut self, song: &mut Song) {
        if self.legacy {
            song.set_channel_counts(3, 1);
        } else {
            let pitch = self.digit() as usize;
            let drum = self.digit() as usize;
            song.set_channel_counts(pitch, drum);
        }

        while let Some(&tag) = self.src.get(self.pos) {
            self.pos += 1;
            if !self.read_tag(tag as char, song) {
                warn!("unknown song string tag {:?} at {}; stopping", tag as char, self.pos - 1);
                break;
            }
        }

        song.set_loop(self.loop_start, self.loop_length);
        song.clamp_settings();
    }

    /// Apply one tagged field. Returns false for an unrecognized tag.
    fn read_tag(&mut self, tag: char, song: &mut Song) -> bool {
        match tag {
            'O' => {
                let len = self.digits2() as usize;
                let mut theme = String::with_capacity(len);
                for _ in 0..len {
                    if let Some(c) = char::from_u32(self.digits2()) {
                        theme.push(c);
                    }
                }
                song.theme = theme;
            }
            's' => song.scale = self.digit() as usize,
            'k' => song.key = self.digit() as usize,
            'l' => self.loop_start = self.digits2() as usize,
            'e' => self.loop_length = self.digits2() as usize + 1,
            't' => {
                song.tempo = if self.before_three {
                    OLD_TEMPOS[(self.digit() as usize).min(OLD_TEMPOS.len() - 1)]
                } else {
                    self.digit()
                };
            }
            'm' => {
                let value = self.digit();
                song.reverb = if self.legacy { (value * 2).min(REVERB_RANGE - 1) } else { value };
            }
            'x' => song.mix = self.digit() as usize,
            'S' => song.sample_rate = self.digit() as usize,
            'B' => song.blend = self.digit(),
            'R' => song.riff = self.digit(),
            'D' => song.detune = self.digit(),
            'M' => song.muff = self.digit(),
            'a' => song.set_beats_per_bar(self.digit() + 1),
            'g' => {
                let bars = if self.before_three { self.digit() } else { self.digits2() };
                song.set_bar_count(bars as usize + 1);
            }
            'j' => song.set_patterns_per_channel(self.digit() as usize + 1),
            'i' => song.set_instruments_per_channel(self.digit() as usize + 1),
            'r' => {
                let index = (self.digit() as usize).min(config::PARTS_PER_BEAT.len() - 1);
                song.set_parts_per_beat(config::PARTS_PER_BEAT[index]);
            }
            'o' => {
                if self.before_three {
                    let channel = self.digit() as usize;
                    let octave = self.digit();
                    if let Some(ch) = song.channel_mut(channel) {
                        ch.octave = octave.min(config::OCTAVE_MAX);
                    }
                } else {
                    for i in 0..song.channel_count() {
                        let octave = self.digit();
                        if let Some(ch) = song.channel_mut(i) {
                            ch.octave = octave.min(config::OCTAVE_MAX);
                        }
                    }
                }
            }
            'b' => self.read_bars(song),
            'p' => self.read_notes(song),
            _ => {
                if let Some(field) = InstrumentField::from_tag(tag) {
                    self.read_instrument_field(field, song);
                } else if let Some(field) = OperatorField::from_tag(tag) {
                    self.read_operator_field(field, song);
                } else {
                    return false;
                }
            }
        }
        true
    }

    fn read_instrument_field(&mut self, field: InstrumentField, song: &mut Song) {
        let version = self.version;
        let legacy = self.legacy;
        let adjust = move |value: u32| match field {
            InstrumentField::Effect if legacy => {
                LEGACY_EFFECT_MAP[(value as usize).min(LEGACY_EFFECT_MAP.len() - 1)] as u32
            }
            InstrumentField::Pan if !legacy && version == 1 => (value * 2).min(PAN_RANGE - 1),
            _ => value,
        };

        if self.before_three {
            let channel = self.digit() as usize;
            let value = adjust(self.digit());
            let is_drum = song.is_drum_channel(channel);
            if let Some(inst) = song.channel_mut(channel).and_then(|ch| ch.instrument_mut(0)) {
                field.set(inst, value, is_drum);
            }
            return;
        }
        for c in 0..song.channel_count() {
            let is_drum = song.is_drum_channel(c);
            for i in 0..song.instruments_per_channel() {
                let value = adjust(self.digit());
                if let Some(inst) = song.channel_mut(c).and_then(|ch| ch.instrument_mut(i)) {
                    field.set(inst, value, is_drum);
                }
            }
        }
    }

    fn read_operator_field(&mut self, field: OperatorField, song: &mut Song) {
        for c in 0..song.channel_count() {
            for i in 0..song.instruments_per_channel() {
                for o in 0..OPERATOR_COUNT {
                    let value = self.digit();
                    if let Some(inst) = song.channel_mut(c).and_then(|ch| ch.instrument_mut(i)) {
                        field.set(&mut inst.operators[o], value);
                    }
                }
            }
        }
    }

    fn read_bars(&mut self, song: &mut Song) {
        let bar_count = song.bar_count();
        if self.before_three {
            let channel = self.digit() as usize;
            let length = (bar_count * 3).div_ceil(6);
            let mut bits = BitReader::new(self.src, self.pos, self.pos + length);
            self.pos += length;
            if let Some(ch) = song.channel_mut(channel) {
                for bar in 0..bar_count {
                    ch.set_bar(bar, bits.read(3) as usize + 1);
                }
            }
            return;
        }
        let width = bits_for(song.patterns_per_channel() + 1);
        let length = (song.channel_count() * bar_count * width as usize).div_ceil(6);
        let mut bits = BitReader::new(self.src, self.pos, self.pos + length);
        self.pos += length;
        for c in 0..song.channel_count() {
            for bar in 0..bar_count {
                let pattern = bits.read(width) as usize;
                if let Some(ch) = song.channel_mut(c) {
                    ch.set_bar(bar, pattern);
                }
            }
        }
    }

    fn read_notes(&mut self, song: &mut Song) {
        let (first_channel, length) = if self.before_three {
            let channel = self.digit() as usize;
            self.digit(); // pattern count, always the song's
            (channel, self.digits2() as usize)
        } else {
            let digits = self.digit().clamp(1, 4);
            let mut length = 0usize;
            for _ in 0..digits {
                length = (length << 6) | self.digit() as usize;
            }
            (0, length)
        };
        let mut bits = BitReader::new(self.src, self.pos, self.pos.saturating_add(length));
        self.pos = self.pos.saturating_add(length);

        let instrument_bits = bits_for(song.instruments_per_channel());
        let bar_length = song.bar_length();
        let has_notes_flag = !self.before_three;
        let last_channel = if self.before_three { first_channel + 1 } else { song.channel_count() };
        for c in first_channel..last_channel.min(song.channel_count()) {
            let is_drum = song.is_drum_channel(c);
            if let Some(channel) = song.channel_mut(c) {
                notes::decode_channel(&mut bits, channel, is_drum, bar_length, instrument_bits, has_notes_flag);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::{Note, NotePin, make_note_pin};

    fn pin(interval: i32, time: u32, volume: u32) -> NotePin {
        make_note_pin(interval, time, volume)
    }

    /// Base64 digits of a bit writer, for hand-built legacy strings.
    fn base64_of(bits: &BitWriter) -> String {
        let mut out = String::new();
        bits.encode_base64(&mut out);
        out
    }

    #[test]
    fn default_song_header() {
        let song = Song::new();
        let text = song.to_base64_string();
        assert!(text.starts_with("n3"), "unexpected header in {text}");
        assert_eq!(text.as_bytes()[0], 0x6E);
        let decoded = Song::from_base64_string(&text).unwrap();
        assert_eq!(decoded.pitch_channel_count(), 4);
        assert_eq!(decoded.drum_channel_count(), 1);
        assert_eq!(decoded.bar_count(), 16);
        assert_eq!(decoded, song);
    }

    #[test]
    fn full_song_round_trips() {
        let mut song = Song::new();
        song.set_channel_counts(3, 2);
        song.set_bar_count(70);
        song.set_patterns_per_channel(5);
        song.set_instruments_per_channel(3);
        song.set_beats_per_bar(6);
        song.set_parts_per_beat(6);
        song.set_loop(65, 3);
        song.scale = 4;
        song.key = 9;
        song.tempo = 15;
        song.reverb = 5;
        song.mix = 1;
        song.sample_rate = 2;
        song.blend = 2;
        song.riff = 3;
        song.detune = 7;
        song.muff = 1;
        song.theme = String::from("midnight é");

        let ch = song.channel_mut(1).unwrap();
        ch.octave = 4;
        let inst = ch.instrument_mut(2).unwrap();
        inst.set_type_and_reset(InstrumentType::Fm, false);
        inst.algorithm = 7;
        inst.feedback_type = 12;
        inst.feedback_amplitude = 9;
        inst.operators[3].frequency = 11;
        inst.operators[3].amplitude = 13;
        inst.operators[2].envelope = 17;
        inst.pan = 1;
        inst.muted = true;
        let inst = ch.instrument_mut(1).unwrap();
        inst.set_type_and_reset(InstrumentType::PulseWidth, false);
        inst.pulse_width = 3;
        inst.effect = 2;
        inst.chorus = 8;
        let pattern = ch.pattern_mut(4).unwrap();
        pattern.instrument = 2;
        pattern.notes.push(Note::with_pins(vec![40, 47], 0, vec![pin(0, 0, 3), pin(5, 6, 1), pin(5, 9, 0)]));
        pattern.notes.push(Note::new(71, 12, 36, 2));
        ch.set_bar(0, 5);
        ch.set_bar(69, 5);
        ch.set_bar(33, 2);

        let drum = song.channel_mut(4).unwrap();
        drum.instrument_mut(0).unwrap().wave = 4;
        drum.pattern_mut(0).unwrap().notes.push(Note::new(11, 3, 4, 1));
        drum.set_bar(7, 1);

        let text = song.to_base64_string();
        let decoded = Song::from_base64_string(&text).unwrap();
        assert_eq!(decoded, song);
        assert_eq!(decoded.to_base64_string(), text, "re-encoding should be stable");
    }

    #[test]
    fn url_fragment_is_accepted() {
        let text = format!("#{}", Song::new().to_base64_string());
        assert!(Song::from_base64_string(&text).is_ok());
    }

    #[test]
    fn header_errors() {
        assert_eq!(Song::from_base64_string(""), Err(CodecError::Empty));
        assert_eq!(Song::from_base64_string("  "), Err(CodecError::Empty));
        assert_eq!(
            Song::from_base64_string("n9"),
            Err(CodecError::UnsupportedVersion { variant: 'n', version: 9 })
        );
        assert!(matches!(
            Song::from_base64_string("zz"),
            Err(CodecError::UnsupportedVersion { variant: 'z', .. })
        ));
        assert!(Song::from_base64_string("1").is_err());
    }

    #[test]
    fn unknown_tag_keeps_earlier_fields() {
        let decoded = Song::from_base64_string("n341k5t9!s3").unwrap();
        assert_eq!(decoded.key, 5);
        assert_eq!(decoded.tempo, 9);
        assert_eq!(decoded.scale, crate::config::DEFAULT_SCALE, "fields after the bad tag are ignored");
    }

    #[test]
    fn out_of_range_fields_are_clamped() {
        let decoded = Song::from_base64_string("n361s_k_t_m_w__________").unwrap();
        assert_eq!(decoded.pitch_channel_count(), 6);
        assert_eq!(decoded.drum_channel_count(), 1);
        assert_eq!(decoded.scale, crate::config::SCALES.len() - 1);
        assert_eq!(decoded.key, crate::config::KEYS.len() - 1);
        assert_eq!(decoded.tempo, crate::config::TEMPO_STEPS - 1);
        assert_eq!(decoded.reverb, REVERB_RANGE - 1);
        assert_eq!(decoded.channels()[0].instruments()[0].wave, crate::config::CHIP_WAVES.len() - 1);
        assert_eq!(decoded.channels()[6].instruments()[0].wave, crate::config::NOISE_WAVES.len() - 1);
    }

    #[test]
    fn truncated_string_degrades_to_defaults() {
        let full = Song::new().to_base64_string();
        for cut in 2..full.len() {
            assert!(Song::from_base64_string(&full[..cut]).is_ok(), "failed at cut {cut}");
        }
    }

    #[test]
    fn current_version_keeps_pan_extremes() {
        let mut song = Song::new();
        for (channel, pan) in [(0, 0), (1, PAN_RANGE - 1), (2, 3), (4, 6)] {
            song.channel_mut(channel).unwrap().instrument_mut(0).unwrap().pan = pan;
        }
        let text = song.to_base64_string();
        assert!(text.starts_with("n3"));
        let decoded = Song::from_base64_string(&text).unwrap();
        let pans: Vec<u32> = decoded.channels().iter().map(|ch| ch.instruments()[0].pan).collect();
        assert_eq!(pans, vec![0, PAN_RANGE - 1, 3, crate::config::PAN_CENTER, 6], "v3 pan must not be rescaled");
    }

    #[test]
    fn overlong_theme_is_cut_at_the_length_field() {
        let mut song = Song::new();
        song.key = 7;
        song.theme = format!("{}😀{}", "a".repeat(3000), "b".repeat(2000));

        let text = song.to_base64_string();
        let decoded = Song::from_base64_string(&text).unwrap();
        assert_eq!(decoded.theme.chars().count(), 4095, "the 2-digit length caps the theme");
        assert!(!decoded.theme.contains('😀'), "characters past 4095 are dropped");
        assert!(decoded.theme.ends_with('b'));
        assert_eq!(decoded.key, 7, "fields after the theme still decode");
        assert_eq!(decoded.to_base64_string(), text, "re-encoding should be stable");
    }

    #[test]
    fn first_version_pan_is_doubled() {
        let decoded = Song::from_base64_string("n111L21").unwrap();
        assert_eq!(decoded.channels()[0].instruments()[0].pan, 4);
        assert_eq!(decoded.channels()[1].instruments()[0].pan, 2);
        let current = Song::from_base64_string("n311L21").unwrap();
        assert_eq!(current.channels()[0].instruments()[0].pan, 2);
    }

    #[test]
    fn legacy_family_with_tag_per_instrument() {
        // Version 4: fixed 3+1 layout, legacy effects, halved reverb.
        let decoded = Song::from_base64_string("4t9m3c1234o3210").unwrap();
        assert_eq!(decoded.pitch_channel_count(), 3);
        assert_eq!(decoded.drum_channel_count(), 1);
        assert_eq!(decoded.tempo, 9);
        assert_eq!(decoded.reverb, 6);
        let effects: Vec<usize> = decoded.channels().iter().map(|c| c.instruments()[0].effect).collect();
        assert_eq!(effects, vec![1, 3, 4, 5]);
        let octaves: Vec<u32> = decoded.channels().iter().map(|c| c.octave).collect();
        assert_eq!(octaves, vec![3, 2, 1, 0]);
    }

    #[test]
    fn oldest_legacy_branches() {
        // Version 2: old tempo table, channel-addressed tags, 3-bit bars, no has-notes bit.
        let mut notes = BitWriter::new();
        // Pattern 0: a whole-bar note at pitch 24, the front of the octave-1 cache.
        notes.write(2, 1);
        notes.write(1, 0); // one pitch
        notes.write_pin_count(1);
        notes.write(2, 3);
        notes.write(1, 0);
        notes.write_part_duration(32);
        notes.write(2, 2);
        notes.write(1, 1);
        notes.write(3, 0);
        // Patterns 1..8: a full-bar rest each.
        for _ in 1..8 {
            notes.write(2, 0);
            notes.write_part_duration(32);
        }
        let payload = base64_of(&notes);

        let mut bars = BitWriter::new();
        for pattern in [0u32, 0, 3, 7] {
            bars.write(3, pattern);
        }
        let bar_payload = base64_of(&bars);

        let text = format!(
            "2t2g3j7o11w13b1{bar_payload}p1{}{}{payload}",
            int_to_base64(0),
            {
                let mut s = String::new();
                push_digits2(&mut s, payload.len() as u32);
                s
            }
        );
        let decoded = Song::from_base64_string(&text).unwrap();
        assert_eq!(decoded.tempo, OLD_TEMPOS[2]);
        assert_eq!(decoded.bar_count(), 4);
        assert_eq!(decoded.patterns_per_channel(), 8);
        let ch = &decoded.channels()[1];
        assert_eq!(ch.octave, 1);
        assert_eq!(ch.instruments()[0].wave, 3);
        assert_eq!(ch.bars(), &[1, 1, 4, 8]);
        let notes = &ch.patterns()[0].notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitches, vec![24]);
        assert_eq!((notes[0].start, notes[0].end), (0, 32));
        assert_eq!(notes[0].pins, vec![pin(0, 0, 3), pin(0, 32, 2)]);
        assert!(decoded.channels()[0].patterns()[0].notes.is_empty());
    }
}
