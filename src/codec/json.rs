//! Human-readable JSON form of a song.
//!
//! Lossy and independent of the song string: table indices become names,
//! volumes become percentages, and every field falls back to the default
//! song's value when missing.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{
    self, ALGORITHMS, CHIP_WAVES, CHORUSES, DRUM_COUNT, EFFECTS, FEEDBACKS, FILTERS, KEYS,
    MAX_PITCH, MIX_STYLES, NOISE_WAVES, NOTE_VOLUME_MAX, OPERATOR_COUNT, OPERATOR_ENVELOPES,
    OPERATOR_FREQUENCIES, PAN_CENTER, PAN_RANGE, PULSE_WIDTH_RANGE, SAMPLE_RATES, SCALES,
    TRANSITIONS, VOLUME_RANGE,
};
use crate::error::JsonError;
use crate::song::{Instrument, InstrumentType, Note, Operator, Pattern, Song, make_note_pin};

pub const FORMAT_NAME: &str = "chipbox";
/// Version written by the exporter.
pub const JSON_VERSION: u32 = 3;
/// First version with point volumes on the 0–100 scale.
const PERCENT_VOLUME_VERSION: u32 = 2;
/// Pan step in the exported -100..=100 range.
const PAN_PERCENT_STEP: f64 = 25.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SongDoc {
    format: String,
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    theme: Option<String>,
    scale: String,
    key: String,
    mix: String,
    sample_rate: String,
    intro_bars: usize,
    loop_bars: usize,
    beats_per_bar: u32,
    ticks_per_beat: u32,
    beats_per_minute: f64,
    reverb: u32,
    blend: u32,
    riff: u32,
    detune: u32,
    muff: u32,
    channels: Vec<ChannelDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ChannelDoc {
    #[serde(rename = "type")]
    kind: String,
    octave_scroll_bar: u32,
    instruments: Vec<InstrumentDoc>,
    patterns: Vec<PatternDoc>,
    sequence: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct InstrumentDoc {
    #[serde(rename = "type")]
    kind: String,
    /// 0..=100.
    volume: f64,
    /// -100..=100.
    pan: f64,
    muted: bool,
    transition: String,
    effect: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    wave: Option<String>,
    /// Duty cycle in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pulse_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chorus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feedback_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feedback_amplitude: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feedback_envelope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    operators: Option<Vec<OperatorDoc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct OperatorDoc {
    frequency: String,
    amplitude: u32,
    envelope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct PatternDoc {
    /// 1-based instrument slot.
    instrument: usize,
    notes: Vec<NoteDoc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct NoteDoc {
    pitches: Vec<i32>,
    points: Vec<PointDoc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PointDoc {
    tick: u32,
    pitch_bend: i32,
    volume: f64,
}

impl Default for SongDoc {
    fn default() -> Self {
        let mut doc = SongDoc::from_song(&Song::new());
        doc.channels.clear();
        doc
    }
}

impl Default for ChannelDoc {
    fn default() -> Self {
        ChannelDoc {
            kind: String::from("pitch"),
            octave_scroll_bar: 3,
            instruments: Vec::new(),
            patterns: Vec::new(),
            sequence: Vec::new(),
        }
    }
}

impl Default for InstrumentDoc {
    fn default() -> Self {
        let mut doc = InstrumentDoc::from_instrument(&Instrument::new(false));
        doc.wave = None;
        doc.filter = None;
        doc.chorus = None;
        doc
    }
}

impl Default for OperatorDoc {
    fn default() -> Self {
        OperatorDoc::from_operator(&Operator::new(1))
    }
}

impl Default for PatternDoc {
    fn default() -> Self {
        PatternDoc {
            instrument: 1,
            notes: Vec::new(),
        }
    }
}

// ── Export ──────────────────────────────────────────────────

impl SongDoc {
    fn from_song(song: &Song) -> Self {
        SongDoc {
            format: FORMAT_NAME.to_string(),
            version: JSON_VERSION,
            theme: Some(song.theme.clone()),
            scale: SCALES[song.scale.min(SCALES.len() - 1)].name.to_string(),
            key: KEYS[song.key.min(KEYS.len() - 1)].name.to_string(),
            mix: MIX_STYLES[song.mix.min(MIX_STYLES.len() - 1)].name.to_string(),
            sample_rate: SAMPLE_RATES[song.sample_rate.min(SAMPLE_RATES.len() - 1)].name.to_string(),
            intro_bars: song.loop_start(),
            loop_bars: song.loop_length(),
            beats_per_bar: song.beats_per_bar(),
            ticks_per_beat: song.parts_per_beat(),
            beats_per_minute: song.beats_per_minute(),
            reverb: song.reverb,
            blend: song.blend,
            riff: song.riff,
            detune: song.detune,
            muff: song.muff,
            channels: song
                .channels()
                .iter()
                .enumerate()
                .map(|(i, channel)| ChannelDoc {
                    kind: (if song.is_drum_channel(i) { "drum" } else { "pitch" }).to_string(),
                    octave_scroll_bar: channel.octave,
                    instruments: channel.instruments().iter().map(InstrumentDoc::from_instrument).collect(),
                    patterns: channel.patterns().iter().map(PatternDoc::from_pattern).collect(),
                    sequence: channel.bars().to_vec(),
                })
                .collect(),
        }
    }
}

impl InstrumentDoc {
    fn from_instrument(inst: &Instrument) -> Self {
        let mut doc = InstrumentDoc {
            kind: inst.kind.name().to_string(),
            volume: (100.0 * (VOLUME_RANGE - 1 - inst.volume.min(VOLUME_RANGE - 1)) as f64
                / (VOLUME_RANGE - 1) as f64)
                .round(),
            pan: (inst.pan as f64 - PAN_CENTER as f64) * PAN_PERCENT_STEP,
            muted: inst.muted,
            transition: name_at(TRANSITIONS, inst.transition, |t| t.name),
            effect: name_at(EFFECTS, inst.effect, |e| e.name),
            wave: None,
            pulse_width: None,
            filter: None,
            chorus: None,
            algorithm: None,
            feedback_type: None,
            feedback_amplitude: None,
            feedback_envelope: None,
            operators: None,
        };
        match inst.kind {
            InstrumentType::Chip => {
                doc.wave = Some(name_at(CHIP_WAVES, inst.wave, |w| w.name));
                doc.filter = Some(name_at(FILTERS, inst.filter, |f| f.name));
                doc.chorus = Some(name_at(CHORUSES, inst.chorus, |c| c.name));
            }
            InstrumentType::PulseWidth => {
                doc.pulse_width = Some(pulse_width_percent(inst.pulse_width));
                doc.filter = Some(name_at(FILTERS, inst.filter, |f| f.name));
                doc.chorus = Some(name_at(CHORUSES, inst.chorus, |c| c.name));
            }
            InstrumentType::Noise => {
                doc.wave = Some(name_at(NOISE_WAVES, inst.wave, |w| w.name));
            }
            InstrumentType::Fm => {
                doc.algorithm = Some(name_at(ALGORITHMS, inst.algorithm, |a| a.name));
                doc.feedback_type = Some(name_at(FEEDBACKS, inst.feedback_type, |f| f.name));
                doc.feedback_amplitude = Some(inst.feedback_amplitude);
                doc.feedback_envelope =
                    Some(name_at(OPERATOR_ENVELOPES, inst.feedback_envelope, |e| e.name));
                doc.operators = Some(inst.operators.iter().map(OperatorDoc::from_operator).collect());
            }
        }
        doc
    }
}

impl OperatorDoc {
    fn from_operator(op: &Operator) -> Self {
        OperatorDoc {
            frequency: name_at(OPERATOR_FREQUENCIES, op.frequency, |f| f.name),
            amplitude: op.amplitude,
            envelope: name_at(OPERATOR_ENVELOPES, op.envelope, |e| e.name),
        }
    }
}

impl PatternDoc {
    fn from_pattern(pattern: &Pattern) -> Self {
        PatternDoc {
            instrument: pattern.instrument + 1,
            notes: pattern
                .notes
                .iter()
                .map(|note| NoteDoc {
                    pitches: note.pitches.clone(),
                    points: note
                        .pins
                        .iter()
                        .map(|pin| PointDoc {
                            tick: note.start + pin.time,
                            pitch_bend: pin.interval,
                            volume: (pin.volume as f64 * 100.0 / NOTE_VOLUME_MAX as f64).round(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn name_at<T>(table: &[T], index: usize, name: impl Fn(&T) -> &'static str) -> String {
    name(&table[index.min(table.len() - 1)]).to_string()
}

fn pulse_width_percent(setting: u32) -> f64 {
    (config::pulse_width_ratio(setting) * 10000.0).round() / 100.0
}

// ── Import ──────────────────────────────────────────────────

/// Look a name up in a table, keeping `fallback` when it is unknown.
fn lookup<T>(table: &[T], name: &str, fallback: usize, get: impl Fn(&T) -> &str) -> usize {
    config::index_by_name(table, name, get).unwrap_or_else(|| {
        debug!("unknown name {name:?} in song JSON; using default");
        fallback
    })
}

impl SongDoc {
    fn into_song(self) -> Song {
        let mut song = Song::new();
        if self.format != FORMAT_NAME {
            debug!("song JSON format {:?}, reading as {FORMAT_NAME}", self.format);
        }

        if let Some(theme) = self.theme {
            song.theme = theme;
        }
        song.scale = lookup(SCALES, &self.scale, song.scale, |s| s.name);
        song.key = lookup(KEYS, &self.key, song.key, |k| k.name);
        song.mix = lookup(MIX_STYLES, &self.mix, song.mix, |m| m.name);
        song.sample_rate = lookup(SAMPLE_RATES, &self.sample_rate, song.sample_rate, |r| r.name);
        song.set_tempo(config::tempo_from_bpm(self.beats_per_minute));
        song.reverb = self.reverb;
        song.blend = self.blend;
        song.riff = self.riff;
        song.detune = self.detune;
        song.muff = self.muff;
        song.set_beats_per_bar(self.beats_per_bar);
        song.set_parts_per_beat(self.ticks_per_beat);

        let (drums, pitches): (Vec<ChannelDoc>, Vec<ChannelDoc>) =
            self.channels.into_iter().partition(|c| c.kind == "drum");
        song.set_channel_counts(pitches.len(), drums.len());
        let all = || pitches.iter().chain(drums.iter());
        if let Some(bars) = all().map(|c| c.sequence.len()).max().filter(|&b| b > 0) {
            song.set_bar_count(bars);
        }
        if let Some(patterns) = all().map(|c| c.patterns.len()).max().filter(|&n| n > 0) {
            song.set_patterns_per_channel(patterns);
        }
        if let Some(instruments) = all().map(|c| c.instruments.len()).max().filter(|&n| n > 0) {
            song.set_instruments_per_channel(instruments);
        }
        song.set_loop(self.intro_bars, self.loop_bars);

        let version = self.version;
        let bar_length = song.bar_length();
        let pitch_count = song.pitch_channel_count();
        let docs = pitches
            .into_iter()
            .take(pitch_count)
            .chain(drums.into_iter().take(song.drum_channel_count()));
        for (index, doc) in docs.enumerate() {
            let is_drum = song.is_drum_channel(index);
            let Some(channel) = song.channel_mut(index) else {
                break;
            };
            channel.octave = doc.octave_scroll_bar.min(config::OCTAVE_MAX);
            for (i, inst_doc) in doc.instruments.iter().enumerate() {
                if let Some(inst) = channel.instrument_mut(i) {
                    inst_doc.apply(inst, is_drum);
                }
            }
            let instrument_count = channel.instruments().len();
            for (i, pattern_doc) in doc.patterns.iter().enumerate() {
                if let Some(pattern) = channel.pattern_mut(i) {
                    *pattern = pattern_doc.to_pattern(version, is_drum, bar_length);
                    if pattern.instrument >= instrument_count {
                        pattern.instrument = 0;
                    }
                }
            }
            for (bar, &pattern) in doc.sequence.iter().enumerate() {
                channel.set_bar(bar, pattern);
            }
        }
        song.clamp_settings();
        song
    }
}

impl InstrumentDoc {
    fn apply(&self, inst: &mut Instrument, is_drum: bool) {
        let kind = InstrumentType::from_name(&self.kind).unwrap_or_default();
        inst.set_type_and_reset(kind, is_drum);

        let top = (VOLUME_RANGE - 1) as f64;
        inst.volume = (top - self.volume * top / 100.0).round().clamp(0.0, top) as u32;
        inst.pan = (self.pan / PAN_PERCENT_STEP + PAN_CENTER as f64)
            .round()
            .clamp(0.0, (PAN_RANGE - 1) as f64) as u32;
        inst.muted = self.muted;
        inst.transition = lookup(TRANSITIONS, &self.transition, inst.transition, |t| t.name);
        inst.effect = lookup(EFFECTS, &self.effect, inst.effect, |e| e.name);

        if let Some(wave) = &self.wave {
            inst.wave = if inst.kind == InstrumentType::Noise {
                lookup(NOISE_WAVES, wave, inst.wave, |w| w.name)
            } else {
                lookup(CHIP_WAVES, wave, inst.wave, |w| w.name)
            };
        }
        if let Some(percent) = self.pulse_width {
            inst.pulse_width = (0..PULSE_WIDTH_RANGE)
                .min_by(|&a, &b| {
                    let da = (pulse_width_percent(a) - percent).abs();
                    let db = (pulse_width_percent(b) - percent).abs();
                    da.total_cmp(&db)
                })
                .unwrap_or(inst.pulse_width);
        }
        if let Some(filter) = &self.filter {
            inst.filter = lookup(FILTERS, filter, inst.filter, |f| f.name);
        }
        if let Some(chorus) = &self.chorus {
            inst.chorus = lookup(CHORUSES, chorus, inst.chorus, |c| c.name);
        }
        if let Some(algorithm) = &self.algorithm {
            inst.algorithm = lookup(ALGORITHMS, algorithm, inst.algorithm, |a| a.name);
        }
        if let Some(feedback) = &self.feedback_type {
            inst.feedback_type = lookup(FEEDBACKS, feedback, inst.feedback_type, |f| f.name);
        }
        if let Some(amplitude) = self.feedback_amplitude {
            inst.feedback_amplitude = amplitude;
        }
        if let Some(envelope) = &self.feedback_envelope {
            inst.feedback_envelope =
                lookup(OPERATOR_ENVELOPES, envelope, inst.feedback_envelope, |e| e.name);
        }
        if let Some(operators) = &self.operators {
            for (op, doc) in inst.operators.iter_mut().zip(operators.iter().take(OPERATOR_COUNT)) {
                op.frequency = lookup(OPERATOR_FREQUENCIES, &doc.frequency, op.frequency, |f| f.name);
                op.amplitude = doc.amplitude;
                op.envelope = lookup(OPERATOR_ENVELOPES, &doc.envelope, op.envelope, |e| e.name);
            }
        }
    }
}

impl PatternDoc {
    fn to_pattern(&self, version: u32, is_drum: bool, bar_length: u32) -> Pattern {
        let max_pitch = if is_drum { DRUM_COUNT - 1 } else { MAX_PITCH };
        let mut pattern = Pattern {
            notes: Vec::with_capacity(self.notes.len()),
            instrument: self.instrument.saturating_sub(1),
        };
        for note_doc in &self.notes {
            let mut points = note_doc.points.clone();
            points.sort_by_key(|p| p.tick);
            let Some(first) = points.first() else {
                continue;
            };
            let start = first.tick;
            let pins = points
                .iter()
                .map(|p| {
                    let volume = if version >= PERCENT_VOLUME_VERSION {
                        p.volume * NOTE_VOLUME_MAX as f64 / 100.0
                    } else {
                        p.volume
                    };
                    let volume = volume.round().clamp(0.0, NOTE_VOLUME_MAX as f64) as u32;
                    make_note_pin(p.pitch_bend, p.tick - start, volume)
                })
                .collect();
            let pitches = note_doc.pitches.iter().map(|&p| p.clamp(0, max_pitch)).collect();
            pattern.notes.push(Note::with_pins(pitches, start, pins));
        }
        pattern.normalize(bar_length);
        pattern
    }
}

// ── Public API ──────────────────────────────────────────────

impl Song {
    /// Export as a JSON document.
    pub fn to_json(&self) -> Result<serde_json::Value, JsonError> {
        Ok(serde_json::to_value(SongDoc::from_song(self))?)
    }

    /// Export as pretty-printed JSON text.
    pub fn to_json_string(&self) -> Result<String, JsonError> {
        Ok(serde_json::to_string_pretty(&SongDoc::from_song(self))?)
    }

    /// Import a JSON document. Missing fields keep their defaults.
    pub fn from_json(value: &serde_json::Value) -> Result<Song, JsonError> {
        if !value.is_object() {
            return Err(JsonError::NotAnObject);
        }
        let doc: SongDoc = serde_json::from_value(value.clone())?;
        Ok(doc.into_song())
    }

    pub fn from_json_str(text: &str) -> Result<Song, JsonError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Song::from_json(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::NotePin;
    use serde_json::json;

    fn pin(interval: i32, time: u32, volume: u32) -> NotePin {
        make_note_pin(interval, time, volume)
    }

    fn sample_song() -> Song {
        let mut song = Song::new();
        song.set_channel_counts(2, 1);
        song.set_bar_count(6);
        song.set_patterns_per_channel(3);
        song.set_instruments_per_channel(2);
        song.set_loop(1, 4);
        song.key = 2;
        song.tempo = 10;
        song.reverb = 3;
        song.theme = String::from("forest");

        let ch = song.channel_mut(0).unwrap();
        ch.octave = 2;
        let inst = ch.instrument_mut(1).unwrap();
        inst.set_type_and_reset(InstrumentType::Fm, false);
        inst.algorithm = 4;
        inst.feedback_type = 2;
        inst.feedback_amplitude = 6;
        inst.operators[1].amplitude = 9;
        inst.operators[1].frequency = 5;
        inst.volume = 3;
        inst.pan = 7;
        let inst = ch.instrument_mut(0).unwrap();
        inst.wave = 4;
        inst.chorus = 5;
        inst.effect = 3;
        let pattern = ch.pattern_mut(1).unwrap();
        pattern.instrument = 1;
        pattern.notes.push(Note::with_pins(vec![24, 28], 2, vec![pin(0, 0, 3), pin(3, 4, 2), pin(3, 6, 0)]));
        ch.set_bar(0, 2);
        ch.set_bar(5, 1);

        let ch = song.channel_mut(1).unwrap();
        let inst = ch.instrument_mut(0).unwrap();
        inst.set_type_and_reset(InstrumentType::PulseWidth, false);
        inst.pulse_width = 2;

        let drum = song.channel_mut(2).unwrap();
        drum.instrument_mut(0).unwrap().wave = 2;
        drum.pattern_mut(0).unwrap().notes.push(Note::new(9, 0, 2, 1));
        drum.set_bar(3, 1);
        song
    }

    #[test]
    fn export_uses_names_and_percentages() {
        let value = sample_song().to_json().unwrap();
        assert_eq!(value["format"], FORMAT_NAME);
        assert_eq!(value["version"], JSON_VERSION);
        assert_eq!(value["key"], "D");
        assert_eq!(value["introBars"], 1);
        assert_eq!(value["loopBars"], 4);
        let ch = &value["channels"][0];
        assert_eq!(ch["type"], "pitch");
        assert_eq!(ch["instruments"][0]["wave"], "sawtooth");
        assert_eq!(ch["instruments"][1]["type"], "FM");
        assert_eq!(ch["instruments"][1]["volume"], 57.0);
        assert_eq!(ch["instruments"][1]["pan"], 75.0);
        let note = &ch["patterns"][1]["notes"][0];
        assert_eq!(ch["patterns"][1]["instrument"], 2);
        assert_eq!(note["points"][0], json!({"tick": 2, "pitchBend": 0, "volume": 100.0}));
        assert_eq!(note["points"][1]["volume"], 67.0);
        assert_eq!(ch["sequence"], json!([2, 0, 0, 0, 0, 1]));
        assert_eq!(value["channels"][2]["type"], "drum");
    }

    #[test]
    fn json_round_trips_the_model() {
        let song = sample_song();
        let text = song.to_json_string().unwrap();
        let decoded = Song::from_json_str(&text).unwrap();
        assert_eq!(decoded, song);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let song = Song::from_json(&json!({})).unwrap();
        let mut expected = Song::new();
        expected.set_channel_counts(1, 0);
        assert_eq!(song, expected);

        let song = Song::from_json(&json!({
            "beatsPerMinute": 150,
            "channels": [{"instruments": [{"type": "PWM"}], "sequence": [1, 0]}]
        }))
        .unwrap();
        assert_eq!(song.tempo, config::tempo_from_bpm(150.0));
        assert_eq!(song.bar_count(), 2);
        assert_eq!(song.channels()[0].instruments()[0].kind, InstrumentType::PulseWidth);
    }

    #[test]
    fn first_version_volumes_are_raw() {
        let doc = json!({
            "version": 1,
            "channels": [{
                "patterns": [{"notes": [{"pitches": [30], "points": [
                    {"tick": 0, "volume": 3}, {"tick": 4, "volume": 1}
                ]}]}],
                "sequence": [1]
            }]
        });
        let song = Song::from_json(&doc).unwrap();
        let note = &song.channels()[0].patterns()[0].notes[0];
        assert_eq!(note.pins, vec![pin(0, 0, 3), pin(0, 4, 1)]);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(Song::from_json(&json!([1, 2])), Err(JsonError::NotAnObject)));
        assert!(matches!(Song::from_json_str("{"), Err(JsonError::Parse(_))));
        assert!(matches!(
            Song::from_json(&json!({"beatsPerBar": "eight"})),
            Err(JsonError::Parse(_))
        ));
    }

    #[test]
    fn unknown_names_fall_back() {
        let song = Song::from_json(&json!({
            "scale": "nonsense",
            "channels": [{"instruments": [{"wave": "kazoo", "transition": "warp"}]}]
        }))
        .unwrap();
        assert_eq!(song.scale, config::DEFAULT_SCALE);
        let inst = &song.channels()[0].instruments()[0];
        assert_eq!(inst.wave, Instrument::new(false).wave);
        assert_eq!(inst.transition, config::DEFAULT_TRANSITION);
    }
}
