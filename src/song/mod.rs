//! Score model: the in-memory composition.
//!
//! `Song` owns every channel, instrument, pattern, and note. Structural
//! counts are private and change only through setters that resize the
//! per-channel arrays to match, so `channels.len() == pitch + drum` and
//! each channel's instrument/pattern/bar arrays always have the song-level
//! lengths.

pub mod channel;
pub mod instrument;
pub mod pattern;

pub use channel::Channel;
pub use instrument::{Instrument, InstrumentType, Operator};
pub use pattern::{Note, NotePin, Pattern, make_note_pin};

use crate::config::{
    self, BAR_COUNT_MAX, BAR_COUNT_MIN, BEATS_PER_BAR_MAX, BEATS_PER_BAR_MIN, BLEND_RANGE,
    DEFAULT_SCALE, DEFAULT_TEMPO, DETUNE_CENTER, DETUNE_RANGE, DRUM_CHANNEL_COUNT_MAX,
    DRUM_CHANNEL_COUNT_MIN, INSTRUMENTS_PER_CHANNEL_MAX, INSTRUMENTS_PER_CHANNEL_MIN, KEYS,
    MIX_STYLES, MUFF_RANGE, PARTS_PER_BEAT, PATTERNS_PER_CHANNEL_MAX, PATTERNS_PER_CHANNEL_MIN,
    PITCH_CHANNEL_COUNT_MAX, PITCH_CHANNEL_COUNT_MIN, REVERB_RANGE, RIFF_RANGE, SAMPLE_RATES,
    SCALES, TEMPO_STEPS,
};

/// Default octave scroll for newly created pitch channels.
const DEFAULT_OCTAVE: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub scale: usize,
    pub key: usize,
    /// 0..=24, see [`config::beats_per_minute`].
    pub tempo: u32,
    pub reverb: u32,
    pub mix: usize,
    pub sample_rate: usize,
    pub blend: u32,
    pub riff: u32,
    pub detune: u32,
    pub muff: u32,
    /// Free-text colour theme tag for the editor.
    pub theme: String,
    loop_start: usize,
    loop_length: usize,
    beats_per_bar: u32,
    bar_count: usize,
    patterns_per_channel: usize,
    parts_per_beat: u32,
    instruments_per_channel: usize,
    pitch_channel_count: usize,
    drum_channel_count: usize,
    channels: Vec<Channel>,
}

impl Default for Song {
    fn default() -> Self {
        Song::new()
    }
}

impl Song {
    /// An empty song: 4 pitch channels, 1 drum channel, 16 bars of 8 beats.
    pub fn new() -> Self {
        let mut song = Song {
            scale: DEFAULT_SCALE,
            key: 0,
            tempo: DEFAULT_TEMPO,
            reverb: 0,
            mix: 0,
            sample_rate: 0,
            blend: 0,
            riff: 0,
            detune: DETUNE_CENTER,
            muff: 0,
            theme: String::from("default"),
            loop_start: 0,
            loop_length: 4,
            beats_per_bar: 8,
            bar_count: 16,
            patterns_per_channel: 8,
            parts_per_beat: 4,
            instruments_per_channel: 1,
            pitch_channel_count: 0,
            drum_channel_count: 0,
            channels: Vec::new(),
        };
        song.set_channel_counts(4, 1);
        song
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut Channel> {
        self.channels.get_mut(index)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn pitch_channel_count(&self) -> usize {
        self.pitch_channel_count
    }

    pub fn drum_channel_count(&self) -> usize {
        self.drum_channel_count
    }

    pub fn is_drum_channel(&self, channel: usize) -> bool {
        channel >= self.pitch_channel_count
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn parts_per_beat(&self) -> u32 {
        self.parts_per_beat
    }

    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    pub fn patterns_per_channel(&self) -> usize {
        self.patterns_per_channel
    }

    pub fn instruments_per_channel(&self) -> usize {
        self.instruments_per_channel
    }

    pub fn loop_start(&self) -> usize {
        self.loop_start
    }

    pub fn loop_length(&self) -> usize {
        self.loop_length
    }

    /// Parts in one bar.
    pub fn bar_length(&self) -> u32 {
        self.beats_per_bar * self.parts_per_beat
    }

    pub fn beats_per_minute(&self) -> f64 {
        config::beats_per_minute(self.tempo)
    }

    pub fn key_offset(&self) -> i32 {
        KEYS[self.key.min(KEYS.len() - 1)].offset
    }

    /// The pattern playing on `channel` at `bar`.
    pub fn pattern_at(&self, channel: usize, bar: usize) -> Option<&Pattern> {
        self.channels.get(channel)?.pattern_at(bar)
    }

    /// The instrument selected by the pattern at `bar` (slot 0 for empty bars).
    pub fn instrument_for(&self, channel: usize, bar: usize) -> Option<&Instrument> {
        let ch = self.channels.get(channel)?;
        let slot = ch.pattern_at(bar).map_or(0, |p| p.instrument);
        ch.instruments.get(slot).or_else(|| ch.instruments.first())
    }

    /// Index of the last bar with any pattern assigned, plus one.
    pub fn used_bar_count(&self) -> usize {
        self.channels
            .iter()
            .filter_map(|ch| ch.bars.iter().rposition(|&b| b != 0))
            .max()
            .map_or(0, |last| last + 1)
    }

    // ── Structural setters ──────────────────────────────────

    /// Change the number of pitch and drum channels, keeping existing
    /// channels of each kind in order.
    pub fn set_channel_counts(&mut self, pitch: usize, drum: usize) {
        let pitch = pitch.clamp(PITCH_CHANNEL_COUNT_MIN, PITCH_CHANNEL_COUNT_MAX);
        let drum = drum.clamp(DRUM_CHANNEL_COUNT_MIN, DRUM_CHANNEL_COUNT_MAX);
        let mut old = std::mem::take(&mut self.channels).into_iter();
        let old_pitch: Vec<Channel> = old.by_ref().take(self.pitch_channel_count).collect();
        let old_drum: Vec<Channel> = old.collect();

        let mut channels = Vec::with_capacity(pitch + drum);
        for i in 0..pitch {
            channels.push(old_pitch.get(i).cloned().unwrap_or_else(|| self.new_channel(false)));
        }
        for i in 0..drum {
            channels.push(old_drum.get(i).cloned().unwrap_or_else(|| self.new_channel(true)));
        }
        self.channels = channels;
        self.pitch_channel_count = pitch;
        self.drum_channel_count = drum;
    }

    fn new_channel(&self, is_drum: bool) -> Channel {
        Channel::new(
            is_drum,
            if is_drum { 0 } else { DEFAULT_OCTAVE },
            self.instruments_per_channel,
            self.patterns_per_channel,
            self.bar_count,
        )
    }

    pub fn set_bar_count(&mut self, count: usize) {
        let count = count.clamp(BAR_COUNT_MIN, BAR_COUNT_MAX);
        self.bar_count = count;
        for channel in &mut self.channels {
            channel.resize_bars(count);
        }
        self.set_loop(self.loop_start, self.loop_length);
    }

    pub fn set_patterns_per_channel(&mut self, count: usize) {
        let count = count.clamp(PATTERNS_PER_CHANNEL_MIN, PATTERNS_PER_CHANNEL_MAX);
        self.patterns_per_channel = count;
        for channel in &mut self.channels {
            channel.resize_patterns(count);
        }
    }

    pub fn set_instruments_per_channel(&mut self, count: usize) {
        let count = count.clamp(INSTRUMENTS_PER_CHANNEL_MIN, INSTRUMENTS_PER_CHANNEL_MAX);
        self.instruments_per_channel = count;
        let pitch = self.pitch_channel_count;
        for (i, channel) in self.channels.iter_mut().enumerate() {
            channel.resize_instruments(count, i >= pitch);
        }
    }

    /// Change the bar length, trimming notes that no longer fit.
    pub fn set_beats_per_bar(&mut self, beats: u32) {
        let beats = beats.clamp(BEATS_PER_BAR_MIN, BEATS_PER_BAR_MAX);
        if beats < self.beats_per_bar {
            let bar_length = beats * self.parts_per_beat;
            self.for_each_pattern(|pattern| {
                pattern.notes.retain_mut(|note| note.trim_end(bar_length));
            });
        }
        self.beats_per_bar = beats;
    }

    /// Change the beat subdivision to the closest allowed value, rescaling
    /// every note's timing.
    pub fn set_parts_per_beat(&mut self, parts: u32) {
        let parts = PARTS_PER_BEAT[config::parts_per_beat_index(parts)];
        let old = self.parts_per_beat;
        if parts == old {
            return;
        }
        let bar_length = self.beats_per_bar * parts;
        self.for_each_pattern(|pattern| {
            pattern.notes.retain_mut(|note| note.rescale(old, parts));
            pattern.normalize(bar_length);
        });
        self.parts_per_beat = parts;
    }

    /// Set the loop region, clamped to the song.
    pub fn set_loop(&mut self, start: usize, length: usize) {
        self.loop_start = start.min(self.bar_count - 1);
        self.loop_length = length.clamp(1, self.bar_count - self.loop_start);
    }

    pub fn set_tempo(&mut self, tempo: u32) {
        self.tempo = tempo.min(TEMPO_STEPS - 1);
    }

    /// Clamp every scalar setting and instrument index into its table.
    pub fn clamp_settings(&mut self) {
        self.scale = self.scale.min(SCALES.len() - 1);
        self.key = self.key.min(KEYS.len() - 1);
        self.tempo = self.tempo.min(TEMPO_STEPS - 1);
        self.reverb = self.reverb.min(REVERB_RANGE - 1);
        self.mix = self.mix.min(MIX_STYLES.len() - 1);
        self.sample_rate = self.sample_rate.min(SAMPLE_RATES.len() - 1);
        self.blend = self.blend.min(BLEND_RANGE - 1);
        self.riff = self.riff.min(RIFF_RANGE - 1);
        self.detune = self.detune.min(DETUNE_RANGE - 1);
        self.muff = self.muff.min(MUFF_RANGE - 1);
        let pitch = self.pitch_channel_count;
        for (i, channel) in self.channels.iter_mut().enumerate() {
            for instrument in &mut channel.instruments {
                instrument.clamp(i >= pitch);
            }
        }
    }

    fn for_each_pattern(&mut self, mut f: impl FnMut(&mut Pattern)) {
        for channel in &mut self.channels {
            for pattern in &mut channel.patterns {
                f(pattern);
            }
        }
    }
}
