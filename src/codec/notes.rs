//! Per-channel note stream.
//!
//! Notes are written as a sequence of rest / new-shape / old-shape symbols.
//! Two move-to-front histories (recent shapes and recent pitches) are reset
//! per channel; the encoder and decoder must mutate them in the same order
//! or the stream desynchronizes.

use crate::bitstream::{BitReader, BitWriter};
use crate::config::{
    DRUM_COUNT, MAX_CHORD_SIZE, MAX_PITCH, NOTE_VOLUME_MAX, RECENT_PITCH_CAPACITY,
    RECENT_SHAPE_CAPACITY,
};
use crate::song::{Channel, Note, NotePin, make_note_pin};

const PITCH_CACHE_SEED: [i32; 7] = [12, 19, 24, 31, 36, 7, 0];
const DRUM_CACHE_SEED: [i32; 8] = [4, 6, 7, 2, 3, 8, 0, 10];

/// Largest pitch step the decoder will follow; anything wider is corrupt.
const MAX_PITCH_STEP: i32 = 256;

/// Small most-recently-used list with move-to-front semantics.
#[derive(Debug, Clone)]
pub(crate) struct RecentCache<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T: PartialEq> RecentCache<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        RecentCache {
            items: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub(crate) fn position(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|x| x == item)
    }

    pub(crate) fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Remove and return the entry at `index`.
    pub(crate) fn take(&mut self, index: usize) -> Option<T> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Insert at the front, evicting the oldest entry past capacity.
    pub(crate) fn push_front(&mut self, item: T) {
        self.items.insert(0, item);
        self.items.truncate(self.capacity);
    }
}

/// A note's envelope with the pitches stripped out.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Shape {
    pitch_count: usize,
    initial_volume: u32,
    pins: Vec<ShapePin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShapePin {
    bends: bool,
    time: u32,
    volume: u32,
}

impl Shape {
    fn bend_count(&self) -> usize {
        self.pins.iter().filter(|p| p.bends).count()
    }

    fn length(&self) -> u32 {
        self.pins.last().map_or(0, |p| p.time)
    }

    fn write(&self, bits: &mut BitWriter) {
        for _ in 1..self.pitch_count {
            bits.write(1, 1);
        }
        if self.pitch_count < MAX_CHORD_SIZE {
            bits.write(1, 0);
        }
        bits.write_pin_count(self.pins.len() as u32);
        bits.write(2, self.initial_volume);
        let mut last_time = 0;
        for pin in &self.pins {
            bits.write(1, pin.bends as u32);
            bits.write_part_duration(pin.time - last_time);
            last_time = pin.time;
            bits.write(2, pin.volume);
        }
    }

    fn read(bits: &mut BitReader, bar_length: u32) -> Self {
        let mut pitch_count = 1;
        while pitch_count < MAX_CHORD_SIZE && bits.read(1) == 1 {
            pitch_count += 1;
        }
        // A valid note never has more pins than parts in the bar.
        let pin_count = bits.read_pin_count().min(bar_length.max(1));
        let initial_volume = bits.read(2);
        let mut pins = Vec::with_capacity(pin_count as usize);
        let mut time = 0u32;
        for _ in 0..pin_count {
            let bends = bits.read(1) == 1;
            time = time.saturating_add(bits.read_part_duration());
            let volume = bits.read(2);
            pins.push(ShapePin { bends, time, volume });
        }
        Shape {
            pitch_count,
            initial_volume,
            pins,
        }
    }
}

/// Per-channel codec state shared by both directions.
struct History {
    shapes: RecentCache<Shape>,
    pitches: RecentCache<i32>,
    last_pitch: i32,
}

impl History {
    fn new(is_drum: bool, octave: u32) -> Self {
        let mut pitches = RecentCache::new(RECENT_PITCH_CAPACITY);
        let last_pitch;
        if is_drum {
            for &p in DRUM_CACHE_SEED.iter().rev() {
                pitches.push_front(p);
            }
            last_pitch = DRUM_CACHE_SEED[0];
        } else {
            let offset = octave as i32 * 12;
            for &p in PITCH_CACHE_SEED.iter().rev() {
                pitches.push_front(p + offset);
            }
            last_pitch = PITCH_CACHE_SEED[0] + offset;
        }
        History {
            shapes: RecentCache::new(RECENT_SHAPE_CAPACITY),
            pitches,
            last_pitch,
        }
    }

    /// Number of uncached pitches crossed stepping from the last pitch to `pitch`.
    fn interval_to(&self, pitch: i32) -> i32 {
        let mut interval = 0;
        let mut iter = self.last_pitch;
        while iter < pitch {
            iter += 1;
            if !self.pitches.contains(&iter) {
                interval += 1;
            }
        }
        while iter > pitch {
            iter -= 1;
            if !self.pitches.contains(&iter) {
                interval -= 1;
            }
        }
        interval
    }

    /// Inverse of [`History::interval_to`].
    fn pitch_from_interval(&self, interval: i32) -> i32 {
        let mut pitch = self.last_pitch;
        let mut steps = interval.clamp(-MAX_PITCH_STEP, MAX_PITCH_STEP);
        while steps > 0 {
            pitch += 1;
            while self.pitches.contains(&pitch) {
                pitch += 1;
            }
            steps -= 1;
        }
        while steps < 0 {
            pitch -= 1;
            while self.pitches.contains(&pitch) {
                pitch -= 1;
            }
            steps += 1;
        }
        pitch
    }
}

/// Append one channel's patterns to the note stream.
pub(crate) fn encode_channel(
    bits: &mut BitWriter,
    channel: &Channel,
    is_drum: bool,
    bar_length: u32,
    instrument_bits: u32,
) {
    let mut history = History::new(is_drum, channel.octave);
    for pattern in channel.patterns() {
        bits.write(instrument_bits, pattern.instrument as u32);
        if pattern.notes.is_empty() {
            bits.write(1, 0);
            continue;
        }
        bits.write(1, 1);

        let mut cursor = 0;
        for note in &pattern.notes {
            // Only well-formed notes can be represented; the rest fall into rests.
            if note.pitches.is_empty() || note.start < cursor || note.end > bar_length {
                continue;
            }
            if note.start > cursor {
                bits.write(2, 0);
                bits.write_part_duration(note.start - cursor);
            }
            encode_note(bits, note, &mut history);
            cursor = note.end;
        }
        if cursor < bar_length {
            bits.write(2, 0);
            bits.write_part_duration(bar_length - cursor);
        }
    }
}

fn encode_note(bits: &mut BitWriter, note: &Note, history: &mut History) {
    let pitches = &note.pitches[..note.pitches.len().min(MAX_CHORD_SIZE)];
    let base = pitches[0];
    let mut current = base;
    let mut bends = Vec::new();
    let mut shape = Shape {
        pitch_count: pitches.len(),
        initial_volume: note.pins.first().map_or(NOTE_VOLUME_MAX, |p| p.volume),
        pins: Vec::with_capacity(note.pins.len()),
    };
    for pin in note.pins.iter().skip(1) {
        let next = base + pin.interval;
        let bent = next != current;
        if bent {
            bends.push(next);
            current = next;
        }
        shape.pins.push(ShapePin {
            bends: bent,
            time: pin.time,
            volume: pin.volume,
        });
    }

    match history.shapes.position(&shape) {
        Some(index) => {
            bits.write(1, 1);
            bits.write_long_tail(0, 0, index as u32);
            history.shapes.take(index);
        }
        None => {
            bits.write(2, 1);
            shape.write(bits);
        }
    }
    history.shapes.push_front(shape);

    let chord_end = pitches.len();
    for (i, &pitch) in pitches.iter().chain(bends.iter()).enumerate() {
        match history.pitches.position(&pitch) {
            Some(index) => {
                bits.write(1, 1);
                bits.write(3, index as u32);
                history.pitches.take(index);
            }
            None => {
                bits.write(1, 0);
                bits.write_pitch_interval(history.interval_to(pitch));
            }
        }
        history.pitches.push_front(pitch);
        history.last_pitch = if i + 1 == chord_end { base } else { pitch };
    }
}

/// Read one channel's patterns from the note stream.
///
/// `has_notes_flag` is false for the oldest strings, whose patterns always
/// carry a full bar of symbols.
pub(crate) fn decode_channel(
    bits: &mut BitReader,
    channel: &mut Channel,
    is_drum: bool,
    bar_length: u32,
    instrument_bits: u32,
    has_notes_flag: bool,
) {
    let mut history = History::new(is_drum, channel.octave);
    let instrument_count = channel.instruments().len();
    let max_pitch = if is_drum { DRUM_COUNT - 1 } else { MAX_PITCH };

    for index in 0..channel.patterns().len() {
        let instrument = (bits.read(instrument_bits) as usize).min(instrument_count.saturating_sub(1));
        let mut notes = Vec::new();
        if !has_notes_flag || bits.read(1) == 1 {
            let mut cursor = 0;
            while cursor < bar_length {
                let use_old_shape = bits.read(1) == 1;
                let shape = if use_old_shape {
                    let shape_index = bits.read_long_tail(0, 0) as usize;
                    match history.shapes.take(shape_index) {
                        Some(shape) => shape,
                        None => {
                            log::warn!("note stream references unknown shape {shape_index}; stopping");
                            return;
                        }
                    }
                } else if bits.read(1) == 1 {
                    Shape::read(bits, bar_length)
                } else {
                    cursor = cursor.saturating_add(bits.read_part_duration());
                    continue;
                };

                let mut note = decode_note(bits, &shape, cursor, &mut history, max_pitch);
                history.shapes.push_front(shape);
                cursor = note.end;
                if note.trim_end(bar_length) {
                    notes.push(note);
                }
            }
        }
        if let Some(pattern) = channel.pattern_mut(index) {
            pattern.instrument = instrument;
            pattern.notes = notes;
        }
    }
}

fn decode_note(
    bits: &mut BitReader,
    shape: &Shape,
    start: u32,
    history: &mut History,
    max_pitch: i32,
) -> Note {
    let total = shape.pitch_count + shape.bend_count();
    let mut pitches = Vec::with_capacity(shape.pitch_count);
    let mut bends = Vec::with_capacity(total - shape.pitch_count + 1);

    for j in 0..total {
        let pitch = if bits.read(1) == 1 {
            let index = bits.read(3) as usize;
            // An empty slot decodes as the last pitch so the caches stay aligned.
            history.pitches.take(index).unwrap_or(history.last_pitch)
        } else {
            let interval = bits.read_pitch_interval();
            history.pitch_from_interval(interval)
        };
        history.pitches.push_front(pitch);
        if j < shape.pitch_count {
            pitches.push(pitch);
        } else {
            bends.push(pitch);
        }
        history.last_pitch = if j + 1 == shape.pitch_count { pitches[0] } else { pitch };
    }

    let end = start.saturating_add(shape.length());
    let base = pitches[0];
    let mut pins: Vec<NotePin> = Vec::with_capacity(shape.pins.len() + 1);
    pins.push(make_note_pin(0, 0, shape.initial_volume));
    let mut current = base;
    let mut bends = bends.into_iter();
    for pin in &shape.pins {
        if pin.bends {
            current = bends.next().unwrap_or(current);
        }
        pins.push(make_note_pin(current - base, pin.time, pin.volume));
    }

    let mut kept: Vec<i32> = Vec::with_capacity(pitches.len());
    for pitch in pitches {
        let pitch = pitch.clamp(0, max_pitch);
        if !kept.contains(&pitch) {
            kept.push(pitch);
        }
    }
    Note {
        pitches: kept,
        start,
        end,
        pins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::bits_for;
    use crate::song::Pattern;

    fn channel_with(patterns: Vec<Pattern>, octave: u32, instruments: usize) -> Channel {
        let mut channel = Channel::new(false, octave, instruments, patterns.len(), 4);
        for (i, pattern) in patterns.into_iter().enumerate() {
            *channel.pattern_mut(i).unwrap() = pattern;
        }
        channel
    }

    fn round_trip(channel: &Channel, is_drum: bool, bar_length: u32) -> Channel {
        let instrument_bits = bits_for(channel.instruments().len());
        let mut bits = BitWriter::new();
        encode_channel(&mut bits, channel, is_drum, bar_length, instrument_bits);
        let mut decoded = Channel::new(
            is_drum,
            channel.octave,
            channel.instruments().len(),
            channel.patterns().len(),
            channel.bars().len(),
        );
        let mut reader = BitReader::from_writer(&bits);
        decode_channel(&mut reader, &mut decoded, is_drum, bar_length, instrument_bits, true);
        assert_eq!(reader.remaining(), 0, "decoder left bits unread");
        decoded
    }

    fn pin(interval: i32, time: u32, volume: u32) -> NotePin {
        make_note_pin(interval, time, volume)
    }

    #[test]
    fn cache_moves_to_front_and_evicts() {
        let mut cache = RecentCache::new(3);
        for i in [1, 2, 3] {
            cache.push_front(i);
        }
        assert_eq!(cache.position(&1), Some(2));
        let taken = cache.take(2).unwrap();
        cache.push_front(taken);
        assert_eq!(cache.position(&1), Some(0));
        cache.push_front(9);
        assert_eq!(cache.position(&3), Some(2));
        assert_eq!(cache.position(&2), None, "oldest entry should be evicted");
        assert!(cache.take(7).is_none());
    }

    #[test]
    fn interval_skips_cached_pitches() {
        let history = History::new(false, 0);
        // 12 is last; 13 is free, 19 is cached.
        assert_eq!(history.interval_to(13), 1);
        assert_eq!(history.pitch_from_interval(1), 13);
        let up = history.interval_to(20);
        assert_eq!(history.pitch_from_interval(up), 20);
        let down = history.interval_to(5);
        assert!(down < 0);
        assert_eq!(history.pitch_from_interval(down), 5);
    }

    #[test]
    fn melody_round_trips() {
        let mut pattern = Pattern::new();
        pattern.notes.push(Note::new(48, 0, 4, 3));
        pattern.notes.push(Note::new(50, 4, 6, 2));
        pattern.notes.push(Note::new(77, 8, 12, 3));
        pattern.notes.push(Note::new(48, 12, 16, 3));
        let channel = channel_with(vec![pattern, Pattern::new()], 3, 1);
        let decoded = round_trip(&channel, false, 32);
        assert_eq!(decoded.patterns(), channel.patterns());
    }

    #[test]
    fn chords_bends_and_repeated_shapes_round_trip() {
        let mut pattern = Pattern::new();
        pattern.instrument = 2;
        pattern.notes.push(Note::with_pins(vec![36, 40, 43], 0, vec![pin(0, 0, 3), pin(2, 2, 2), pin(-1, 5, 1), pin(-1, 6, 0)]));
        pattern.notes.push(Note::with_pins(vec![60, 61, 62, 70], 6, vec![pin(0, 0, 1), pin(0, 3, 3)]));
        pattern.notes.push(Note::with_pins(vec![36, 40, 43], 10, vec![pin(0, 0, 3), pin(2, 2, 2), pin(-1, 5, 1), pin(-1, 6, 0)]));
        let mut second = Pattern::new();
        second.notes.push(Note::with_pins(vec![5], 3, vec![pin(0, 0, 0), pin(12, 1, 3), pin(24, 2, 3), pin(0, 4, 0)]));
        let channel = channel_with(vec![second.clone(), pattern, second], 2, 3);
        let decoded = round_trip(&channel, false, 24);
        assert_eq!(decoded.patterns(), channel.patterns());
    }

    #[test]
    fn drum_notes_round_trip() {
        let mut pattern = Pattern::new();
        for (i, drum) in [0, 4, 11, 4, 9].into_iter().enumerate() {
            pattern.notes.push(Note::new(drum, i as u32 * 3, i as u32 * 3 + 2, 3));
        }
        let mut channel = Channel::new(true, 0, 1, 1, 1);
        *channel.pattern_mut(0).unwrap() = pattern;
        let decoded = round_trip(&channel, true, 16);
        assert_eq!(decoded.patterns(), channel.patterns());
    }

    #[test]
    fn more_than_eight_distinct_pitches_round_trip() {
        let mut pattern = Pattern::new();
        for i in 0..16 {
            pattern.notes.push(Note::new(20 + (i * 7) % 40, i as u32 * 2, i as u32 * 2 + 1, 2));
        }
        let channel = channel_with(vec![pattern], 1, 1);
        let decoded = round_trip(&channel, false, 32);
        assert_eq!(decoded.patterns(), channel.patterns());
    }

    #[test]
    fn truncated_stream_yields_rests() {
        let mut channel = Channel::new(false, 3, 1, 2, 1);
        let mut reader = BitReader::new(b"", 0, 0);
        decode_channel(&mut reader, &mut channel, false, 32, 0, true);
        assert!(channel.patterns().iter().all(|p| p.notes.is_empty()));
    }

    #[test]
    fn oldest_format_patterns_have_no_flag() {
        let mut pattern = Pattern::new();
        pattern.notes.push(Note::new(30, 0, 32, 3));
        let channel = channel_with(vec![pattern], 3, 1);
        let mut bits = BitWriter::new();
        encode_channel(&mut bits, &channel, false, 32, 0);
        // Drop the has-notes bit to mimic the flagless layout.
        let mut legacy = BitWriter::new();
        for &bit in &bits.as_bits()[1..] {
            legacy.write(1, bit as u32);
        }
        let mut decoded = Channel::new(false, 3, 1, 1, 1);
        decode_channel(&mut BitReader::from_writer(&legacy), &mut decoded, false, 32, 0, false);
        assert_eq!(decoded.patterns(), channel.patterns());
    }
}
