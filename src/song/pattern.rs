//! Patterns, notes, and the piecewise-linear note envelope.

use crate::config::{MAX_CHORD_SIZE, NOTE_VOLUME_MAX};

/// A keyframe of a note's pitch/volume envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotePin {
    /// Semitones relative to the note's first pitch.
    pub interval: i32,
    /// Parts since the note start.
    pub time: u32,
    /// 0..=3.
    pub volume: u32,
}

pub fn make_note_pin(interval: i32, time: u32, volume: u32) -> NotePin {
    NotePin {
        interval,
        time,
        volume: volume.min(NOTE_VOLUME_MAX),
    }
}

/// One or more simultaneous pitches sharing an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub pitches: Vec<i32>,
    /// Start part within the bar.
    pub start: u32,
    /// End part (exclusive).
    pub end: u32,
    pub pins: Vec<NotePin>,
}

impl Note {
    /// A flat note of constant volume.
    pub fn new(pitch: i32, start: u32, end: u32, volume: u32) -> Self {
        let end = end.max(start + 1);
        Note {
            pitches: vec![pitch],
            start,
            end,
            pins: vec![make_note_pin(0, 0, volume), make_note_pin(0, end - start, volume)],
        }
    }

    /// Build a note from explicit pins, normalizing them.
    pub fn with_pins(pitches: Vec<i32>, start: u32, pins: Vec<NotePin>) -> Self {
        let mut note = Note {
            pitches,
            start,
            end: start + 1,
            pins,
        };
        note.normalize();
        note
    }

    pub fn length(&self) -> u32 {
        self.end - self.start
    }

    /// Interval of the final pin.
    pub fn end_interval(&self) -> i32 {
        self.pins.last().map_or(0, |pin| pin.interval)
    }

    /// Evaluate the envelope at `time` parts after the note start.
    ///
    /// Returns `(interval, volume)` with volume on the 0..=3 pin scale,
    /// interpolated linearly between the bracketing pins.
    pub fn envelope_at(&self, time: f64) -> (f64, f64) {
        let Some(first) = self.pins.first() else {
            return (0.0, 0.0);
        };
        if time <= first.time as f64 {
            return (first.interval as f64, first.volume as f64);
        }
        for pair in self.pins.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if time <= b.time as f64 {
                let span = (b.time - a.time) as f64;
                let ratio = (time - a.time as f64) / span;
                let interval = a.interval as f64 + (b.interval - a.interval) as f64 * ratio;
                let volume = a.volume as f64 + (b.volume as f64 - a.volume as f64) * ratio;
                return (interval, volume);
            }
        }
        let last = self.pins[self.pins.len() - 1];
        (last.interval as f64, last.volume as f64)
    }

    /// Drop interior pins identical to both neighbours.
    pub fn coalesce_pins(&mut self) {
        let mut i = 1;
        while i + 1 < self.pins.len() {
            let (prev, cur, next) = (self.pins[i - 1], self.pins[i], self.pins[i + 1]);
            if prev.interval == cur.interval
                && cur.interval == next.interval
                && prev.volume == cur.volume
                && cur.volume == next.volume
            {
                self.pins.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Restore the note invariants after arbitrary edits.
    ///
    /// Pins are sorted with duplicate times removed, the first pin sits at
    /// time 0 with interval 0 (shifting the pitches to compensate), at least
    /// two pins exist, `end` follows the last pin, pitches are unique and at
    /// most [`MAX_CHORD_SIZE`], and colinear pins are coalesced.
    pub fn normalize(&mut self) {
        if self.pins.is_empty() {
            self.pins.push(make_note_pin(0, 0, NOTE_VOLUME_MAX));
        }
        self.pins.sort_by_key(|pin| pin.time);
        self.pins.dedup_by_key(|pin| pin.time);
        for pin in &mut self.pins {
            pin.volume = pin.volume.min(NOTE_VOLUME_MAX);
        }

        let first = self.pins[0];
        if first.time != 0 || first.interval != 0 {
            self.start += first.time;
            for pin in &mut self.pins {
                pin.time -= first.time;
                pin.interval -= first.interval;
            }
            for pitch in &mut self.pitches {
                *pitch += first.interval;
            }
        }
        if self.pins.len() < 2 {
            let only = self.pins[0];
            self.pins.push(make_note_pin(only.interval, 1, only.volume));
        }

        let mut seen = Vec::with_capacity(MAX_CHORD_SIZE);
        self.pitches.retain(|p| {
            if seen.contains(p) {
                false
            } else {
                seen.push(*p);
                true
            }
        });
        self.pitches.truncate(MAX_CHORD_SIZE);

        self.end = self.start + self.pins[self.pins.len() - 1].time;
        self.coalesce_pins();
    }

    /// Shorten the note so it ends by `end` (absolute part); the final pin is
    /// interpolated at the cut. Returns false when nothing is left.
    pub fn trim_end(&mut self, end: u32) -> bool {
        if end <= self.start {
            return false;
        }
        if end >= self.end {
            return true;
        }
        let cut = end - self.start;
        let (interval, volume) = self.envelope_at(cut as f64);
        self.pins.retain(|pin| pin.time < cut);
        self.pins
            .push(make_note_pin(interval.round() as i32, cut, volume.round() as u32));
        self.end = end;
        self.coalesce_pins();
        true
    }

    /// Rescale all times from `old` parts per beat to `new`. Returns false
    /// when the note collapses to nothing.
    pub fn rescale(&mut self, old: u32, new: u32) -> bool {
        let scale = |t: u32| ((t as u64 * new as u64 + old as u64 / 2) / old as u64) as u32;
        let start = scale(self.start);
        let end = scale(self.end);
        if end <= start {
            return false;
        }
        let length = end - start;
        for pin in &mut self.pins {
            pin.time = scale(pin.time).min(length);
        }
        self.start = start;
        self.pins.dedup_by_key(|pin| pin.time);
        if let Some(last) = self.pins.last_mut() {
            last.time = length;
        }
        self.normalize();
        true
    }
}

/// One bar's worth of notes for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pattern {
    /// Time-ordered, non-overlapping notes.
    pub notes: Vec<Note>,
    /// Which of the channel's instruments plays this pattern.
    pub instrument: usize,
}

impl Pattern {
    pub fn new() -> Self {
        Pattern::default()
    }

    /// The note sounding at `part` (fractional parts since the bar start).
    pub fn note_at(&self, part: f64) -> Option<(usize, &Note)> {
        self.notes
            .iter()
            .enumerate()
            .find(|(_, note)| note.start as f64 <= part && part < note.end as f64)
    }

    /// Sort, clip to `bar_length`, and drop overlapping notes.
    pub fn normalize(&mut self, bar_length: u32) {
        for note in &mut self.notes {
            note.normalize();
        }
        self.notes.sort_by_key(|note| note.start);
        let mut cursor = 0;
        self.notes.retain_mut(|note| {
            if note.start < cursor || !note.trim_end(bar_length) || note.pitches.is_empty() {
                return false;
            }
            cursor = note.end;
            true
        });
    }
}
