//! A channel: octave offset, instrument slots, patterns, and the bar sequence.
//!
//! The vectors are only resized through [`crate::song::Song`]'s setters so
//! their lengths always match the song-level counts.

use super::instrument::Instrument;
use super::pattern::Pattern;
use crate::config::OCTAVE_MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub octave: u32,
    pub(crate) instruments: Vec<Instrument>,
    pub(crate) patterns: Vec<Pattern>,
    /// Pattern number per bar; 0 is the empty pattern, `n` is `patterns[n - 1]`.
    pub(crate) bars: Vec<usize>,
}

impl Channel {
    pub(crate) fn new(
        is_drum: bool,
        octave: u32,
        instruments: usize,
        patterns: usize,
        bars: usize,
    ) -> Self {
        Channel {
            octave: octave.min(OCTAVE_MAX),
            instruments: vec![Instrument::new(is_drum); instruments],
            patterns: vec![Pattern::new(); patterns],
            bars: vec![0; bars],
        }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn instrument_mut(&mut self, index: usize) -> Option<&mut Instrument> {
        self.instruments.get_mut(index)
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn pattern_mut(&mut self, index: usize) -> Option<&mut Pattern> {
        self.patterns.get_mut(index)
    }

    pub fn bars(&self) -> &[usize] {
        &self.bars
    }

    /// Assign a pattern number to a bar; out-of-range numbers clear the bar.
    pub fn set_bar(&mut self, bar: usize, pattern: usize) {
        let pattern = if pattern > self.patterns.len() { 0 } else { pattern };
        if let Some(slot) = self.bars.get_mut(bar) {
            *slot = pattern;
        }
    }

    /// The pattern playing in `bar`, if any.
    pub fn pattern_at(&self, bar: usize) -> Option<&Pattern> {
        match self.bars.get(bar).copied() {
            Some(0) | None => None,
            Some(n) => self.patterns.get(n - 1),
        }
    }

    pub(crate) fn resize_instruments(&mut self, count: usize, is_drum: bool) {
        self.instruments.resize(count, Instrument::new(is_drum));
        for pattern in &mut self.patterns {
            if pattern.instrument >= count {
                pattern.instrument = 0;
            }
        }
    }

    pub(crate) fn resize_patterns(&mut self, count: usize) {
        self.patterns.resize(count, Pattern::new());
        for bar in &mut self.bars {
            if *bar > count {
                *bar = 0;
            }
        }
    }

    pub(crate) fn resize_bars(&mut self, count: usize) {
        self.bars.resize(count, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::pattern::Note;

    #[test]
    fn shrinking_patterns_clears_dangling_bars() {
        let mut channel = Channel::new(false, 3, 1, 4, 4);
        channel.set_bar(0, 4);
        channel.set_bar(1, 2);
        channel.resize_patterns(2);
        assert_eq!(channel.bars(), &[0, 2, 0, 0]);
    }

    #[test]
    fn set_bar_rejects_unknown_patterns() {
        let mut channel = Channel::new(false, 3, 1, 2, 2);
        channel.set_bar(0, 3);
        channel.set_bar(9, 1);
        assert_eq!(channel.bars(), &[0, 0]);
    }

    #[test]
    fn pattern_lookup_is_one_based() {
        let mut channel = Channel::new(false, 3, 1, 2, 2);
        channel.pattern_mut(1).unwrap().notes.push(Note::new(24, 0, 4, 3));
        channel.set_bar(1, 2);
        assert!(channel.pattern_at(0).is_none());
        assert_eq!(channel.pattern_at(1).unwrap().notes.len(), 1);
    }

    #[test]
    fn shrinking_instruments_resets_pattern_slots() {
        let mut channel = Channel::new(false, 3, 3, 1, 1);
        channel.pattern_mut(0).unwrap().instrument = 2;
        channel.resize_instruments(2, false);
        assert_eq!(channel.patterns()[0].instrument, 0);
        assert_eq!(channel.instruments().len(), 2);
    }
}
