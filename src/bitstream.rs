//! BitStream codec: variable-length bit packing over a 6-bit base64 alphabet.
//!
//! Every multi-bit field of the song string is written most-significant bit
//! first. Integers whose magnitude is usually small use the "long-tail" code:
//! a unary run of continuation flags that widens the field one bit at a time,
//! a terminating zero, then the remainder at the final width.

/// Symbol for each 6-bit value.
pub const INT_TO_BASE64: [u8; 64] =
    *b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-_";

/// Reverse lookup; characters outside the alphabet map to 0.
pub const BASE64_TO_INT: [u8; 128] = {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < 64 {
        table[INT_TO_BASE64[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Decode a single base64 character to its 6-bit value.
#[inline]
pub fn base64_to_int(ch: u8) -> u32 {
    BASE64_TO_INT.get(ch as usize).copied().unwrap_or(0) as u32
}

/// Encode the low 6 bits of `value` as a base64 character.
#[inline]
pub fn int_to_base64(value: u32) -> char {
    INT_TO_BASE64[(value & 0x3f) as usize] as char
}

/// Accumulates individual bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitWriter {
    bits: Vec<u8>,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter { bits: Vec::new() }
    }

    /// Append the `bits` low bits of `value`, most significant first.
    pub fn write(&mut self, bits: u32, value: u32) {
        for shift in (0..bits).rev() {
            self.bits.push(((value >> shift) & 1) as u8);
        }
    }

    /// Append `value` using the long-tail code.
    ///
    /// `value` must be `>= min_value`.
    pub fn write_long_tail(&mut self, min_value: u32, min_bits: u32, value: u32) {
        debug_assert!(value >= min_value, "long-tail value {value} below minimum {min_value}");
        // Wide enough that the widest tail (32 data bits) never overflows.
        let mut value = u64::from(value.saturating_sub(min_value));
        let mut num_bits = min_bits;
        while value >= (1u64 << num_bits) {
            self.bits.push(1);
            value -= 1u64 << num_bits;
            num_bits += 1;
        }
        self.bits.push(0);
        for shift in (0..num_bits).rev() {
            self.bits.push(((value >> shift) & 1) as u8);
        }
    }

    /// Pin count minus one (always at least 1 for valid notes).
    pub fn write_pin_count(&mut self, value: u32) {
        self.write_long_tail(1, 0, value);
    }

    /// Signed pitch step, never zero.
    pub fn write_pitch_interval(&mut self, value: i32) {
        if value < 0 {
            self.write(1, 1);
            self.write_long_tail(1, 3, value.unsigned_abs());
        } else {
            self.write(1, 0);
            self.write_long_tail(1, 3, value as u32);
        }
    }

    /// Duration in parts (rests and pin spacing).
    pub fn write_part_duration(&mut self, value: u32) {
        self.write_long_tail(1, 2, value);
    }

    /// Append every bit of `other`.
    pub fn concat(&mut self, other: &BitWriter) {
        self.bits.extend_from_slice(&other.bits);
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The raw bit sequence, one bit per byte.
    pub fn as_bits(&self) -> &[u8] {
        &self.bits
    }

    /// Number of base64 characters `encode_base64` will emit.
    pub fn length_base64(&self) -> usize {
        self.bits.len().div_ceil(6)
    }

    /// Append the bits to `out` six at a time, zero-padding the last symbol.
    pub fn encode_base64(&self, out: &mut String) {
        for chunk in self.bits.chunks(6) {
            let mut value = 0u32;
            for i in 0..6 {
                value = (value << 1) | chunk.get(i).copied().unwrap_or(0) as u32;
            }
            out.push(int_to_base64(value));
        }
    }
}

/// Reads bits out of a window of base64 characters.
#[derive(Debug, Clone)]
pub struct BitReader {
    bits: Vec<u8>,
    read_index: usize,
}

impl BitReader {
    /// Unpack `source[start..stop]`; the window is clipped to the source.
    pub fn new(source: &[u8], start: usize, stop: usize) -> Self {
        let stop = stop.min(source.len());
        let start = start.min(stop);
        let mut bits = Vec::with_capacity((stop - start) * 6);
        for &ch in &source[start..stop] {
            let value = base64_to_int(ch);
            for shift in (0..6).rev() {
                bits.push(((value >> shift) & 1) as u8);
            }
        }
        BitReader { bits, read_index: 0 }
    }

    /// Build a reader directly over a writer's bits (no base64 padding).
    pub fn from_writer(writer: &BitWriter) -> Self {
        BitReader {
            bits: writer.bits.clone(),
            read_index: 0,
        }
    }

    /// Next bit; past the end the stream reads as zeros.
    #[inline]
    fn next_bit(&mut self) -> u32 {
        let bit = self.bits.get(self.read_index).copied().unwrap_or(0);
        self.read_index += 1;
        bit as u32
    }

    pub fn read(&mut self, bits: u32) -> u32 {
        let mut result = 0;
        for _ in 0..bits {
            result = (result << 1) | self.next_bit();
        }
        result
    }

    pub fn read_long_tail(&mut self, min_value: u32, min_bits: u32) -> u32 {
        let mut result = min_value;
        let mut num_bits = min_bits;
        // A truncated stream reads zeros, so the unary run always terminates.
        while self.next_bit() == 1 {
            result = result.saturating_add(1 << num_bits.min(31));
            num_bits += 1;
        }
        while num_bits > 0 {
            num_bits -= 1;
            if self.next_bit() == 1 {
                result = result.saturating_add(1 << num_bits.min(31));
            }
        }
        result
    }

    pub fn read_pin_count(&mut self) -> u32 {
        self.read_long_tail(1, 0)
    }

    pub fn read_pitch_interval(&mut self) -> i32 {
        if self.read(1) == 1 {
            -(self.read_long_tail(1, 3) as i32)
        } else {
            self.read_long_tail(1, 3) as i32
        }
    }

    pub fn read_part_duration(&mut self) -> u32 {
        self.read_long_tail(1, 2)
    }

    /// Bits consumed so far (may exceed the available bits).
    pub fn position(&self) -> usize {
        self.read_index
    }

    pub fn remaining(&self) -> usize {
        self.bits.len().saturating_sub(self.read_index)
    }
}

/// Minimum bit width able to represent `count` distinct values (0 for 0 or 1).
pub fn bits_for(count: usize) -> u32 {
    let mut bits = 0;
    while (1usize << bits) < count {
        bits += 1;
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_round_trips() {
        for v in 0..64 {
            let ch = int_to_base64(v);
            assert_eq!(base64_to_int(ch as u8), v, "symbol {ch} should decode to {v}");
        }
        assert_eq!(int_to_base64(23), 'n');
        assert_eq!(base64_to_int(b'*'), 0);
    }

    #[test]
    fn write_is_msb_first() {
        let mut w = BitWriter::new();
        w.write(4, 0b1010);
        assert_eq!(w.as_bits(), &[1, 0, 1, 0]);
    }

    #[test]
    fn long_tail_small_values_are_short() {
        let mut w = BitWriter::new();
        w.write_long_tail(1, 2, 1);
        // terminator + two zero bits
        assert_eq!(w.as_bits(), &[0, 0, 0]);

        let mut w = BitWriter::new();
        w.write_long_tail(1, 2, 5);
        // 5 - 1 = 4 needs a continuation: 1, 0, then 4 - 4 = 0 in 3 bits
        assert_eq!(w.as_bits(), &[1, 0, 0, 0, 0]);
    }

    #[test]
    fn long_tail_values_read_back() {
        let cases = [(0, 0, 0), (0, 0, 9), (1, 0, 1), (1, 2, 3), (1, 2, 100), (1, 3, 4000), (5, 1, 5), (2, 4, 70000)];
        let mut w = BitWriter::new();
        for &(min_value, min_bits, value) in &cases {
            w.write_long_tail(min_value, min_bits, value);
        }
        let mut r = BitReader::from_writer(&w);
        for &(min_value, min_bits, value) in &cases {
            assert_eq!(
                r.read_long_tail(min_value, min_bits),
                value,
                "long tail ({min_value}, {min_bits}) lost {value}"
            );
        }
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn long_tail_handles_full_u32_range() {
        let cases = [(0, 0, u32::MAX), (1, 3, u32::MAX), (1, 2, u32::MAX - 5), (0, 0, 1 << 31)];
        let mut w = BitWriter::new();
        for &(min_value, min_bits, value) in &cases {
            w.write_long_tail(min_value, min_bits, value);
        }
        let mut r = BitReader::from_writer(&w);
        for &(min_value, min_bits, value) in &cases {
            assert_eq!(r.read_long_tail(min_value, min_bits), value);
        }
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn pitch_intervals_keep_sign() {
        let mut w = BitWriter::new();
        for v in [-13, -1, 1, 7, 30] {
            w.write_pitch_interval(v);
        }
        let mut r = BitReader::from_writer(&w);
        for v in [-13, -1, 1, 7, 30] {
            assert_eq!(r.read_pitch_interval(), v);
        }
    }

    #[test]
    fn base64_survives_padding() {
        let mut w = BitWriter::new();
        w.write(3, 0b101);
        w.write_part_duration(12);
        w.write(7, 99);
        let mut encoded = String::new();
        w.encode_base64(&mut encoded);
        assert_eq!(encoded.len(), w.length_base64());

        let mut r = BitReader::new(encoded.as_bytes(), 0, encoded.len());
        assert_eq!(r.read(3), 0b101);
        assert_eq!(r.read_part_duration(), 12);
        assert_eq!(r.read(7), 99);
    }

    #[test]
    fn reading_past_end_yields_zeros() {
        let mut r = BitReader::new(b"_", 0, 1);
        assert_eq!(r.read(6), 63);
        assert_eq!(r.read(4), 0);
        assert_eq!(r.read_long_tail(1, 2), 1);
    }

    #[test]
    fn bits_for_counts() {
        assert_eq!(bits_for(0), 0);
        assert_eq!(bits_for(1), 0);
        assert_eq!(bits_for(2), 1);
        assert_eq!(bits_for(9), 4);
        assert_eq!(bits_for(16), 4);
        assert_eq!(bits_for(17), 5);
    }
}
