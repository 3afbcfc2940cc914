//! WAV renderer: renders a song to a WAV byte buffer.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::info;

use super::engine::{Synth, SynthConfig};
use crate::song::Song;

/// Render `song` to a 16-bit stereo WAV file, playing the loop region
/// `loops` times.
pub fn render_wav(song: &Song, config: SynthConfig, loops: u32) -> Vec<u8> {
    let mut synth = Synth::new(config);
    let samples = synth.render_song(song, loops);
    let sample_rate = synth.sample_rate() as u32;
    let pcm: Vec<i16> = samples.iter().map(|&s| to_pcm16(s)).collect();
    info!(
        "Rendered {:.2}s of audio at {sample_rate} Hz",
        pcm.len() as f64 / 2.0 / sample_rate as f64
    );
    encode_wav(&pcm, sample_rate, 2)
}

/// Scale a `[-1, 1]` sample to 16-bit PCM.
pub fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Wrap a WAV file in a `data:` URI for browser download links.
pub fn wav_data_uri(wav: &[u8]) -> String {
    format!("data:audio/wav;base64,{}", STANDARD.encode(wav))
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}
