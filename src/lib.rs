pub mod bitstream;
pub mod codec;
pub mod config;
pub mod dsp;
pub mod error;
pub mod song;

use crate::dsp::SynthConfig;
use crate::song::Song;
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the chipbox-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: decode a song string into its JSON export.
#[wasm_bindgen]
pub fn song_to_json(song_string: &str) -> Result<JsValue, JsValue> {
    let song = Song::from_base64_string(song_string).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let json = song.to_json().map_err(|e| JsValue::from_str(&format!("{e}")))?;
    json.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: build a song string from a JSON export object.
#[wasm_bindgen]
pub fn json_to_song(json: JsValue) -> Result<String, JsValue> {
    let value: serde_json::Value =
        serde_wasm_bindgen::from_value(json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let song = Song::from_json(&value).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(song.to_base64_string())
}

/// WASM-exposed: render a song string to a WAV byte array.
#[wasm_bindgen]
pub fn render_song_wav(song_string: &str, sample_rate: u32, loops: u32) -> Result<Vec<u8>, JsValue> {
    let song = Song::from_base64_string(song_string).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let config = SynthConfig { host_sample_rate: sample_rate, ..SynthConfig::default() };
    Ok(dsp::renderer::render_wav(&song, config, loops))
}

/// WASM-exposed: render a song string to interleaved stereo f32 samples
/// for AudioWorklet playback.
#[wasm_bindgen]
pub fn render_song_samples(song_string: &str, sample_rate: u32, loops: u32) -> Result<Vec<f32>, JsValue> {
    let song = Song::from_base64_string(song_string).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let config = SynthConfig { host_sample_rate: sample_rate, ..SynthConfig::default() };
    let mut synth = dsp::Synth::new(config);
    Ok(synth.render_song(&song, loops))
}
