//! Offline renderer: a song string or JSON export in, a WAV file out.
//!
//! ```text
//! chipbox-render "$SONG" -o song.wav --loops 2
//! chipbox-render @song.txt --json -o song.json
//! RUST_LOG=debug chipbox-render @song.json -o song.wav
//! ```

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use chipbox_core::dsp::SynthConfig;
use chipbox_core::dsp::renderer::render_wav;
use chipbox_core::error::ChipboxError;
use chipbox_core::song::Song;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "chipbox-render")]
#[command(about = "Render a ChipBox song to a WAV file", long_about = None)]
struct Args {
    /// Song string, or @PATH to read a song string or JSON export from a file
    #[arg(value_name = "SONG")]
    song: String,

    /// Output file
    #[arg(short, long, value_name = "FILE", default_value = "song.wav")]
    output: PathBuf,

    /// Passes through the loop region
    #[arg(long, value_name = "N", default_value_t = 1)]
    loops: u32,

    /// Write the song as JSON instead of rendering audio
    #[arg(long)]
    json: bool,

    /// Output rate for songs that defer to the host
    #[arg(long, value_name = "HZ", default_value_t = 44100)]
    sample_rate: u32,

    /// Bypass the reverb
    #[arg(long)]
    no_reverb: bool,

    /// Bypass the limiter (output is still clamped)
    #[arg(long)]
    no_limiter: bool,
}

fn load_song(source: &str) -> Result<Song, ChipboxError> {
    let text = match source.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)?,
        None => source.to_string(),
    };
    let text = text.trim();
    if text.starts_with('{') {
        Ok(Song::from_json_str(text)?)
    } else {
        Ok(Song::from_base64_string(text)?)
    }
}

fn run(args: &Args) -> Result<(), ChipboxError> {
    let song = load_song(&args.song)?;
    info!(
        "Loaded song: {} channels, {} bars at {} BPM",
        song.channel_count(),
        song.bar_count(),
        song.beats_per_minute()
    );

    if args.json {
        fs::write(&args.output, song.to_json_string()?)?;
    } else {
        let config = SynthConfig {
            host_sample_rate: args.sample_rate,
            loop_enabled: true,
            reverb_enabled: !args.no_reverb,
            limiter_enabled: !args.no_limiter,
        };
        fs::write(&args.output, render_wav(&song, config, args.loops))?;
    }
    info!("Wrote {}", args.output.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
