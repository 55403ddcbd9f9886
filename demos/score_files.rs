//! Example: Score a recorded performance against a reference vocal file
//!
//! ```text
//! cargo run --example score_files -- <reference> <performance> [--song-id ID] [--config FILE] [--cache-dir DIR]
//! ```
//!
//! Decodes both files with symphonia, scores them and prints the breakdown
//! as JSON. Set `RUST_LOG=debug` to follow the pipeline.

use karaoke_scorer::{AudioSignal, JsonFileStore, ReferenceCache, ScoringConfig, ScoringEngine};
use std::env;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

/// Decode any supported container into a mono signal
fn decode_audio_file(path: &str) -> Result<AudioSignal, Box<dyn std::error::Error>> {
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or("No supported audio tracks found")?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or("Unknown sample rate")?;
    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut channels = 1;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(Box::new(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = spec.channels.count();
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buffer.samples());
            }
            // Corrupted packets are skipped
            Err(SymphoniaError::DecodeError(e)) => log::warn!("Skipping packet: {}", e),
            Err(e) => return Err(Box::new(e)),
        }
    }

    Ok(AudioSignal::from_interleaved(&interleaved, channels, sample_rate)?)
}

fn usage() -> ! {
    eprintln!(
        "Usage: score_files <reference> <performance> [--song-id ID] [--config FILE] [--cache-dir DIR]"
    );
    std::process::exit(2);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut positional = Vec::new();
    let mut song_id = None;
    let mut config_path = None;
    let mut cache_dir = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--song-id" => song_id = Some(args.next().unwrap_or_else(|| usage())),
            "--config" => config_path = Some(args.next().unwrap_or_else(|| usage())),
            "--cache-dir" => cache_dir = Some(args.next().unwrap_or_else(|| usage())),
            "-h" | "--help" => usage(),
            _ => positional.push(arg),
        }
    }
    if positional.len() != 2 {
        usage();
    }
    let (reference_path, performance_path) = (&positional[0], &positional[1]);

    let config = match config_path {
        Some(path) => ScoringConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => ScoringConfig::default(),
    };

    let mut cache = ReferenceCache::from_config(&config);
    if let Some(dir) = cache_dir {
        cache = cache.with_store(JsonFileStore::new(dir)?);
    }
    let engine = ScoringEngine::with_cache(config, Arc::new(cache))?;

    // Song id defaults to the reference file stem
    let song_id = song_id.unwrap_or_else(|| {
        Path::new(reference_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("song")
            .to_string()
    });

    let reference = decode_audio_file(reference_path)?;
    let performance = decode_audio_file(performance_path)?;
    log::info!(
        "Reference {:.1}s, performance {:.1}s",
        reference.duration_sec(),
        performance.duration_sec()
    );

    let breakdown = engine.score(&song_id, &reference, &performance)?;
    println!("{}", serde_json::to_string_pretty(&breakdown)?);

    Ok(())
}
