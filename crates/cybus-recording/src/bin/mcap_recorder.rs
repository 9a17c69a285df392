// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! mcap-recorder - record, replay, and convert bus logs.
//!
//! Usage:
//!   mcap-recorder record -o capture -c /imu /gps -i 60
//!   mcap-recorder play capture_0.mcap -r 2.0 -s 5.0
//!   mcap-recorder convert --input drive.record --output drive.mcap

use clap::{Parser, Subcommand};
use cybus::Bus;
use cybus_recording::{
    mcap_to_record, record_to_mcap, KeyboardListener, Player, PlayerConfig, Recorder,
    RecorderConfig,
};
use cybus_schema::SchemaRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mcap-recorder")]
#[command(about = "Record, replay, and convert bus logs")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record bus topics to MCAP
    Record {
        /// Output file stem (default: timestamp-based)
        #[arg(short, long, default_value = "")]
        output: String,

        /// Only record the given topics (space-separated, repeatable)
        #[arg(short = 'c', long = "white-channel", num_args = 1..)]
        white_channels: Vec<String>,

        /// Never record the given topics (space-separated, repeatable)
        #[arg(short = 'k', long = "black-channel", num_args = 1..)]
        black_channels: Vec<String>,

        /// Rotate segments every N seconds (0 = single file)
        #[arg(short = 'i', long = "segment-interval", default_value = "0")]
        segment_interval: u64,

        /// Topic discovery interval in milliseconds
        #[arg(long = "discovery-interval", default_value = "2000")]
        discovery_interval: u64,
    },

    /// Replay MCAP files onto the bus
    Play {
        /// Input files, played in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Loop the full sequence
        #[arg(short = 'l', long = "loop")]
        loop_playback: bool,

        /// Speed multiplier (0 = step-only)
        #[arg(short = 'r', long = "rate", default_value = "1.0")]
        rate: f64,

        /// Skip the first N seconds
        #[arg(short = 's', long = "start", default_value = "0.0")]
        start: f64,

        /// Only play the given topics (space-separated, repeatable)
        #[arg(short = 'c', long = "white-channel", num_args = 1..)]
        white_channels: Vec<String>,

        /// Never play the given topics (space-separated, repeatable)
        #[arg(short = 'k', long = "black-channel", num_args = 1..)]
        black_channels: Vec<String>,
    },

    /// Convert between .record and .mcap
    Convert {
        /// Input file (.record or .mcap)
        #[arg(long)]
        input: PathBuf,

        /// Output file (.mcap or .record)
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = cli.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .init();

    match cli.command {
        Command::Record {
            output,
            white_channels,
            black_channels,
            segment_interval,
            discovery_interval,
        } => run_record(
            output,
            white_channels,
            black_channels,
            segment_interval,
            discovery_interval,
        ),
        Command::Play {
            files,
            loop_playback,
            rate,
            start,
            white_channels,
            black_channels,
        } => run_play(
            files,
            loop_playback,
            rate,
            start,
            white_channels,
            black_channels,
        ),
        Command::Convert { input, output } => run_convert(input, output),
    }
}

fn run_record(
    output: String,
    white_channels: Vec<String>,
    black_channels: Vec<String>,
    segment_interval: u64,
    discovery_interval: u64,
) -> anyhow::Result<()> {
    let bus = Bus::builder("mcap_recorder").build();
    let registry = Arc::new(SchemaRegistry::new());

    let config = RecorderConfig::new()
        .output_stem(output)
        .allow(white_channels)
        .deny(black_channels)
        .segment_interval(Duration::from_secs(segment_interval))
        .discovery_interval(Duration::from_millis(discovery_interval));

    let mut recorder = Recorder::new(bus, registry, config);
    recorder.start()?;

    let stop = recorder.stop_handle();
    ctrlc::set_handler(move || stop.stop())?;

    info!("recording started, press Ctrl+C to stop");

    let mut last_report = Instant::now();
    while recorder.is_running() {
        std::thread::sleep(Duration::from_millis(50));
        if last_report.elapsed() >= Duration::from_secs(10) {
            let stats = recorder.stats();
            if stats.message_count > 0 {
                info!(
                    "{} topics, {} messages ({:.1} MB)",
                    stats.topic_count,
                    stats.message_count,
                    stats.byte_count as f64 / 1_048_576.0
                );
            }
            last_report = Instant::now();
        }
    }

    let stats = recorder.stop()?;
    info!("messages: {}", stats.message_count);
    info!("bytes:    {}", stats.byte_count);
    info!("topics:   {}", stats.topic_count);
    for (topic, dropped) in &stats.dropped {
        tracing::warn!("dropped {} messages on {}", dropped, topic);
    }

    Ok(())
}

fn run_play(
    files: Vec<PathBuf>,
    loop_playback: bool,
    rate: f64,
    start: f64,
    white_channels: Vec<String>,
    black_channels: Vec<String>,
) -> anyhow::Result<()> {
    if rate < 0.0 {
        anyhow::bail!("rate must be >= 0 (0 = step-only)");
    }
    if start < 0.0 {
        anyhow::bail!("start offset must be >= 0");
    }

    let bus = Bus::builder("mcap_player").build();
    let registry = Arc::new(SchemaRegistry::new());

    let config = PlayerConfig::new(files)
        .speed(rate)
        .loop_playback(loop_playback)
        .start_offset(Duration::from_secs_f64(start))
        .allow(white_channels)
        .deny(black_channels);

    let mut player = Player::new(bus, registry, config);
    let controls = player.controls();

    let signal_controls = Arc::clone(&controls);
    ctrlc::set_handler(move || signal_controls.stop())?;

    let keyboard = KeyboardListener::spawn(Arc::clone(&controls));

    let result = player.play();

    // Stops the keyboard thread on natural completion too, restoring the
    // terminal before we report.
    controls.stop();
    keyboard.join();

    let stats = result?;
    info!("messages played:  {}", stats.messages_played);
    info!("messages skipped: {}", stats.messages_skipped);
    if stats.codec_mismatches > 0 {
        tracing::warn!(
            "skipped {} channels with unsupported encodings",
            stats.codec_mismatches
        );
    }
    if stats.loops_completed > 0 {
        info!("loops completed:  {}", stats.loops_completed);
    }

    Ok(())
}

fn run_convert(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let extension = |p: &PathBuf| {
        p.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string()
    };

    let stats = match (extension(&input).as_str(), extension(&output).as_str()) {
        ("record", "mcap") => record_to_mcap(&input, &output)?,
        ("mcap", "record") => mcap_to_record(&input, &output)?,
        (from, to) => anyhow::bail!(
            "cannot infer conversion direction from .{from} -> .{to} \
             (supported: .record -> .mcap, .mcap -> .record)"
        ),
    };

    info!("converted {} messages", stats.message_count);
    if stats.codec_mismatches > 0 {
        tracing::warn!(
            "skipped {} channels with unsupported encodings",
            stats.codec_mismatches
        );
    }
    Ok(())
}
