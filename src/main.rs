mod audio;
mod estimator;
mod ui;
mod wav;

use crate::audio::StereoCapture;
use crate::estimator::{Effect, Estimator, Mode, SnapshotCell, transition_effects};
use crate::ui::{METER_WIDTH, OutputFormat, StatusEvent, meter_line};
use crate::wav::read_wav_channels;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "earshot")]
#[command(about = "Stereo sound direction and loudness meter for the terminal")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen on a stereo input device and show direction and loudness live
    Locate {
        /// Input device name (default input device if omitted)
        #[arg(long)]
        device: Option<String>,

        /// Calibrate channel gain for this many seconds before locating
        #[arg(long, default_value = "0")]
        calibrate_secs: u64,

        /// Display update interval in milliseconds
        #[arg(long, default_value = "100")]
        interval_ms: u64,

        /// Requested capture block size in frames
        #[arg(long, default_value = "4096")]
        buffer_frames: u32,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run the estimation pipeline over a stereo WAV file
    Analyze {
        /// Stereo WAV file to analyze
        file: PathBuf,

        /// WAV of a balanced reference signal, used to calibrate first
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Frames per processing chunk
        #[arg(long, default_value = "4096")]
        chunk_frames: usize,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List available audio input devices
    Devices,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Locate {
            device,
            calibrate_secs,
            interval_ms,
            buffer_frames,
            format,
        } => run_locate(device, calibrate_secs, interval_ms, buffer_frames, format).await,
        Commands::Analyze {
            file,
            calibration,
            chunk_frames,
            format,
        } => run_analyze(file, calibration, chunk_frames, format),
        Commands::Devices => run_devices(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Driver half of the mode state machine
///
/// Publishes the new mode through the watch channel (the capture callback
/// picks it up within a buffer) and applies the capture effects to the
/// stream. The stream is built lazily on the first `StartCapture`, which
/// moves the estimator into the audio callback.
#[allow(clippy::too_many_arguments)]
fn switch_mode(
    capture: &StereoCapture,
    estimator: &mut Option<Estimator>,
    stream: &mut Option<cpal::Stream>,
    mode_tx: &watch::Sender<Mode>,
    mode_rx: &watch::Receiver<Mode>,
    cell: &Arc<SnapshotCell>,
    current: &mut Mode,
    new_mode: Mode,
) -> Result<()> {
    use cpal::traits::StreamTrait;

    let effects = transition_effects(*current, new_mode);
    mode_tx.send(new_mode).ok();
    *current = new_mode;

    for effect in effects {
        match effect {
            Effect::StartCapture => {
                if stream.is_none() {
                    let est = estimator
                        .take()
                        .context("capture was already started once")?;
                    *stream = Some(capture.start(est, mode_rx.clone(), Arc::clone(cell))?);
                }
                if let Some(s) = stream {
                    s.play().context("starting capture stream")?;
                }
            }
            Effect::StopCapture => {
                if let Some(s) = stream {
                    s.pause().context("pausing capture stream")?;
                }
            }
            // Applied inside the estimator when it sees the mode change
            Effect::ResetCalibration => {}
        }
    }

    Ok(())
}

async fn run_locate(
    device: Option<String>,
    calibrate_secs: u64,
    interval_ms: u64,
    buffer_frames: u32,
    format: OutputFormat,
) -> Result<()> {
    let capture = StereoCapture::new(device.as_deref(), buffer_frames.max(64))?;
    eprintln!(
        "Input device: {} ({} Hz, {} channel(s))",
        capture.device_name(),
        capture.sample_rate(),
        capture.channels()
    );
    if capture.channels() < 2 {
        eprintln!("Warning: mono input, balance will stay centered");
    }

    let cell = Arc::new(SnapshotCell::default());
    let (mode_tx, mode_rx) = watch::channel(Mode::Description);
    let mut estimator = Some(Estimator::new());
    let mut stream: Option<cpal::Stream> = None;
    let mut mode = Mode::Description;

    let first = if calibrate_secs > 0 {
        eprintln!("Calibrating for {calibrate_secs}s, keep the sound source centered...");
        Mode::Calibrating
    } else {
        Mode::Locating
    };
    switch_mode(
        &capture,
        &mut estimator,
        &mut stream,
        &mode_tx,
        &mode_rx,
        &cell,
        &mut mode,
        first,
    )?;

    let mut calibrate_until = (calibrate_secs > 0)
        .then(|| tokio::time::Instant::now() + Duration::from_secs(calibrate_secs));
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(10)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if let Some(deadline) = calibrate_until
                    && tokio::time::Instant::now() >= deadline
                {
                    calibrate_until = None;
                    switch_mode(
                        &capture,
                        &mut estimator,
                        &mut stream,
                        &mode_tx,
                        &mode_rx,
                        &cell,
                        &mut mode,
                        Mode::Locating,
                    )?;
                    eprintln!("\nCalibration done, locating");
                }

                let snapshot = cell.load();
                match format {
                    OutputFormat::Text => {
                        ui::draw_meter(&meter_line(&snapshot, mode, METER_WIDTH));
                    }
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string(&StatusEvent::new(mode, snapshot))?);
                    }
                }
            }
        }
    }

    switch_mode(
        &capture,
        &mut estimator,
        &mut stream,
        &mode_tx,
        &mode_rx,
        &cell,
        &mut mode,
        Mode::Description,
    )?;

    let snapshot = cell.load();
    if matches!(format, OutputFormat::Text) {
        eprintln!();
    }
    eprintln!(
        "Stopped. Last estimate: total {:.3}, balance {:.3}",
        snapshot.total, snapshot.balance
    );
    Ok(())
}

fn run_analyze(
    file: PathBuf,
    calibration: Option<PathBuf>,
    chunk_frames: usize,
    format: OutputFormat,
) -> Result<()> {
    let chunk_frames = chunk_frames.max(1);
    let mut estimator = Estimator::new();

    if let Some(cal_path) = calibration {
        let cal = read_wav_channels(&cal_path)
            .with_context(|| format!("reading calibration file {}", cal_path.display()))?;
        estimator.set_mode(Mode::Calibrating);
        for chunk in cal.chunks(chunk_frames) {
            estimator.process_buffer(&chunk, Mode::Calibrating);
        }
        let (cal_left, cal_right) = estimator.calibration_totals();
        eprintln!(
            "Calibrated from {} ({} frames): left {:.3}, right {:.3}",
            cal_path.display(),
            cal.frames(),
            cal_left,
            cal_right
        );
    }

    let channels =
        read_wav_channels(&file).with_context(|| format!("reading {}", file.display()))?;
    estimator.set_mode(Mode::Locating);
    for chunk in channels.chunks(chunk_frames) {
        estimator.process_buffer(&chunk, Mode::Locating);
    }

    let snapshot = estimator.snapshot();
    match format {
        OutputFormat::Text => {
            println!("{}", meter_line(&snapshot, Mode::Locating, METER_WIDTH));
            println!(
                "{} frames at {} Hz, total {:.4}, balance {:.4}",
                channels.frames(),
                channels.sample_rate(),
                snapshot.total,
                snapshot.balance
            );
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&StatusEvent::new(Mode::Locating, snapshot))?
            );
        }
    }
    Ok(())
}

fn run_devices() -> Result<()> {
    let devices = audio::list_devices()?;

    println!("Available Audio Devices:");
    println!(
        "{:<30} {:<10} {:<8} Sample Rates",
        "Name", "Default", "Stereo"
    );
    println!("{}", "-".repeat(72));

    for device in devices {
        let default_str = if device.is_default { "YES" } else { "NO" };
        let stereo_str = if device.max_channels >= 2 { "YES" } else { "NO" };
        let sample_rates = device
            .supported_sample_rates
            .iter()
            .take(3)
            .map(|sr| sr.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        println!(
            "{:<30} {:<10} {:<8} {}",
            &device.name[..device.name.len().min(30)],
            default_str,
            stereo_str,
            sample_rates
        );
    }

    Ok(())
}
