use anyhow::{Context, Result, bail};
use dwell_vision::core_modules::utils::{load, save};
use dwell_vision::{HuePalette, MonitorConfig, Observation, OccupancyMonitor};
use image::{Rgb, RgbImage};
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// One line of the observation log.
#[derive(Debug, Deserialize)]
struct LoggedTick {
    timestamp: f64,
    #[serde(default)]
    observations: Vec<Observation>,
}

struct Args {
    log_path: PathBuf,
    output_dir: PathBuf,
    background: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let mut positional = Vec::new();
    let mut background = None;
    let mut config = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--background" => background = Some(PathBuf::from(args.next()?)),
            "--config" => config = Some(PathBuf::from(args.next()?)),
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    if positional.len() != 2 {
        return None;
    }
    let output_dir = positional.pop()?;
    let log_path = positional.pop()?;
    Some(Args {
        log_path,
        output_dir,
        background,
        config,
    })
}

fn load_config(path: Option<&Path>) -> Result<MonitorConfig> {
    match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing config {}", path.display()))
        }
        None => Ok(MonitorConfig::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dwell_vision=info,visual_tester=info")),
        )
        .init();

    // --- 1. Argument Parsing & Setup ---
    let Some(args) = parse_args() else {
        println!(
            "Usage: visual_tester <observations.jsonl> <output_dir> [--background <image>] [--config <config.json>]"
        );
        return Ok(());
    };

    let mut config = load_config(args.config.as_deref())?;

    // --- 2. Background Frame ---
    // A background image fixes the frame size; otherwise draw on black.
    let background = match &args.background {
        Some(path) => {
            let image = load(path).with_context(|| format!("loading background {}", path.display()))?;
            config.frame_width = image.width();
            config.frame_height = image.height();
            image
        }
        None => RgbImage::from_pixel(config.frame_width, config.frame_height, Rgb([0, 0, 0])),
    };

    // --- 3. Monitor Initialization ---
    let mut monitor = OccupancyMonitor::new(config).context("invalid monitor configuration")?;

    // --- 4. Replay Loop ---
    let log = File::open(&args.log_path)
        .with_context(|| format!("opening observation log {}", args.log_path.display()))?;
    let mut last_timestamp = None;
    for (line_no, line) in BufReader::new(log).lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let tick: LoggedTick = match serde_json::from_str(&line) {
            Ok(tick) => tick,
            Err(err) => {
                warn!(line = line_no + 1, error = %err, "skipping malformed tick");
                continue;
            }
        };
        let report = monitor.update(&tick.observations, tick.timestamp);
        if !report.is_clean() {
            info!(line = line_no + 1, issues = report.issues.len(), "tick applied with issues");
        }
        last_timestamp = Some(tick.timestamp);
    }

    let Some(end) = last_timestamp else {
        bail!("observation log {} contained no ticks", args.log_path.display());
    };

    // --- 5. Visualization ---
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let palette = HuePalette::default();
    let size = background.dimensions();

    let heatmap = monitor.heatmap_render(&background, size);
    let trails = monitor.trail_render(&background, &palette);
    let mut times = background.clone();
    monitor.draw_time(&mut times, 0.5, 1, &palette);

    for (name, frame) in [("heatmap.png", &heatmap), ("trails.png", &trails), ("times.png", &times)] {
        let path = args.output_dir.join(name);
        save(&path, frame).with_context(|| format!("writing {}", path.display()))?;
    }

    // --- 6. Dashboard Export ---
    let snapshot = monitor.dashboard(end);
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    info!(ticks = monitor.tick_count(), output = %args.output_dir.display(), "replay complete");
    Ok(())
}
