//! Delay line diagnostics
//!
//! Feeds a synthetic RGBA frame sequence through a [`DelayLine`] configured
//! from YAML and prints memory usage plus a few retrievals.
//!
//! ## Usage
//!
//! ```text
//! delay-stats [CONFIG] [--frames N] [--raw] [--glitch AMOUNT] [--write-default]
//! ```
//!
//! - `CONFIG`: YAML config path (default: the user config directory)
//! - `--frames N`: number of frames to record (default: twice the history size)
//! - `--raw`: store frames uncompressed regardless of the config
//! - `--glitch AMOUNT`: glitchiness for the retrievals (0.0 - 1.0)
//! - `--write-default`: write a default config to CONFIG and exit

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};

use frame_delay::config::{default_config_path, load_config, save_config};
use frame_delay::{DelayLine, DelayLineConfig, ImageBuffer, MemoryUsage, Plane, PlanarImage};

const WIDTH: usize = 320;
const HEIGHT: usize = 180;
const FRAME_INTERVAL: f64 = 1.0 / 30.0;

struct Options {
    config_path: PathBuf,
    frames: Option<usize>,
    raw: bool,
    glitch: Option<f32>,
    write_default: bool,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        config_path: default_config_path(),
        frames: None,
        raw: false,
        glitch: None,
        write_default: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                let value = args.next().context("--frames needs a value")?;
                options.frames = Some(value.parse().with_context(|| format!("Invalid frame count: {}", value))?);
            }
            "--glitch" => {
                let value = args.next().context("--glitch needs a value")?;
                options.glitch = Some(value.parse().with_context(|| format!("Invalid glitchiness: {}", value))?);
            }
            "--raw" => options.raw = true,
            "--write-default" => options.write_default = true,
            path => options.config_path = PathBuf::from(path),
        }
    }

    Ok(options)
}

/// Moving diagonal gradient, one plane per channel
fn synthetic_frame(index: usize, planes: &mut [Vec<u8>; 4]) {
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let i = y * WIDTH + x;
            planes[0][i] = (x + index * 4) as u8;
            planes[1][i] = (y + index * 2) as u8;
            planes[2][i] = ((x + y) / 2) as u8;
            planes[3][i] = 255;
        }
    }
}

fn print_usage(label: &str, usage: &MemoryUsage) {
    println!(
        "{:<12} items {:>4} | history {:>10} B | scratch {:>8} B | pending {:>8} B | total {:>10} B",
        label, usage.item_count, usage.history_bytes, usage.scratch_bytes, usage.pending_bytes, usage.total_bytes
    );
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let options = parse_args()?;

    if options.write_default {
        save_config(&DelayLineConfig::default(), &options.config_path)?;
        println!("Wrote default config to {}", options.config_path.display());
        return Ok(());
    }

    let config: DelayLineConfig = load_config(&options.config_path);
    let frames = options.frames.unwrap_or(config.max_history_size * 2);
    let use_compression = config.use_compression && !options.raw;

    log::info!(
        "delay-stats: {} frames of {}x{}, history {}, compression {}",
        frames,
        WIDTH,
        HEIGHT,
        config.max_history_size,
        if use_compression { "on" } else { "off" }
    );

    let mut line = DelayLine::new();
    line.init_with_config(&config).context("Failed to initialize delay line")?;

    let mut planes: [Vec<u8>; 4] = std::array::from_fn(|_| vec![0u8; WIDTH * HEIGHT]);
    let started = Instant::now();

    for index in 0..frames {
        synthetic_frame(index, &mut planes);
        let image = PlanarImage::rgba(
            [
                Plane::tight(&planes[0], WIDTH),
                Plane::tight(&planes[1], WIDTH),
                Plane::tight(&planes[2], WIDTH),
                Plane::tight(&planes[3], WIDTH),
            ],
            WIDTH,
            HEIGHT,
        )?;
        line.add(&image, config.jpeg_quality as i32, index as f64 * FRAME_INTERVAL, use_compression);
        line.poll();
    }
    line.tick();

    let elapsed = started.elapsed();
    println!(
        "Recorded {} frames in {:.1} ms ({:.2} ms/frame)",
        frames,
        elapsed.as_secs_f64() * 1000.0,
        elapsed.as_secs_f64() * 1000.0 / frames.max(1) as f64
    );
    print_usage("recorded", &line.memory_usage());

    let mut out = ImageBuffer::new();
    let length = line.get_length();
    for offset in [0, length / 2, length.saturating_sub(1)] {
        match line.get(offset, &mut out, options.glitch) {
            Some(timestamp) => println!(
                "get({:>3})            -> t={:.3}s {}x{}",
                offset,
                timestamp,
                out.width(),
                out.height()
            ),
            None => println!("get({:>3})            -> none", offset),
        }
    }

    let last = frames.saturating_sub(1) as f64 * FRAME_INTERVAL;
    for query in [last, last - 0.5, -1.0] {
        match line.get_by_timestamp(query, &mut out, options.glitch) {
            Some(timestamp) => println!("get_by_timestamp({:>7.3}) -> t={:.3}s", query, timestamp),
            None => println!("get_by_timestamp({:>7.3}) -> none", query),
        }
    }
    print_usage("after reads", &line.memory_usage());

    line.shut();
    print_usage("shut", &line.memory_usage());

    Ok(())
}
