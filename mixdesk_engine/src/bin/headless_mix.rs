//! Plays WAV stems from a directory through the default output device.
//!
//! Usage: headless_mix <root-dir> <stem.wav>... [--seconds N] [--config engine.json]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, bail};
use mixdesk_engine::{DirectoryResolver, EngineConfig, PlaybackEngine, WavFileLoader};
use mixdesk_shared::StemDescriptor;

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(root) = args.next().map(PathBuf::from) else {
        bail!("usage: headless_mix <root-dir> <stem.wav>... [--seconds N] [--config engine.json]");
    };

    let mut stems = Vec::new();
    let mut seconds = 5.0f64;
    let mut config = EngineConfig::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seconds" => {
                let value = args.next().context("--seconds needs a value")?;
                seconds = value.parse().with_context(|| format!("bad --seconds value '{}'", value))?;
            }
            "--config" => {
                let path = PathBuf::from(args.next().context("--config needs a path")?);
                config = EngineConfig::from_path(&path)
                    .with_context(|| format!("loading {}", path.display()))?;
            }
            _ => stems.push(StemDescriptor::new(arg)),
        }
    }
    if stems.is_empty() {
        bail!("no stems given");
    }

    println!("[Headless] Starting with {} stem(s) from {}", stems.len(), root.display());
    let resolver = Arc::new(DirectoryResolver::new(&root));
    let mut engine = PlaybackEngine::with_default_output(config, resolver, Arc::new(WavFileLoader))?;
    engine.load_job("headless", stems)?;

    for status in engine.stem_statuses() {
        match &status.error {
            Some(err) => println!("[Headless] {:<16} {:?}: {}", status.name, status.readiness, err),
            None => println!(
                "[Headless] {:<16} {:?} {:.2}s {}",
                status.name,
                status.readiness,
                status.duration,
                status.url.as_deref().unwrap_or("-")
            ),
        }
    }

    let report = engine.play()?;
    println!("[Headless] Playing {} stem(s), {} pending", report.started.len(), report.pending.len());

    let ticks = (seconds * 10.0).max(0.0) as u64;
    for _ in 0..ticks {
        thread::sleep(Duration::from_millis(100));
        let snapshot = engine.sample_transport();
        let levels = engine.master_levels();
        println!(
            "[Headless] {:6.2}s / {:6.2}s  peak {:6.1} dBFS  rms {:6.1} dBFS",
            snapshot.current_time, snapshot.duration, levels.peak_dbfs, levels.rms_dbfs
        );
        if !snapshot.is_playing {
            break;
        }
    }

    engine.stop();
    println!("[Headless] Correction payload: {}", engine.correction_payload().to_json()?);
    engine.teardown();
    println!("[Headless] Done.");
    Ok(())
}
