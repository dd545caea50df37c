// Demo driver for the `pinpong` library.
//
// Runs the stage headless: a synthetic camera publishes frames from its own
// task, the main loop ticks at the target frame rate, a key script stands in for
// the keyboard, and the last rendered frame can be written out as a PNG.

use anyhow::{Context, Result, bail};
use clap::Parser;
use pinpong::core_modules::camera::{SyntheticCamera, frame_slot, select_device};
use pinpong::core_modules::command::Key;
use pinpong::core_modules::surface::{BACKGROUND, RasterSurface};
use pinpong::core_modules::utils::image_helper::image_helper;
use pinpong::stage::{Stage, StageConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pinpong", about = "Projection-mapped table tennis, headless demo driver")]
struct Cli {
    /// JSON stage config; missing file means defaults.
    #[arg(long, default_value = "pinpong.json")]
    config: PathBuf,
    /// Calibration file, overriding the config.
    #[arg(long)]
    calibration: Option<PathBuf>,
    /// Frames to run; 0 runs until ctrl-c.
    #[arg(long, default_value_t = 600)]
    frames: u64,
    /// Write the last rendered frame here as PNG.
    #[arg(long)]
    snapshot: Option<PathBuf>,
    #[arg(long)]
    screen_width: Option<f64>,
    #[arg(long)]
    screen_height: Option<f64>,
    /// Comma-separated `key@frame` presses, e.g. `f@10,c@20,space@300`.
    /// Key names are single characters or left/right/up/down/space; a
    /// leading `+` holds shift.
    #[arg(long, default_value = "")]
    script: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScriptedKey {
    frame: u64,
    key: Key,
    shift: bool,
}

fn parse_script(script: &str) -> Result<Vec<ScriptedKey>> {
    let mut keys = Vec::new();
    for token in script.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (name, frame) = match token.rsplit_once('@') {
            Some((name, frame)) => (
                name,
                frame
                    .parse::<u64>()
                    .with_context(|| format!("bad frame number in script token {token:?}"))?,
            ),
            None => (token, 0),
        };
        let (name, shift) = match name.strip_prefix('+') {
            Some(rest) if !rest.is_empty() => (rest, true),
            _ => (name, false),
        };
        let Some(key) = Key::parse(name) else {
            bail!("unknown key {name:?} in script");
        };
        keys.push(ScriptedKey { frame, key, shift });
    }
    keys.sort_by_key(|k| k.frame);
    Ok(keys)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = StageConfig::from_file(&cli.config).context("loading stage config")?;
    if let Some(path) = cli.calibration {
        config.calibration_path = path;
    }
    if let Some(width) = cli.screen_width {
        config.screen_width = width;
    }
    if let Some(height) = cli.screen_height {
        config.screen_height = height;
    }
    let script = parse_script(&cli.script)?;

    let devices = SyntheticCamera::devices();
    let device = select_device(&devices).context("no frame source available")?;
    tracing::info!(device = %device.name, "starting capture");

    let (publisher, mut subscriber) = frame_slot();
    let (stop_capture, capture_shutdown) = watch::channel(false);
    let camera = SyntheticCamera::new(config.camera_width, config.camera_height);
    let capture = tokio::spawn(camera.run(publisher, config.target_fps, capture_shutdown));

    let mut surface = RasterSurface::new(
        config.screen_width.max(1.0) as u32,
        config.screen_height.max(1.0) as u32,
    );
    let frame_period = Duration::from_secs_f64(1.0 / config.target_fps.max(1.0));
    let mut ticker = tokio::time::interval(frame_period);
    let mut stage = Stage::new(config);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut frame = 0u64;
    let mut pending = script.iter().peekable();
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
        }

        while let Some(scripted) = pending.next_if(|k| k.frame <= frame) {
            stage.handle_key(scripted.key, scripted.shift);
        }
        stage.update(&mut subscriber);
        surface.clear(BACKGROUND);
        stage.draw(&mut surface);

        frame += 1;
        if cli.frames > 0 && frame >= cli.frames {
            break;
        }
    }
    tracing::info!(frames = frame, phase = ?stage.table().phase(), "loop finished");

    // The capture task may already be gone; either way it is stopping.
    let _ = stop_capture.send(true);
    capture.await.context("capture task panicked")?;

    if let Some(path) = cli.snapshot {
        image_helper::save_png(&path, surface.canvas())
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        tracing::info!(path = %path.display(), "snapshot written");
    }

    stage.shutdown().context("saving calibration")?;
    Ok(())
}
