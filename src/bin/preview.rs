//! Headless preview of the avatar engine.
//!
//! Runs the scene against the headless backend for a fixed time, optionally
//! listening to the microphone, and logs what happens. All output goes to
//! stderr through tracing.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use visage::audio::capture::MicrophoneSource;
use visage::scene::{HeadlessBackend, ProceduralStyle};
use visage::{
    AmplitudeAnalyzer, AvatarSceneController, AvatarSignals, FrameLoop, VadEvents, VisageConfig,
};

const USAGE: &str = "usage: visage-preview [--config <path>] [--seconds <n>] [--style <name>] [--mic] [--list-devices]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    seconds: Option<f64>,
    style: Option<ProceduralStyle>,
    mic: bool,
    list_devices: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut out = Args::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context(USAGE)?;
                out.config = Some(PathBuf::from(path));
            }
            "--seconds" => {
                let value = args.next().context(USAGE)?;
                out.seconds = Some(parse_seconds(&value)?);
            }
            "--style" => {
                let value = args.next().context(USAGE)?;
                out.style = Some(value.parse().map_err(|e: String| anyhow::anyhow!(e))?);
            }
            "--mic" => out.mic = true,
            "--list-devices" => out.list_devices = true,
            "-h" | "--help" => {
                eprintln!("{USAGE}");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument '{other}'\n{USAGE}"),
        }
    }
    Ok(out)
}

/// A run length in seconds: finite and not negative.
fn parse_seconds(value: &str) -> anyhow::Result<f64> {
    let seconds: f64 = value
        .parse()
        .with_context(|| format!("invalid --seconds value '{value}'"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        anyhow::bail!("--seconds must be a non-negative number, got '{value}'");
    }
    Ok(seconds)
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<VisageConfig> {
    let explicit = path.is_some();
    let path = path.unwrap_or_else(VisageConfig::default_config_path);
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(VisageConfig::default());
    }
    VisageConfig::from_file(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

/// Alternate the speaking flag so the mouth has something to do.
fn spawn_speech_demo(signals: AvatarSignals, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(2));
        let mut speaking = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    speaking = !speaking;
                    signals.set_speaking(speaking);
                    tracing::info!(speaking, "demo speaking flag");
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;

    if args.list_devices {
        for name in MicrophoneSource::list_input_devices()? {
            eprintln!("{name}");
        }
        return Ok(());
    }

    let mut config = load_config(args.config)?;
    if let Some(style) = args.style {
        config.scene.avatar = style;
    }

    let signals = AvatarSignals::new();
    let backend = HeadlessBackend::new();
    let stats = backend.stats();
    let mut scene = AvatarSceneController::new(&config, signals.clone());
    scene
        .initialize(Box::new(backend), config.scene.width, config.scene.height)
        .context("failed to initialise scene")?;

    let cancel = CancellationToken::new();
    let mut analyzer = None;
    if args.mic {
        let start_signals = signals.clone();
        let end_signals = signals.clone();
        let events = VadEvents::new()
            .on_speech_start(move || {
                tracing::info!("speech started");
                start_signals.set_listening(true);
            })
            .on_speech_end(move || {
                tracing::info!("speech ended");
                end_signals.set_listening(false);
            });
        let mut mic_analyzer =
            AmplitudeAnalyzer::new(config.analyzer.clone(), config.audio.queue_depth, events);
        match mic_analyzer.attach(Box::new(MicrophoneSource::new(&config.audio))) {
            Ok(()) => {
                scene.attach_amplitude(mic_analyzer.probe());
                analyzer = Some(mic_analyzer);
            }
            Err(e) => tracing::warn!(error = %e, "microphone unavailable, using synthetic mouth"),
        }
    }
    if analyzer.is_none() {
        spawn_speech_demo(signals.clone(), cancel.clone());
    }

    let scene = Arc::new(Mutex::new(scene));
    let mut frames = FrameLoop::start(Arc::clone(&scene), config.scene.frame_rate);

    let run_for = args.seconds.map(Duration::from_secs_f64);
    tokio::select! {
        _ = async {
            match run_for {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        } => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            tracing::info!("interrupted");
        }
    }

    frames.stop();
    cancel.cancel();
    if let Some(mut analyzer) = analyzer {
        analyzer.detach();
    }
    match scene.lock() {
        Ok(mut scene) => {
            tracing::info!(state = ?scene.animation_state(), "final animation state");
            scene.dispose();
        }
        Err(e) => anyhow::bail!("scene lock poisoned: {e}"),
    }

    if let Ok(stats) = stats.lock() {
        tracing::info!(
            frames = stats.frames,
            uploads = stats.uploads,
            releases = stats.releases,
            live = stats.live.len(),
            "preview finished"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn seconds_accepts_plain_durations() {
        assert_eq!(parse_seconds("2.5").unwrap(), 2.5);
        assert_eq!(parse_seconds("0").unwrap(), 0.0);
    }

    #[test]
    fn seconds_rejects_negative_and_non_finite() {
        for bad in ["-1", "NaN", "inf", "-inf", "soon"] {
            assert!(parse_seconds(bad).is_err(), "accepted '{bad}'");
        }
    }
}
