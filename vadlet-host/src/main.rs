//! `vadlet`: reference host for vadlet-core.
//!
//! ```text
//! vadlet [--settings <file.json>] wav <path>
//! vadlet [--settings <file.json>] mic [--seconds <n>]
//! ```
//!
//! Events are written to stdout as JSON lines; logs go to stderr
//! (`VADLET_LOG`, then `RUST_LOG`, default `info`).

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[cfg(feature = "audio-cpal")]
mod mic;
mod settings;
mod sim;
mod wav;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Wav(PathBuf),
    Mic { seconds: u64 },
}

#[derive(Debug)]
struct Args {
    settings: Option<PathBuf>,
    command: Command,
}

const USAGE: &str = "usage: vadlet [--settings <file.json>] (wav <path> | mic [--seconds <n>])";

fn parse_args<I>(args: I) -> std::result::Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut settings: Option<PathBuf> = None;
    let mut command: Option<Command> = None;

    let mut it = args.into_iter().peekable();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" => {
                let value = it.next().ok_or("--settings requires a path")?;
                settings = Some(PathBuf::from(value));
            }
            "wav" => {
                let value = it.next().ok_or("wav requires a file path")?;
                command = Some(Command::Wav(PathBuf::from(value)));
            }
            "mic" => {
                let mut seconds = 10;
                if it.peek().map(String::as_str) == Some("--seconds") {
                    it.next();
                    let value = it.next().ok_or("--seconds requires a value")?;
                    seconds = value
                        .parse::<u64>()
                        .map_err(|_| format!("invalid --seconds value: {value}"))?;
                }
                command = Some(Command::Mic { seconds });
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other => return Err(format!("unknown argument: {other}\n{USAGE}")),
        }
    }

    Ok(Args {
        settings,
        command: command.ok_or(USAGE)?,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("VADLET_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let args = parse_args(std::env::args().skip(1)).map_err(anyhow::Error::msg)?;
    let path = args
        .settings
        .unwrap_or_else(settings::default_settings_path);
    let settings = settings::load_settings(&path);
    info!(path = %path.display(), ?settings, "settings loaded");

    match args.command {
        Command::Wav(file) => sim::run_wav(&settings, &file).await,
        #[cfg(feature = "audio-cpal")]
        Command::Mic { seconds } => mic::run_mic(&settings, seconds).await,
        #[cfg(not(feature = "audio-cpal"))]
        Command::Mic { .. } => anyhow::bail!("vadlet was built without the audio-cpal feature"),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        error!("{e:#}");
        eprintln!("vadlet failed: {e:#}");
        std::process::exit(1);
    }
}
