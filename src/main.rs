// tapedeck - play one track from a URL or a local file
// Small command driver around the playback controller: load happens in the
// background, transport commands come in on stdin.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tapedeck::{format_clock, Config, PlaybackController, PlaybackStatus, PlayerEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "tapedeck")]
#[command(about = "Play a single track from a URL or a local file")]
struct Args {
    /// URL or path of the track to play
    source: Option<String>,

    /// Label shown in status output (derived from the source when omitted)
    #[arg(long, short)]
    name: Option<String>,

    /// Starting volume, 0-100
    #[arg(long)]
    volume: Option<i64>,

    /// Use this config file instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable developer logging (stderr + debug output)
    #[arg(long)]
    dev: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Play,
    Pause,
    Resume,
    Stop,
    Seek(SeekTarget),
    Volume(String),
    Status { json: bool },
    Load { source: String, name: String },
    Help,
    Quit,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
enum SeekTarget {
    Seconds(f64),
    Percent(f64),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_lowercase().as_str() {
            "play" | "p" => Command::Play,
            "pause" => Command::Pause,
            "resume" | "r" => Command::Resume,
            "stop" | "s" => Command::Stop,
            "seek" => match parse_seek(rest) {
                Some(target) => Command::Seek(target),
                None => Command::Unknown(line.to_string()),
            },
            "vol" | "volume" => Command::Volume(rest.to_string()),
            "status" | "st" => Command::Status {
                json: rest == "--json",
            },
            "load" | "l" if !rest.is_empty() => {
                let (source, name) = match rest.split_once(char::is_whitespace) {
                    Some((source, name)) => (source.to_string(), name.trim().to_string()),
                    None => (rest.to_string(), String::new()),
                };
                Command::Load { source, name }
            }
            "help" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        };
        Some(command)
    }
}

fn parse_seek(raw: &str) -> Option<SeekTarget> {
    if let Some(percent) = raw.strip_suffix('%') {
        return percent.trim().parse().ok().map(SeekTarget::Percent);
    }
    if let Some((minutes, seconds)) = raw.split_once(':') {
        let minutes: f64 = minutes.parse().ok()?;
        let seconds: f64 = seconds.parse().ok()?;
        return Some(SeekTarget::Seconds(minutes * 60.0 + seconds));
    }
    raw.parse().ok().map(SeekTarget::Seconds)
}

fn print_help() {
    println!("Commands:");
    println!("  play | pause | resume | stop");
    println!("  seek <sec> | seek <m:ss> | seek <pct>%");
    println!("  vol <0-100>");
    println!("  status [--json]");
    println!("  load <url|path> [name]");
    println!("  quit");
}

fn print_status(status: &PlaybackStatus) {
    let icon = if status.is_playing {
        "▶"
    } else if status.is_paused {
        "⏸"
    } else {
        "⏹"
    };
    let total = if status.duration_seconds > 0.0 {
        format_clock(status.duration_seconds)
    } else {
        "--:--".to_string()
    };
    let name = if status.display_name.is_empty() {
        "(nothing loaded)"
    } else {
        status.display_name.as_str()
    };

    println!(
        "{} {} [{} / {}] vol {}%",
        icon,
        name,
        format_clock(status.position_seconds),
        total,
        status.volume_percent
    );
}

/// Fetching can take a while, so it runs as its own task and the prompt stays live.
fn spawn_load(controller: &Arc<PlaybackController>, source: String, name: String) {
    let controller = Arc::clone(controller);
    tokio::spawn(async move {
        println!("⏳ Loading {}...", source);
        match controller.load(&source, &name).await {
            Ok(()) => {
                if controller.play() {
                    print_status(&controller.get_status());
                }
            }
            Err(e) => println!("❌ {}", e),
        }
    });
}

async fn log_events(mut events: mpsc::UnboundedReceiver<PlayerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PlayerEvent::PositionChanged(_) => {}
            PlayerEvent::TrackFinished(duration) => {
                info!("Track finished ({})", format_clock(duration));
                println!("✅ Finished");
            }
            PlayerEvent::Error(message) => error!("Player error: {}", message),
            other => debug!("Player event: {:?}", other),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config - falls back to defaults if missing
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let _log_guard = tapedeck::logging::init_logging(&config.logging, args.dev)?;
    info!("tapedeck starting up");

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut controller = PlaybackController::from_config(&config)?;
    controller.set_event_sender(event_tx);
    let controller = Arc::new(controller);
    tokio::spawn(log_events(event_rx));

    if let Some(volume) = args.volume {
        controller.set_volume(volume);
    }
    if let Some(source) = args.source.clone() {
        spawn_load(&controller, source, args.name.clone().unwrap_or_default());
    }
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = Command::parse(&line) else {
            continue;
        };

        match command {
            Command::Play => {
                if !controller.play() {
                    println!("Nothing to play");
                }
            }
            Command::Pause => {
                controller.pause();
            }
            Command::Resume => {
                controller.resume();
            }
            Command::Stop => controller.stop(),
            Command::Seek(target) => {
                let ok = match target {
                    SeekTarget::Seconds(seconds) => controller.seek(seconds),
                    SeekTarget::Percent(percent) => controller.seek_fraction(percent / 100.0),
                };
                if !ok {
                    println!("Can't seek there");
                }
            }
            Command::Volume(raw) => {
                if !controller.set_volume_input(&raw) {
                    println!("Volume must be a number");
                }
            }
            Command::Status { json } => {
                let status = controller.get_status();
                if json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else {
                    print_status(&status);
                }
            }
            Command::Load { source, name } => spawn_load(&controller, source, name),
            Command::Help => print_help(),
            Command::Quit => break,
            Command::Unknown(line) => println!("Unknown command: {} (try 'help')", line),
        }
    }

    controller.teardown();
    info!("tapedeck shut down");
    Ok(())
}
