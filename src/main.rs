use anyhow::Result;
use clap::Parser;
use gesture_midi::config::{load_config, Config, SourceConfig};
use gesture_midi::session::Session;
use gesture_midi::sink::{list_ports, LogSink, MidiSink, MidirSink};
use gesture_midi::source::{FrameSource, LineFrameSource, ProcessFrameSource, UdpFrameSource};
use log::{info, warn};
use std::path::PathBuf;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "gesture-midi", about = "Play MIDI with hand gestures")]
struct Cli {
    /// JSON config file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay recorded classifier output instead of the configured source
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Log MIDI messages instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// List MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,
}

async fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match config {
        SourceConfig::Udp { bind } => Box::new(UdpFrameSource::bind(bind).await?),
        SourceConfig::Lines { path, assume_ready } => {
            Box::new(LineFrameSource::open(path, *assume_ready).await?)
        }
        SourceConfig::Command { program, args } => {
            Box::new(ProcessFrameSource::spawn(program, args)?)
        }
    };
    Ok(source)
}

fn open_sink(config: &Config, dry_run: bool) -> Box<dyn MidiSink> {
    if dry_run {
        info!("Dry run, MIDI messages are only logged");
        return Box::new(LogSink);
    }
    match MidirSink::connect(&config.midi) {
        Ok(sink) => {
            info!("{} MIDI output(s): {:?}", sink.port_names().len(), sink.port_names());
            Box::new(sink)
        }
        Err(e) => {
            warn!("{:#}, logging MIDI messages instead", e);
            Box::new(LogSink)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if let Some(path) = cli.replay {
        config.source = SourceConfig::Lines {
            path,
            assume_ready: true,
        };
    }

    if cli.list_ports {
        let names = list_ports(&config.midi.client_name, config.midi.port_filter.as_deref())?;
        if names.is_empty() {
            println!("No MIDI output ports found");
        }
        for (i, name) in names.iter().enumerate() {
            println!("{}: {}", i, name);
        }
        return Ok(());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            let _ = stop_tx.send(true);
        }
    });

    let mut source = open_source(&config.source).await?;
    let mut sink = open_sink(&config, cli.dry_run);

    Session::new(&config)
        .run(source.as_mut(), sink.as_mut(), stop_rx)
        .await?;
    Ok(())
}
