//! Command line front end for the subscription manager.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use gds_monitor::simulation::SimulatedDevice;
use gds_monitor::sink::{monitor_channel, MonitorEvent};
use gds_monitor::{MonitorConfig, RemoteService, SubscriptionManager, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gds-monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Monitor PLC global data space variables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a monitor config file.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Subscribe to variables on the simulated controller and print changes.
    Watch {
        /// Variable URIs, e.g. `Arp.Plc.Eclr/Main.Counter`.
        #[arg(required = true)]
        uris: Vec<String>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop after this many milliseconds.
        #[arg(long, default_value_t = 2_000)]
        duration_ms: u64,
        /// Print one JSON object per event.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::CheckConfig { config } => check_config(&config),
        Command::Watch {
            uris,
            config,
            duration_ms,
            json,
        } => {
            let config = match config {
                Some(path) => MonitorConfig::load(&path)?,
                None => MonitorConfig::default(),
            };
            init_logging(&config);
            watch(config, &uris, Duration::from_millis(duration_ms), json)
        }
    }
}

fn init_logging(config: &MonitorConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = MonitorConfig::load(path)?;
    println!(
        "config ok: kind={} publish_interval_us={} poll={}ms/{}ms log={}",
        config.kind.as_str(),
        config.publish_interval_us,
        config.poll.initial_delay.as_millis(),
        config.poll.interval.as_millis(),
        config.log_level
    );
    Ok(())
}

fn demo_device() -> SimulatedDevice {
    SimulatedDevice::with_variables([
        ("Arp.Plc.Eclr/Main.Counter", Value::DInt(0)),
        ("Arp.Plc.Eclr/Main.Running", Value::Bool(true)),
        ("Arp.Plc.Eclr/Main.Temperature", Value::LReal(20.0)),
        ("Arp.Plc.Eclr/Main.Label", Value::String("line 1".into())),
    ])
}

fn watch(
    config: MonitorConfig,
    uris: &[String],
    duration: Duration,
    json: bool,
) -> anyhow::Result<()> {
    let device = Arc::new(demo_device());
    let (sink, rx) = monitor_channel();
    let sink = Arc::new(sink);
    let step = config.poll.interval;
    let remote: Arc<dyn RemoteService> = device.clone();
    let manager = SubscriptionManager::builder(remote, sink.clone())
        .reporter(sink)
        .config(config)
        .build();

    let subscribed = uris
        .iter()
        .filter(|uri| manager.subscribe_to(uri).is_ok())
        .count();
    if subscribed == 0 {
        drain(&rx, json)?;
        bail!("none of the requested variables could be subscribed");
    }

    let deadline = Instant::now() + duration;
    let mut next_step = Instant::now() + step;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let wake = next_step.min(deadline);
        match rx.recv_timeout(wake.saturating_duration_since(now)) {
            Ok(event) => print_event(&event, json)?,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if Instant::now() >= next_step {
            device.step();
            next_step += step;
        }
    }

    let summary = manager.variables();
    manager.shutdown();
    drain(&rx, json)?;
    if !json {
        for variable in summary {
            println!("{variable}");
        }
    }
    Ok(())
}

fn drain(rx: &Receiver<MonitorEvent>, json: bool) -> anyhow::Result<()> {
    for event in rx.try_iter() {
        print_event(&event, json)?;
    }
    Ok(())
}

fn print_event(event: &MonitorEvent, json: bool) -> anyhow::Result<()> {
    if json {
        let line = serde_json::to_string(event).context("serialize event")?;
        println!("{line}");
        return Ok(());
    }
    match event {
        MonitorEvent::Updated { uri, value } => println!("{uri} = {value}"),
        MonitorEvent::Message { text } => println!("{text}"),
        MonitorEvent::Error { text } => eprintln!("error: {text}"),
    }
    Ok(())
}
