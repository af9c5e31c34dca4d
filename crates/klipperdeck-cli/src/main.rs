//! klipperdeck operator CLI.
//!
//! Connects to a Moonraker host (or the simulator) and drives it from the
//! terminal:
//!   klipperdeck --host 192.168.1.8 watch --seconds 60
//!   klipperdeck --host 192.168.1.8 temp hotend 210
//!   klipperdeck demo

mod config;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use klipperdeck_core::{Axis, PrinterCommand, SessionState, Snapshot, gcode};
use klipperdeck_session::{Fallback, Session, TICK_INTERVAL};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "klipperdeck")]
#[command(about = "Control and monitor a Klipper printer through Moonraker", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Printer host, overrides the config file
    #[arg(long, env = "KLIPPERDECK_HOST")]
    host: Option<String>,

    /// Moonraker port, overrides the config file
    #[arg(long, env = "KLIPPERDECK_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the host and explain what is wrong
    Diagnose {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect (falling back to the simulator) and print telemetry
    Watch {
        #[arg(long, default_value = "30")]
        seconds: u64,
        /// Connect even when auto_connect is off in the config
        #[arg(long)]
        connect: bool,
    },
    /// Run the simulator alone and print telemetry
    Demo {
        #[arg(long, default_value = "30")]
        seconds: u64,
        /// Hotend target to heat towards
        #[arg(long)]
        hotend: Option<f64>,
        /// Bed target to heat towards
        #[arg(long)]
        bed: Option<f64>,
    },
    /// Send raw G-code
    Gcode { script: String },
    /// Set a heater target (0 turns it off)
    Temp { heater: Heater, target: f64 },
    /// Home the given axes ("xy"), or all
    Home { axes: Option<String> },
    /// Relative move of one axis, mm
    Move {
        axis: Axis,
        #[arg(allow_negative_numbers = true)]
        distance: f64,
    },
    /// List G-code files on the host
    Files,
    /// Emergency stop
    Estop,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Heater {
    Hotend,
    Bed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("klipperdeck=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.override_with(args.host, args.port);

    match args.command {
        Command::Diagnose { json } => {
            let session = Session::with_options(config.params(), config.session_options());
            let report = session.diagnose().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
            if !report.is_healthy() {
                std::process::exit(1);
            }
        }
        Command::Watch { seconds, connect } => {
            let session = Session::with_options(config.params(), config.session_options());
            let result = if connect {
                session.connect().await
            } else {
                session.auto_connect().await
            };
            if let Err(e) = result {
                tracing::warn!("Connect failed: {}", e);
            }
            if session.state().await == SessionState::Disconnected {
                println!("auto_connect is off; pass --connect to open the connection");
            }
            watch(&session, seconds).await;
            print_log(&session).await;
            session.disconnect().await;
        }
        Command::Demo {
            seconds,
            hotend,
            bed,
        } => {
            let session = Session::with_options(config.params(), config.session_options());
            session.start_demo_mode().await;
            if let Some(target) = hotend {
                session.set_hotend_temperature(target).await?;
            }
            if let Some(target) = bed {
                session.set_bed_temperature(target).await?;
            }
            watch(&session, seconds).await;
            print_log(&session).await;
        }
        Command::Files => {
            let session = connected(&config).await?;
            for file in session.files().await {
                let minutes = file.estimated_time.map(|t| t / 60.0).unwrap_or(0.0);
                println!(
                    "{:<40} {:>10} bytes  ~{:.0} min",
                    file.filename, file.size, minutes
                );
            }
        }
        Command::Gcode { script } => run_one(&config, PrinterCommand::Raw { script }).await?,
        Command::Temp { heater, target } => {
            let command = match heater {
                Heater::Hotend => PrinterCommand::SetHotendTemperature { target },
                Heater::Bed => PrinterCommand::SetBedTemperature { target },
            };
            run_one(&config, command).await?
        }
        Command::Home { axes } => {
            let axes = match axes {
                Some(letters) => Axis::parse_many(&letters)?,
                None => Vec::new(),
            };
            run_one(&config, PrinterCommand::Home { axes }).await?
        }
        Command::Move { axis, distance } => {
            let command = PrinterCommand::MoveAxis {
                axis,
                distance,
                feedrate: None,
            };
            run_one(&config, command).await?
        }
        Command::Estop => run_one(&config, PrinterCommand::EmergencyStop).await?,
    }

    Ok(())
}

/// Check `command` against the profile, then send it over a fresh live
/// session. Nothing is contacted when the command is out of range.
async fn run_one(config: &Config, command: PrinterCommand) -> anyhow::Result<()> {
    gcode::validate(&config.printer, &command)?;
    let session = connected(config).await?;
    session.execute(command).await?;
    print_latest(&session).await;
    Ok(())
}

/// A live session for one-shot commands. Never falls back to the simulator.
async fn connected(config: &Config) -> anyhow::Result<Session> {
    let mut options = config.session_options();
    options.policy.fallback = Fallback::Stay;
    let session = Session::with_options(config.params(), options);

    if let Err(e) = session.connect().await {
        print_log(&session).await;
        return Err(e).context("cannot reach the printer, try `klipperdeck diagnose`");
    }
    if !session.state().await.is_connected() {
        bail!("not connected");
    }
    Ok(session)
}

async fn watch(session: &Session, seconds: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    let mut interval = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let state = session.state().await;
                let snapshot = session.snapshot().await;
                println!("{}", telemetry_line(&state, &snapshot));
            }
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn telemetry_line(state: &SessionState, snapshot: &Snapshot) -> String {
    let heater = |h: Option<klipperdeck_core::subsystems::Heater>| match h {
        Some(h) => format!(
            "{:.1}/{:.0}",
            h.temperature.unwrap_or(0.0),
            h.target.unwrap_or(0.0)
        ),
        None => "-".to_string(),
    };
    let progress = snapshot
        .display_status()
        .and_then(|d| d.progress)
        .unwrap_or(0.0);
    let job = snapshot
        .print_stats()
        .and_then(|p| p.state)
        .unwrap_or_else(|| "standby".to_string());

    format!(
        "[{}] hotend {}  bed {}  {} {:.0}%",
        state.label(),
        heater(snapshot.extruder()),
        heater(snapshot.heater_bed()),
        job,
        progress * 100.0
    )
}

async fn print_log(session: &Session) {
    let logs = session.logs().await;
    if logs.is_empty() {
        return;
    }
    println!("--- activity ---");
    for entry in logs.iter().rev() {
        println!("{entry}");
    }
}

async fn print_latest(session: &Session) {
    if let Some(entry) = session.logs().await.first() {
        println!("{entry}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use klipperdeck_core::PrinterProfile;
    use klipperdeck_session::Simulator;
    use serde_json::json;

    #[test]
    fn parses_negative_moves() {
        let args = Args::try_parse_from(["klipperdeck", "move", "z", "-0.5"]).unwrap();
        match args.command {
            Command::Move { axis, distance } => {
                assert_eq!(axis, Axis::Z);
                assert_eq!(distance, -0.5);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[tokio::test]
    async fn out_of_range_command_fails_before_connecting() {
        let mut config = Config::default();
        // Nothing listens here; reaching the network would fail differently.
        config.override_with(Some("192.0.2.1".into()), Some(7125));
        let err = run_one(&config, PrinterCommand::SetBedTemperature { target: 500.0 })
            .await
            .unwrap_err();
        assert!(
            err.downcast_ref::<klipperdeck_core::CommandError>().is_some(),
            "{err:#}"
        );
    }

    #[test]
    fn telemetry_line_formats_snapshot() {
        let status = json!({
            "extruder": {"temperature": 204.96, "target": 205.0},
            "print_stats": {"state": "printing"},
            "display_status": {"progress": 0.42},
        });
        let snapshot = Snapshot::from_status(status.as_object().unwrap());
        let line = telemetry_line(&SessionState::Connected, &snapshot);
        assert_eq!(line, "[connected] hotend 205.0/205  bed -  printing 42%");
    }

    #[test]
    fn simulated_progress_renders_as_percent() {
        let mut sim = Simulator::seeded(PrinterProfile::default(), 42);
        let mut snapshot = Simulator::baseline_snapshot();
        sim.apply(
            &PrinterCommand::StartPrint {
                filename: "benchy.gcode".into(),
            },
            &mut snapshot,
        );
        for _ in 0..200 {
            sim.tick(&mut snapshot);
        }

        let line = telemetry_line(&SessionState::Simulated, &snapshot);
        let percent: f64 = line
            .rsplit(' ')
            .next()
            .and_then(|p| p.strip_suffix('%'))
            .and_then(|p| p.parse().ok())
            .unwrap();
        assert!(line.contains("printing"), "{line}");
        assert!(percent > 0.0 && percent <= 100.0, "{line}");
    }
}
