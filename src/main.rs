mod cli;

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::Level;
use tracing_subscriber::{
    filter::{EnvFilter, Targets},
    fmt,
    prelude::*,
};

use clap::Parser;
use cli::{Cli, Commands};
use hedgehog_config::{Config, DriveConfig};
use hedgehog_link::{
    log_layer, Command, LogEntry, Session, SessionError, SessionEvent, SessionState,
};

/// How the session ended, as seen by the renderer.
#[derive(Debug)]
enum Outcome {
    ConnectFailed(String),
    Disconnected { by_user: bool, reason: String },
    /// The event channel closed without a terminal event.
    Unknown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logs = init_logging(cli.verbose);

    match &cli.command {
        Some(Commands::Completions { shell }) => {
            cli::print_completions(*shell);
            return Ok(());
        }
        Some(Commands::Commands) => {
            print_command_table();
            return Ok(());
        }
        Some(Commands::ShowConfig) => {
            let config = hedgehog_config::load(cli.config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            return Ok(());
        }
        _ => {}
    }

    let mut config = hedgehog_config::load(cli.config.as_deref())?;
    apply_overrides(&cli, &mut config);
    let addr = resolve_addr(&config).await?;

    let session = Session::new(addr, config.device.session_config());
    let renderer = tokio::spawn(render(session.subscribe_events(), logs));

    println!("Hedgehog at {}", session.peer_label());
    if let Err(e) = session.connect().await {
        let _ = renderer.await;
        return Err(anyhow::Error::new(e)
            .context(format!("Could not connect to {}", session.peer_label())));
    }

    let run = match cli.command {
        Some(Commands::Send { commands }) => send_all(&session, &commands).await,
        Some(Commands::Drive { no_stop }) => drive(&session, &config.drive, !no_stop).await,
        _ => drive(&session, &config.drive, config.drive.stop_before_move).await,
    };
    session.disconnect(true, "Disconnected by user.").await;

    let outcome = tokio::time::timeout(Duration::from_secs(1), renderer)
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or(Outcome::Unknown);
    run?;

    match outcome {
        Outcome::Disconnected { by_user: false, reason } => {
            anyhow::bail!("The connection to the Hedgehog has been lost!\n{reason}")
        }
        Outcome::ConnectFailed(reason) => anyhow::bail!("Could not connect: {reason}"),
        _ => Ok(()),
    }
}

fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(host) = &cli.host {
        config.device.host = Some(host.clone());
    }
    if let Some(port) = cli.port {
        config.device.port = port;
    }
    if let Some(secs) = cli.connect_timeout {
        config.device.connect_timeout_secs = Some(secs);
    }
}

async fn resolve_addr(config: &Config) -> anyhow::Result<SocketAddr> {
    let host = config
        .device
        .host
        .as_deref()
        .context("no Hedgehog address: pass --host or set `host` under [device] in the config")?;
    let port = config.device.port;
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("resolving {host}"))?
        .next()
        .with_context(|| format!("{host} did not resolve to any address"))
}

/// Send each command once, in order.
async fn send_all(session: &Session, commands: &[Command]) -> anyhow::Result<()> {
    for &command in commands {
        session
            .send_command(command)
            .await
            .with_context(|| format!("sending {command}"))?;
        println!("{}", command.friendly());
    }
    Ok(())
}

/// Read commands from stdin until `quit`, end of input, or the device goes away.
async fn drive(session: &Session, drive: &DriveConfig, stop_first: bool) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state_rx = session.subscribe_state();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                if matches!(line.trim(), "quit" | "exit") {
                    break;
                }
                let command = if line.is_empty() {
                    drive.default_command
                } else {
                    match line.parse::<Command>() {
                        Ok(c) => c,
                        Err(e) => {
                            eprintln!("{e}");
                            continue;
                        }
                    }
                };

                let res = if stop_first {
                    session.steer(command).await
                } else {
                    session.send_command(command).await
                };
                match res {
                    Ok(()) => println!("{}", command.friendly()),
                    // Timeouts and the like: the link is still up, keep going.
                    Err(e @ (SessionError::SendTimeout { .. } | SessionError::NotConnected)) => {
                        eprintln!("{e}");
                    }
                    Err(_) => break,
                }
            }
            _ = state_rx.wait_for(|s| *s == SessionState::Disconnected) => break,
        }
    }
    Ok(())
}

/// Print session events and captured log lines until the session ends.
async fn render(
    mut events: broadcast::Receiver<SessionEvent>,
    mut logs: broadcast::Receiver<LogEntry>,
) -> Outcome {
    let mut logs_open = true;
    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Ok(SessionEvent::Connecting { .. }) => {
                    println!("Status: {}", SessionState::Connecting.label());
                }
                Ok(SessionEvent::Connected { .. }) => {
                    println!("Status: {}", SessionState::Connected.label());
                }
                Ok(SessionEvent::CommandSent { .. }) => {}
                Ok(SessionEvent::ConnectFailed { reason }) => {
                    drain_logs(&mut logs);
                    println!("Status: {}", SessionState::Disconnected.label());
                    return Outcome::ConnectFailed(reason);
                }
                Ok(SessionEvent::Disconnected { by_user, reason }) => {
                    drain_logs(&mut logs);
                    println!("Status: {}", SessionState::Disconnected.label());
                    return Outcome::Disconnected { by_user, reason };
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Outcome::Unknown,
            },
            entry = logs.recv(), if logs_open => match entry {
                Ok(entry) => print_log(&entry),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => logs_open = false,
            },
        }
    }
}

fn drain_logs(logs: &mut broadcast::Receiver<LogEntry>) {
    while let Ok(entry) = logs.try_recv() {
        print_log(&entry);
    }
}

fn print_log(entry: &LogEntry) {
    let prefix = match entry.level.as_str() {
        "WARN" | "ERROR" => "ERROR: ",
        _ => "",
    };
    println!(
        "({}) > {prefix}{}",
        chrono::Local::now().format("%H:%M:%S"),
        entry.message
    );
}

fn print_command_table() {
    println!("{:<14}  {:<5}  {:>4}  DESCRIPTION", "COMMAND", "KEY", "CODE");
    println!("{}", "-".repeat(50));
    for cmd in Command::ALL {
        let key = match cmd.key() {
            ' ' => "space".to_string(),
            k => k.to_string(),
        };
        println!(
            "{:<14}  {:<5}  {:>4}  {}",
            cmd.name(),
            key,
            cmd.code(),
            cmd.friendly()
        );
    }
}

/// Session log lines go to the returned receiver for the `(HH:MM:SS) >`
/// log view; everything else goes to stderr filtered by verbosity.
fn init_logging(verbosity: u8) -> broadcast::Receiver<LogEntry> {
    let level = match verbosity {
        0 => "warn,hedgehog_link=off",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let (capture, logs) = log_layer::build_log_channel();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .with(capture.with_filter(Targets::new().with_target("hedgehog_link", Level::INFO)))
        .init();

    logs
}
