//! singlepeer - single-instance coordination
//!
//! CLI entry point for inspecting channels and relaying messages between
//! launches of an application.

use std::fs;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use singlepeer::cli::{Cli, Command, OutputFormat, get_log_path};
use singlepeer::{ChannelName, Config, CoordinatorEvent, PeerContext, Role};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    // Appending: a second launch shares this file with the running primary
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // A read-only home must not stop the relay from working
    if let Err(e) = setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    debug!(?config, "main: config loaded");

    match cli.command {
        Command::Channel { application_id } => cmd_channel(&config, &application_id),
        Command::Status { application_id, format } => cmd_status(&config, &application_id, format).await,
        Command::Run {
            application_id,
            message,
        } => cmd_run(&config, &application_id, message.as_deref()).await,
        Command::Send {
            application_id,
            text,
            timeout_ms,
        } => cmd_send(&config, &application_id, &text, timeout_ms).await,
    }
}

/// Print the channel name and its endpoints
fn cmd_channel(config: &Config, application_id: &str) -> Result<()> {
    debug!(%application_id, "cmd_channel: called");
    let channel = ChannelName::derive(application_id);
    println!("{}", channel);
    println!("  lock:   {}", channel.lock_path(&config.runtime_dir).display());
    println!("  socket: {}", channel.socket_path(&config.runtime_dir).display());
    Ok(())
}

/// Probe the channel: claiming and immediately releasing it answers "running?"
async fn cmd_status(config: &Config, application_id: &str, format: OutputFormat) -> Result<()> {
    debug!(%application_id, ?format, "cmd_status: called");
    let ctx = PeerContext::new(config.clone())?;
    let app = ctx.coordinator();
    app.set_application_id(application_id);

    let running = app.is_running();
    let role = app.role();
    let channel = ctx.channel().map(|c| c.to_string()).unwrap_or_default();
    drop(app);

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "application_id": application_id,
                "channel": channel,
                "running": running,
                "reachable": role == Some(Role::Client),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Application: {}", application_id.cyan());
            println!("Channel: {}", channel);
            match role {
                Some(Role::Client) => println!("Status: {}", "running".green()),
                Some(Role::Fallback) => println!("Status: {} (channel unavailable)", "assumed running".yellow()),
                Some(Role::Primary) | None => println!("Status: {}", "not running".dimmed()),
            }
        }
    }

    Ok(())
}

/// Run as the primary, or hand the message to the primary that already exists
async fn cmd_run(config: &Config, application_id: &str, message: Option<&str>) -> Result<()> {
    debug!(%application_id, ?message, "cmd_run: called");
    let ctx = PeerContext::new(config.clone())?;
    let mut app = ctx.coordinator();
    app.set_application_id(application_id);
    // Drain our own identity/running notifications
    while app.try_next_event().is_some() {}

    if app.is_running() {
        println!("{} {} is already running", "→".yellow(), application_id.cyan());
        if let Some(text) = message {
            match app.send_message(text).await {
                Ok(()) => println!("{} Message forwarded", "✓".green()),
                Err(e) => {
                    warn!(error = %e, "cmd_run: message not delivered");
                    println!("{} Message not delivered: {}", "✗".red(), e);
                }
            }
        }
        return Ok(());
    }

    eprintln!(
        "{} Primary for {} (Ctrl+C to stop)",
        "✓".green(),
        application_id.cyan()
    );
    info!(%application_id, "cmd_run: waiting for messages");

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            event = app.next_event() => match event {
                Some(CoordinatorEvent::MessageReceived { text }) => println!("{}", text),
                Some(other) => debug!(?other, "cmd_run: ignoring notification"),
                None => break,
            },
            _ = sigint.recv() => {
                debug!("cmd_run: SIGINT received");
                break;
            }
            _ = sigterm.recv() => {
                debug!("cmd_run: SIGTERM received");
                break;
            }
        }
    }

    info!("cmd_run: shutting down");
    ctx.shutdown();
    Ok(())
}

/// Relay one message; exits non-zero when it was not acknowledged
async fn cmd_send(config: &Config, application_id: &str, text: &str, timeout_ms: Option<u64>) -> Result<()> {
    debug!(%application_id, ?timeout_ms, "cmd_send: called");
    let ctx = PeerContext::new(config.clone())?;
    let app = ctx.coordinator();
    app.set_application_id(application_id);

    match app.role() {
        Some(Role::Client) => {}
        Some(Role::Fallback) => {
            return Err(eyre::eyre!("Channel for {} is unavailable, nothing sent", application_id));
        }
        Some(Role::Primary) | None => {
            return Err(eyre::eyre!("No running instance of {}, nothing sent", application_id));
        }
    }

    let timeout = timeout_ms.map(Duration::from_millis).unwrap_or_else(|| config.send_timeout());
    app.send_message_with_timeout(text, timeout)
        .await
        .context("Message not delivered")?;

    println!("{} Delivered to {}", "✓".green(), application_id.cyan());
    Ok(())
}
