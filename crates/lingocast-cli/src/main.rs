// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lingocast_application::{AppState, Resolution, Session};
use lingocast_config::load as load_config;
use lingocast_domain::RecognizedLine;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Resolve recognized game text to official translations and voice lines.
#[derive(Debug, Parser)]
#[command(name = "lingocast", version)]
struct Args {
    /// TOML configuration file layered over the defaults.
    #[arg(short, long, env = "LINGOCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Also resolve the voice line of the first matched segment.
    #[arg(long)]
    audio: bool,

    #[arg(long)]
    pretty: bool,

    /// Recognized lines in reading order. Without any, stdin is read and
    /// every blank-line separated block is resolved as one screen.
    lines: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    init_tracing(&config.telemetry.log_level);

    let session = AppState::new(config).start().await?;

    let screens = if args.lines.is_empty() {
        let input = tokio::task::spawn_blocking(|| std::io::read_to_string(std::io::stdin()))
            .await
            .context("stdin reader task failed")?
            .context("failed to read stdin")?;
        split_screens(&input)
    } else {
        vec![args.lines.clone()]
    };

    tokio::select! {
        result = run(&session, screens, args.audio, args.pretty) => result?,
        _ = shutdown_signal() => {}
    }

    Ok(())
}

async fn run(session: &Session, screens: Vec<Vec<String>>, audio: bool, pretty: bool) -> Result<()> {
    info!(target: "cli", screens = screens.len(), audio, "resolving");
    for screen in screens {
        let lines = screen
            .into_iter()
            .map(|text| RecognizedLine::new(text, 1.0))
            .collect();
        match session.submit(lines, audio).await {
            Some(resolution) => println!("{}", render(&resolution, pretty)?),
            None => warn!(target: "cli", "result superseded before it finished"),
        }
    }
    Ok(())
}

fn render(resolution: &Resolution, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(resolution)?
    } else {
        serde_json::to_string(resolution)?
    };
    Ok(json)
}

/// Blank lines separate screens; surrounding whitespace is dropped.
fn split_screens(input: &str) -> Vec<Vec<String>> {
    let mut screens = Vec::new();
    let mut current = Vec::new();
    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                screens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.to_string());
        }
    }
    if !current.is_empty() {
        screens.push(current);
    }
    screens
}

fn init_tracing(default_level: &str) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: "cli", "shutdown signal received"),
        Err(error) => {
            warn!(target: "cli", %error, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
