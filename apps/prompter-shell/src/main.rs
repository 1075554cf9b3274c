#![cfg_attr(test, allow(clippy::expect_used))]

mod terminal;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use prompter_core::{
    CommandRunner, PanelState, PrompterConfig, RawRequest, ShellCommandRunner, UiLoop,
    submit_raw_request,
};
use terminal::TerminalLogSurface;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "prompter-shell",
    about = "Run raw API requests in the background and keep their history"
)]
struct Args {
    /// Shell used for every command (overrides PROMPTER_SHELL).
    #[arg(long)]
    shell: Option<String>,

    /// Extra environment for every request.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Delay before the log view is mounted; earlier lines are buffered.
    #[arg(long, default_value_t = 0)]
    mount_delay_ms: u64,

    /// Print the history as JSON instead of a summary list.
    #[arg(long)]
    json: bool,

    #[arg(required = true, value_name = "COMMAND")]
    commands: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = PrompterConfig::from_env().context("invalid prompter configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let runner: Arc<dyn CommandRunner> = Arc::new(match args.shell.as_deref() {
        Some(shell) => ShellCommandRunner::new(shell),
        None => ShellCommandRunner::from_config(&config),
    });
    let mut env = config.env_overrides();
    env.extend(args.env.iter().cloned());

    let mut ui = UiLoop::<PanelState>::new();
    let mut state = PanelState::new();
    state.event_log.append(format!(
        "Session started, {} request(s) queued",
        args.commands.len()
    ));

    for command in &args.commands {
        let request = RawRequest::new(command.clone()).envs(env.clone());
        let task_id = submit_raw_request(&mut ui, Arc::clone(&runner), request);
        tracing::debug!(task = %task_id, %command, "raw request submitted");
    }

    let mount_at = Instant::now() + Duration::from_millis(args.mount_delay_ms);
    let mut mounted = false;
    loop {
        if !mounted && Instant::now() >= mount_at {
            mounted = state
                .event_log
                .mount(Box::new(TerminalLogSurface::stdout()))
                .is_mounted();
        }
        if mounted && ui.is_idle() {
            break;
        }
        ui.pump_timeout(&mut state, config.pump_interval);
    }

    print_history(&state, args.json)
}

fn print_history(state: &PanelState, json: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    if json {
        let records = state.history.iter().collect::<Vec<_>>();
        serde_json::to_writer_pretty(&mut out, &records).context("failed to encode history")?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "History ({} record(s)):", state.history.len())?;
    for record in state.history.iter() {
        writeln!(
            out,
            "  #{:<3} exit {:<4} {}",
            record.ordinal,
            record.exit_code,
            record.summary()
        )?;
    }
    if state.event_log.dropped_count() > 0 {
        writeln!(
            out,
            "{} log line(s) could not be displayed",
            state.event_log.dropped_count()
        )?;
    }
    Ok(())
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing variable name in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
