//! dispatchq CLI: run a hook command for every instance key read from stdin.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dispatchq::config::Config;
use dispatchq::engine::{DispatchQueue, HookCommand, QueueSnapshot};
use dispatchq::model::{DispatchKey, InstanceKey};
use dispatchq::telemetry::{TelemetryConfig, init_telemetry};
use std::fmt::Write as _;
use std::future::Future;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Exit status after a second Ctrl-C (128 + SIGINT).
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "dispatchq", about = "Deduplicating, bounded-concurrency work dispatcher")]
struct Cli {
    /// TOML config file (defaults to environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read `host:port` keys from stdin, one per line, and run PROGRAM for each
    Run {
        /// Maximum concurrent hook invocations
        #[arg(long)]
        max_concurrency: Option<usize>,
        /// Print the final queue snapshot as JSON
        #[arg(long)]
        json: bool,
        /// Hook program followed by its arguments; the key is appended last
        #[arg(required = true, trailing_var_arg = true, num_args = 1..)]
        command: Vec<String>,
    },
    /// Parse keys and report whether they are valid
    Check {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env()?,
    };

    match cli.command {
        Command::Run {
            max_concurrency,
            json,
            command,
        } => cmd_run(config, max_concurrency, json, command).await,
        Command::Check { keys } => cmd_check(&keys),
    }
}

async fn cmd_run(
    mut config: Config,
    max_concurrency: Option<usize>,
    json: bool,
    command: Vec<String>,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.telemetry.endpoint.clone(),
        service_name: "dispatchq".to_string(),
        log_level: config.telemetry.log_level.clone(),
    })?;

    if let Some(n) = max_concurrency {
        config.queue.max_concurrency = n;
    }

    let (program, args) = command
        .split_first()
        .context("missing hook program")?;
    let hook = Arc::new(HookCommand::new(program, args.to_vec())?);
    info!(program = %hook.program().display(), "hook configured");

    let (tx, rx) = config.queue.input_channel()?;
    let queue = DispatchQueue::from_config(&config.queue, rx, move |key: InstanceKey| {
        let hook = Arc::clone(&hook);
        async move { hook.process(key).await }
    })?;
    let monitor = queue.monitor();

    // A blocking stdin read cannot be cancelled, so it gets its own thread
    // that nothing waits on. Interrupts close the queue input from the async side.
    let (line_tx, line_rx) = config.queue.input_channel()?;
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || read_keys(std::io::stdin().lock(), line_tx))
        .context("starting stdin reader")?;

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(watch_interrupts(stop_tx));
    let forwarder = tokio::spawn(forward_keys(line_rx, tx, async move {
        if stop_rx.await.is_err() {
            // No Ctrl-C handler; only end of input stops intake.
            std::future::pending::<()>().await;
        }
    }));

    queue.run().await;
    forwarder.await?;

    println!("{}", render_summary(&monitor.snapshot(), json)?);
    Ok(())
}

/// Map one stdin line to a key. `None` for `#` comments; blank lines give the
/// reserved empty key so the queue counts them as rejected.
fn parse_input_line(line: &str) -> Option<dispatchq::Result<InstanceKey>> {
    if line.trim_start().starts_with('#') {
        return None;
    }
    Some(line.parse())
}

/// Parse keys from `input` until end of input or until nobody is receiving.
fn read_keys(input: impl BufRead, tx: mpsc::Sender<InstanceKey>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("stdin read error: {e}");
                break;
            }
        };
        let key = match parse_input_line(&line) {
            None => continue,
            Some(Ok(key)) => key,
            Some(Err(e)) => {
                warn!("skipping input line: {e}");
                continue;
            }
        };
        if tx.blocking_send(key).is_err() {
            break;
        }
    }
}

/// Pass keys through to the queue until the reader finishes or `stop`
/// resolves. Returning drops `tx`, which starts the queue's drain.
async fn forward_keys(
    mut keys: mpsc::Receiver<InstanceKey>,
    tx: mpsc::Sender<InstanceKey>,
    stop: impl Future<Output = ()>,
) {
    tokio::pin!(stop);
    loop {
        let key = tokio::select! {
            () = &mut stop => {
                info!("no longer reading input, draining queued work");
                return;
            }
            key = keys.recv() => match key {
                Some(key) => key,
                None => return,
            },
        };
        if tx.send(key).await.is_err() {
            return;
        }
    }
}

/// First Ctrl-C stops intake; a second one exits without waiting for hooks.
async fn watch_interrupts(stop: oneshot::Sender<()>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        return;
    }
    info!("interrupted; press Ctrl-C again to exit immediately");
    let _ = stop.send(());

    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted again, exiting without draining");
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
}

fn render_summary(snapshot: &QueueSnapshot, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(snapshot)?);
    }

    let c = &snapshot.counters;
    let mut out = String::new();
    writeln!(out, "Received:   {}", c.received)?;
    writeln!(out, "Queued:     {}", c.queued)?;
    writeln!(out, "Merged:     {}", c.merged)?;
    writeln!(out, "Rejected:   {}", c.rejected)?;
    writeln!(out, "Dispatched: {}", c.dispatched)?;
    write!(out, "Completed:  {}", c.completed)?;
    Ok(out)
}

/// One report line per key, plus the number of invalid keys.
fn check_keys(keys: &[String]) -> (Vec<String>, usize) {
    let mut lines = Vec::with_capacity(keys.len());
    let mut invalid = 0;
    for raw in keys {
        match raw.parse::<InstanceKey>() {
            Ok(key) if key.is_valid() => lines.push(format!("ok       {key}")),
            Ok(_) => {
                invalid += 1;
                lines.push(format!("invalid  {raw:?}: empty key"));
            }
            Err(e) => {
                invalid += 1;
                lines.push(format!("invalid  {raw:?}: {e}"));
            }
        }
    }
    (lines, invalid)
}

fn cmd_check(keys: &[String]) -> anyhow::Result<()> {
    let (lines, invalid) = check_keys(keys);
    for line in &lines {
        println!("{line}");
    }

    if invalid > 0 {
        anyhow::bail!("{invalid} of {} key(s) invalid", keys.len());
    }
    Ok(())
}
