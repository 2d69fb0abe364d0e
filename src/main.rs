use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use tunnelstats::config::Config;
use tunnelstats::export::health::HealthMetrics;
use tunnelstats::feed::parse_line;
use tunnelstats::sink::StatsdSink;
use tunnelstats::{Flusher, StatsQueue};

/// Coalescing StatsD buffer for tunnel lifecycle events.
///
/// Reads `<kind> <timestamp> <entity> <value>` lines from stdin.
#[derive(Parser)]
#[command(name = "tunnelstats", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    /// Overrides `log_level` from the config file.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!(
            "tunnelstats {} ({}/{})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH,
        );
        return Ok(());
    }

    let cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let mut cfg = Config::default();
            cfg.resolve_hostname();
            cfg
        }
    };

    let log_level = cli.log_level.as_deref().unwrap_or(&cfg.log_level);
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level: {log_level}"))?;

    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        stats_enabled = cfg.stats.enabled,
        statsd = %cfg.stats.sink_addr(),
        hostname = %cfg.stats.hostname,
        "starting tunnelstats",
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let result = rt.block_on(async { run(cfg).await });

    // Stdin reads park a blocking thread; don't wait on it.
    rt.shutdown_timeout(Duration::from_secs(1));

    result
}

async fn run(cfg: Config) -> Result<()> {
    let health = if cfg.health.enabled {
        let health = Arc::new(HealthMetrics::new(&cfg.health.addr)?);
        health.start().await?;
        Some(health)
    } else {
        None
    };

    let mut queue = StatsQueue::<StatsdSink>::new(&cfg.stats);
    if let Some(health) = &health {
        queue = queue.with_health(Arc::clone(health));
    }
    let queue = Arc::new(queue);

    let cancel = CancellationToken::new();
    let flusher = Flusher::new(Arc::clone(&queue), cfg.stats.flush_interval);
    flusher.start(cancel.clone()).await;

    let feeder = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { feed_stdin(&queue).await })
    };

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("registering SIGTERM handler")?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
        res = feeder => {
            match res {
                Ok(Ok(())) => tracing::info!("input closed, shutting down"),
                Ok(Err(e)) => tracing::error!(error = %e, "reading input failed"),
                Err(e) => tracing::error!(error = %e, "input task failed"),
            }
        }
    }

    // Final drain happens in the flusher task.
    cancel.cancel();
    flusher.wait_for_shutdown().await;

    if let Some(health) = &health {
        health.stop().await?;
    }

    tracing::info!("tunnelstats stopped");

    Ok(())
}

/// Pushes every parseable stdin line into the queue until EOF.
async fn feed_stdin(queue: &StatsQueue<StatsdSink>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        match parse_line(&line) {
            Ok(Some(ev)) => {
                queue.push(ev.kind, ev.timestamp, ev.entity, ev.value);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, line = %line, "skipping malformed line"),
        }
    }

    Ok(())
}
