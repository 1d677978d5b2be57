//! # mkt-runner
//!
//! Entry point for the market stream publisher.
//!
//! Loads a JSON configuration file, builds the partitioned publisher, and
//! publishes match batches read as JSON lines (one `MatchBatch` per line)
//! from a file or stdin until EOF or Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! mkt-runner config.json --input batches.jsonl --log-level debug
//! engine | mkt-runner config.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mkt_core::MatchBatch;
use mkt_stream::{Dispatcher, ProducerPool};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Market Stream Publisher.
#[derive(Parser)]
#[command(name = "mkt-runner", about = "Partitioned market-event publisher")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// JSON-lines batch file; reads stdin when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log directory for file output; overrides the config's log path.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = mkt_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    let _log_guard = mkt_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name())?;

    info!(
        "mkt-runner starting — config={}, topic={}, partitions={}",
        cli.config.display(),
        config.pulsar.topic,
        config.pulsar.partitions,
    );

    // 3. Build the publisher and its background reporters
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(mkt_stream::create_dispatcher(&config, Some(err_tx))?);

    tokio::spawn(async move {
        while let Some(e) = err_rx.recv().await {
            warn!("transport error [{}]: {e}", e.code());
        }
    });

    if let Some(interval) = config.latency_print_interval() {
        let pool = Arc::clone(dispatcher.pool());
        tokio::spawn(async move { print_latency(pool, interval).await });
    }

    // 4. Publish until EOF or shutdown signal
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &cli.input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    tokio::select! {
        res = publish_lines(&dispatcher, reader) => {
            match res {
                Ok(n) => info!("input exhausted after {n} batch(es)"),
                Err(e) => error!("input error: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    // 5. Stop producers
    dispatcher.pool().shutdown().await;
    let markets = dispatcher.registry().snapshot();
    info!("{} market(s) known at exit — goodbye", markets.len());
    for market in &markets {
        debug!("known market {market}");
    }
    Ok(())
}

/// Publish one batch per input line. Returns the number of batches read.
async fn publish_lines(dispatcher: &Dispatcher, reader: impl AsyncBufRead + Unpin) -> Result<usize> {
    let mut lines = reader.lines();
    let mut count = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        count += 1;
        let batch: MatchBatch = match serde_json::from_str(&line) {
            Ok(b) => b,
            Err(e) => {
                error!("batch #{count}: invalid JSON: {e}");
                continue;
            }
        };

        let report = dispatcher.send_batch(&batch).await;
        match &report.error {
            None => info!("batch #{count}: {report}"),
            Some(e) => warn!("batch #{count}: {report} (code {})", e.code()),
        }
    }
    Ok(count)
}

async fn print_latency(pool: Arc<ProducerPool>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        for (topic, stats) in pool.take_latency_stats() {
            if let Some(stats) = stats {
                info!("[{topic}] publish latency: {stats}");
            }
        }
    }
}
