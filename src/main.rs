//! xtrace-store - report ingest CLI
//!
//! Reads framed X-Trace reports from stdin, one blank-line-terminated
//! block at a time, and feeds them into a [`xtrace_store::ReportStore`].
//! Shuts down cleanly on EOF, committing any outstanding metadata
//! before exiting.

use std::io::{self, BufRead};

use xtrace_store::config::StoreConfig;
use xtrace_store::store::ReportStore;

fn main() -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("xtrace-store v{} starting", xtrace_store::VERSION);

    let config = match StoreConfig::from_env() {
        Some(config) => config,
        None => {
            let root = std::env::args()
                .nth(1)
                .ok_or_else(|| anyhow::anyhow!("usage: xtrace-store <root-dir> (or set XTRACE_ROOT)"))?;
            StoreConfig::new(root)
        }
    };
    log::info!("report root: {}", config.root.display());

    let store = ReportStore::open(config)?;
    let tx = store.spawn_workers();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut block = String::new();
    let mut blocks_fed: u64 = 0;

    while let Some(line) = lines.next() {
        let line = line?;
        if line.trim().is_empty() {
            if !block.is_empty() {
                block.push('\n');
                tx.send(std::mem::take(&mut block))?;
                blocks_fed += 1;
            }
            continue;
        }
        block.push_str(&line);
        block.push('\n');
    }
    if !block.is_empty() {
        block.push('\n');
        tx.send(block)?;
        blocks_fed += 1;
    }

    log::info!("stdin exhausted, fed {blocks_fed} report blocks, shutting down");
    drop(tx);
    store.shutdown();

    let stats = store.stats();
    log::info!(
        "final counters: ingested={} dropped={} batches_committed={} lru_evictions={}",
        stats.reports_ingested,
        stats.reports_dropped,
        stats.updater_batches_committed,
        stats.lru_evictions,
    );

    Ok(())
}
