mod catalog;
mod cli;
mod config;
mod detector;
mod error;
mod notify;
mod state;
mod types;

#[cfg(test)]
mod test_support;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::catalog::{in_tracked_order, CatalogGateway};
use crate::cli::Cli;
use crate::config::{CatalogCredentials, Config};
use crate::detector::ChangeDetector;
use crate::error::Result;
use crate::notify::dispatcher::{enabled_publishers, DispatchReport};
use crate::notify::Dispatcher;
use crate::state::snapshot_store::{merge, previous_ids, stock_index};
use crate::state::tracking::{parse_inline_ids, read_id_file};
use crate::state::{SnapshotStore, TrackingStore};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    let level = if cli.debug { "debug" } else { cfg.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .init();

    if cli.is_add_mode() {
        if let Err(e) = add_ids(&cli, &cfg) {
            error!("[TRACKING] could not add ids: {e}");
        }
        return;
    }

    // No network activity without credentials.
    let creds = match cfg.catalog_credentials() {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        res = run(&cli, &cfg, &creds) => {
            if let Err(e) = res {
                error!("[RUN] stopped on unexpected error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("[RUN] interrupted, stopping (snapshot left as last written)");
        }
    }
}

fn add_ids(cli: &Cli, cfg: &Config) -> Result<()> {
    let mut ids = Vec::new();
    if let Some(raw) = &cli.add {
        ids.extend(parse_inline_ids(raw));
    }
    if let Some(path) = &cli.add_file {
        ids.extend(read_id_file(path)?);
    }
    if ids.is_empty() {
        warn!("[TRACKING] no ids given");
        return Ok(());
    }

    let added = TrackingStore::new(&cfg.tracking_file).add_identifiers(&ids)?;
    if added == 0 {
        info!("[TRACKING] nothing new to add");
    }
    Ok(())
}

async fn run(cli: &Cli, cfg: &Config, creds: &CatalogCredentials) -> Result<DispatchReport> {
    let tracking = TrackingStore::new(&cfg.tracking_file).load_or_init();
    let ctx = cli.run_context(&tracking, cfg.cold_start);
    if ctx.debug {
        debug!("[RUN] {ctx:?}");
    }

    if tracking.tracked_ids.is_empty() {
        error!("[RUN] {} lists no ids, nothing to check", cfg.tracking_file);
        return Ok(DispatchReport::default());
    }
    info!(
        tracked = tracking.tracked_ids.len(),
        min_discount = ctx.filters.min_discount_percent,
        seller_only = ctx.filters.seller_only,
        dry_run = ctx.dry_run,
        "[RUN] starting pass"
    );

    let snapshots = SnapshotStore::new(&cfg.snapshot_file);
    let previous = snapshots.load_previous();
    let previous_index = stock_index(&previous);
    info!(
        "[SNAPSHOT] {} previous records in {}",
        previous.len(),
        snapshots.path().display()
    );

    let gateway = CatalogGateway::from_config(cfg, creds)?;
    let (fetched, stats) = gateway.fetch_all(&tracking.tracked_ids).await;
    info!(
        chunks = stats.chunks,
        failed = stats.chunks_failed,
        "[CATALOG] fetched {} of {} ids",
        stats.records,
        tracking.tracked_ids.len()
    );

    let current = in_tracked_order(fetched, &tracking.tracked_ids);
    let classified = ChangeDetector::new(ctx.filters).classify(
        &current,
        &previous_index,
        &previous_ids(&previous),
    );

    // Persisted before dispatch.
    let merged = merge(&current, &previous);
    if !snapshots.save(&merged) {
        warn!("[SNAPSHOT] save failed, next run will diff against the old snapshot");
    }

    let publishers = enabled_publishers(cfg, &ctx)?;
    let report = Dispatcher::new(publishers, ctx.dry_run)
        .dispatch(&classified)
        .await;

    info!(
        fetched = current.len(),
        restocked = report.restock_candidates,
        discounted = report.discount_candidates,
        posted_items = report.items_dispatched,
        posts_ok = report.posts_ok,
        posts_failed = report.posts_failed,
        "[RUN] pass complete"
    );
    Ok(report)
}
