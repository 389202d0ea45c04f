use std::path::PathBuf;

use clap::Parser;

use crate::types::{ColdStartPolicy, DetectionFilters, RunContext, TrackingConfig};

/// Price-drop and restock tracker for a fixed list of catalog ids.
#[derive(Parser, Debug, Clone)]
#[command(name = "tracker", about = "Watch tracked ids for discounts and restocks")]
pub struct Cli {
    /// Detect and print, but post nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Force debug logging regardless of LOG_LEVEL
    #[arg(long)]
    pub debug: bool,

    /// Minimum discount percent; overrides the tracking file
    #[arg(long, value_name = "PCT")]
    pub min_discount: Option<f64>,

    /// Only items sold by the first-party seller
    #[arg(long, alias = "amazon-only")]
    pub seller_only: bool,

    /// Restock detection only
    #[arg(long, conflicts_with = "discount_only")]
    pub stock_only: bool,

    /// Discount detection only
    #[arg(long)]
    pub discount_only: bool,

    /// Do not post to Threads
    #[arg(long)]
    pub no_threads: bool,

    /// Do not post to the microblog
    #[arg(long)]
    pub no_microblog: bool,

    /// Comma-separated ids to add to the tracking file, then exit
    #[arg(long, value_name = "IDS")]
    pub add: Option<String>,

    /// File of ids (one per line) to add to the tracking file, then exit
    #[arg(long, value_name = "PATH")]
    pub add_file: Option<PathBuf>,
}

impl Cli {
    pub fn is_add_mode(&self) -> bool {
        self.add.is_some() || self.add_file.is_some()
    }

    /// Flags win over the tracking file; `seller_only` is on if either
    /// asks for it.
    pub fn run_context(&self, tracking: &TrackingConfig, cold_start: ColdStartPolicy) -> RunContext {
        RunContext {
            dry_run: self.dry_run,
            debug: self.debug,
            filters: DetectionFilters {
                min_discount_percent: self.min_discount.unwrap_or(tracking.min_discount_percent),
                seller_only: self.seller_only || tracking.seller_only,
                detect_restock: !self.discount_only,
                detect_discount: !self.stock_only,
                cold_start,
            },
            threads_enabled: !self.no_threads,
            microblog_enabled: !self.no_microblog,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tracker").chain(args.iter().copied()))
            .expect("valid args")
    }

    #[test]
    fn defaults_follow_tracking_file() {
        let tracking = TrackingConfig {
            min_discount_percent: 25.0,
            seller_only: true,
            tracked_ids: vec![],
        };
        let ctx = parse(&[]).run_context(&tracking, ColdStartPolicy::Suppress);
        assert_eq!(ctx.filters.min_discount_percent, 25.0);
        assert!(ctx.filters.seller_only);
        assert!(ctx.filters.detect_restock && ctx.filters.detect_discount);
        assert!(ctx.threads_enabled && ctx.microblog_enabled);
        assert!(!ctx.dry_run);
    }

    #[test]
    fn flags_override() {
        let cli = parse(&[
            "--dry-run",
            "--min-discount",
            "40",
            "--amazon-only",
            "--stock-only",
            "--no-microblog",
        ]);
        let ctx = cli.run_context(&TrackingConfig::default(), ColdStartPolicy::NotifyPrimarySeller);
        assert!(ctx.dry_run);
        assert_eq!(ctx.filters.min_discount_percent, 40.0);
        assert!(ctx.filters.seller_only);
        assert!(ctx.filters.detect_restock);
        assert!(!ctx.filters.detect_discount);
        assert!(ctx.threads_enabled);
        assert!(!ctx.microblog_enabled);
        assert_eq!(ctx.filters.cold_start, ColdStartPolicy::NotifyPrimarySeller);
    }

    #[test]
    fn stock_only_and_discount_only_conflict() {
        assert!(Cli::try_parse_from(["tracker", "--stock-only", "--discount-only"]).is_err());
    }

    #[test]
    fn add_mode() {
        assert!(parse(&["--add", "B0CC944LHR,B0C65KM3ZT"]).is_add_mode());
        assert!(parse(&["--add-file", "ids.txt"]).is_add_mode());
        assert!(!parse(&["--debug"]).is_add_mode());
    }
}
