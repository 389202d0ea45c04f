use std::time::Duration;

use tracing::{info, warn};

use crate::config::message_limits::THREADS_MAX_CHARS;
use crate::config::{Config, POST_LIMIT, POST_PACING_SECS};
use crate::error::Result;
use crate::notify::message::{compose, compose_measured, format_yen};
use crate::notify::{MicroblogPublisher, Publisher, ThreadsPublisher};
use crate::types::{Classified, EventKind, ProductRecord, RunContext, UNKNOWN};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub restock_candidates: usize,
    pub discount_candidates: usize,
    /// Items handed to the publishers after capping.
    pub items_dispatched: usize,
    pub posts_ok: usize,
    pub posts_failed: usize,
}

/// Publishers enabled for this run, in dispatch order. Each skipped one is
/// logged with the reason.
pub fn enabled_publishers(cfg: &Config, ctx: &RunContext) -> Result<Vec<Box<dyn Publisher>>> {
    let mut out: Vec<Box<dyn Publisher>> = Vec::new();

    if !ctx.threads_enabled {
        info!("[DISPATCH] threads disabled by flag, skipped");
    } else if let Some(p) = ThreadsPublisher::from_config(cfg)? {
        out.push(Box::new(p));
    } else {
        info!("[DISPATCH] threads credentials incomplete, skipped");
    }

    if !ctx.microblog_enabled {
        info!("[DISPATCH] microblog disabled by flag, skipped");
    } else if let Some(p) = MicroblogPublisher::from_config(cfg)? {
        out.push(Box::new(p));
    } else {
        info!("[DISPATCH] MICROBLOG_ACCESS_TOKEN not set, microblog skipped");
    }

    Ok(out)
}

/// Hands classified events to the publishers: restock stream first, then
/// discounts, each capped at `limit`, with a fixed pause between items.
pub struct Dispatcher {
    publishers: Vec<Box<dyn Publisher>>,
    dry_run: bool,
    limit: usize,
    pacing: Duration,
}

impl Dispatcher {
    pub fn new(publishers: Vec<Box<dyn Publisher>>, dry_run: bool) -> Self {
        Self {
            publishers,
            dry_run,
            limit: POST_LIMIT,
            pacing: Duration::from_secs(POST_PACING_SECS),
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn dispatch(&self, classified: &Classified) -> DispatchReport {
        let mut report = DispatchReport {
            restock_candidates: classified.restocked.len(),
            discount_candidates: classified.discounted.len(),
            ..DispatchReport::default()
        };

        if classified.is_empty() {
            info!("[DISPATCH] nothing new to report");
            return report;
        }

        if self.dry_run {
            println!("{}", self.dry_run_output(classified));
            info!(
                restock = report.restock_candidates,
                discount = report.discount_candidates,
                "[DISPATCH] dry run, nothing posted"
            );
            return report;
        }

        if self.publishers.is_empty() {
            warn!(
                "[DISPATCH] no publishers enabled, {} events dropped",
                report.restock_candidates + report.discount_candidates
            );
            return report;
        }

        let queue = [
            (EventKind::Restock, &classified.restocked),
            (EventKind::Discount, &classified.discounted),
        ];
        for (kind, items) in queue {
            if items.is_empty() {
                continue;
            }
            let take = items.len().min(self.limit);
            if items.len() > take {
                info!("[DISPATCH] {kind}: {} candidates, posting the first {take}", items.len());
            } else {
                info!("[DISPATCH] {kind}: posting {take}");
            }

            for (i, record) in items.iter().take(take).enumerate() {
                if report.items_dispatched > 0 {
                    tokio::time::sleep(self.pacing).await;
                }
                info!(
                    "[DISPATCH] {kind} {}/{take}: {} ({})",
                    i + 1,
                    record.short_title(30),
                    record.id
                );
                self.publish_one(kind, record, &mut report).await;
                report.items_dispatched += 1;
            }
        }

        info!(
            items = report.items_dispatched,
            ok = report.posts_ok,
            failed = report.posts_failed,
            "[DISPATCH] done"
        );
        report
    }

    async fn publish_one(&self, kind: EventKind, record: &ProductRecord, report: &mut DispatchReport) {
        for publisher in &self.publishers {
            let text = compose_measured(kind, record, publisher.max_chars(), |t| publisher.text_len(t));
            let ok = publisher.publish(&text, record.image_url.as_deref()).await;
            if ok {
                report.posts_ok += 1;
                info!("[DISPATCH] {} {kind} {}: ok", publisher.name(), record.id);
            } else {
                report.posts_failed += 1;
                warn!("[DISPATCH] {} {kind} {}: failed", publisher.name(), record.id);
            }
        }
    }

    /// Summaries of the non-empty streams, restock first.
    fn dry_run_output(&self, classified: &Classified) -> String {
        [
            (EventKind::Restock, &classified.restocked),
            (EventKind::Discount, &classified.discounted),
        ]
        .into_iter()
        .filter(|(_, items)| !items.is_empty())
        .map(|(kind, items)| self.summary(kind, items))
        .collect::<Vec<_>>()
        .join("\n")
    }

    /// Console summary for dry runs: every candidate, uncapped, with the
    /// message it would be posted as.
    fn summary(&self, kind: EventKind, items: &[ProductRecord]) -> String {
        let max_chars = self
            .publishers
            .iter()
            .map(|p| p.max_chars())
            .max()
            .unwrap_or(THREADS_MAX_CHARS);
        let heading = match kind {
            EventKind::Restock => "入荷検知結果",
            EventKind::Discount => "割引検知結果",
            EventKind::Generic => "検知結果",
        };

        let mut out = format!("{}\n【{heading}: {}件】\n{}", "=".repeat(50), items.len(), "=".repeat(50));
        for (i, r) in items.iter().enumerate() {
            out.push_str(&format!("\n{}. {}\n   ASIN: {}\n", i + 1, r.title, r.id));
            match (kind, r.discount(), r.current_price, r.reference_price) {
                (EventKind::Discount, Some(d), Some(cur), Some(reference)) => {
                    out.push_str(&format!(
                        "   現在価格: {}\n   元の価格: {}\n   割引額: {} ({:.1}%オフ)\n",
                        format_yen(cur),
                        format_yen(reference),
                        format_yen(d.amount),
                        d.percent
                    ));
                }
                (_, _, Some(cur), _) => {
                    out.push_str(&format!("   価格: {}\n", format_yen(cur)));
                }
                _ => {}
            }
            if kind == EventKind::Restock {
                out.push_str(&format!("   在庫状況: {}\n", r.availability_text));
                if r.seller_name != UNKNOWN {
                    out.push_str(&format!("   販売元: {}\n", r.seller_name));
                }
            }
            out.push_str(&format!("   URL: {}\n", r.detail_url));
            if let Some(img) = &r.image_url {
                out.push_str(&format!("   画像: {img}\n"));
            }
            out.push_str("   --- message ---\n");
            out.push_str(&compose(kind, r, max_chars));
            out.push('\n');
        }
        out
    }
}
