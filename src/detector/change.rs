use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::detector::classifier::{emits_restock, stock_transition, StockTransition};
use crate::types::{Classified, DetectionFilters, ProductRecord, StockState};

/// Diffs one run's records against the previous snapshot.
///
/// Restock rule: an id whose previous entry was out of stock and is in stock
/// now. An id with no previous entry is a cold start and is handled by
/// `filters.cold_start` (suppressed by default).
///
/// Discount rule: records with a discount of at least
/// `filters.min_discount_percent`, excluding ids already present in the
/// previous snapshot, sorted by discount percent descending. Ties keep the
/// order of `current`.
///
/// The detector holds no state; classifying the same input twice gives the
/// same output.
pub struct ChangeDetector {
    filters: DetectionFilters,
}

impl ChangeDetector {
    pub fn new(filters: DetectionFilters) -> Self {
        Self { filters }
    }

    /// `current` is this run's records in tracked order, one per id.
    pub fn classify(
        &self,
        current: &[ProductRecord],
        previous_index: &HashMap<String, StockState>,
        previous_ids: &HashSet<String>,
    ) -> Classified {
        Classified {
            restocked: if self.filters.detect_restock {
                self.restocked(current, previous_index)
            } else {
                Vec::new()
            },
            discounted: if self.filters.detect_discount {
                self.discounted(current, previous_ids)
            } else {
                Vec::new()
            },
        }
    }

    fn passes_seller_filter(&self, r: &ProductRecord) -> bool {
        !self.filters.seller_only || r.is_primary_seller
    }

    fn restocked(
        &self,
        current: &[ProductRecord],
        previous_index: &HashMap<String, StockState>,
    ) -> Vec<ProductRecord> {
        let mut out = Vec::new();

        for r in current {
            if !self.passes_seller_filter(r) {
                info!(
                    "[DETECT] not first-party, skipped: {} ({}) seller={}",
                    r.short_title(30),
                    r.id,
                    r.seller_name
                );
                continue;
            }

            let prev = previous_index.get(&r.id);
            let transition = stock_transition(prev, r.in_stock);
            let emit = emits_restock(transition, r.is_primary_seller, self.filters.cold_start);

            match (transition, prev) {
                (StockTransition::Restocked, Some(prev)) => {
                    info!(
                        was = %prev.availability_text,
                        previous_price = ?prev.current_price,
                        price = ?r.current_price,
                        "[DETECT] restocked: {} ({})",
                        r.short_title(30),
                        r.id
                    );
                }
                (StockTransition::FirstSeenInStock, _) if emit => {
                    info!(
                        "[DETECT] first seen in stock from first-party seller, notifying: {} ({})",
                        r.short_title(30),
                        r.id
                    );
                }
                (StockTransition::FirstSeenInStock, _) => {
                    info!(
                        "[DETECT] first seen in stock, not notified ({} policy): {} ({})",
                        self.filters.cold_start,
                        r.short_title(30),
                        r.id
                    );
                }
                (StockTransition::SoldOut, _) => {
                    debug!("[DETECT] went out of stock: {}", r.id);
                }
                _ => {}
            }

            if emit {
                out.push(r.clone());
            }
        }
        out
    }

    fn discounted(
        &self,
        current: &[ProductRecord],
        previous_ids: &HashSet<String>,
    ) -> Vec<ProductRecord> {
        let mut with_discount: Vec<(ProductRecord, f64)> = current
            .iter()
            .filter_map(|r| {
                let d = r.discount()?;
                let mut r = r.clone();
                r.discount_amount = Some(d.amount);
                r.discount_percent = Some(d.percent);
                Some((r, d.percent))
            })
            .collect();
        let found = with_discount.len();

        with_discount.retain(|(r, _)| self.passes_seller_filter(r));
        if self.filters.seller_only {
            info!(
                "[DETECT] first-party filter: {} of {found} discounted items remain",
                with_discount.len()
            );
        }

        with_discount.retain(|(_, pct)| *pct >= self.filters.min_discount_percent);

        with_discount.retain(|(r, pct)| {
            let seen = previous_ids.contains(&r.id);
            if seen {
                debug!(
                    "[DETECT] {} at {pct:.1}% off already in previous snapshot, suppressed",
                    r.id
                );
            }
            !seen
        });

        // Stable: equal percentages keep tracked order.
        with_discount.sort_by(|a, b| b.1.total_cmp(&a.1));

        if !with_discount.is_empty() {
            info!("[DETECT] {} new discounted items", with_discount.len());
        }
        with_discount.into_iter().map(|(r, _)| r).collect()
    }
}
