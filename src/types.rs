use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel for text fields the catalog API left out.
pub const UNKNOWN: &str = "unknown";

// ---------------------------------------------------------------------------
// Product record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    #[serde(default = "unknown")]
    pub title: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    /// "Was" price the discount is computed against.
    #[serde(default)]
    pub reference_price: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub detail_url: String,
    #[serde(default = "unknown")]
    pub availability_text: String,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default = "unknown")]
    pub seller_name: String,
    #[serde(default)]
    pub is_primary_seller: bool,
    #[serde(default)]
    pub fetched_at: DateTime<Utc>,
    /// True when this id already appeared in an earlier snapshot.
    #[serde(default)]
    pub posted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<f64>,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discount {
    pub amount: f64,
    pub percent: f64,
}

impl Discount {
    /// A discount exists only when both prices are known and the reference
    /// price is strictly higher than the current one.
    pub fn between(current: Option<f64>, reference: Option<f64>) -> Option<Self> {
        let (current, reference) = (current?, reference?);
        if reference <= current {
            return None;
        }
        let amount = reference - current;
        Some(Self {
            amount,
            percent: amount / reference * 100.0,
        })
    }
}

impl ProductRecord {
    /// Discount derived from the record's prices, ignoring any stored fields.
    pub fn discount(&self) -> Option<Discount> {
        Discount::between(self.current_price, self.reference_price)
    }

    /// Re-derives the stored discount fields from the prices.
    pub fn refresh_discount(&mut self) {
        let d = self.discount();
        self.discount_amount = d.map(|d| d.amount);
        self.discount_percent = d.map(|d| d.percent);
    }

    /// Title cut to `max` characters for log lines.
    pub fn short_title(&self, max: usize) -> String {
        truncate_chars(&self.title, max)
    }
}

/// Char-boundary safe truncation; titles are routinely multi-byte.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

/// Previous-run view of one id, used by the restock rule.
#[derive(Debug, Clone, PartialEq)]
pub struct StockState {
    pub in_stock: bool,
    pub availability_text: String,
    pub current_price: Option<f64>,
}

// ---------------------------------------------------------------------------
// Tracking config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_min_discount")]
    pub min_discount_percent: f64,
    #[serde(default, alias = "amazon_only")]
    pub seller_only: bool,
    #[serde(default, alias = "tracking_asins")]
    pub tracked_ids: Vec<String>,
}

fn default_min_discount() -> f64 {
    crate::config::DEFAULT_MIN_DISCOUNT_PERCENT
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_discount_percent: default_min_discount(),
            seller_only: false,
            tracked_ids: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// What to do with an id that is in stock the first time it is ever seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColdStartPolicy {
    /// Record it, never notify. A first run over a catalog of in-stock items
    /// stays quiet.
    #[default]
    Suppress,
    /// Notify immediately when the first-party seller has it.
    NotifyPrimarySeller,
}

impl std::str::FromStr for ColdStartPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "suppress" => Ok(Self::Suppress),
            "notify_primary_seller" | "notify-primary-seller" => Ok(Self::NotifyPrimarySeller),
            other => Err(format!("unknown cold start policy: {other}")),
        }
    }
}

impl std::fmt::Display for ColdStartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ColdStartPolicy::Suppress => "suppress",
            ColdStartPolicy::NotifyPrimarySeller => "notify_primary_seller",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionFilters {
    pub min_discount_percent: f64,
    pub seller_only: bool,
    pub detect_restock: bool,
    pub detect_discount: bool,
    pub cold_start: ColdStartPolicy,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classified {
    pub restocked: Vec<ProductRecord>,
    /// Sorted by discount percent, highest first.
    pub discounted: Vec<ProductRecord>,
}

impl Classified {
    pub fn is_empty(&self) -> bool {
        self.restocked.is_empty() && self.discounted.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Discount,
    Restock,
    Generic,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Discount => "discount",
            EventKind::Restock => "restock",
            EventKind::Generic => "generic",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Everything a pass needs to know about how it was invoked. Built once in
/// `main` and handed to each component; nothing reads flags from globals.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub dry_run: bool,
    pub debug: bool,
    pub filters: DetectionFilters,
    pub threads_enabled: bool,
    pub microblog_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_requires_both_prices() {
        assert!(Discount::between(None, Some(100.0)).is_none());
        assert!(Discount::between(Some(100.0), None).is_none());
        assert!(Discount::between(None, None).is_none());
    }

    #[test]
    fn no_discount_when_reference_not_higher() {
        assert!(Discount::between(Some(100.0), Some(100.0)).is_none());
        assert!(Discount::between(Some(120.0), Some(100.0)).is_none());
    }

    #[test]
    fn discount_percent_is_exact() {
        let d = Discount::between(Some(1000.0), Some(2000.0)).expect("discount");
        assert_eq!(d.amount, 1000.0);
        assert_eq!(d.percent, 50.0);

        let d = Discount::between(Some(2980.0), Some(3980.0)).expect("discount");
        assert_eq!(d.percent, (3980.0 - 2980.0) / 3980.0 * 100.0);
    }

    #[test]
    fn refresh_discount_clears_stale_fields() {
        let mut rec: ProductRecord =
            serde_json::from_str(r#"{"id":"X","current_price":900.0,"reference_price":1000.0}"#)
                .expect("record");
        rec.refresh_discount();
        assert_eq!(rec.discount_amount, Some(100.0));

        rec.current_price = Some(1000.0);
        rec.refresh_discount();
        assert!(rec.discount_amount.is_none());
        assert!(rec.discount_percent.is_none());
        let json = serde_json::to_string(&rec).expect("json");
        assert!(!json.contains("discount_percent"));
    }

    #[test]
    fn sparse_record_fills_sentinels() {
        let rec: ProductRecord = serde_json::from_str(r#"{"id":"B000"}"#).expect("record");
        assert_eq!(rec.title, UNKNOWN);
        assert_eq!(rec.seller_name, UNKNOWN);
        assert_eq!(rec.availability_text, UNKNOWN);
        assert!(!rec.in_stock);
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_chars("スチームアイロン", 4), "スチーム…");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn tracking_config_reads_legacy_keys() {
        let cfg: TrackingConfig = serde_json::from_str(
            r#"{"min_discount_percent":20,"amazon_only":true,"tracking_asins":["A","B"]}"#,
        )
        .expect("config");
        assert!(cfg.seller_only);
        assert_eq!(cfg.tracked_ids, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(cfg.min_discount_percent, 20.0);
    }

    #[test]
    fn cold_start_policy_parses() {
        assert_eq!("suppress".parse::<ColdStartPolicy>(), Ok(ColdStartPolicy::Suppress));
        assert_eq!(
            "NOTIFY_PRIMARY_SELLER".parse::<ColdStartPolicy>(),
            Ok(ColdStartPolicy::NotifyPrimarySeller)
        );
        assert!("loud".parse::<ColdStartPolicy>().is_err());
    }
}
