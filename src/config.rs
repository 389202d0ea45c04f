use std::time::Duration;

use crate::error::{AppError, Result};
use crate::types::ColdStartPolicy;

pub const CATALOG_HOST: &str = "webservices.amazon.co.jp";
pub const CATALOG_PATH: &str = "/paapi5/getitems";
pub const CATALOG_REGION: &str = "us-west-2";
pub const CATALOG_SERVICE: &str = "ProductAdvertisingAPI";
pub const MARKETPLACE: &str = "www.amazon.co.jp";
pub const PRODUCT_PAGE_BASE: &str = "https://www.amazon.co.jp/dp";

pub const THREADS_GRAPH_URL: &str = "https://graph.threads.net/v1.0";
pub const THREADS_TOKEN_URL: &str = "https://graph.facebook.com/v18.0/oauth/access_token";
pub const MICROBLOG_API_URL: &str = "https://api.x.com";

pub const TRACKING_FILE: &str = "tracking_asins.json";
pub const SNAPSHOT_FILE: &str = "asin_results.json";

/// The catalog API accepts at most this many ids per GetItems call.
pub const MAX_BATCH_SIZE: usize = 10;

/// Wait between catalog chunks, and the base of the retry backoff.
pub const API_WAIT_SECS: u64 = 3;

/// Attempts per catalog chunk and per publish.
pub const MAX_ATTEMPTS: u32 = 3;

/// Base backoff between publish attempts.
pub const PUBLISH_RETRY_BASE_SECS: u64 = 2;

/// Wait between notification items, regardless of outcome.
pub const POST_PACING_SECS: u64 = 5;

/// Items published per stream per run.
pub const POST_LIMIT: usize = 5;

/// Snapshot retention cap.
pub const SNAPSHOT_CAP: usize = 500;

pub const REQUEST_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_MIN_DISCOUNT_PERCENT: f64 = 15.0;

/// Sample ids written to a freshly generated tracking file.
pub const SAMPLE_TRACKED_IDS: &[&str] = &[
    "B0CC944LHR",
    "B0C65KM3ZT",
    "B08JKFH23G",
    "B002VPUOOE",
    "B004Y9IXZW",
];

/// Message length limits per posting endpoint (characters).
pub mod message_limits {
    pub const THREADS_MAX_CHARS: usize = 500;
    pub const MICROBLOG_MAX_CHARS: usize = 280;
}

/// Bounded retry with exponential backoff: attempt `n` (1-based) that fails
/// waits `base * 2^(n-1)` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay * 2u32.pow(exp)
    }

    pub fn catalog() -> Self {
        Self::new(MAX_ATTEMPTS, Duration::from_secs(API_WAIT_SECS))
    }

    pub fn publish() -> Self {
        Self::new(MAX_ATTEMPTS, Duration::from_secs(PUBLISH_RETRY_BASE_SECS))
    }
}

/// Credentials needed before any catalog request can be made.
#[derive(Debug, Clone)]
pub struct CatalogCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub partner_tag: String,
}

#[derive(Debug, Clone, Default)]
pub struct ThreadsCredentials {
    pub account_id: Option<String>,
    pub long_lived_token: Option<String>,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
}

impl ThreadsCredentials {
    /// An account id plus either a long-lived token or an app id/secret pair.
    pub fn is_complete(&self) -> bool {
        self.account_id.is_some()
            && (self.long_lived_token.is_some()
                || (self.app_id.is_some() && self.app_secret.is_some()))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub pa_api_key: Option<String>,
    pub pa_api_secret: Option<String>,
    pub partner_tag: Option<String>,
    /// Host used for signing (CATALOG_HOST)
    pub catalog_host: String,
    /// Full endpoint base; defaults to `https://{catalog_host}` (CATALOG_BASE_URL)
    pub catalog_base_url: String,
    pub catalog_region: String,
    pub marketplace: String,
    pub tracking_file: String,
    pub snapshot_file: String,
    pub threads: ThreadsCredentials,
    pub threads_api_url: String,
    pub threads_token_url: String,
    /// OAuth2 user-context token for the micro-blog API (MICROBLOG_ACCESS_TOKEN)
    pub microblog_token: Option<String>,
    pub microblog_api_url: String,
    pub cold_start: ColdStartPolicy,
    /// Comma-separated override of the positive-stock marker phrases (STOCK_MARKERS)
    pub stock_markers: Vec<String>,
    /// Comma-separated override of the first-party seller names (PRIMARY_SELLERS)
    pub primary_sellers: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let catalog_host =
            std::env::var("CATALOG_HOST").unwrap_or_else(|_| CATALOG_HOST.to_string());
        let catalog_base_url = std::env::var("CATALOG_BASE_URL")
            .unwrap_or_else(|_| format!("https://{catalog_host}"));

        let cold_start = match env_opt("COLD_START_POLICY") {
            Some(v) => v.parse::<ColdStartPolicy>().map_err(AppError::Config)?,
            None => ColdStartPolicy::default(),
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            pa_api_key: env_opt("PA_API_KEY"),
            pa_api_secret: env_opt("PA_API_SECRET"),
            partner_tag: env_opt("PARTNER_TAG"),
            catalog_host,
            catalog_base_url,
            catalog_region: std::env::var("CATALOG_REGION")
                .unwrap_or_else(|_| CATALOG_REGION.to_string()),
            marketplace: std::env::var("MARKETPLACE").unwrap_or_else(|_| MARKETPLACE.to_string()),
            tracking_file: std::env::var("TRACKING_FILE")
                .unwrap_or_else(|_| TRACKING_FILE.to_string()),
            snapshot_file: std::env::var("SNAPSHOT_FILE")
                .unwrap_or_else(|_| SNAPSHOT_FILE.to_string()),
            threads: ThreadsCredentials {
                account_id: env_opt("THREADS_INSTAGRAM_ACCOUNT_ID"),
                long_lived_token: env_opt("THREADS_LONG_LIVED_TOKEN"),
                app_id: env_opt("THREADS_APP_ID"),
                app_secret: env_opt("THREADS_APP_SECRET"),
            },
            threads_api_url: std::env::var("THREADS_API_URL")
                .unwrap_or_else(|_| THREADS_GRAPH_URL.to_string()),
            threads_token_url: std::env::var("THREADS_TOKEN_URL")
                .unwrap_or_else(|_| THREADS_TOKEN_URL.to_string()),
            microblog_token: env_opt("MICROBLOG_ACCESS_TOKEN"),
            microblog_api_url: std::env::var("MICROBLOG_API_URL")
                .unwrap_or_else(|_| MICROBLOG_API_URL.to_string()),
            cold_start,
            stock_markers: split_list(&std::env::var("STOCK_MARKERS").unwrap_or_default()),
            primary_sellers: split_list(&std::env::var("PRIMARY_SELLERS").unwrap_or_default()),
        })
    }

    /// Pre-flight check for the detection pass. Missing catalog credentials
    /// are fatal and must be reported before any network activity.
    pub fn catalog_credentials(&self) -> Result<CatalogCredentials> {
        let missing: Vec<&str> = [
            ("PA_API_KEY", &self.pa_api_key),
            ("PA_API_SECRET", &self.pa_api_secret),
            ("PARTNER_TAG", &self.partner_tag),
        ]
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();

        match (&self.pa_api_key, &self.pa_api_secret, &self.partner_tag) {
            (Some(access_key), Some(secret_key), Some(partner_tag)) => Ok(CatalogCredentials {
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
                partner_tag: partner_tag.clone(),
            }),
            _ => Err(AppError::Config(format!(
                "missing catalog credentials: {}",
                missing.join(", ")
            ))),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
