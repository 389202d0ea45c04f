use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::markers::MarkerTable;
use crate::catalog::normalize::normalize_item;
use crate::catalog::signer::{HmacChainSigner, SignInput, Signer};
use crate::config::{
    CatalogCredentials, Config, RetryPolicy, API_WAIT_SECS, CATALOG_PATH, CATALOG_SERVICE,
    MAX_BATCH_SIZE, REQUEST_TIMEOUT_SECS,
};
use crate::error::Result;
use crate::types::ProductRecord;

const OPERATION: &str = "GetItems";

/// Resources requested for every item.
const RESOURCES: &[&str] = &[
    "ItemInfo.Title",
    "Offers.Listings.Price",
    "Offers.Listings.SavingBasis",
    "Images.Primary.Large",
    "Offers.Listings.Availability.Message",
    "Offers.Listings.DeliveryInfo.IsAmazonFulfilled",
    "Offers.Listings.MerchantInfo",
];

#[derive(Debug, Default)]
pub struct FetchStats {
    pub chunks: usize,
    /// Chunks that produced nothing after every attempt.
    pub chunks_failed: usize,
    pub records: usize,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Scheme + authority the request is sent to.
    pub base_url: String,
    /// Host name covered by the signature.
    pub host: String,
    pub path: String,
    pub partner_tag: String,
    pub marketplace: String,
    pub markers: MarkerTable,
    pub retry: RetryPolicy,
    /// Pause between consecutive chunks.
    pub chunk_pause: Duration,
}

/// Why a single attempt at a chunk produced nothing.
#[derive(Debug)]
enum ChunkFailure {
    RateLimited,
    Status(u16, String),
    ErrorEnvelope(String),
    Transport(reqwest::Error),
    Malformed(String),
    Signing(String),
}

impl std::fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkFailure::RateLimited => write!(f, "rate limited (429)"),
            ChunkFailure::Status(code, body) => write!(f, "status {code}: {body}"),
            ChunkFailure::ErrorEnvelope(errors) => write!(f, "error envelope: {errors}"),
            ChunkFailure::Transport(e) => write!(f, "transport: {e}"),
            ChunkFailure::Malformed(why) => write!(f, "malformed body: {why}"),
            ChunkFailure::Signing(why) => write!(f, "signing: {why}"),
        }
    }
}

/// Signed, batched, retrying client for the catalog API. Holds no state
/// between calls beyond its configuration.
pub struct CatalogGateway {
    client: reqwest::Client,
    signer: Box<dyn Signer>,
    settings: GatewaySettings,
}

impl CatalogGateway {
    pub fn new(settings: GatewaySettings, signer: Box<dyn Signer>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, signer, settings })
    }

    pub fn from_config(cfg: &Config, creds: &CatalogCredentials) -> Result<Self> {
        let signer = HmacChainSigner::new(
            creds.access_key.clone(),
            creds.secret_key.clone(),
            cfg.catalog_region.clone(),
            CATALOG_SERVICE,
        );
        let settings = GatewaySettings {
            base_url: cfg.catalog_base_url.clone(),
            host: cfg.catalog_host.clone(),
            path: CATALOG_PATH.to_string(),
            partner_tag: creds.partner_tag.clone(),
            marketplace: cfg.marketplace.clone(),
            markers: MarkerTable::new(cfg.stock_markers.clone(), cfg.primary_sellers.clone()),
            retry: RetryPolicy::catalog(),
            chunk_pause: Duration::from_secs(API_WAIT_SECS),
        };
        Self::new(settings, Box::new(signer))
    }

    /// Fetch every id, `MAX_BATCH_SIZE` at a time, pausing between chunks.
    /// Failed chunks contribute no records.
    pub async fn fetch_all(&self, ids: &[String]) -> (HashMap<String, ProductRecord>, FetchStats) {
        let mut out = HashMap::new();
        let mut stats = FetchStats::default();

        for (i, chunk) in ids.chunks(MAX_BATCH_SIZE).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.chunk_pause).await;
            }
            stats.chunks += 1;
            let records = self.fetch_batch(chunk).await;
            if records.is_empty() {
                stats.chunks_failed += 1;
            }
            out.extend(records);
        }

        stats.records = out.len();
        (out, stats)
    }

    /// One call for at most `MAX_BATCH_SIZE` ids. Never fails: exhausting the
    /// retries yields an empty map.
    pub async fn fetch_batch(&self, ids: &[String]) -> HashMap<String, ProductRecord> {
        let ids = if ids.len() > MAX_BATCH_SIZE {
            warn!(
                "[CATALOG] batch of {} ids exceeds the per-call limit, only the first {MAX_BATCH_SIZE} are requested",
                ids.len()
            );
            &ids[..MAX_BATCH_SIZE]
        } else {
            ids
        };
        if ids.is_empty() {
            return HashMap::new();
        }

        info!("[CATALOG] fetching {} ids: {}", ids.len(), ids.join(", "));
        let retry = self.settings.retry;

        for attempt in 1..=retry.max_attempts {
            match self.request_items(ids).await {
                Ok(items) => {
                    let fetched_at = Utc::now();
                    let records: HashMap<String, ProductRecord> = items
                        .iter()
                        .filter_map(|item| {
                            normalize_item(
                                item,
                                &self.settings.partner_tag,
                                &self.settings.markers,
                                fetched_at,
                            )
                        })
                        .map(|r| (r.id.clone(), r))
                        .collect();
                    debug!(
                        requested = ids.len(),
                        returned = records.len(),
                        attempt,
                        "[CATALOG] chunk ok"
                    );
                    return records;
                }
                Err(failure) => {
                    if attempt < retry.max_attempts {
                        let wait = retry.delay_after(attempt);
                        warn!(
                            "[CATALOG] attempt {attempt}/{} failed: {failure}; retrying in {}ms",
                            retry.max_attempts,
                            wait.as_millis()
                        );
                        tokio::time::sleep(wait).await;
                    } else {
                        warn!(
                            "[CATALOG] attempt {attempt}/{} failed: {failure}; giving up on {}",
                            retry.max_attempts,
                            ids.join(", ")
                        );
                    }
                }
            }
        }

        HashMap::new()
    }

    async fn request_items(&self, ids: &[String]) -> std::result::Result<Vec<Value>, ChunkFailure> {
        let payload = serde_json::json!({
            "ItemIds": ids,
            "Resources": RESOURCES,
            "PartnerTag": self.settings.partner_tag,
            "PartnerType": "Associates",
            "Marketplace": self.settings.marketplace,
        })
        .to_string();

        let headers = self
            .signer
            .sign(&SignInput {
                host: &self.settings.host,
                path: &self.settings.path,
                payload: &payload,
                operation: OPERATION,
                timestamp: Utc::now(),
            })
            .map_err(|e| ChunkFailure::Signing(e.to_string()))?;

        let url = format!("{}{}", self.settings.base_url, self.settings.path);
        let mut req = self.client.post(&url).body(payload);
        for (name, value) in &headers {
            // reqwest derives Host from the URL.
            if name != "host" {
                req = req.header(name.as_str(), value.as_str());
            }
        }

        let resp = req.send().await.map_err(ChunkFailure::Transport)?;
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ChunkFailure::RateLimited);
        }
        let text = resp.text().await.map_err(ChunkFailure::Transport)?;
        if status != reqwest::StatusCode::OK {
            let sample: String = text.chars().take(300).collect();
            return Err(ChunkFailure::Status(status.as_u16(), sample));
        }

        let data: Value =
            serde_json::from_str(&text).map_err(|e| ChunkFailure::Malformed(e.to_string()))?;
        parse_items(&data)
    }
}

/// Pull `ItemsResult.Items` out of a response body. Any `Errors` key fails
/// the attempt, even when items came back next to it.
fn parse_items(data: &Value) -> std::result::Result<Vec<Value>, ChunkFailure> {
    if let Some(errors) = data.get("Errors") {
        return Err(ChunkFailure::ErrorEnvelope(errors.to_string()));
    }
    data.pointer("/ItemsResult/Items")
        .and_then(|i| i.as_array())
        .cloned()
        .ok_or_else(|| ChunkFailure::Malformed("missing ItemsResult.Items".to_string()))
}

/// Lay fetched records out in tracked-id order, each id at most once.
pub fn in_tracked_order(
    mut batch: HashMap<String, ProductRecord>,
    tracked: &[String],
) -> Vec<ProductRecord> {
    tracked.iter().filter_map(|id| batch.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde_json::json;

    use super::*;
    use crate::test_support::{record, spawn_stub};

    fn settings(base_url: String) -> GatewaySettings {
        GatewaySettings {
            base_url,
            host: "webservices.amazon.co.jp".to_string(),
            path: CATALOG_PATH.to_string(),
            partner_tag: "mytag-22".to_string(),
            marketplace: "www.amazon.co.jp".to_string(),
            markers: MarkerTable::default(),
            retry: RetryPolicy::new(3, Duration::from_millis(50)),
            chunk_pause: Duration::from_millis(5),
        }
    }

    fn gateway(base_url: String) -> CatalogGateway {
        let signer = HmacChainSigner::new("AKID", "secret", "us-west-2", CATALOG_SERVICE);
        CatalogGateway::new(settings(base_url), Box::new(signer)).expect("gateway")
    }

    /// Echo back one in-stock item per requested id.
    fn items_for(body: &str) -> Value {
        let req: Value = serde_json::from_str(body).expect("request json");
        let items: Vec<Value> = req["ItemIds"]
            .as_array()
            .expect("ItemIds")
            .iter()
            .map(|id| {
                json!({
                    "ASIN": id,
                    "ItemInfo": {"Title": {"DisplayValue": format!("Item {}", id.as_str().unwrap_or(""))}},
                    "Offers": {"Listings": [{
                        "Price": {"Amount": 1000.0},
                        "SavingBasis": {"Amount": 2000.0},
                        "Availability": {"Message": "在庫あり。"},
                        "MerchantInfo": {"Name": "Amazon.co.jp"}
                    }]}
                })
            })
            .collect();
        json!({"ItemsResult": {"Items": items}})
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn rate_limit_then_success_returns_records_after_backoff() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new().route(
            CATALOG_PATH,
            post(move |body: String| {
                let h = h.clone();
                async move {
                    if h.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::TOO_MANY_REQUESTS, String::new())
                    } else {
                        (StatusCode::OK, items_for(&body).to_string())
                    }
                }
            }),
        );
        let gw = gateway(spawn_stub(app).await);

        let started = Instant::now();
        let out = gw.fetch_batch(&ids(&["B0CC944LHR"])).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(50));
        let rec = out.get("B0CC944LHR").expect("record");
        assert_eq!(rec.discount_percent, Some(50.0));
    }

    #[tokio::test]
    async fn exhausted_retries_yield_empty_result() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new().route(
            CATALOG_PATH,
            post(move || {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string())
                }
            }),
        );
        let gw = gateway(spawn_stub(app).await);

        let out = gw.fetch_batch(&ids(&["A", "B"])).await;
        assert!(out.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn error_envelope_and_malformed_body_are_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new().route(
            CATALOG_PATH,
            post(move |body: String| {
                let h = h.clone();
                async move {
                    match h.fetch_add(1, Ordering::SeqCst) {
                        0 => (
                            StatusCode::OK,
                            json!({"Errors": [{"Code": "TooManyRequests"}]}).to_string(),
                        ),
                        1 => (StatusCode::OK, "{\"ItemsResult\": ".to_string()),
                        _ => (StatusCode::OK, items_for(&body).to_string()),
                    }
                }
            }),
        );
        let gw = gateway(spawn_stub(app).await);

        let out = gw.fetch_batch(&ids(&["A"])).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(out.contains_key("A"));
    }

    #[tokio::test]
    async fn errors_next_to_items_fail_the_chunk() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let app = Router::new().route(
            CATALOG_PATH,
            post(move |body: String| {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    let mut v = items_for(&body);
                    v["Errors"] = json!([{"Code": "InvalidParameterValue", "Message": "bad id"}]);
                    (StatusCode::OK, v.to_string())
                }
            }),
        );
        let gw = gateway(spawn_stub(app).await);
        let out = gw.fetch_batch(&ids(&["A"])).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn requests_are_signed_and_carry_the_payload() {
        let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let app = Router::new().route(
            CATALOG_PATH,
            post(move |headers: HeaderMap, body: String| {
                let s = s.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    s.lock().unwrap().push((auth, body.clone()));
                    (StatusCode::OK, items_for(&body).to_string())
                }
            }),
        );
        let gw = gateway(spawn_stub(app).await);
        gw.fetch_batch(&ids(&["B0CC944LHR"])).await;

        let seen = seen.lock().unwrap();
        let (auth, body) = &seen[0];
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKID/"));
        let payload: Value = serde_json::from_str(body).expect("payload");
        assert_eq!(payload["PartnerTag"], "mytag-22");
        assert_eq!(payload["PartnerType"], "Associates");
        assert_eq!(payload["ItemIds"], json!(["B0CC944LHR"]));
    }

    #[tokio::test]
    async fn fetch_all_chunks_by_ten() {
        let sizes: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let s = sizes.clone();
        let app = Router::new().route(
            CATALOG_PATH,
            post(move |body: String| {
                let s = s.clone();
                async move {
                    let req: Value = serde_json::from_str(&body).expect("json");
                    s.lock().unwrap().push(req["ItemIds"].as_array().map_or(0, |a| a.len()));
                    (StatusCode::OK, items_for(&body).to_string())
                }
            }),
        );
        let gw = gateway(spawn_stub(app).await);
        let all: Vec<String> = (0..23).map(|i| format!("ID{i:02}")).collect();

        let (out, stats) = gw.fetch_all(&all).await;
        assert_eq!(*sizes.lock().unwrap(), vec![10, 10, 3]);
        assert_eq!(out.len(), 23);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.chunks_failed, 0);
        assert_eq!(stats.records, 23);
    }

    #[tokio::test]
    async fn transport_failure_degrades_to_empty() {
        // Nothing listens on this port once the listener is dropped.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let gw = gateway(format!("http://{addr}"));
        assert!(gw.fetch_batch(&ids(&["A"])).await.is_empty());
    }

    #[test]
    fn tracked_order_is_kept_and_duplicates_dropped() {
        let mut batch = HashMap::new();
        for id in ["C", "A", "B"] {
            batch.insert(id.to_string(), record(id));
        }
        let tracked = ids(&["A", "X", "B", "A", "C"]);
        let ordered: Vec<String> = in_tracked_order(batch, &tracked)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ordered, vec!["A", "B", "C"]);
    }

    #[test]
    fn body_without_items_or_errors_is_malformed() {
        assert!(matches!(
            parse_items(&json!({"Foo": 1})),
            Err(ChunkFailure::Malformed(_))
        ));
        assert!(matches!(
            parse_items(&json!({"Errors": []})),
            Err(ChunkFailure::ErrorEnvelope(_))
        ));
        assert!(matches!(
            parse_items(&json!({"ItemsResult": {"Items": [{"ASIN": "A"}]}, "Errors": []})),
            Err(ChunkFailure::ErrorEnvelope(_))
        ));
        assert_eq!(
            parse_items(&json!({"ItemsResult": {"Items": []}})).map(|v| v.len()).ok(),
            Some(0)
        );
    }
}
