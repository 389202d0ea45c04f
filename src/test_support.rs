//! Fixtures shared by the inline test modules.

use axum::Router;
use chrono::{TimeZone, Utc};

use crate::types::{ColdStartPolicy, DetectionFilters, ProductRecord};

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve stub") });
    format!("http://{addr}")
}

pub fn record(id: &str) -> ProductRecord {
    ProductRecord {
        id: id.to_string(),
        title: format!("Product {id}"),
        current_price: None,
        reference_price: None,
        image_url: None,
        detail_url: format!("https://www.amazon.co.jp/dp/{id}?tag=test-22"),
        availability_text: "在庫あり。".to_string(),
        in_stock: true,
        seller_name: "Amazon.co.jp".to_string(),
        is_primary_seller: true,
        fetched_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        posted: false,
        discount_amount: None,
        discount_percent: None,
    }
}

pub fn priced(id: &str, current: f64, reference: f64) -> ProductRecord {
    let mut r = record(id);
    r.current_price = Some(current);
    r.reference_price = Some(reference);
    r.refresh_discount();
    r
}

pub fn out_of_stock(id: &str) -> ProductRecord {
    let mut r = record(id);
    r.in_stock = false;
    r.availability_text = "現在在庫切れです。".to_string();
    r
}

pub fn filters() -> DetectionFilters {
    DetectionFilters {
        min_discount_percent: 15.0,
        seller_only: false,
        detect_restock: true,
        detect_discount: true,
        cold_start: ColdStartPolicy::Suppress,
    }
}
