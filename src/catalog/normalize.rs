use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::catalog::markers::MarkerTable;
use crate::config::PRODUCT_PAGE_BASE;
use crate::types::{ProductRecord, UNKNOWN};

/// Build a canonical record from one `ItemsResult.Items[]` entry.
/// Returns None only when the item carries no `ASIN`; every other missing
/// field falls back to its default.
pub fn normalize_item(
    item: &Value,
    partner_tag: &str,
    markers: &MarkerTable,
    fetched_at: DateTime<Utc>,
) -> Option<ProductRecord> {
    let id = item
        .get("ASIN")
        .and_then(|a| a.as_str())
        .filter(|a| !a.is_empty())?
        .to_string();

    let title = item
        .pointer("/ItemInfo/Title/DisplayValue")
        .and_then(|t| t.as_str())
        .unwrap_or(UNKNOWN)
        .to_string();

    let listing = item.pointer("/Offers/Listings/0");

    let current_price = listing
        .and_then(|l| l.pointer("/Price/Amount"))
        .and_then(as_amount);
    let reference_price = listing
        .and_then(|l| l.pointer("/SavingBasis/Amount"))
        .and_then(as_amount);

    let availability_text = listing
        .and_then(|l| l.pointer("/Availability/Message"))
        .and_then(|m| m.as_str())
        .unwrap_or(UNKNOWN)
        .to_string();
    let in_stock = markers.is_in_stock(&availability_text);

    let seller_name = listing
        .and_then(|l| l.pointer("/MerchantInfo/Name"))
        .and_then(|n| n.as_str())
        .unwrap_or(UNKNOWN)
        .to_string();
    let is_primary_seller = markers.is_primary_seller(&seller_name);

    let image_url = item
        .pointer("/Images/Primary/Large/URL")
        .and_then(|u| u.as_str())
        .map(|s| s.to_string());

    let detail_url = match item.get("DetailPageURL").and_then(|u| u.as_str()) {
        Some(url) if !url.is_empty() => ensure_partner_tag(url, partner_tag),
        _ => ensure_partner_tag(&format!("{PRODUCT_PAGE_BASE}/{id}"), partner_tag),
    };

    let mut record = ProductRecord {
        id,
        title,
        current_price,
        reference_price,
        image_url,
        detail_url,
        availability_text,
        in_stock,
        seller_name,
        is_primary_seller,
        fetched_at,
        posted: false,
        discount_amount: None,
        discount_percent: None,
    };
    record.refresh_discount();
    Some(record)
}

/// Append `tag=<partner>` unless the URL already carries a tag parameter.
pub fn ensure_partner_tag(url: &str, partner_tag: &str) -> String {
    if partner_tag.is_empty() || url.contains("?tag=") || url.contains("&tag=") {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}tag={partner_tag}")
}

/// Prices come back as numbers, occasionally as strings.
fn as_amount(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}
