/// Phrases in the availability message that mean the item can be bought now.
pub const DEFAULT_STOCK_MARKERS: &[&str] = &["在庫あり", "通常配送無料", "お届け予定"];

/// Merchant names the marketplace uses for its own first-party store.
pub const DEFAULT_PRIMARY_SELLERS: &[&str] = &["Amazon", "Amazon.co.jp"];

/// Lookup table behind `in_stock` and `is_primary_seller`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerTable {
    stock_markers: Vec<String>,
    primary_sellers: Vec<String>,
}

impl MarkerTable {
    /// Empty overrides fall back to the defaults for that column.
    pub fn new(stock_markers: Vec<String>, primary_sellers: Vec<String>) -> Self {
        let defaults = Self::default();
        Self {
            stock_markers: if stock_markers.is_empty() {
                defaults.stock_markers
            } else {
                stock_markers
            },
            primary_sellers: if primary_sellers.is_empty() {
                defaults.primary_sellers
            } else {
                primary_sellers
            },
        }
    }

    /// Substring match against any marker phrase.
    pub fn is_in_stock(&self, availability_text: &str) -> bool {
        self.stock_markers
            .iter()
            .any(|m| availability_text.contains(m.as_str()))
    }

    /// Exact match against the first-party names.
    pub fn is_primary_seller(&self, seller_name: &str) -> bool {
        self.primary_sellers.iter().any(|s| s == seller_name)
    }
}

impl Default for MarkerTable {
    fn default() -> Self {
        Self {
            stock_markers: DEFAULT_STOCK_MARKERS.iter().map(|s| s.to_string()).collect(),
            primary_sellers: DEFAULT_PRIMARY_SELLERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}
