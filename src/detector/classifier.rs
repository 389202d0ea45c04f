use crate::types::{ColdStartPolicy, StockState};

/// How an id's availability moved between the previous snapshot and now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockTransition {
    /// Out of stock last time, in stock now.
    Restocked,
    Unchanged,
    /// In stock last time, out now. Logged, never notified.
    SoldOut,
    /// No previous entry and in stock now.
    FirstSeenInStock,
    /// No previous entry and not in stock.
    FirstSeenOutOfStock,
}

pub fn stock_transition(previous: Option<&StockState>, in_stock_now: bool) -> StockTransition {
    match (previous, in_stock_now) {
        (Some(prev), true) if !prev.in_stock => StockTransition::Restocked,
        (Some(prev), false) if prev.in_stock => StockTransition::SoldOut,
        (Some(_), _) => StockTransition::Unchanged,
        (None, true) => StockTransition::FirstSeenInStock,
        (None, false) => StockTransition::FirstSeenOutOfStock,
    }
}

/// Whether a transition goes into the restock stream.
pub fn emits_restock(
    transition: StockTransition,
    is_primary_seller: bool,
    policy: ColdStartPolicy,
) -> bool {
    match transition {
        StockTransition::Restocked => true,
        StockTransition::FirstSeenInStock => match policy {
            ColdStartPolicy::Suppress => false,
            ColdStartPolicy::NotifyPrimarySeller => is_primary_seller,
        },
        _ => false,
    }
}
