use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInfo {
    pub item_id: i64,
    pub item_name: String,
    pub rarity: String,
    pub icon_url: Option<String>,
}

// One raw trading post sample (collected every ~3h)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub item_id: i64,
    pub sell_price: i64,
    pub buy_price: i64,
    pub sell_quantity: i64,
    pub buy_quantity: i64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyVolume {
    pub item_id: i64,
    pub snap_date: NaiveDate,
    pub items_sold: i64,
    pub items_bought: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Holding {
    pub item_id: i64,
    pub count: i64,
}

/// Mean of a window and of the equally long window right before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowPair {
    pub current: Option<f64>,
    pub prior: Option<f64>,
}

/// Aggregated price/volume stats for one item.
///
/// Averages, extrema and standard deviations use `0` for "no data"; the
/// filters treat a zero as disqualifying rather than as a real price.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item_id: i64,
    pub item_name: String,
    pub rarity: String,

    pub current_count: i64,

    pub latest_sell_price: i64,
    pub latest_buy_price: i64,

    pub avg_sell_30d: f64,
    pub avg_buy_30d: f64,
    pub std_sell_30d: f64,
    pub std_buy_30d: f64,

    // 30d extrema, last 24h excluded so a spike can't be its own breakout
    pub hist_min_sell: i64,
    pub hist_max_sell: i64,
    pub hist_min_buy: i64,
    pub hist_max_buy: i64,

    pub sell_listings: i64,
    pub buy_orders: i64,

    pub avg_daily_sold: i64,
    pub avg_daily_bought: i64,

    pub avg_sell_3d: Option<f64>,
    pub avg_buy_3d: Option<f64>,
    pub sell_price_7d: WindowPair,
    pub buy_price_7d: WindowPair,
    pub sell_qty_7d: WindowPair,
    pub buy_qty_7d: WindowPair,
}

impl ItemSnapshot {
    pub fn held(&self) -> bool {
        self.current_count > 0
    }

    pub fn position_value(&self) -> i64 {
        self.current_count.saturating_mul(self.latest_sell_price)
    }
}
