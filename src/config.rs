use serde::{Deserialize, Serialize};

use crate::currency::COPPER_PER_GOLD;

/// Trading post listing fee + exchange fee.
pub const TP_TAX_RATE: f64 = 0.15;

pub const MIN_SELL_LISTINGS: i64 = 10;
pub const MIN_BUY_ORDERS: i64 = 10;
pub const MIN_DAILY_SOLD: i64 = 10;

pub const BUY_Z_THRESHOLD: f64 = -1.0;
pub const SELL_Z_THRESHOLD: f64 = 0.5;

pub const BREAKOUT_TOP_N: usize = 5;

/// Tunables for every ranking policy. Persisted in the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub tax_rate: f64,
    pub min_sell_listings: i64,
    pub min_buy_orders: i64,
    pub min_daily_sold: i64,
    pub buy_z_threshold: f64,
    pub sell_z_threshold: f64,
    /// Copper. Defaults to one gold.
    pub min_position_profit: f64,
    pub breakout_top_n: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            tax_rate: TP_TAX_RATE,
            min_sell_listings: MIN_SELL_LISTINGS,
            min_buy_orders: MIN_BUY_ORDERS,
            min_daily_sold: MIN_DAILY_SOLD,
            buy_z_threshold: BUY_Z_THRESHOLD,
            sell_z_threshold: SELL_Z_THRESHOLD,
            min_position_profit: COPPER_PER_GOLD as f64,
            breakout_top_n: BREAKOUT_TOP_N,
        }
    }
}

impl SignalConfig {
    /// Share of a sale that actually reaches the seller.
    pub fn after_tax(&self) -> f64 {
        1.0 - self.tax_rate
    }
}
