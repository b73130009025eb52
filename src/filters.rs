use crate::config::SignalConfig;
use crate::model::ItemSnapshot;

/// All four prices present, so ratio math against them is meaningful.
pub fn is_valid(row: &ItemSnapshot) -> bool {
    row.latest_sell_price > 0
        && row.latest_buy_price > 0
        && row.avg_sell_30d > 0.0
        && row.avg_buy_30d > 0.0
}

pub fn liquid_to_buy(row: &ItemSnapshot, cfg: &SignalConfig) -> bool {
    row.sell_listings >= cfg.min_sell_listings
}

// Nothing to sell without inventory, no point listing without demand
pub fn liquid_to_sell(row: &ItemSnapshot, cfg: &SignalConfig) -> bool {
    row.held() && row.buy_orders >= cfg.min_buy_orders
}
