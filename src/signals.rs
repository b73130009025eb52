use serde::Serialize;

use crate::config::SignalConfig;
use crate::model::ItemSnapshot;
use crate::stats::{round1, trend_pct};

/// Derived numbers for one snapshot row. Session only, never persisted.
///
/// `None` means the inputs could not support the ratio (zero or missing
/// denominator) and is read as "no signal".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Signals {
    // vs. 30d average
    pub discount: f64,
    pub discount_pct: Option<f64>,
    pub premium: f64,
    pub premium_pct: Option<f64>,
    pub flip_margin_pct: Option<f64>,

    // vs. 30d extrema (last 24h excluded)
    pub below_floor_pct: Option<f64>,
    pub above_ceiling_pct: Option<f64>,

    // statistical
    pub buy_z_score: Option<f64>,
    pub sell_z_score: Option<f64>,
    pub buy_range_pct: Option<f64>,
    pub sell_range_pct: Option<f64>,
    pub buy_trend_3d_vs_7d: Option<f64>,
    pub sell_trend_3d_vs_7d: Option<f64>,
    pub expected_profit_per_unit: f64,
    pub total_position_profit: f64,

    // 7d vs prior 7d
    pub sell_price_trend_7d: Option<f64>,
    pub buy_price_trend_7d: Option<f64>,
    pub sell_supply_trend_7d: Option<f64>,
    pub buy_demand_trend_7d: Option<f64>,
}

impl Signals {
    pub fn derive(row: &ItemSnapshot, cfg: &SignalConfig) -> Self {
        let latest_sell = row.latest_sell_price as f64;
        let latest_buy = row.latest_buy_price as f64;
        let keep = cfg.after_tax();

        let discount = row.avg_buy_30d - latest_buy;
        let premium = latest_sell - row.avg_sell_30d;

        let below_floor_pct = (row.hist_min_sell > 0 && row.latest_sell_price > 0)
            .then(|| pct_of((row.hist_min_sell - row.latest_sell_price) as f64, row.hist_min_sell as f64))
            .flatten();
        let above_ceiling_pct = (row.hist_max_buy > 0)
            .then(|| pct_of((row.latest_buy_price - row.hist_max_buy) as f64, row.hist_max_buy as f64))
            .flatten();

        let expected_profit_per_unit = row.avg_sell_30d * keep - latest_buy;
        let total_position_profit =
            ((latest_sell * keep - row.avg_buy_30d) * row.current_count as f64).max(0.0);

        Signals {
            discount,
            discount_pct: priced(latest_buy).and_then(|_| pct_of(discount, row.avg_buy_30d)),
            premium,
            premium_pct: priced(latest_sell).and_then(|_| pct_of(premium, row.avg_sell_30d)),
            flip_margin_pct: pct_of(latest_sell * keep - latest_buy, latest_buy),

            below_floor_pct,
            above_ceiling_pct,

            buy_z_score: z_score(latest_buy, row.avg_buy_30d, row.std_buy_30d),
            sell_z_score: z_score(latest_sell, row.avg_sell_30d, row.std_sell_30d),
            buy_range_pct: range_pct(row.latest_buy_price, row.hist_min_buy, row.hist_max_buy),
            sell_range_pct: range_pct(row.latest_sell_price, row.hist_min_sell, row.hist_max_sell),
            buy_trend_3d_vs_7d: delta(row.avg_buy_3d, row.buy_price_7d.current),
            sell_trend_3d_vs_7d: delta(row.avg_sell_3d, row.sell_price_7d.current),
            expected_profit_per_unit,
            total_position_profit,

            sell_price_trend_7d: trend_pct(row.sell_price_7d.current, row.sell_price_7d.prior),
            buy_price_trend_7d: trend_pct(row.buy_price_7d.current, row.buy_price_7d.prior),
            sell_supply_trend_7d: trend_pct(row.sell_qty_7d.current, row.sell_qty_7d.prior),
            buy_demand_trend_7d: trend_pct(row.buy_qty_7d.current, row.buy_qty_7d.prior),
        }
    }
}

fn priced(v: f64) -> Option<f64> {
    (v > 0.0).then_some(v)
}

fn pct_of(part: f64, whole: f64) -> Option<f64> {
    if whole <= 0.0 || !whole.is_finite() || !part.is_finite() {
        return None;
    }
    Some(round1(part / whole * 100.0))
}

fn z_score(latest: f64, mean: f64, std_dev: f64) -> Option<f64> {
    if latest <= 0.0 || mean <= 0.0 || std_dev <= 0.0 || !std_dev.is_finite() {
        return None;
    }
    Some((latest - mean) / std_dev)
}

// 0% = floor, 100% = ceiling
fn range_pct(latest: i64, min: i64, max: i64) -> Option<f64> {
    if latest <= 0 || min <= 0 || max <= min {
        return None;
    }
    let pos = (latest - min) as f64 / (max - min) as f64 * 100.0;
    Some(round1(pos.clamp(0.0, 100.0)))
}

fn delta(short: Option<f64>, long: Option<f64>) -> Option<f64> {
    Some(short? - long?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WindowPair;

    fn base() -> ItemSnapshot {
        ItemSnapshot {
            item_id: 19721,
            item_name: "Glob of Ectoplasm".into(),
            latest_sell_price: 2_400,
            latest_buy_price: 2_000,
            avg_sell_30d: 2_500.0,
            avg_buy_30d: 2_200.0,
            ..Default::default()
        }
    }

    #[test]
    fn discount_against_thirty_day_average() {
        let row = ItemSnapshot {
            latest_buy_price: 8_000,
            avg_buy_30d: 10_000.0,
            ..base()
        };
        let s = Signals::derive(&row, &SignalConfig::default());
        assert_eq!(s.discount, 2_000.0);
        assert_eq!(s.discount_pct, Some(20.0));
    }

    #[test]
    fn breakout_below_floor() {
        let row = ItemSnapshot {
            latest_sell_price: 5_000,
            hist_min_sell: 6_000,
            ..base()
        };
        let s = Signals::derive(&row, &SignalConfig::default());
        assert_eq!(s.below_floor_pct, Some(16.7));
    }

    #[test]
    fn missing_denominators_are_absent() {
        let row = ItemSnapshot {
            avg_buy_30d: 0.0,
            avg_sell_30d: 0.0,
            latest_buy_price: 0,
            ..base()
        };
        let s = Signals::derive(&row, &SignalConfig::default());
        assert_eq!(s.discount_pct, None);
        assert_eq!(s.premium_pct, None);
        assert_eq!(s.flip_margin_pct, None);
        assert_eq!(s.below_floor_pct, None);
        assert_eq!(s.above_ceiling_pct, None);
        assert_eq!(s.buy_z_score, None);
        assert_eq!(s.buy_range_pct, None);
        assert_eq!(s.sell_price_trend_7d, None);
    }

    #[test]
    fn z_scores_and_range() {
        let row = ItemSnapshot {
            latest_buy_price: 1_800,
            std_buy_30d: 200.0,
            hist_min_buy: 1_600,
            hist_max_buy: 2_600,
            ..base()
        };
        let s = Signals::derive(&row, &SignalConfig::default());
        assert_eq!(s.buy_z_score, Some(-2.0));
        assert_eq!(s.buy_range_pct, Some(20.0));
        // no std dev, no z-score
        assert_eq!(s.sell_z_score, None);
    }

    #[test]
    fn range_is_clamped_outside_the_window() {
        let row = ItemSnapshot {
            latest_sell_price: 5_000,
            hist_min_sell: 2_000,
            hist_max_sell: 3_000,
            ..base()
        };
        let s = Signals::derive(&row, &SignalConfig::default());
        assert_eq!(s.sell_range_pct, Some(100.0));
    }

    #[test]
    fn profits_after_tax() {
        let row = ItemSnapshot {
            current_count: 4,
            latest_sell_price: 3_000,
            avg_buy_30d: 2_000.0,
            avg_sell_30d: 2_600.0,
            latest_buy_price: 2_000,
            ..base()
        };
        let s = Signals::derive(&row, &SignalConfig::default());
        // 2600 * 0.85 - 2000
        assert!((s.expected_profit_per_unit - 210.0).abs() < 1e-9);
        // (3000 * 0.85 - 2000) * 4
        assert!((s.total_position_profit - 2_200.0).abs() < 1e-9);
        assert_eq!(s.flip_margin_pct, Some(27.5));
    }

    #[test]
    fn position_profit_never_negative() {
        let row = ItemSnapshot {
            current_count: 10,
            latest_sell_price: 1_000,
            avg_buy_30d: 5_000.0,
            ..base()
        };
        let s = Signals::derive(&row, &SignalConfig::default());
        assert_eq!(s.total_position_profit, 0.0);
    }

    #[test]
    fn momentum_and_weekly_trends() {
        let row = ItemSnapshot {
            avg_buy_3d: Some(2_100.0),
            buy_price_7d: WindowPair { current: Some(2_000.0), prior: Some(1_600.0) },
            sell_qty_7d: WindowPair { current: Some(300.0), prior: Some(0.0) },
            ..base()
        };
        let s = Signals::derive(&row, &SignalConfig::default());
        assert_eq!(s.buy_trend_3d_vs_7d, Some(100.0));
        assert_eq!(s.buy_price_trend_7d, Some(25.0));
        assert_eq!(s.sell_supply_trend_7d, None);
        assert_eq!(s.sell_trend_3d_vs_7d, None);
    }
}
