use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::SignalConfig;
use crate::filters::{is_valid, liquid_to_buy, liquid_to_sell};
use crate::model::ItemSnapshot;
use crate::signals::Signals;

/// Which derivation turns a snapshot batch into buy/sell lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Policy {
    /// Current price vs. its 30-day average.
    MeanReversion,
    /// Current price past its 30-day floor/ceiling.
    Breakout,
    /// Z-score + momentum + after-tax profit.
    Statistical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub item_id: i64,
    pub item_name: String,
    pub rarity: String,
    pub current_count: i64,
    pub latest_sell_price: i64,
    pub latest_buy_price: i64,
    pub avg_buy_30d: f64,
    pub avg_sell_30d: f64,
    pub avg_daily_sold: i64,
    pub avg_daily_bought: i64,
    /// The value this policy ranked on.
    pub score: f64,
    pub signals: Signals,
}

#[derive(Debug, Clone, Default)]
pub struct Recommendations {
    pub buy: Vec<Candidate>,
    pub sell: Vec<Candidate>,
}

impl Recommendations {
    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }
}

impl Policy {
    pub const ALL: [Policy; 3] = [Policy::MeanReversion, Policy::Breakout, Policy::Statistical];

    pub fn label(self) -> &'static str {
        match self {
            Policy::MeanReversion => "vs 30-Day Average",
            Policy::Breakout => "30-Day Breakout",
            Policy::Statistical => "Statistical",
        }
    }

    /// Column header for `Candidate::score`.
    pub fn score_label(self, side: Side) -> &'static str {
        match (self, side) {
            (Policy::MeanReversion, Side::Buy) => "Discount %",
            (Policy::MeanReversion, Side::Sell) => "Above Avg %",
            (Policy::Breakout, Side::Buy) => "Below Floor %",
            (Policy::Breakout, Side::Sell) => "Above Ceiling %",
            (Policy::Statistical, Side::Buy) => "Exp. Profit/Unit",
            (Policy::Statistical, Side::Sell) => "Position Profit",
        }
    }

    /// Whether `score` is copper (otherwise a percentage).
    pub fn score_is_copper(self) -> bool {
        matches!(self, Policy::Statistical)
    }

    pub fn recommend(self, rows: &[ItemSnapshot], cfg: &SignalConfig) -> Recommendations {
        let mut buy = Vec::new();
        let mut sell = Vec::new();

        for row in rows {
            let signals = Signals::derive(row, cfg);
            if let Some(score) = self.buy_score(row, &signals, cfg) {
                buy.push(candidate(row, score, signals.clone()));
            }
            if let Some(score) = self.sell_score(row, &signals, cfg) {
                sell.push(candidate(row, score, signals));
            }
        }

        rank(&mut buy);
        rank(&mut sell);
        if let Some(n) = self.limit(cfg) {
            buy.truncate(n);
            sell.truncate(n);
        }

        tracing::debug!(policy = ?self, rows = rows.len(), buy = buy.len(), sell = sell.len(), "ranked candidates");
        Recommendations { buy, sell }
    }

    fn limit(self, cfg: &SignalConfig) -> Option<usize> {
        match self {
            Policy::Breakout => Some(cfg.breakout_top_n),
            Policy::MeanReversion | Policy::Statistical => None,
        }
    }

    fn buy_score(self, row: &ItemSnapshot, s: &Signals, cfg: &SignalConfig) -> Option<f64> {
        match self {
            Policy::MeanReversion => {
                if !is_valid(row) || !liquid_to_buy(row, cfg) || s.discount <= 0.0 {
                    return None;
                }
                s.discount_pct.filter(|&p| p > 0.0)
            }
            Policy::Breakout => {
                if row.hist_min_sell <= 0 || row.latest_sell_price <= 0 {
                    return None;
                }
                if row.latest_sell_price >= row.hist_min_sell {
                    return None;
                }
                s.below_floor_pct
            }
            Policy::Statistical => {
                if !is_valid(row) || row.avg_daily_sold < cfg.min_daily_sold {
                    return None;
                }
                let z = s.buy_z_score?;
                let trend = s.buy_trend_3d_vs_7d?;
                let profit = s.expected_profit_per_unit;
                (z <= cfg.buy_z_threshold && trend >= 0.0 && profit > 0.0).then_some(profit)
            }
        }
    }

    fn sell_score(self, row: &ItemSnapshot, s: &Signals, cfg: &SignalConfig) -> Option<f64> {
        if !row.held() {
            return None;
        }
        match self {
            Policy::MeanReversion => {
                if !is_valid(row) || !liquid_to_sell(row, cfg) || s.premium <= 0.0 {
                    return None;
                }
                s.premium_pct.filter(|&p| p > 0.0)
            }
            Policy::Breakout => {
                if row.hist_max_buy <= 0 || row.latest_buy_price <= row.hist_max_buy {
                    return None;
                }
                s.above_ceiling_pct
            }
            Policy::Statistical => {
                if !is_valid(row) {
                    return None;
                }
                let z = s.sell_z_score?;
                let profit = s.total_position_profit;
                (z >= cfg.sell_z_threshold && profit >= cfg.min_position_profit).then_some(profit)
            }
        }
    }
}

fn candidate(row: &ItemSnapshot, score: f64, signals: Signals) -> Candidate {
    Candidate {
        item_id: row.item_id,
        item_name: row.item_name.clone(),
        rarity: row.rarity.clone(),
        current_count: row.current_count,
        latest_sell_price: row.latest_sell_price,
        latest_buy_price: row.latest_buy_price,
        avg_buy_30d: row.avg_buy_30d,
        avg_sell_30d: row.avg_sell_30d,
        avg_daily_sold: row.avg_daily_sold,
        avg_daily_bought: row.avg_daily_bought,
        score,
        signals,
    }
}

// Highest score first, ties by item id so the order is stable across refreshes
fn rank(list: &mut [Candidate]) {
    list.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.item_id.cmp(&b.item_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WindowPair;

    fn row(item_id: i64) -> ItemSnapshot {
        ItemSnapshot {
            item_id,
            item_name: format!("Item {}", item_id),
            rarity: "Basic".into(),
            latest_sell_price: 1_000,
            latest_buy_price: 900,
            avg_sell_30d: 1_000.0,
            avg_buy_30d: 900.0,
            sell_listings: 50,
            buy_orders: 50,
            ..Default::default()
        }
    }

    #[test]
    fn empty_batch_gives_empty_lists() {
        let cfg = SignalConfig::default();
        for policy in Policy::ALL {
            assert!(policy.recommend(&[], &cfg).is_empty());
        }
    }

    #[test]
    fn mean_reversion_buy_scenario() {
        let rows = vec![ItemSnapshot {
            latest_buy_price: 8_000,
            avg_buy_30d: 10_000.0,
            latest_sell_price: 11_000,
            avg_sell_30d: 11_000.0,
            sell_listings: 15,
            ..row(1)
        }];
        let recs = Policy::MeanReversion.recommend(&rows, &SignalConfig::default());
        assert_eq!(recs.buy.len(), 1);
        let c = &recs.buy[0];
        assert_eq!(c.signals.discount, 2_000.0);
        assert_eq!(c.signals.discount_pct, Some(20.0));
        assert_eq!(c.score, 20.0);
    }

    #[test]
    fn mean_reversion_buy_list_is_sorted_and_liquid() {
        let rows: Vec<ItemSnapshot> = (1..=12)
            .map(|i| ItemSnapshot {
                latest_buy_price: 1_000 - i * 37,
                avg_buy_30d: 1_000.0,
                // every third item has a thin order book
                sell_listings: if i % 3 == 0 { 5 } else { 40 },
                ..row(i)
            })
            .chain(std::iter::once(ItemSnapshot {
                // priced above average: no discount
                latest_buy_price: 1_100,
                avg_buy_30d: 1_000.0,
                ..row(99)
            }))
            .collect();

        let recs = Policy::MeanReversion.recommend(&rows, &SignalConfig::default());
        assert_eq!(recs.buy.len(), 8);
        for c in &recs.buy {
            assert!(c.signals.discount_pct.unwrap() > 0.0);
            let src = rows.iter().find(|r| r.item_id == c.item_id).unwrap();
            assert!(src.sell_listings >= 10);
        }
        for pair in recs.buy.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn mean_reversion_sell_needs_inventory() {
        let premium = ItemSnapshot {
            latest_sell_price: 1_300,
            avg_sell_30d: 1_000.0,
            ..row(1)
        };
        let held = ItemSnapshot { current_count: 5, ..premium.clone() };
        let thin = ItemSnapshot { item_id: 3, current_count: 5, buy_orders: 2, ..premium.clone() };

        let recs = Policy::MeanReversion.recommend(&[premium, held, thin], &SignalConfig::default());
        assert_eq!(recs.sell.len(), 1);
        assert_eq!(recs.sell[0].current_count, 5);
        assert_eq!(recs.sell[0].signals.premium_pct, Some(30.0));
    }

    #[test]
    fn mean_reversion_sell_list_is_sorted_by_premium() {
        let held = |item_id: i64, sell: i64| ItemSnapshot {
            current_count: 2,
            latest_sell_price: sell,
            avg_sell_30d: 1_000.0,
            ..row(item_id)
        };
        let rows = vec![held(1, 1_300), held(2, 1_100), held(3, 1_500), held(4, 950)];

        let recs = Policy::MeanReversion.recommend(&rows, &SignalConfig::default());
        let ids: Vec<i64> = recs.sell.iter().map(|c| c.item_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        for pair in recs.sell.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            assert!(pair[1].signals.premium_pct.unwrap() > 0.0);
        }
    }

    #[test]
    fn mean_reversion_skips_invalid_rows() {
        let rows = vec![ItemSnapshot {
            latest_buy_price: 500,
            avg_buy_30d: 1_000.0,
            avg_sell_30d: 0.0,
            ..row(1)
        }];
        let recs = Policy::MeanReversion.recommend(&rows, &SignalConfig::default());
        assert!(recs.buy.is_empty());
    }

    #[test]
    fn breakout_buy_scenario() {
        let rows = vec![ItemSnapshot {
            latest_sell_price: 5_000,
            hist_min_sell: 6_000,
            ..row(1)
        }];
        let recs = Policy::Breakout.recommend(&rows, &SignalConfig::default());
        assert_eq!(recs.buy.len(), 1);
        assert_eq!(recs.buy[0].signals.below_floor_pct, Some(16.7));
        assert_eq!(recs.buy[0].score, 16.7);
    }

    #[test]
    fn breakout_sell_list_is_capped_and_held() {
        let rows: Vec<ItemSnapshot> = (1..=9)
            .map(|i| ItemSnapshot {
                current_count: if i == 4 { 0 } else { 3 },
                latest_buy_price: 1_000 + i * 10,
                hist_max_buy: 1_000,
                ..row(i)
            })
            .chain(std::iter::once(ItemSnapshot {
                current_count: 3,
                latest_buy_price: 900,
                hist_max_buy: 1_000,
                ..row(50)
            }))
            .collect();

        let recs = Policy::Breakout.recommend(&rows, &SignalConfig::default());
        assert_eq!(recs.sell.len(), 5);
        for c in &recs.sell {
            let src = rows.iter().find(|r| r.item_id == c.item_id).unwrap();
            assert!(src.current_count > 0);
            assert!(src.latest_buy_price > src.hist_max_buy);
        }
        assert_eq!(recs.sell[0].item_id, 9);
    }

    #[test]
    fn breakout_ignores_rows_without_history() {
        let rows = vec![ItemSnapshot { latest_sell_price: 5, hist_min_sell: 0, ..row(1) }];
        assert!(Policy::Breakout.recommend(&rows, &SignalConfig::default()).buy.is_empty());
    }

    fn statistical_buy(item_id: i64) -> ItemSnapshot {
        ItemSnapshot {
            latest_buy_price: 700,
            avg_buy_30d: 900.0,
            std_buy_30d: 100.0,
            avg_sell_30d: 1_100.0,
            avg_daily_sold: 25,
            avg_buy_3d: Some(720.0),
            buy_price_7d: WindowPair { current: Some(700.0), prior: None },
            ..row(item_id)
        }
    }

    #[test]
    fn statistical_buy_requires_every_condition() {
        let good = statistical_buy(1);
        let shallow = ItemSnapshot { std_buy_30d: 400.0, ..statistical_buy(2) };
        let falling = ItemSnapshot { avg_buy_3d: Some(650.0), ..statistical_buy(3) };
        let illiquid = ItemSnapshot { avg_daily_sold: 3, ..statistical_buy(4) };
        let unprofitable = ItemSnapshot { avg_sell_30d: 800.0, ..statistical_buy(5) };

        let rows = vec![good, shallow, falling, illiquid, unprofitable];
        let cfg = SignalConfig::default();
        let recs = Policy::Statistical.recommend(&rows, &cfg);

        assert_eq!(recs.buy.len(), 1);
        assert_eq!(recs.buy[0].item_id, 1);
        for c in &recs.buy {
            let src = rows.iter().find(|r| r.item_id == c.item_id).unwrap();
            assert!(c.signals.buy_z_score.unwrap() <= -1.0);
            assert!(src.avg_daily_sold >= 10);
            assert!(c.signals.expected_profit_per_unit > 0.0);
        }
        // 1100 * 0.85 - 700
        assert!((recs.buy[0].score - 235.0).abs() < 1e-6);
    }

    #[test]
    fn statistical_sell_ranks_by_position_profit() {
        let seller = |item_id: i64, count: i64| ItemSnapshot {
            current_count: count,
            latest_sell_price: 2_000,
            avg_sell_30d: 1_500.0,
            std_sell_30d: 200.0,
            avg_buy_30d: 1_000.0,
            ..row(item_id)
        };
        // (2000 * 0.85 - 1000) = 700 per unit
        let rows = vec![seller(1, 20), seller(2, 100), seller(3, 10), seller(4, 0)];
        let recs = Policy::Statistical.recommend(&rows, &SignalConfig::default());

        let ids: Vec<i64> = recs.sell.iter().map(|c| c.item_id).collect();
        // 10 units = 7000c, under one gold
        assert_eq!(ids, vec![2, 1]);
        assert!((recs.sell[0].score - 70_000.0).abs() < 1e-6);
    }

    #[test]
    fn statistical_sell_needs_elevated_z_score() {
        let seller = |item_id: i64, avg_sell: f64| ItemSnapshot {
            current_count: 100,
            latest_sell_price: 2_000,
            avg_sell_30d: avg_sell,
            std_sell_30d: 400.0,
            avg_buy_30d: 1_000.0,
            ..row(item_id)
        };
        // z = (2000 - 1900) / 400 = 0.25, and (2000 - 1800) / 400 = 0.5 exactly
        let rows = vec![seller(1, 1_900.0), seller(2, 1_800.0)];
        let cfg = SignalConfig::default();
        let recs = Policy::Statistical.recommend(&rows, &cfg);

        let ids: Vec<i64> = recs.sell.iter().map(|c| c.item_id).collect();
        assert_eq!(ids, vec![2]);
        assert_eq!(recs.sell[0].signals.sell_z_score, Some(cfg.sell_z_threshold));
        // 100 * (2000 * 0.85 - 1000)
        assert!((recs.sell[0].score - 70_000.0).abs() < 1e-6);

        let below = Policy::Statistical.recommend(&rows[..1], &cfg);
        assert!(below.sell.is_empty());
    }

    #[test]
    fn ties_break_by_item_id() {
        let rows = vec![
            ItemSnapshot { latest_sell_price: 500, hist_min_sell: 1_000, ..row(7) },
            ItemSnapshot { latest_sell_price: 500, hist_min_sell: 1_000, ..row(3) },
        ];
        let recs = Policy::Breakout.recommend(&rows, &SignalConfig::default());
        let ids: Vec<i64> = recs.buy.iter().map(|c| c.item_id).collect();
        assert_eq!(ids, vec![3, 7]);
    }
}
