use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use std::collections::HashMap;

use crate::model::{DailyVolume, Holding, ItemInfo, ItemSnapshot, PricePoint, WindowPair};

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Percent change of `current` over `prior`, one decimal.
///
/// `None` when either side is missing or `prior` is zero: no signal, which is
/// not the same thing as "no change".
pub fn trend_pct(current: Option<f64>, prior: Option<f64>) -> Option<f64> {
    let (current, prior) = (current?, prior?);
    if prior == 0.0 || !prior.is_finite() || !current.is_finite() {
        return None;
    }
    Some(round1((current - prior) / prior * 100.0))
}

/// Everything the snapshot builder needs, as loaded from the store.
pub struct MarketHistory<'a> {
    pub items: &'a [ItemInfo],
    pub prices: &'a [PricePoint],
    pub holdings: &'a [Holding],
    pub daily_volumes: &'a [DailyVolume],
}

pub fn build_snapshots(data: &MarketHistory<'_>, now: DateTime<Utc>) -> Vec<ItemSnapshot> {
    let mut history: HashMap<i64, Vec<&PricePoint>> = HashMap::new();
    for p in data.prices {
        history.entry(p.item_id).or_default().push(p);
    }
    for records in history.values_mut() {
        records.sort_by_key(|p| p.recorded_at);
    }

    let counts: HashMap<i64, i64> = data
        .holdings
        .iter()
        .map(|h| (h.item_id, h.count))
        .collect();

    // Last 7 days only, smooths out single-day spikes
    let volume_cutoff = (now - Duration::days(7)).date_naive();
    let mut volumes: HashMap<i64, (i64, i64, i64)> = HashMap::new();
    for v in data.daily_volumes.iter().filter(|v| v.snap_date >= volume_cutoff) {
        let e = volumes.entry(v.item_id).or_default();
        e.0 += v.items_sold;
        e.1 += v.items_bought;
        e.2 += 1;
    }
    let daily_avg = |item_id: i64| -> (i64, i64) {
        match volumes.get(&item_id) {
            Some(&(sold, bought, days)) if days > 0 => (
                (sold as f64 / days as f64).round() as i64,
                (bought as f64 / days as f64).round() as i64,
            ),
            _ => (0, 0),
        }
    };

    let mut results: Vec<ItemSnapshot> = data
        .items
        .par_iter()
        .filter_map(|info| {
            let records = history.get(&info.item_id)?;
            let count = counts.get(&info.item_id).copied().unwrap_or(0);
            Some(aggregate(info, records, count, daily_avg(info.item_id), now))
        })
        .collect();

    results.sort_by_key(|s| s.item_id);
    tracing::debug!(items = data.items.len(), snapshots = results.len(), "built snapshots");
    results
}

fn aggregate(
    info: &ItemInfo,
    records: &[&PricePoint],
    current_count: i64,
    (avg_daily_sold, avg_daily_bought): (i64, i64),
    now: DateTime<Utc>,
) -> ItemSnapshot {
    let sell = |p: &PricePoint| p.sell_price;
    let buy = |p: &PricePoint| p.buy_price;
    let sell_qty = |p: &PricePoint| p.sell_quantity;
    let buy_qty = |p: &PricePoint| p.buy_quantity;

    let month = now - Duration::days(30);
    let day = now - Duration::hours(24);
    let three_days = now - Duration::days(3);
    let week = now - Duration::days(7);
    let fortnight = now - Duration::days(14);

    let (avg_sell_30d, std_sell_30d) = mean_std(&prices_between(records, month, None, sell));
    let (avg_buy_30d, std_buy_30d) = mean_std(&prices_between(records, month, None, buy));

    let hist_sells = prices_between(records, month, Some(day), sell);
    let hist_buys = prices_between(records, month, Some(day), buy);

    let (latest_sell_price, latest_buy_price, sell_listings, buy_orders) = match records.last() {
        Some(p) => (p.sell_price, p.buy_price, p.sell_quantity, p.buy_quantity),
        None => (0, 0, 0, 0),
    };

    ItemSnapshot {
        item_id: info.item_id,
        item_name: info.item_name.clone(),
        rarity: info.rarity.clone(),
        current_count,
        latest_sell_price,
        latest_buy_price,
        avg_sell_30d,
        avg_buy_30d,
        std_sell_30d,
        std_buy_30d,
        hist_min_sell: extreme(&hist_sells, false),
        hist_max_sell: extreme(&hist_sells, true),
        hist_min_buy: extreme(&hist_buys, false),
        hist_max_buy: extreme(&hist_buys, true),
        sell_listings,
        buy_orders,
        avg_daily_sold,
        avg_daily_bought,
        avg_sell_3d: mean(&prices_between(records, three_days, None, sell)),
        avg_buy_3d: mean(&prices_between(records, three_days, None, buy)),
        sell_price_7d: WindowPair {
            current: mean(&prices_between(records, week, None, sell)),
            prior: mean(&prices_between(records, fortnight, Some(week), sell)),
        },
        buy_price_7d: WindowPair {
            current: mean(&prices_between(records, week, None, buy)),
            prior: mean(&prices_between(records, fortnight, Some(week), buy)),
        },
        sell_qty_7d: WindowPair {
            current: mean(&values_between(records, week, None, sell_qty)),
            prior: mean(&values_between(records, fortnight, Some(week), sell_qty)),
        },
        buy_qty_7d: WindowPair {
            current: mean(&values_between(records, week, None, buy_qty)),
            prior: mean(&values_between(records, fortnight, Some(week), buy_qty)),
        },
    }
}

// [from, until) in sample time
fn values_between(
    records: &[&PricePoint],
    from: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
    field: impl Fn(&PricePoint) -> i64,
) -> Vec<i64> {
    records
        .iter()
        .filter(|p| p.recorded_at >= from && until.is_none_or(|u| p.recorded_at < u))
        .map(|p| field(*p))
        .collect()
}

// A zero price means nothing was listed, not that the item was free
fn prices_between(
    records: &[&PricePoint],
    from: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
    field: impl Fn(&PricePoint) -> i64,
) -> Vec<i64> {
    let mut v = values_between(records, from, until, field);
    v.retain(|&p| p > 0);
    v
}

fn extreme(values: &[i64], max: bool) -> i64 {
    let it = values.iter().copied();
    let found = if max { it.max() } else { it.min() };
    found.unwrap_or(0)
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
}

fn mean_std(values: &[i64]) -> (f64, f64) {
    use statrs::statistics::Statistics;

    if values.is_empty() {
        return (0.0, 0.0);
    }
    let floats: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    let avg = floats.iter().mean();
    let std_dev = if floats.len() >= 2 { floats.iter().std_dev() } else { 0.0 };
    (
        if avg.is_finite() { avg } else { 0.0 },
        if std_dev.is_finite() { std_dev } else { 0.0 },
    )
}
