use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::error::StoreError;
use crate::model::{DailyVolume, Holding, ItemInfo, ItemSnapshot, PricePoint};
use crate::stats::{build_snapshots, MarketHistory};

// Filled by the external collector job. recorded_at is unix seconds.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
    item_id   INTEGER PRIMARY KEY,
    item_name TEXT NOT NULL,
    rarity    TEXT NOT NULL DEFAULT '',
    icon_url  TEXT
);
CREATE TABLE IF NOT EXISTS prices (
    item_id       INTEGER NOT NULL,
    sell_price    INTEGER NOT NULL DEFAULT 0,
    buy_price     INTEGER NOT NULL DEFAULT 0,
    sell_quantity INTEGER NOT NULL DEFAULT 0,
    buy_quantity  INTEGER NOT NULL DEFAULT 0,
    recorded_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_prices_item_time ON prices (item_id, recorded_at);
CREATE TABLE IF NOT EXISTS inventory (
    item_id INTEGER PRIMARY KEY,
    count   INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS daily_volumes (
    item_id      INTEGER NOT NULL,
    snap_date    TEXT NOT NULL,
    items_sold   INTEGER NOT NULL DEFAULT 0,
    items_bought INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (item_id, snap_date)
);
";

type RawPrice = (i64, i64, i64, i64, i64, i64);

pub struct Store {
    path: PathBuf,
    conn: Connection,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = connect(&path)?;
        info!(path = %path.display(), "opened market database");
        Ok(Self { path, conn })
    }

    // Stale handle: reopen and try exactly once more, report the first error if that fails too
    fn with_retry<T>(
        &mut self,
        what: &str,
        query: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let first = match query(&self.conn) {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        warn!(query = what, error = %first, "query failed, reconnecting");

        match connect(&self.path) {
            Ok(conn) => self.conn = conn,
            Err(e) => {
                warn!(error = %e, "reconnect failed");
                return Err(first.into());
            }
        }
        query(&self.conn).map_err(|_| first.into())
    }

    pub fn load_items(&mut self) -> Result<Vec<ItemInfo>, StoreError> {
        self.with_retry("items", |conn| {
            let mut stmt = conn.prepare(
                "SELECT item_id, item_name, rarity, icon_url
                 FROM items
                 ORDER BY item_name",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ItemInfo {
                    item_id: row.get(0)?,
                    item_name: row.get(1)?,
                    rarity: row.get(2)?,
                    icon_url: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    pub fn load_prices_since(&mut self, since: DateTime<Utc>) -> Result<Vec<PricePoint>, StoreError> {
        let raw: Vec<RawPrice> = self.with_retry("prices", |conn| {
            let mut stmt = conn.prepare(
                "SELECT item_id, sell_price, buy_price, sell_quantity, buy_quantity, recorded_at
                 FROM prices
                 WHERE recorded_at >= ?1
                 ORDER BY recorded_at",
            )?;
            let rows = stmt.query_map([since.timestamp()], raw_price)?;
            rows.collect()
        })?;
        raw.into_iter().map(to_price_point).collect()
    }

    pub fn load_price_history(&mut self, item_id: i64) -> Result<Vec<PricePoint>, StoreError> {
        let raw: Vec<RawPrice> = self.with_retry("price history", |conn| {
            let mut stmt = conn.prepare(
                "SELECT item_id, sell_price, buy_price, sell_quantity, buy_quantity, recorded_at
                 FROM prices
                 WHERE item_id = ?1
                 ORDER BY recorded_at",
            )?;
            let rows = stmt.query_map([item_id], raw_price)?;
            rows.collect()
        })?;
        raw.into_iter().map(to_price_point).collect()
    }

    pub fn load_holdings(&mut self) -> Result<Vec<Holding>, StoreError> {
        self.with_retry("inventory", |conn| {
            let mut stmt = conn.prepare("SELECT item_id, count FROM inventory WHERE count > 0")?;
            let rows = stmt.query_map([], |row| {
                Ok(Holding {
                    item_id: row.get(0)?,
                    count: row.get(1)?,
                })
            })?;
            rows.collect()
        })
    }

    pub fn load_daily_volumes_since(&mut self, since: NaiveDate) -> Result<Vec<DailyVolume>, StoreError> {
        self.with_retry("daily volumes", |conn| {
            let mut stmt = conn.prepare(
                "SELECT item_id, snap_date, items_sold, items_bought
                 FROM daily_volumes
                 WHERE snap_date >= ?1
                 ORDER BY snap_date",
            )?;
            let rows = stmt.query_map([since], daily_volume)?;
            rows.collect()
        })
    }

    pub fn load_item_daily_volumes(
        &mut self,
        item_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<DailyVolume>, StoreError> {
        self.with_retry("item daily volumes", |conn| {
            let mut stmt = conn.prepare(
                "SELECT item_id, snap_date, items_sold, items_bought
                 FROM daily_volumes
                 WHERE item_id = ?1 AND snap_date >= ?2
                 ORDER BY snap_date",
            )?;
            let rows = stmt.query_map(params![item_id, since], daily_volume)?;
            rows.collect()
        })
    }
}

fn connect(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn raw_price(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPrice> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn to_price_point(
    (item_id, sell_price, buy_price, sell_quantity, buy_quantity, ts): RawPrice,
) -> Result<PricePoint, StoreError> {
    let recorded_at = DateTime::from_timestamp(ts, 0).ok_or(StoreError::BadTimestamp(ts))?;
    Ok(PricePoint {
        item_id,
        sell_price,
        buy_price,
        sell_quantity,
        buy_quantity,
        recorded_at,
    })
}

fn daily_volume(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyVolume> {
    Ok(DailyVolume {
        item_id: row.get(0)?,
        snap_date: row.get(1)?,
        items_sold: row.get(2)?,
        items_bought: row.get(3)?,
    })
}

pub const SNAPSHOT_TTL: StdDuration = StdDuration::from_secs(300);
pub const ITEM_LIST_TTL: StdDuration = StdDuration::from_secs(600);
pub const HISTORY_TTL: StdDuration = StdDuration::from_secs(300);
pub const DAILY_VOLUME_TTL: StdDuration = StdDuration::from_secs(600);

/// The caches `MarketData` reads through.
pub struct MarketCaches {
    pub snapshots: TtlCache<(), Arc<Vec<ItemSnapshot>>>,
    pub items: TtlCache<(), Arc<Vec<ItemInfo>>>,
    pub history: TtlCache<i64, Arc<Vec<PricePoint>>>,
    pub daily_volumes: TtlCache<i64, Arc<Vec<DailyVolume>>>,
}

impl Default for MarketCaches {
    fn default() -> Self {
        Self {
            snapshots: TtlCache::new(SNAPSHOT_TTL),
            items: TtlCache::new(ITEM_LIST_TTL),
            history: TtlCache::new(HISTORY_TTL),
            daily_volumes: TtlCache::new(DAILY_VOLUME_TTL),
        }
    }
}

/// Store + caches. Everything the UI pages read goes through here.
pub struct MarketData {
    store: Store,
    caches: MarketCaches,
}

impl MarketData {
    pub fn new(store: Store, caches: MarketCaches) -> Self {
        Self { store, caches }
    }

    pub fn snapshots(&mut self) -> Result<Arc<Vec<ItemSnapshot>>, StoreError> {
        let store = &mut self.store;
        self.caches.snapshots.get_or_try_insert_with((), || {
            let snaps = load_snapshots(store, Utc::now())?;
            info!(count = snaps.len(), "loaded item snapshots");
            Ok(Arc::new(snaps))
        })
    }

    pub fn items(&mut self) -> Result<Arc<Vec<ItemInfo>>, StoreError> {
        let store = &mut self.store;
        self.caches
            .items
            .get_or_try_insert_with((), || store.load_items().map(Arc::new))
    }

    pub fn price_history(&mut self, item_id: i64) -> Result<Arc<Vec<PricePoint>>, StoreError> {
        let store = &mut self.store;
        self.caches
            .history
            .get_or_try_insert_with(item_id, || store.load_price_history(item_id).map(Arc::new))
    }

    /// Last 7 days of sold/bought counts for one item.
    pub fn daily_volumes(&mut self, item_id: i64) -> Result<Arc<Vec<DailyVolume>>, StoreError> {
        let store = &mut self.store;
        let since = (Utc::now() - Duration::days(7)).date_naive();
        self.caches.daily_volumes.get_or_try_insert_with(item_id, || {
            store.load_item_daily_volumes(item_id, since).map(Arc::new)
        })
    }

    /// Drops one item's cached history and daily volumes.
    pub fn forget_item(&mut self, item_id: i64) {
        debug!(item_id, "dropping cached item history");
        self.caches.history.invalidate(&item_id);
        self.caches.daily_volumes.invalidate(&item_id);
    }

    pub fn invalidate(&mut self) {
        debug!("invalidating market caches");
        self.caches.snapshots.invalidate_all();
        self.caches.items.invalidate_all();
        self.caches.history.invalidate_all();
        self.caches.daily_volumes.invalidate_all();
    }
}

pub fn load_snapshots(store: &mut Store, now: DateTime<Utc>) -> Result<Vec<ItemSnapshot>, StoreError> {
    let items = store.load_items()?;
    let prices = store.load_prices_since(now - Duration::days(30))?;
    let holdings = store.load_holdings()?;
    let daily_volumes = store.load_daily_volumes_since((now - Duration::days(7)).date_naive())?;

    let history = MarketHistory {
        items: &items,
        prices: &prices,
        holdings: &holdings,
        daily_volumes: &daily_volumes,
    };
    Ok(build_snapshots(&history, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("market.db")).unwrap();
        let now = Utc::now().timestamp();

        store
            .conn
            .execute_batch(
                "INSERT INTO items VALUES (19721, 'Glob of Ectoplasm', 'Exotic', NULL);
                 INSERT INTO items VALUES (24295, 'Vial of Powerful Blood', 'Rare', NULL);
                 INSERT INTO inventory VALUES (19721, 250);",
            )
            .unwrap();
        for (hours_ago, sell, buy) in [(72, 2_500, 2_300), (48, 2_450, 2_250), (3, 2_600, 2_400)] {
            store
                .conn
                .execute(
                    "INSERT INTO prices VALUES (19721, ?1, ?2, 400, 900, ?3)",
                    params![sell, buy, now - hours_ago * 3600],
                )
                .unwrap();
        }
        let yesterday = (Utc::now() - Duration::days(1)).date_naive();
        store
            .conn
            .execute(
                "INSERT INTO daily_volumes VALUES (19721, ?1, 1500, 1200)",
                params![yesterday],
            )
            .unwrap();

        (dir, store)
    }

    #[test]
    fn snapshots_come_from_raw_history() {
        let (_dir, mut store) = seeded();
        let snaps = load_snapshots(&mut store, Utc::now()).unwrap();

        assert_eq!(snaps.len(), 1);
        let s = &snaps[0];
        assert_eq!(s.item_name, "Glob of Ectoplasm");
        assert_eq!(s.current_count, 250);
        assert_eq!(s.latest_sell_price, 2_600);
        assert_eq!(s.sell_listings, 400);
        assert_eq!(s.buy_orders, 900);
        assert_eq!(s.hist_max_sell, 2_500);
        assert_eq!(s.avg_daily_sold, 1_500);
    }

    #[test]
    fn item_queries() {
        let (_dir, mut store) = seeded();
        let items = store.load_items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_name, "Glob of Ectoplasm");

        let history = store.load_price_history(19721).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));

        let since = (Utc::now() - Duration::days(7)).date_naive();
        assert_eq!(store.load_item_daily_volumes(19721, since).unwrap().len(), 1);
        assert!(store.load_item_daily_volumes(24295, since).unwrap().is_empty());
    }

    #[test]
    fn failed_query_reconnects_once() {
        let (_dir, mut store) = seeded();
        store.conn.execute_batch("DROP TABLE items").unwrap();

        // reconnect recreates the schema, so the retry sees an empty table
        let items = store.load_items().unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn market_data_serves_from_cache_until_invalidated() {
        let (_dir, store) = seeded();
        let mut market = MarketData::new(store, MarketCaches::default());

        let first = market.snapshots().unwrap();
        let second = market.snapshots().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        market.invalidate();
        let third = market.snapshots().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn forgetting_an_item_reloads_only_that_item() {
        let (_dir, store) = seeded();
        let mut market = MarketData::new(store, MarketCaches::default());

        let snaps = market.snapshots().unwrap();
        let history = market.price_history(19721).unwrap();
        let volumes = market.daily_volumes(19721).unwrap();

        market.forget_item(19721);
        assert!(!Arc::ptr_eq(&history, &market.price_history(19721).unwrap()));
        assert!(!Arc::ptr_eq(&volumes, &market.daily_volumes(19721).unwrap()));
        assert!(Arc::ptr_eq(&snaps, &market.snapshots().unwrap()));
    }

    #[test]
    fn zero_ttl_cache_always_reloads() {
        let (_dir, store) = seeded();
        let caches = MarketCaches {
            history: TtlCache::new(StdDuration::ZERO),
            ..MarketCaches::default()
        };
        let mut market = MarketData::new(store, caches);

        let a = market.price_history(19721).unwrap();
        let b = market.price_history(19721).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), b.len());
    }
}
