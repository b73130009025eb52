mod cache;
mod config;
mod currency;
mod error;
mod filters;
mod loader;
mod model;
mod policy;
mod settings;
mod signals;
mod stats;
mod summarizer;
mod ui;

use eframe::egui;
use loader::{MarketCaches, MarketData, Store};
use settings::{Settings, SettingsStore};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use ui::TpApp;

const DEFAULT_DB_PATH: &str = "gw2_market.db";

fn main() -> eframe::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "gw2_tp_analyzer=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings_store = SettingsStore::from_env();
    let settings = settings_store.load().unwrap_or_else(|e| {
        warn!(error = %e, "could not load settings, using defaults");
        Settings::default()
    });

    let db_path = std::env::var("GW2_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let market = match Store::open(&db_path) {
        Ok(store) => {
            info!(path = %db_path, "opened market database");
            Ok(MarketData::new(store, MarketCaches::default()))
        }
        Err(e) => {
            error!(path = %db_path, error = %e, "could not open market database");
            Err(e.to_string())
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1500.0, 950.0])
            .with_min_inner_size([1100.0, 700.0]),
        ..Default::default()
    };

    eframe::run_native(
        "GW2 Trading Post Analyzer",
        options,
        Box::new(move |cc| {
            ui::install_fonts(&cc.egui_ctx);
            ui::set_custom_style(&cc.egui_ctx);
            Ok(Box::new(TpApp::new(market, settings_store, settings)))
        }),
    )
}
