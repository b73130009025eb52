use crate::{
    currency::{decompose, format_gsc, format_gsc_f64, group_thousands, COPPER_PER_GOLD},
    error::SummaryError,
    loader::MarketData,
    model::{DailyVolume, ItemSnapshot, PricePoint},
    policy::{Candidate, Policy, Recommendations, Side},
    settings::{Settings, SettingsStore},
    summarizer::{build_snapshot_csv, GeminiClient, Summarizer},
};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use eframe::egui;
use egui::{Color32, Context, FontFamily, FontId, Margin, RichText, Stroke, Vec2, Visuals};
use egui_extras::{Column, TableBuilder};
use egui_plot::{Bar, BarChart, Legend, Line, Plot, PlotPoints};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use tracing::{error, info};

const GOLD: Color32 = Color32::from_rgb(255, 204, 77);
const HEADER: Color32 = Color32::from_rgb(200, 190, 170);
const MUTED: Color32 = Color32::from_rgb(160, 150, 135);
const SELL_RED: Color32 = Color32::from_rgb(0xe7, 0x4c, 0x3c);
const BUY_GREEN: Color32 = Color32::from_rgb(0x2e, 0xcc, 0x71);
const WARN: Color32 = Color32::from_rgb(255, 180, 80);
const ERROR: Color32 = Color32::from_rgb(255, 100, 100);

// In-game item rarity colours; the theme borrows its accents from these.
const JUNK: Color32 = Color32::from_rgb(170, 170, 170);
const BASIC: Color32 = Color32::from_rgb(230, 230, 230);
const FINE: Color32 = Color32::from_rgb(98, 164, 218);
const MASTERWORK: Color32 = Color32::from_rgb(26, 147, 6);
const RARE: Color32 = Color32::from_rgb(252, 208, 11);
const EXOTIC: Color32 = Color32::from_rgb(255, 164, 5);
const ASCENDED: Color32 = Color32::from_rgb(251, 62, 141);
const LEGENDARY: Color32 = Color32::from_rgb(160, 46, 247);

// Fonts tried in order; the first one found becomes the proportional default.
const SYSTEM_FONTS: &[(&str, &str)] = &[
    ("SegoeUI", "C:\\Windows\\Fonts\\segoeui.ttf"),
    ("DejaVuSans", "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
    ("HelveticaNeue", "/System/Library/Fonts/HelveticaNeue.ttc"),
];

pub fn install_fonts(ctx: &Context) {
    let mut fonts = egui::FontDefinitions::default();

    let found = SYSTEM_FONTS
        .iter()
        .find_map(|(name, path)| std::fs::read(path).ok().map(|data| (*name, data)));
    if let Some((name, data)) = found {
        fonts
            .font_data
            .insert(name.to_owned(), egui::FontData::from_owned(data).into());
        if let Some(family) = fonts.families.get_mut(&FontFamily::Proportional) {
            family.insert(0, name.to_owned());
        }
        info!(font = name, "using system font");
    }

    ctx.set_fonts(fonts);
}

/// Washes `accent` into a dark panel colour, `strength` in 0..=1.
fn tint(accent: Color32, strength: f32) -> Color32 {
    let base = Color32::from_rgb(24, 22, 28);
    let mix = |b: u8, a: u8| (b as f32 + (a as f32 - b as f32) * strength).round() as u8;
    Color32::from_rgb(
        mix(base.r(), accent.r()),
        mix(base.g(), accent.g()),
        mix(base.b(), accent.b()),
    )
}

pub fn set_custom_style(ctx: &Context) {
    let mut visuals = Visuals::dark();

    visuals.panel_fill = tint(LEGENDARY, 0.03);
    visuals.window_fill = tint(LEGENDARY, 0.06);
    visuals.extreme_bg_color = tint(FINE, 0.08);
    visuals.faint_bg_color = tint(RARE, 0.04);
    visuals.hyperlink_color = FINE;
    visuals.warn_fg_color = EXOTIC;
    visuals.error_fg_color = ASCENDED;

    // idle widgets sit on a faint exotic wash, hover lights up rare, pressed is legendary
    let states = [
        (&mut visuals.widgets.inactive, EXOTIC, 0.12, 1.0_f32),
        (&mut visuals.widgets.hovered, RARE, 0.22, 1.5_f32),
        (&mut visuals.widgets.active, LEGENDARY, 0.35, 2.0_f32),
    ];
    for (widget, accent, fill, stroke) in states {
        widget.bg_fill = tint(accent, fill);
        widget.weak_bg_fill = tint(accent, fill * 0.8);
        widget.bg_stroke = Stroke::new(stroke, tint(accent, 0.6));
    }

    visuals.selection.bg_fill = tint(EXOTIC, 0.4);
    visuals.selection.stroke = Stroke::new(1.0, GOLD);

    ctx.set_visuals(visuals);

    let mut style = (*ctx.style()).clone();
    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.window_margin = Margin::same(10);
    style.spacing.button_padding = egui::vec2(10.0, 6.0);

    for (text_style, size) in [
        (egui::TextStyle::Small, 12.0),
        (egui::TextStyle::Body, 15.0),
        (egui::TextStyle::Button, 15.0),
        (egui::TextStyle::Heading, 21.0),
    ] {
        style
            .text_styles
            .insert(text_style, FontId::new(size, FontFamily::Proportional));
    }

    ctx.set_style(style);
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Page {
    Dashboard,
    ItemAnalysis,
    Recommendations,
    AiRecommendations,
    Settings,
}

impl Page {
    const ALL: [Page; 5] = [
        Page::Dashboard,
        Page::ItemAnalysis,
        Page::Recommendations,
        Page::AiRecommendations,
        Page::Settings,
    ];

    fn title(self) -> &'static str {
        match self {
            Page::Dashboard => "🏠 Dashboard",
            Page::ItemAnalysis => "📊 Item Analysis",
            Page::Recommendations => "📋 Recommendations",
            Page::AiRecommendations => "🤖 AI Recommendations",
            Page::Settings => "⚙ Settings",
        }
    }
}

struct RankedCache {
    policy: Policy,
    source: Arc<Vec<ItemSnapshot>>,
    recs: Recommendations,
}

pub struct TpApp {
    market: Result<MarketData, String>,
    load_error: Option<String>,

    settings_store: SettingsStore,
    settings: Settings,
    draft: Settings,
    settings_status: Option<Result<String, String>>,

    page: Page,

    // Recommendations
    policy: Policy,
    ranked: Option<RankedCache>,

    // Item analysis
    search: String,
    selected_item: Option<(i64, String)>,

    // AI
    ai_job: Option<Receiver<Result<String, SummaryError>>>,
    ai_result: Option<Result<String, String>>,
}

impl TpApp {
    pub fn new(market: Result<MarketData, String>, settings_store: SettingsStore, settings: Settings) -> Self {
        Self {
            market,
            load_error: None,

            settings_store,
            draft: settings.clone(),
            settings,
            settings_status: None,

            page: Page::Dashboard,

            policy: Policy::MeanReversion,
            ranked: None,

            search: String::new(),
            selected_item: None,

            ai_job: None,
            ai_result: None,
        }
    }

    fn refresh(&mut self) {
        if let Ok(market) = self.market.as_mut() {
            market.invalidate();
        }
        self.load_error = None;
        self.ranked = None;
    }

    // Runs a read against the store; a failure is shown until the next refresh instead of retried every frame
    fn read<T>(
        &mut self,
        ui: &mut egui::Ui,
        what: &str,
        f: impl FnOnce(&mut MarketData) -> Result<T, crate::error::StoreError>,
    ) -> Option<T> {
        if let Some(msg) = &self.load_error {
            error_label(ui, msg);
            return None;
        }
        let market = match self.market.as_mut() {
            Ok(m) => m,
            Err(msg) => {
                error_label(ui, &format!("No database connection: {}", msg));
                return None;
            }
        };
        match f(market) {
            Ok(v) => Some(v),
            Err(e) => {
                error!(what, error = %e, "load failed");
                let msg = format!("Failed to load {} from the database: {}", what, e);
                error_label(ui, &msg);
                self.load_error = Some(msg);
                None
            }
        }
    }

    fn snapshots(&mut self, ui: &mut egui::Ui) -> Option<Arc<Vec<ItemSnapshot>>> {
        self.read(ui, "market data", |m| m.snapshots())
    }

    fn dashboard(&mut self, ui: &mut egui::Ui) {
        ui.heading(RichText::new("Dashboard").color(GOLD));

        let Some(snaps) = self.snapshots(ui) else { return };
        if snaps.is_empty() {
            warn_label(ui, "No item data found. Is the price collector populating the database?");
            return;
        }

        let total: i64 = snaps.iter().map(|s| s.position_value()).sum();
        let (g, s, c) = decompose(total);

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            metric(ui, "Gold", group_thousands(g), Color32::from_rgb(255, 204, 77));
            ui.add_space(40.0);
            metric(ui, "Silver", s.to_string(), Color32::from_rgb(200, 200, 210));
            ui.add_space(40.0);
            metric(ui, "Copper", c.to_string(), Color32::from_rgb(200, 130, 80));
        });
        ui.add_space(8.0);
        metric(ui, "Total Liquid Account Value", format_gsc(total), GOLD);

        ui.add_space(10.0);
        ui.separator();
        ui.heading(RichText::new("Inventory Breakdown").color(HEADER));

        let mut held: Vec<&ItemSnapshot> = snaps.iter().filter(|s| s.held()).collect();
        if held.is_empty() {
            info_label(ui, "No items currently in inventory.");
            return;
        }
        held.sort_by(|a, b| b.position_value().cmp(&a.position_value()));

        TableBuilder::new(ui)
            .striped(true)
            .vscroll(true)
            .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
            .column(Column::remainder().at_least(220.0).clip(true))
            .column(Column::exact(80.0))
            .column(Column::exact(140.0))
            .column(Column::exact(140.0))
            .column(Column::exact(160.0))
            .header(30.0, |mut header| {
                for title in ["Item", "Qty", "Sell Price", "Buy Price", "Total Value"] {
                    header.col(|ui| {
                        ui.heading(RichText::new(title).color(HEADER));
                    });
                }
            })
            .body(|body| {
                body.rows(30.0, held.len(), |mut row| {
                    let s = held[row.index()];
                    row.col(|ui| {
                        ui.label(RichText::new(&s.item_name).color(rarity_color(&s.rarity)));
                    });
                    row.col(|ui| {
                        ui.label(s.current_count.to_string());
                    });
                    row.col(|ui| {
                        ui.label(RichText::new(format_gsc(s.latest_sell_price)).color(SELL_RED));
                    });
                    row.col(|ui| {
                        ui.label(RichText::new(format_gsc(s.latest_buy_price)).color(BUY_GREEN));
                    });
                    row.col(|ui| {
                        ui.label(RichText::new(format_gsc(s.position_value())).color(GOLD).strong());
                    });
                });
            });
    }

    fn item_analysis(&mut self, ui: &mut egui::Ui) {
        ui.heading(RichText::new("Item Analysis").color(GOLD));

        let Some(items) = self.read(ui, "items", |m| m.items()) else { return };
        if items.is_empty() {
            warn_label(ui, "No items found in the database.");
            return;
        }

        ui.horizontal(|ui| {
            ui.label(RichText::new("🔎").color(HEADER));
            ui.add(
                egui::TextEdit::singleline(&mut self.search)
                    .hint_text("Start typing an item name…")
                    .desired_width(320.0),
            );
            if let Some((_, label)) = &self.selected_item {
                ui.label(RichText::new(label).color(GOLD).strong());
            }
        });

        if !self.search.is_empty() {
            let needle = self.search.to_lowercase();
            egui::ScrollArea::vertical()
                .id_salt("item_picker")
                .max_height(160.0)
                .show(ui, |ui| {
                    for item in items
                        .iter()
                        .filter(|i| i.item_name.to_lowercase().contains(&needle))
                        .take(200)
                    {
                        let label = format!("{} ({})", item.item_name, item.rarity);
                        let selected = self.selected_item.as_ref().map(|(id, _)| *id) == Some(item.item_id);
                        let text = RichText::new(&label).color(rarity_color(&item.rarity));
                        if ui.selectable_label(selected, text).clicked() {
                            // picking an item (again) pulls its latest history
                            if let Ok(market) = self.market.as_mut() {
                                market.forget_item(item.item_id);
                            }
                            self.selected_item = Some((item.item_id, label));
                        }
                    }
                });
        }

        let Some((item_id, _)) = self.selected_item.clone() else {
            info_label(ui, "Choose an item to view its price and volume history.");
            return;
        };

        let Some(history) = self.read(ui, "price history", |m| m.price_history(item_id)) else { return };
        if history.is_empty() {
            warn_label(ui, "No price history found for this item.");
            return;
        }
        let tz = self.settings.tz();

        ui.separator();
        egui::ScrollArea::vertical().id_salt("item_charts").show(ui, |ui| {
            ui.label(RichText::new("Price Trends").color(HEADER).strong());
            price_chart(ui, &history, tz);

            ui.add_space(8.0);
            ui.label(RichText::new("Volume Trends").color(HEADER).strong());
            volume_chart(ui, &history, tz);

            let volumes = self.read(ui, "daily volumes", |m| m.daily_volumes(item_id));
            if let Some(volumes) = volumes.filter(|v| !v.is_empty()) {
                ui.add_space(8.0);
                ui.label(RichText::new("Daily Transaction Volume").color(HEADER).strong());
                daily_volume_chart(ui, &volumes);
            }
        });
    }

    fn recommendations(&mut self, ui: &mut egui::Ui) {
        ui.heading(RichText::new("Recommendations").color(GOLD));

        ui.horizontal(|ui| {
            ui.label(RichText::new("Strategy:").color(HEADER));
            for policy in Policy::ALL {
                ui.selectable_value(&mut self.policy, policy, policy.label());
            }
        });
        ui.separator();

        let Some(snaps) = self.snapshots(ui) else { return };
        if snaps.is_empty() {
            warn_label(ui, "No opportunity data available. Is the price collector populating the database?");
            return;
        }

        let stale = match &self.ranked {
            Some(r) => r.policy != self.policy || !Arc::ptr_eq(&r.source, &snaps),
            None => true,
        };
        if stale {
            let recs = self.policy.recommend(&snaps, &self.settings.signals);
            info!(policy = ?self.policy, buy = recs.buy.len(), sell = recs.sell.len(), "recomputed recommendations");
            self.ranked = Some(RankedCache {
                policy: self.policy,
                source: snaps,
                recs,
            });
        }
        let Some(ranked) = &self.ranked else { return };
        let policy = ranked.policy;

        if ranked.recs.is_empty() {
            info_label(ui, "No buy or sell signals right now.");
        }

        egui::ScrollArea::vertical().id_salt("recs").show(ui, |ui| {
            ui.label(RichText::new(format!("📈 Buy · {}", policy.label())).color(BUY_GREEN).size(18.0));
            if ranked.recs.buy.is_empty() {
                info_label(ui, "No items currently qualify as buys.");
            } else {
                ui.label(RichText::new(format!("{} items", ranked.recs.buy.len())).color(MUTED).small());
                ui.push_id("buy_table", |ui| candidate_table(ui, policy, Side::Buy, &ranked.recs.buy));
            }

            ui.add_space(12.0);
            ui.label(RichText::new(format!("💰 Sell · {}", policy.label())).color(SELL_RED).size(18.0));
            if ranked.recs.sell.is_empty() {
                info_label(ui, "No inventory items currently qualify as sells.");
            } else {
                ui.label(RichText::new(format!("{} items", ranked.recs.sell.len())).color(MUTED).small());
                ui.push_id("sell_table", |ui| candidate_table(ui, policy, Side::Sell, &ranked.recs.sell));
            }
        });
    }

    fn ai_recommendations(&mut self, ui: &mut egui::Ui) {
        ui.heading(RichText::new("AI Recommendations").color(GOLD));

        if !self.settings.has_api_key() {
            warn_label(ui, "No Gemini API key configured. Go to Settings to add one.");
            return;
        }

        ui.label(
            RichText::new(
                "Analyzes your market data combined with current GW2 news and events \
                 to produce Top 5 Buy and Sell picks with reasoning.",
            )
            .color(MUTED),
        );

        self.poll_ai_job();
        let running = self.ai_job.is_some();

        ui.horizontal(|ui| {
            let button = egui::Button::new(RichText::new("🤖 Generate AI Top 5 Picks").color(GOLD).strong());
            if ui.add_enabled(!running, button).clicked() {
                self.start_ai_job(ui);
            }
            if running {
                ui.spinner();
                ui.label(RichText::new("Researching GW2 market trends and analyzing data…").color(MUTED));
            }
        });

        match &self.ai_result {
            Some(Ok(text)) => {
                ui.separator();
                egui::ScrollArea::vertical().id_salt("ai_text").show(ui, |ui| {
                    ui.label(RichText::new(text).monospace());
                });
            }
            Some(Err(msg)) => error_label(ui, msg),
            None => {}
        }
    }

    fn start_ai_job(&mut self, ui: &mut egui::Ui) {
        let Some(snaps) = self.snapshots(ui) else { return };
        if snaps.is_empty() {
            self.ai_result = Some(Err("No opportunity data available.".to_string()));
            return;
        }

        let cfg = self.settings.signals.clone();
        let csv = build_snapshot_csv(&snaps, &cfg);
        let api_key = self.settings.gemini_api_key.clone();
        let today = Utc::now().date_naive();
        let ctx = ui.ctx().clone();

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let result = GeminiClient::new(api_key)
                .and_then(|client| Summarizer::new(client).summarize(&csv, today, &cfg));
            let _ = tx.send(result);
            ctx.request_repaint();
        });

        info!("started AI summary request");
        self.ai_job = Some(rx);
        self.ai_result = None;
    }

    fn poll_ai_job(&mut self) {
        let Some(rx) = &self.ai_job else { return };
        match rx.try_recv() {
            Ok(Ok(text)) => {
                self.ai_result = Some(Ok(text));
                self.ai_job = None;
            }
            Ok(Err(e)) => {
                error!(error = %e, "AI summary failed");
                self.ai_result = Some(Err(format!("Gemini API error: {}", e)));
                self.ai_job = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.ai_result = Some(Err("AI request ended without a result.".to_string()));
                self.ai_job = None;
            }
        }
    }

    fn settings_page(&mut self, ui: &mut egui::Ui) {
        ui.heading(RichText::new("Settings").color(GOLD));
        ui.label(
            RichText::new(format!("Saved to {}", self.settings_store.path().display()))
                .color(MUTED)
                .small(),
        );
        ui.add_space(8.0);

        let tz_ok = self.draft.timezone.parse::<Tz>().is_ok();
        let draft = &mut self.draft;

        egui::Grid::new("settings_grid")
            .num_columns(2)
            .spacing([16.0, 10.0])
            .show(ui, |ui| {
                ui.label("Display Timezone");
                ui.horizontal(|ui| {
                    ui.add(egui::TextEdit::singleline(&mut draft.timezone).desired_width(220.0))
                        .on_hover_text("IANA name, e.g. America/New_York. Chart timestamps use this zone.");
                    if !tz_ok {
                        ui.label(RichText::new("unknown zone, charts will use UTC").color(WARN).small());
                    }
                });
                ui.end_row();

                ui.label("Gemini API Key");
                ui.add(
                    egui::TextEdit::singleline(&mut draft.gemini_api_key)
                        .password(true)
                        .desired_width(320.0),
                )
                .on_hover_text("Required for the AI Recommendations page.");
                ui.end_row();

                let sig = &mut draft.signals;

                ui.label("Trading post tax");
                let mut tax_pct = sig.tax_rate * 100.0;
                if ui
                    .add(egui::DragValue::new(&mut tax_pct).range(0.0..=50.0).speed(0.5).suffix(" %"))
                    .changed()
                {
                    sig.tax_rate = tax_pct / 100.0;
                }
                ui.end_row();

                ui.label("Min sell listings (buy side)");
                ui.add(egui::DragValue::new(&mut sig.min_sell_listings).range(0..=100_000));
                ui.end_row();

                ui.label("Min buy orders (sell side)");
                ui.add(egui::DragValue::new(&mut sig.min_buy_orders).range(0..=100_000));
                ui.end_row();

                ui.label("Min daily sold (statistical)");
                ui.add(egui::DragValue::new(&mut sig.min_daily_sold).range(0..=100_000));
                ui.end_row();

                ui.label("Buy z-score ≤");
                ui.add(egui::DragValue::new(&mut sig.buy_z_threshold).range(-5.0..=0.0).speed(0.05));
                ui.end_row();

                ui.label("Sell z-score ≥");
                ui.add(egui::DragValue::new(&mut sig.sell_z_threshold).range(0.0..=5.0).speed(0.05));
                ui.end_row();

                ui.label("Min position profit");
                let mut gold = sig.min_position_profit / COPPER_PER_GOLD as f64;
                if ui
                    .add(egui::DragValue::new(&mut gold).range(0.0..=100_000.0).speed(0.1).suffix(" g"))
                    .changed()
                {
                    sig.min_position_profit = gold * COPPER_PER_GOLD as f64;
                }
                ui.end_row();

                ui.label("Breakout list size");
                ui.add(egui::DragValue::new(&mut sig.breakout_top_n).range(1..=100));
                ui.end_row();
            });

        ui.add_space(10.0);
        ui.horizontal(|ui| {
            if ui
                .add_sized(
                    Vec2::new(140.0, 32.0),
                    egui::Button::new(RichText::new("💾 Save Settings").color(GOLD).strong()),
                )
                .clicked()
            {
                self.settings_status = Some(match self.settings_store.save(&self.draft) {
                    Ok(()) => {
                        self.settings = self.draft.clone();
                        self.ranked = None;
                        Ok("Settings saved successfully!".to_string())
                    }
                    Err(e) => Err(format!("Could not save settings: {}", e)),
                });
            }
            if ui.button("Reset to defaults").clicked() {
                self.draft = Settings {
                    gemini_api_key: self.draft.gemini_api_key.clone(),
                    ..Settings::default()
                };
            }
        });

        match &self.settings_status {
            Some(Ok(msg)) => {
                ui.label(RichText::new(msg).color(BUY_GREEN));
            }
            Some(Err(msg)) => error_label(ui, msg),
            None => {}
        }
    }
}

impl eframe::App for TpApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.add_space(4.0);

            ui.horizontal(|ui| {
                ui.heading(
                    RichText::new("⚔ Guild Wars 2 Trading Post Analyzer")
                        .color(GOLD)
                        .strong()
                        .size(24.0),
                );
            });

            ui.add_space(4.0);
            ui.separator();

            ui.horizontal(|ui| {
                for page in Page::ALL {
                    ui.selectable_value(&mut self.page, page, page.title());
                }

                ui.separator();

                if ui
                    .button(RichText::new("🔄 Refresh").color(GOLD))
                    .on_hover_text("Drop cached data and reload from the database")
                    .clicked()
                {
                    self.refresh();
                }
            });

            ui.add_space(2.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.page {
            Page::Dashboard => self.dashboard(ui),
            Page::ItemAnalysis => self.item_analysis(ui),
            Page::Recommendations => self.recommendations(ui),
            Page::AiRecommendations => self.ai_recommendations(ui),
            Page::Settings => self.settings_page(ui),
        });

        if self.ai_job.is_some() {
            ctx.request_repaint_after(std::time::Duration::from_millis(250));
        }
    }
}

fn candidate_table(ui: &mut egui::Ui, policy: Policy, side: Side, list: &[Candidate]) {
    let (price_head, second_head, volume_head) = match side {
        Side::Buy => ("Buy Price", "30d Avg Buy", "Sold/Day"),
        Side::Sell => ("Sell Price", "Qty", "Bought/Day"),
    };

    TableBuilder::new(ui)
        .striped(true)
        .vscroll(true)
        .max_scroll_height(320.0)
        .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
        .column(Column::remainder().at_least(220.0).clip(true))
        .column(Column::exact(140.0))
        .column(Column::exact(140.0))
        .column(Column::exact(150.0))
        .column(Column::exact(100.0))
        .header(30.0, |mut header| {
            for title in ["Item", price_head, second_head, policy.score_label(side), volume_head] {
                header.col(|ui| {
                    ui.heading(RichText::new(title).color(HEADER));
                });
            }
        })
        .body(|body| {
            body.rows(30.0, list.len(), |mut row| {
                let c = &list[row.index()];

                row.col(|ui| {
                    ui.label(RichText::new(&c.item_name).color(rarity_color(&c.rarity)))
                        .on_hover_text(candidate_details(c));
                });

                match side {
                    Side::Buy => {
                        row.col(|ui| {
                            ui.label(RichText::new(format_gsc(c.latest_buy_price)).color(BUY_GREEN));
                        });
                        row.col(|ui| {
                            ui.label(format_gsc_f64(c.avg_buy_30d));
                        });
                    }
                    Side::Sell => {
                        row.col(|ui| {
                            ui.label(RichText::new(format_gsc(c.latest_sell_price)).color(SELL_RED));
                        });
                        row.col(|ui| {
                            ui.label(c.current_count.to_string());
                        });
                    }
                }

                row.col(|ui| {
                    let text = if policy.score_is_copper() {
                        format_gsc_f64(c.score)
                    } else if side == Side::Sell {
                        format!("+{:.1} %", c.score)
                    } else {
                        format!("{:.1} %", c.score)
                    };
                    ui.label(RichText::new(text).color(GOLD).strong());
                });

                row.col(|ui| {
                    let volume = match side {
                        Side::Buy => c.avg_daily_sold,
                        Side::Sell => c.avg_daily_bought,
                    };
                    ui.label(RichText::new(volume.to_string()).color(Color32::from_rgb(180, 200, 255)));
                });
            });
        });
}

fn candidate_details(c: &Candidate) -> String {
    let s = &c.signals;
    let pct = |v: Option<f64>| v.map(|x| format!("{:.1}%", x)).unwrap_or_else(|| "n/a".into());
    let z = |v: Option<f64>| v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "n/a".into());
    format!(
        "{} ({})\nDiscount: {}  Premium: {}  Flip margin: {}\nBuy z: {}  Sell z: {}\nBuy range: {}  Sell range: {}\n7d sell trend: {}  7d buy trend: {}",
        c.item_name,
        c.rarity,
        pct(s.discount_pct),
        pct(s.premium_pct),
        pct(s.flip_margin_pct),
        z(s.buy_z_score),
        z(s.sell_z_score),
        pct(s.buy_range_pct),
        pct(s.sell_range_pct),
        pct(s.sell_price_trend_7d),
        pct(s.buy_price_trend_7d),
    )
}

fn price_chart(ui: &mut egui::Ui, history: &[PricePoint], tz: Tz) {
    let sell: Vec<[f64; 2]> = history
        .iter()
        .filter(|p| p.sell_price > 0)
        .map(|p| [p.recorded_at.timestamp() as f64, p.sell_price as f64])
        .collect();
    let buy: Vec<[f64; 2]> = history
        .iter()
        .filter(|p| p.buy_price > 0)
        .map(|p| [p.recorded_at.timestamp() as f64, p.buy_price as f64])
        .collect();

    Plot::new("price_chart")
        .height(280.0)
        .legend(Legend::default())
        .x_axis_formatter(move |mark, _range| time_label(mark.value, tz))
        .y_axis_formatter(|mark, _range| format_gsc_f64(mark.value))
        .show(ui, |plot_ui| {
            plot_ui.line(Line::new("Sell Price", PlotPoints::from(sell)).color(SELL_RED));
            plot_ui.line(Line::new("Buy Price", PlotPoints::from(buy)).color(BUY_GREEN));
        });
}

fn volume_chart(ui: &mut egui::Ui, history: &[PricePoint], tz: Tz) {
    let listings: Vec<[f64; 2]> = history
        .iter()
        .map(|p| [p.recorded_at.timestamp() as f64, p.sell_quantity as f64])
        .collect();
    let orders: Vec<[f64; 2]> = history
        .iter()
        .map(|p| [p.recorded_at.timestamp() as f64, p.buy_quantity as f64])
        .collect();

    Plot::new("volume_chart")
        .height(220.0)
        .legend(Legend::default())
        .x_axis_formatter(move |mark, _range| time_label(mark.value, tz))
        .show(ui, |plot_ui| {
            plot_ui.line(Line::new("Sell Listings", PlotPoints::from(listings)).color(SELL_RED));
            plot_ui.line(Line::new("Buy Orders", PlotPoints::from(orders)).color(BUY_GREEN));
        });
}

fn daily_volume_chart(ui: &mut egui::Ui, volumes: &[DailyVolume]) {
    use chrono::Datelike;

    let day = |v: &DailyVolume| v.snap_date.num_days_from_ce() as f64;
    let sold: Vec<Bar> = volumes
        .iter()
        .map(|v| Bar::new(day(v) - 0.2, v.items_sold as f64).width(0.4))
        .collect();
    let bought: Vec<Bar> = volumes
        .iter()
        .map(|v| Bar::new(day(v) + 0.2, v.items_bought as f64).width(0.4))
        .collect();

    Plot::new("daily_volume_chart")
        .height(220.0)
        .legend(Legend::default())
        .x_axis_formatter(|mark, _range| {
            NaiveDate::from_num_days_from_ce_opt(mark.value.round() as i32)
                .map(|d| d.format("%b %d").to_string())
                .unwrap_or_default()
        })
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(BarChart::new("Sold", sold).color(SELL_RED));
            plot_ui.bar_chart(BarChart::new("Bought", bought).color(BUY_GREEN));
        });
}

fn time_label(unix: f64, tz: Tz) -> String {
    DateTime::from_timestamp(unix as i64, 0)
        .map(|t| t.with_timezone(&tz).format("%b %d %H:%M").to_string())
        .unwrap_or_default()
}

fn metric(ui: &mut egui::Ui, label: &str, value: String, color: Color32) {
    ui.vertical(|ui| {
        ui.label(RichText::new(label).color(MUTED));
        ui.label(RichText::new(value).size(26.0).strong().color(color));
    });
}

fn rarity_color(rarity: &str) -> Color32 {
    match rarity {
        "Junk" => JUNK,
        "Fine" => FINE,
        "Masterwork" => MASTERWORK,
        "Rare" => RARE,
        "Exotic" => EXOTIC,
        "Ascended" => ASCENDED,
        "Legendary" => LEGENDARY,
        _ => BASIC,
    }
}

fn info_label(ui: &mut egui::Ui, text: &str) {
    ui.label(RichText::new(format!("ℹ {}", text)).color(MUTED));
}

fn warn_label(ui: &mut egui::Ui, text: &str) {
    ui.label(RichText::new(format!("⚠ {}", text)).color(WARN));
}

fn error_label(ui: &mut egui::Ui, text: &str) {
    ui.label(RichText::new(format!("✖ {}", text)).color(ERROR));
}
