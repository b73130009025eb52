use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SignalConfig;
use crate::currency::{format_gsc, format_gsc_f64};
use crate::error::SummaryError;
use crate::filters::{is_valid, liquid_to_buy};
use crate::model::ItemSnapshot;
use crate::policy::Policy;
use crate::signals::Signals;

pub const GEMINI_MODEL: &str = "gemini-2.5-flash";
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT_SECS: u64 = 120;

pub const SNAPSHOT_ROW_LIMIT: usize = 100;
pub const NO_ANALYSIS: &str = "No analysis was generated. Please try again.";

const SNAPSHOT_COLUMNS: [&str; 25] = [
    "item_name",
    "qty",
    "latest_sell",
    "latest_buy",
    "avg_sell_30d",
    "avg_buy_30d",
    "buy_discount_pct",
    "flip_margin_pct",
    "sell_premium_pct",
    "sell_listings",
    "buy_orders",
    "avg_daily_sold",
    "avg_daily_bought",
    "sell_price_trend_7d",
    "buy_price_trend_7d",
    "sell_supply_trend_7d",
    "buy_demand_trend_7d",
    "buy_z_score",
    "sell_z_score",
    "buy_range_pct",
    "sell_range_pct",
    "buy_trend_3d_vs_7d",
    "expected_profit_per_unit",
    "total_position_profit",
    "signal",
];

/// Comma-delimited market snapshot for the summarizer.
///
/// Valid rows with enough sell listings, best flip margin first, capped at
/// `SNAPSHOT_ROW_LIMIT`. Empty cells mean "no data", not zero.
pub fn build_snapshot_csv(rows: &[ItemSnapshot], cfg: &SignalConfig) -> String {
    let stat = Policy::Statistical.recommend(rows, cfg);
    let buys: HashSet<i64> = stat.buy.iter().map(|c| c.item_id).collect();
    let sells: HashSet<i64> = stat.sell.iter().map(|c| c.item_id).collect();

    let mut picked: Vec<(&ItemSnapshot, Signals)> = rows
        .iter()
        .filter(|r| is_valid(r) && liquid_to_buy(r, cfg))
        .map(|r| (r, Signals::derive(r, cfg)))
        .collect();
    picked.sort_by(|(a, sa), (b, sb)| {
        let ma = sa.flip_margin_pct.unwrap_or(f64::NEG_INFINITY);
        let mb = sb.flip_margin_pct.unwrap_or(f64::NEG_INFINITY);
        mb.total_cmp(&ma).then(a.item_id.cmp(&b.item_id))
    });
    picked.truncate(SNAPSHOT_ROW_LIMIT);

    let mut out = SNAPSHOT_COLUMNS.join(",");
    out.push('\n');

    for (r, s) in &picked {
        let signal = match (buys.contains(&r.item_id), sells.contains(&r.item_id)) {
            (true, true) => "BUY+SELL",
            (true, false) => "BUY",
            (false, true) => "SELL",
            (false, false) => "",
        };
        let fields = [
            quote(&r.item_name),
            r.current_count.to_string(),
            quote(&format_gsc(r.latest_sell_price)),
            quote(&format_gsc(r.latest_buy_price)),
            quote(&format_gsc_f64(r.avg_sell_30d)),
            quote(&format_gsc_f64(r.avg_buy_30d)),
            opt1(s.discount_pct),
            opt1(s.flip_margin_pct),
            opt1(s.premium_pct),
            r.sell_listings.to_string(),
            r.buy_orders.to_string(),
            r.avg_daily_sold.to_string(),
            r.avg_daily_bought.to_string(),
            opt1(s.sell_price_trend_7d),
            opt1(s.buy_price_trend_7d),
            opt1(s.sell_supply_trend_7d),
            opt1(s.buy_demand_trend_7d),
            opt2(s.buy_z_score),
            opt2(s.sell_z_score),
            opt1(s.buy_range_pct),
            opt1(s.sell_range_pct),
            opt1(s.buy_trend_3d_vs_7d),
            format!("{:.0}", s.expected_profit_per_unit),
            format!("{:.0}", s.total_position_profit),
            signal.to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn opt1(v: Option<f64>) -> String {
    v.map(|x| format!("{:.1}", x)).unwrap_or_default()
}

fn opt2(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x)).unwrap_or_default()
}

pub fn system_prompt(today: NaiveDate, cfg: &SignalConfig) -> String {
    let tax_pct = cfg.tax_rate * 100.0;
    let keep = cfg.after_tax();
    format!(
        "You are an expert Guild Wars 2 Trading Post analyst.

Today's date is {today}.

You have access to Google Search. Use it to look up current GW2 events,
patches, or balance changes that could affect item demand.

You will receive a market snapshot CSV. Empty cells mean no data. Key columns:
- latest_buy / latest_sell: current TP prices
- avg_buy_30d / avg_sell_30d: 30-day average prices
- buy_discount_pct: how far below 30d avg the current buy price is (higher = better deal)
- flip_margin_pct: profit margin after {tax_pct:.0}% tax = ((sell * {keep:.2}) - buy) / buy * 100
- sell_price_trend_7d / buy_price_trend_7d: price momentum (+ = rising)
- sell_supply_trend_7d: listing volume change (+ = more supply = bearish)
- buy_demand_trend_7d: buy order change (+ = more demand = bullish)
- avg_daily_sold / avg_daily_bought: actual items traded per day (higher = more liquid)
- buy_z_score / sell_z_score: standard score vs the 30-day distribution
- buy_range_pct / sell_range_pct: position inside the 30-day range (0 = floor, 100 = ceiling)
- signal: BUY / SELL when the statistical screen already flags the item

STRICT RULES:
1. The TP takes {tax_pct:.0}% tax. A flip is ONLY profitable if flip_margin_pct > 0.
2. NEVER recommend items with buy_discount_pct < 3% (noise, not real discounts).
3. NEVER recommend items with avg_daily_sold < 5 (too illiquid).
4. BUY list must be sorted by flip_margin_pct descending.
5. SELL list must be sorted by sell premium above 30d avg descending.
6. For SELL, only include items where qty > 0.

OUTPUT FORMAT, exactly two sections:

## Top 5 Buy Recommendations
| # | Item | Buy Price | Flip Margin | Why |
|---|------|-----------|-------------|-----|
The \"Why\" column is 1-2 sentences citing the discount %, 7d price trend and daily volume.

## Top 5 Sell Recommendations
| # | Item | Sell Price | Qty | Why |
|---|------|------------|-----|-----|
The \"Why\" column is 1-2 sentences citing the premium %, whether price is peaking or still rising, and daily volume.

After both tables, add a \"Market Context\" paragraph (3 sentences max) with
any relevant GW2 news from your search.

If fewer than 5 items meet the criteria, list only those that do.
Do NOT invent data or recommend items that violate the rules above.
"
    )
}

pub fn user_content(snapshot_csv: &str) -> String {
    format!(
        "Here is my full market snapshot with trend data:\n\n```csv\n{snapshot_csv}```\n\n\
         First, search for current Guild Wars 2 news, events, updates, and Trading Post \
         market trends. Then use everything (the data AND your search findings) to produce \
         your Top 5 Buy and Top 5 Sell tables."
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub system_instruction: String,
    pub user_content: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub thinking_budget: u32,
    pub google_search: bool,
}

impl GenerateRequest {
    pub fn primary(system_instruction: String, user_content: String) -> Self {
        Self {
            system_instruction,
            user_content,
            temperature: 0.3,
            max_output_tokens: 8192,
            thinking_budget: 2048,
            google_search: true,
        }
    }

    /// Same prompt without search grounding or a thinking budget.
    pub fn reduced(&self) -> Self {
        Self {
            thinking_budget: 0,
            google_search: false,
            ..self.clone()
        }
    }
}

pub trait TextGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<String, SummaryError>;
}

pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SummaryError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SummaryError::MissingApiKey);
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            api_key,
            model: GEMINI_MODEL.to_string(),
        })
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, request: &GenerateRequest) -> Result<String, SummaryError> {
        let mut body = json!({
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.user_content }] }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_output_tokens,
                "thinkingConfig": { "thinkingBudget": request.thinking_budget },
            },
        });
        if request.google_search {
            body["tools"] = json!([{ "google_search": {} }]);
        }

        let url = format!("{}/{}:generateContent", GEMINI_API_URL, self.model);
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()?;

        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(SummaryError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        extract_text(&text)
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

/// Visible answer text: every non-thought part of every candidate.
pub fn extract_text(body: &str) -> Result<String, SummaryError> {
    let resp: GenerateResponse = serde_json::from_str(body)?;
    let parts: Vec<&str> = resp
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|c| c.parts.iter())
        .filter(|p| !p.thought)
        .filter_map(|p| p.text.as_deref())
        .filter(|t| !t.is_empty())
        .collect();
    Ok(parts.join("\n").trim().to_string())
}

pub struct Summarizer<G> {
    generator: G,
}

impl<G: TextGenerator> Summarizer<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// One primary attempt, one reduced attempt if the first came back empty.
    /// Errors are returned as-is; the caller's tables are unaffected.
    pub fn summarize(&self, snapshot_csv: &str, today: NaiveDate, cfg: &SignalConfig) -> Result<String, SummaryError> {
        let request = GenerateRequest::primary(system_prompt(today, cfg), user_content(snapshot_csv));

        let text = self.generator.generate(&request)?;
        if !text.trim().is_empty() {
            info!(chars = text.len(), "summary generated");
            return Ok(text);
        }

        warn!("empty summary, retrying without search or thinking");
        let text = self.generator.generate(&request.reduced())?;
        if text.trim().is_empty() {
            return Ok(NO_ANALYSIS.to_string());
        }
        Ok(text)
    }
}
