//! Alert rendering and delivery.
//!
//! Alerts are Telegram HTML-mode messages. Every interpolated value goes
//! through [`escape_html`] so market titles can't break the markup and get
//! the message rejected.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::NotifyError;
use crate::sizing::{bankroll_share_pct, suggested_size};
use crate::types::{TradeRecord, TradeSide, WatchedWallet};

/// Shown instead of the trade time when the API gave none.
pub const TIME_UNAVAILABLE: &str = "unavailable";

/// Destination for rendered alerts.
pub trait Notifier {
    /// Deliver one alert. `Ok(())` means the endpoint accepted it.
    fn send(&self, text: &str) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Telegram Bot API `sendMessage` sink.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.settings.telegram_api_base.trim_end_matches('/').to_string(),
            token: config.telegram_token.clone(),
            chat_id: config.chat_id.clone(),
            timeout: Duration::from_secs(config.settings.notify_timeout_secs),
        }
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        // The URL embeds the bot token; strip it from any error before logging.
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": false,
            }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(body = %body, "telegram API error");
            return Err(NotifyError::Status { status, body });
        }
        debug!("Alert delivered");
        Ok(())
    }
}

/// Prints alerts to stdout instead of sending them. Used by `--dry-run`.
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        println!("{text}\n");
        Ok(())
    }
}

/// Everything besides the trade needed to render an alert.
#[derive(Debug, Clone)]
pub struct AlertContext {
    pub your_bankroll: Decimal,
    pub market_base_url: String,
    pub display_offset: FixedOffset,
}

impl AlertContext {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            your_bankroll: config.your_bankroll,
            market_base_url: config.settings.market_base_url.trim_end_matches('/').to_string(),
            display_offset: config.display_offset,
        }
    }
}

/// Render the alert for one new trade.
pub fn render_alert(wallet: &WatchedWallet, trade: &TradeRecord, ctx: &AlertContext) -> String {
    let name = escape_html(&wallet.display_name);
    let outcome = escape_html(&trade.outcome);
    let side = escape_html(trade.side.as_str());
    let side_marker = match trade.side {
        TradeSide::Buy => "🟢 BUY".to_string(),
        TradeSide::Sell => "🔴 SELL".to_string(),
        TradeSide::Other(_) => format!("⚪ {side}"),
    };

    let your_size = cents(suggested_size(
        trade.size_usd,
        wallet.reference_bankroll,
        ctx.your_bankroll,
    ));
    let share_pct = cents(bankroll_share_pct(trade.size_usd, wallet.reference_bankroll));

    format!(
        "🔔 <b>NEW TRADE DETECTED</b>\n\
         👤 <b>Trader:</b> {name}\n\
         \n\
         📊 <b>Market:</b> {title}\n\
         🔗 <a href=\"{url}\">Open on Polymarket</a>\n\
         \n\
         {side_marker} <b>{outcome}</b>\n\
         💰 Price: ${price:.2}\n\
         📦 {name} size: ${usd:.2} ({share_pct:.2}% of bankroll)\n\
         \n\
         ━━━━━━━━━━━━━━━━━━━━━\n\
         💡 <b>Suggestion for you:</b>\n\
         → {side} <b>{outcome}</b> @ ~${price:.2}\n\
         → Size: <b>${your_size:.2}</b>\n\
         ━━━━━━━━━━━━━━━━━━━━━\n\
         \n\
         ⏱️ Traded at: {time}",
        title = escape_html(&trade.title),
        url = escape_html(&market_url(&ctx.market_base_url, trade)),
        price = cents(trade.price),
        usd = cents(trade.size_usd),
        time = trade_time(trade.timestamp, ctx.display_offset),
    )
}

/// Round half away from zero to two places. `{:.2}` on a `Decimal` truncates.
fn cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Deep link to the trade's market.
pub fn market_url(base: &str, trade: &TradeRecord) -> String {
    match (trade.event_slug.is_empty(), trade.slug.is_empty()) {
        (_, true) => base.to_string(),
        (false, false) => format!("{base}/event/{}/{}", trade.event_slug, trade.slug),
        (true, false) => format!("{base}/market/{}", trade.slug),
    }
}

/// When the trade happened, in the display offset.
pub fn trade_time(timestamp: Option<i64>, offset: FixedOffset) -> String {
    timestamp
        .filter(|&ts| ts > 0)
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| {
            dt.with_timezone(&offset)
                .format("%Y-%m-%d %H:%M:%S (UTC%:z)")
                .to_string()
        })
        .unwrap_or_else(|| TIME_UNAVAILABLE.to_string())
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
