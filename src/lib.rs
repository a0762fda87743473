pub mod api;
pub mod config;
pub mod error;
pub mod notifier;
pub mod reporter;
pub mod sizing;
pub mod state;
pub mod tracker;
pub mod types;

/// Polymarket data API base URL (public, no auth required)
pub const DATA_API_BASE: &str = "https://data-api.polymarket.com";

/// Telegram Bot API base URL
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Polymarket web app, used for market deep links
pub const MARKET_BASE_URL: &str = "https://polymarket.com";

/// Maximum notified trades remembered between runs
pub const DEFAULT_HISTORY_CAP: usize = 500;
