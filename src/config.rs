use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ConfigError;
use crate::types::{WatchedWallet, decimal_from_value};
use crate::{DATA_API_BASE, DEFAULT_HISTORY_CAP, MARKET_BASE_URL, TELEGRAM_API_BASE};

/// Default settings file path.
pub const SETTINGS_PATH: &str = "tracker.toml";

const DEFAULT_YOUR_BANKROLL: Decimal = dec!(50);
const DEFAULT_TARGET_BANKROLL: Decimal = dec!(25800);

/// Optional `tracker.toml` contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub settings: Settings,
}

/// Non-secret runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_api_base")]
    pub data_api_base: String,
    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,
    #[serde(default = "default_market_base_url")]
    pub market_base_url: String,
    /// Activity entries requested per wallet (single page).
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_secs: u64,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Maximum notified trades kept in the state file.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Offset used when printing trade times. Defaults to Brasília time.
    #[serde(default = "default_display_offset")]
    pub display_utc_offset_hours: i32,
}

fn default_data_api_base() -> String {
    DATA_API_BASE.to_string()
}

fn default_telegram_api_base() -> String {
    TELEGRAM_API_BASE.to_string()
}

fn default_market_base_url() -> String {
    MARKET_BASE_URL.to_string()
}

fn default_fetch_limit() -> u32 {
    20
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_notify_timeout() -> u64 {
    10
}

fn default_state_file() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_history_cap() -> usize {
    DEFAULT_HISTORY_CAP
}

fn default_display_offset() -> i32 {
    -3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_api_base: default_data_api_base(),
            telegram_api_base: default_telegram_api_base(),
            market_base_url: default_market_base_url(),
            fetch_limit: default_fetch_limit(),
            fetch_timeout_secs: default_fetch_timeout(),
            notify_timeout_secs: default_notify_timeout(),
            state_file: default_state_file(),
            history_cap: default_history_cap(),
            display_utc_offset_hours: default_display_offset(),
        }
    }
}

impl Settings {
    /// Load settings from the given TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file: SettingsFile = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(file.settings)
    }

    pub fn display_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.display_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::Offset(self.display_utc_offset_hours))
    }
}

/// Everything a run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_token: String,
    pub chat_id: String,
    pub your_bankroll: Decimal,
    pub wallets: Vec<WatchedWallet>,
    pub settings: Settings,
    pub display_offset: FixedOffset,
}

impl AppConfig {
    /// Resolve configuration from environment-style key lookups over the
    /// given settings.
    pub fn from_env<F>(lookup: F, settings: Settings) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram_token = required(&lookup, "TELEGRAM_TOKEN")?;
        let chat_id = required(&lookup, "TELEGRAM_CHAT_ID")?;
        let display_offset = settings.display_offset()?;

        let your_bankroll = match lookup("YOUR_BANKROLL") {
            Some(raw) => parse_bankroll(&raw).unwrap_or_else(|| {
                warn!("YOUR_BANKROLL={raw:?} is not a valid amount, using {DEFAULT_YOUR_BANKROLL}");
                DEFAULT_YOUR_BANKROLL
            }),
            None => DEFAULT_YOUR_BANKROLL,
        };

        let wallets = match lookup("WALLETS") {
            Some(raw) => parse_wallets(&raw).unwrap_or_else(|| {
                warn!("WALLETS is malformed, falling back to the default wallet list");
                default_wallets()
            }),
            None => match lookup("TARGET_WALLET") {
                Some(addr) if !addr.trim().is_empty() => {
                    let bankroll = lookup("TARGET_BANKROLL")
                        .and_then(|raw| parse_bankroll(&raw))
                        .unwrap_or(DEFAULT_TARGET_BANKROLL);
                    vec![WatchedWallet::new(&addr, "target", bankroll)]
                }
                _ => default_wallets(),
            },
        };

        Ok(Self {
            telegram_token,
            chat_id,
            your_bankroll,
            wallets,
            settings,
            display_offset,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_bankroll(raw: &str) -> Option<Decimal> {
    decimal_from_value(&Value::String(raw.to_string())).filter(|d| !d.is_sign_negative())
}

#[derive(Deserialize)]
struct WalletEntry {
    address: String,
    name: String,
    bankroll: Value,
}

/// Parse the `WALLETS` JSON array. `None` if anything about it is malformed,
/// including an empty list.
pub fn parse_wallets(raw: &str) -> Option<Vec<WatchedWallet>> {
    let entries: Vec<WalletEntry> = serde_json::from_str(raw).ok()?;
    if entries.is_empty() {
        return None;
    }
    entries
        .into_iter()
        .map(|e| {
            if e.address.trim().is_empty() {
                return None;
            }
            let bankroll = decimal_from_value(&e.bankroll)?;
            Some(WatchedWallet::new(&e.address, &e.name, bankroll))
        })
        .collect()
}

/// Built-in watch list used when `WALLETS` is unset or malformed.
pub fn default_wallets() -> Vec<WatchedWallet> {
    vec![
        WatchedWallet::new(
            "0x8f42ae0a01c0383c7ca8bd060b86a645ee74b88f",
            "cashy",
            DEFAULT_TARGET_BANKROLL,
        ),
        WatchedWallet::new(
            "0xdb27bf2ac5d428a9c63dbc914611036855a6c56e",
            "DrPufferfish",
            dec!(100000),
        ),
    ]
}
