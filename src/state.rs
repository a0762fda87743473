use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::StateError;
use crate::types::TradeRecord;

/// Hex characters kept from the SHA-256 digest.
const TRADE_ID_LEN: usize = 16;

/// Longest market title stored alongside a notified trade.
pub const TITLE_SNIPPET_CHARS: usize = 50;

const LEGACY_TRADER: &str = "unknown";

/// Deterministic identifier of a trade, used for deduplication across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TradeId(String);

impl TradeId {
    /// Digest of the wallet (lowercased) and the trade fields that make a fill
    /// unique. Identical inputs always produce the same id.
    pub fn compute(wallet_address: &str, trade: &TradeRecord) -> Self {
        let timestamp = trade.timestamp.map(|t| t.to_string()).unwrap_or_default();
        let joined = [
            wallet_address.trim().to_lowercase(),
            trade.transaction_hash.clone(),
            timestamp,
            trade.condition_id.clone(),
            trade.side.as_str().to_string(),
            trade.size_tokens.normalize().to_string(),
            trade.price.normalize().to_string(),
        ]
        .join("|");

        let hex = format!("{:x}", Sha256::digest(joined.as_bytes()));
        Self(hex[..TRADE_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TradeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stored for each successfully delivered alert.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub notified_at: DateTime<Utc>,
    pub trader: String,
    /// Market title, truncated to [`TITLE_SNIPPET_CHARS`].
    pub title: String,
}

impl NotificationRecord {
    pub fn new(notified_at: DateTime<Utc>, trader: &str, title: &str) -> Self {
        Self {
            notified_at,
            trader: trader.to_string(),
            title: title.chars().take(TITLE_SNIPPET_CHARS).collect(),
        }
    }

    /// Metadata for ids migrated from the old list-only state format.
    fn placeholder() -> Self {
        Self {
            notified_at: DateTime::<Utc>::UNIX_EPOCH,
            trader: LEGACY_TRADER.to_string(),
            title: String::new(),
        }
    }
}

/// Dedup state carried between runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub notified_trades: HashMap<TradeId, NotificationRecord>,
    pub last_check: Option<DateTime<Utc>>,
}

impl PersistedState {
    pub fn len(&self) -> usize {
        self.notified_trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notified_trades.is_empty()
    }

    /// True if no alert has been delivered for this trade yet.
    pub fn is_new(&self, id: &TradeId) -> bool {
        !self.notified_trades.contains_key(id)
    }

    /// Mark a trade as notified. Only call after delivery succeeded.
    pub fn record_success(&mut self, id: TradeId, record: NotificationRecord) {
        self.notified_trades.insert(id, record);
    }

    /// Drop the oldest-notified entries until at most `cap` remain.
    ///
    /// Returns the number of entries evicted.
    pub fn evict_if_over_cap(&mut self, cap: usize) -> usize {
        let len = self.notified_trades.len();
        if len <= cap {
            return 0;
        }
        let mut entries: Vec<(TradeId, NotificationRecord)> =
            self.notified_trades.drain().collect();
        entries.sort_by(|a, b| b.1.notified_at.cmp(&a.1.notified_at));
        entries.truncate(cap);
        self.notified_trades = entries.into_iter().collect();
        len - cap
    }
}

// ── On-disk format ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    notified_trades: StoredTrades,
    #[serde(default)]
    last_check: Option<String>,
}

/// Current shape is an id → record map; older files stored a bare id list.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredTrades {
    Map(BTreeMap<String, StoredRecord>),
    Legacy(Vec<String>),
}

impl Default for StoredTrades {
    fn default() -> Self {
        StoredTrades::Map(BTreeMap::new())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    notified_at: Option<String>,
    #[serde(default)]
    trader: String,
    #[serde(default)]
    title: String,
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 or a naive ISO-8601 timestamp (taken as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

impl From<StateFile> for PersistedState {
    fn from(file: StateFile) -> Self {
        let notified_trades = match file.notified_trades {
            StoredTrades::Map(map) => map
                .into_iter()
                .map(|(id, stored)| {
                    let notified_at = stored
                        .notified_at
                        .as_deref()
                        .and_then(parse_timestamp)
                        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                    let record = NotificationRecord::new(notified_at, &stored.trader, &stored.title);
                    (TradeId(id), record)
                })
                .collect(),
            StoredTrades::Legacy(ids) => {
                info!("Upgrading {} legacy trade id(s) to the current state format", ids.len());
                ids.into_iter()
                    .map(|id| (TradeId(id), NotificationRecord::placeholder()))
                    .collect()
            }
        };
        Self {
            notified_trades,
            last_check: file.last_check.as_deref().and_then(parse_timestamp),
        }
    }
}

impl From<&PersistedState> for StateFile {
    fn from(state: &PersistedState) -> Self {
        let map = state
            .notified_trades
            .iter()
            .map(|(id, rec)| {
                (
                    id.0.clone(),
                    StoredRecord {
                        notified_at: Some(format_timestamp(&rec.notified_at)),
                        trader: rec.trader.clone(),
                        title: rec.title.clone(),
                    },
                )
            })
            .collect();
        Self {
            notified_trades: StoredTrades::Map(map),
            last_check: state.last_check.as_ref().map(format_timestamp),
        }
    }
}

// ── Store ───────────────────────────────────────────────────────

/// JSON file holding the [`PersistedState`] between runs.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file. `Ok(None)` when it does not exist.
    pub fn read(&self) -> Result<Option<PersistedState>, StateError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|source| StateError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let file: StateFile = serde_json::from_str(&contents)?;
        Ok(Some(file.into()))
    }

    /// Load prior state, degrading to an empty state on any failure.
    pub fn load(&self) -> PersistedState {
        match self.read() {
            Ok(Some(state)) => {
                debug!("Loaded {} notified trade(s) from {}", state.len(), self.path.display());
                state
            }
            Ok(None) => {
                info!("No state file at {}, starting fresh", self.path.display());
                PersistedState::default()
            }
            Err(e) => {
                warn!("Failed to load state from {}: {e}; treating all trades as new", self.path.display());
                PersistedState::default()
            }
        }
    }

    /// Replace the state file atomically: write and fsync a sibling temp
    /// file, then rename it over the target. The temp file is removed if the
    /// rename fails.
    pub fn persist(&self, state: &PersistedState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(&StateFile::from(state))?;
        let io_err = |source| StateError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.tmp_path();
        let written = File::create(&tmp).and_then(|mut file| {
            file.write_all(json.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| std::fs::rename(&tmp, &self.path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        debug!("Persisted {} notified trade(s) to {}", state.len(), self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
