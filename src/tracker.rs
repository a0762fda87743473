use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::ActivitySource;
use crate::config::AppConfig;
use crate::notifier::{AlertContext, Notifier, render_alert};
use crate::state::{NotificationRecord, PersistedState, TradeId};
use crate::types::{TradeRecord, WatchedWallet};

/// Outcome of one tracker pass, reported as a JSON line.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub timestamp: String,
    pub wallets_checked: usize,
    pub wallets_failed: usize,
    pub trades_fetched: usize,
    pub new_trades: usize,
    pub notified: usize,
    pub failed_deliveries: usize,
    pub evicted: usize,
    pub tracked_trades: usize,
}

/// Fetch every watched wallet, alert on unseen trades and update `state`.
///
/// Wallets and trades are processed strictly one at a time. A trade is only
/// committed to `state` once its alert was delivered, so failed deliveries
/// show up as new again on the next run. Fetch and delivery failures are
/// logged and never abort the pass.
pub async fn run_once<S, N>(
    config: &AppConfig,
    source: &S,
    notifier: &N,
    state: &mut PersistedState,
) -> RunSummary
where
    S: ActivitySource,
    N: Notifier,
{
    let ctx = AlertContext::from_config(config);
    let mut summary = RunSummary::default();

    for wallet in &config.wallets {
        let short_id = wallet.short_id();
        summary.wallets_checked += 1;

        let trades = match source.fetch_recent_trades(wallet).await {
            Ok(trades) => trades,
            Err(e) => {
                warn!("[{short_id}] Failed to fetch trades for {}: {e}", wallet.display_name);
                summary.wallets_failed += 1;
                continue;
            }
        };
        summary.trades_fetched += trades.len();

        let fresh = new_trades(wallet, &trades, state);
        if fresh.is_empty() {
            info!("[{short_id}] No new trades ({} fetched)", trades.len());
            continue;
        }
        info!("[{short_id}] Detected {} new trade(s)", fresh.len());
        summary.new_trades += fresh.len();

        for (id, trade) in fresh {
            info!("[{short_id}] Notifying trade {id}: \"{}\" ({} {})", trade.title, trade.side, trade.outcome);
            let text = render_alert(wallet, trade, &ctx);
            match notifier.send(&text).await {
                Ok(()) => {
                    let record = NotificationRecord::new(Utc::now(), &wallet.display_name, &trade.title);
                    state.record_success(id, record);
                    summary.notified += 1;
                }
                Err(e) => {
                    warn!("[{short_id}] Failed to deliver alert for trade {id}: {e}");
                    summary.failed_deliveries += 1;
                }
            }
        }
    }

    let now = Utc::now();
    state.last_check = Some(now);
    summary.evicted = state.evict_if_over_cap(config.settings.history_cap);
    if summary.evicted > 0 {
        info!("Evicted {} oldest notified trade(s)", summary.evicted);
    }
    summary.tracked_trades = state.len();
    summary.timestamp = now.to_rfc3339();
    summary
}

/// Trades not yet notified, oldest first, each id at most once.
fn new_trades<'a>(
    wallet: &WatchedWallet,
    trades: &'a [TradeRecord],
    state: &PersistedState,
) -> Vec<(TradeId, &'a TradeRecord)> {
    let mut seen = HashSet::new();
    let mut fresh: Vec<(TradeId, &TradeRecord)> = trades
        .iter()
        .map(|t| (TradeId::compute(&wallet.address, t), t))
        .filter(|(id, _)| state.is_new(id) && seen.insert(id.clone()))
        .collect();
    // The API lists newest first; alert in the order the trades happened.
    fresh.sort_by_key(|(_, t)| t.timestamp);
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use rust_decimal_macros::dec;

    use crate::config::Settings;
    use crate::error::{FetchError, NotifyError};
    use crate::types::TradeSide;

    /// Serves canned trades per wallet; unknown wallets fail.
    struct FakeSource {
        trades: HashMap<String, Vec<TradeRecord>>,
    }

    impl ActivitySource for FakeSource {
        async fn fetch_recent_trades(
            &self,
            wallet: &WatchedWallet,
        ) -> Result<Vec<TradeRecord>, FetchError> {
            self.trades
                .get(&wallet.address)
                .cloned()
                .ok_or_else(|| FetchError::Payload("boom".to_string()))
        }
    }

    /// Records sent alerts; rejects any alert mentioning a blocked title.
    #[derive(Default)]
    struct FakeNotifier {
        sent: Mutex<Vec<String>>,
        blocked: Vec<String>,
    }

    impl FakeNotifier {
        fn blocking(title: &str) -> Self {
            Self {
                blocked: vec![title.to_string()],
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for FakeNotifier {
        async fn send(&self, text: &str) -> Result<(), NotifyError> {
            if self.blocked.iter().any(|b| text.contains(b.as_str())) {
                return Err(NotifyError::Status {
                    status: reqwest::StatusCode::BAD_REQUEST,
                    body: "rejected".to_string(),
                });
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn make_trade(hash: &str, ts: i64, title: &str) -> TradeRecord {
        TradeRecord {
            transaction_hash: hash.to_string(),
            timestamp: Some(ts),
            condition_id: "0xcond".to_string(),
            side: TradeSide::Buy,
            outcome: "Yes".to_string(),
            price: dec!(0.5),
            size_tokens: dec!(20),
            size_usd: dec!(10),
            title: title.to_string(),
            slug: "slug".to_string(),
            event_slug: "event".to_string(),
        }
    }

    fn config(wallets: Vec<WatchedWallet>) -> AppConfig {
        let mut cfg = AppConfig::from_env(
            |k: &str| match k {
                "TELEGRAM_TOKEN" => Some("token".to_string()),
                "TELEGRAM_CHAT_ID" => Some("chat".to_string()),
                _ => None,
            },
            Settings::default(),
        )
        .unwrap();
        cfg.wallets = wallets;
        cfg
    }

    fn alice() -> WatchedWallet {
        WatchedWallet::new("0xaaaa000000000000000000000000000000000001", "alice", dec!(1000))
    }

    fn bob() -> WatchedWallet {
        WatchedWallet::new("0xbbbb000000000000000000000000000000000002", "bob", dec!(5000))
    }

    #[tokio::test]
    async fn three_new_trades_then_rerun_sends_nothing() {
        let cfg = config(vec![alice()]);
        let source = FakeSource {
            trades: HashMap::from([(
                alice().address,
                vec![
                    make_trade("0x3", 300, "Market C"),
                    make_trade("0x2", 200, "Market B"),
                    make_trade("0x1", 100, "Market A"),
                ],
            )]),
        };
        let mut state = PersistedState::default();

        let notifier = FakeNotifier::default();
        let summary = run_once(&cfg, &source, &notifier, &mut state).await;
        assert_eq!(summary.notified, 3);
        assert_eq!(summary.new_trades, 3);
        assert_eq!(state.len(), 3);
        assert!(state.last_check.is_some());

        // alerts go out oldest first
        let sent = notifier.sent();
        assert!(sent[0].contains("Market A"));
        assert!(sent[2].contains("Market C"));

        let first_check = state.last_check;
        let notifier = FakeNotifier::default();
        let summary = run_once(&cfg, &source, &notifier, &mut state).await;
        assert_eq!(summary.new_trades, 0);
        assert!(notifier.sent().is_empty());
        assert_eq!(state.len(), 3);
        assert!(state.last_check >= first_check);
    }

    #[tokio::test]
    async fn failed_delivery_not_committed_and_retried() {
        let cfg = config(vec![alice()]);
        let first = make_trade("0x1", 100, "Market A");
        let second = make_trade("0x2", 200, "Market B");
        let source = FakeSource {
            trades: HashMap::from([(alice().address, vec![second.clone(), first.clone()])]),
        };
        let mut state = PersistedState::default();

        let notifier = FakeNotifier::blocking("Market B");
        let summary = run_once(&cfg, &source, &notifier, &mut state).await;
        assert_eq!(summary.notified, 1);
        assert_eq!(summary.failed_deliveries, 1);
        assert_eq!(state.len(), 1);
        assert!(!state.is_new(&TradeId::compute(&alice().address, &first)));
        assert!(state.is_new(&TradeId::compute(&alice().address, &second)));

        let notifier = FakeNotifier::default();
        let summary = run_once(&cfg, &source, &notifier, &mut state).await;
        assert_eq!(summary.notified, 1);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Market B"));
        assert_eq!(state.len(), 2);
    }

    #[tokio::test]
    async fn failing_wallet_does_not_block_others() {
        let cfg = config(vec![alice(), bob()]);
        // alice is unknown to the source and fails
        let source = FakeSource {
            trades: HashMap::from([(bob().address, vec![make_trade("0x9", 100, "Bob market")])]),
        };
        let mut state = PersistedState::default();
        let notifier = FakeNotifier::default();

        let summary = run_once(&cfg, &source, &notifier, &mut state).await;
        assert_eq!(summary.wallets_checked, 2);
        assert_eq!(summary.wallets_failed, 1);
        assert_eq!(summary.notified, 1);
        assert!(notifier.sent()[0].contains("<b>Trader:</b> bob"));
        assert!(state.last_check.is_some());
    }

    #[tokio::test]
    async fn same_trade_for_two_wallets_is_distinct() {
        let cfg = config(vec![alice(), bob()]);
        let trade = make_trade("0x1", 100, "Shared");
        let source = FakeSource {
            trades: HashMap::from([
                (alice().address, vec![trade.clone()]),
                (bob().address, vec![trade]),
            ]),
        };
        let mut state = PersistedState::default();
        let notifier = FakeNotifier::default();

        let summary = run_once(&cfg, &source, &notifier, &mut state).await;
        assert_eq!(summary.notified, 2);
        assert_eq!(state.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_within_fetch_sent_once() {
        let cfg = config(vec![alice()]);
        let trade = make_trade("0x1", 100, "Dup");
        let source = FakeSource {
            trades: HashMap::from([(alice().address, vec![trade.clone(), trade])]),
        };
        let mut state = PersistedState::default();
        let notifier = FakeNotifier::default();

        let summary = run_once(&cfg, &source, &notifier, &mut state).await;
        assert_eq!(summary.new_trades, 1);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn history_capped_after_run() {
        let mut cfg = config(vec![alice()]);
        cfg.settings.history_cap = 2;
        let source = FakeSource {
            trades: HashMap::from([(
                alice().address,
                vec![
                    make_trade("0x1", 100, "A"),
                    make_trade("0x2", 200, "B"),
                    make_trade("0x3", 300, "C"),
                ],
            )]),
        };
        let mut state = PersistedState::default();
        let notifier = FakeNotifier::default();

        let summary = run_once(&cfg, &source, &notifier, &mut state).await;
        assert_eq!(summary.notified, 3);
        assert_eq!(summary.evicted, 1);
        assert_eq!(summary.tracked_trades, 2);
        assert_eq!(state.len(), 2);
    }
}
