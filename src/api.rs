use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::FetchError;
use crate::types::{TradeRecord, WatchedWallet};

/// Source of recent trades for a wallet.
pub trait ActivitySource {
    fn fetch_recent_trades(
        &self,
        wallet: &WatchedWallet,
    ) -> impl Future<Output = Result<Vec<TradeRecord>, FetchError>> + Send;
}

/// Client for the public Polymarket data API (no auth required).
pub struct DataApiClient {
    client: reqwest::Client,
    base_url: String,
    limit: u32,
    timeout: Duration,
}

impl DataApiClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.data_api_base.trim_end_matches('/').to_string(),
            limit: settings.fetch_limit,
            timeout: Duration::from_secs(settings.fetch_timeout_secs),
        }
    }
}

impl ActivitySource for DataApiClient {
    /// Fetch one page of the wallet's most recent `TRADE` activity.
    async fn fetch_recent_trades(
        &self,
        wallet: &WatchedWallet,
    ) -> Result<Vec<TradeRecord>, FetchError> {
        let url = format!("{}/activity", self.base_url);
        let limit = self.limit.to_string();
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("user", wallet.address.as_str()),
                ("type", "TRADE"),
                ("limit", limit.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Payload(e.to_string()))?;
        let trades = parse_activity(body)?;
        debug!("[{}] Fetched {} recent trades", wallet.short_id(), trades.len());
        Ok(trades)
    }
}

/// Convert an activity response body into trade records.
///
/// The body must be a JSON array. Elements that are not trade objects are
/// skipped with a warning.
pub fn parse_activity(body: Value) -> Result<Vec<TradeRecord>, FetchError> {
    let Value::Array(items) = body else {
        return Err(FetchError::Payload(format!(
            "expected a JSON array, got {}",
            json_kind(&body)
        )));
    };

    let total = items.len();
    let trades: Vec<TradeRecord> = items.into_iter().filter_map(TradeRecord::from_value).collect();
    if trades.len() < total {
        warn!("Skipped {} malformed activity entries", total - trades.len());
    }
    Ok(trades)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn client_for(server: &MockServer) -> DataApiClient {
        DataApiClient::new(&Settings {
            data_api_base: server.base_url(),
            ..Settings::default()
        })
    }

    fn alice() -> WatchedWallet {
        WatchedWallet::new("0xABCDEF0000000000000000000000000000000001", "alice", dec!(1000))
    }

    #[test]
    fn parses_array() {
        let trades = parse_activity(json!([
            { "transactionHash": "0x1", "side": "BUY", "price": 0.4 },
            { "transactionHash": "0x2", "side": "SELL", "price": 0.6 }
        ]))
        .unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].transaction_hash, "0x2");
    }

    #[test]
    fn empty_array_ok() {
        assert!(parse_activity(json!([])).unwrap().is_empty());
    }

    #[test]
    fn non_array_is_payload_error() {
        let err = parse_activity(json!({ "error": "rate limited" })).unwrap_err();
        match err {
            FetchError::Payload(msg) => assert!(msg.contains("an object")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(parse_activity(Value::Null), Err(FetchError::Payload(_))));
    }

    #[test]
    fn malformed_elements_skipped() {
        let trades = parse_activity(json!([
            "garbage",
            { "transactionHash": "0x1" },
            7,
            { "transactionHash": 12, "title": "Odd hash" }
        ]))
        .unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].transaction_hash, "0x1");
        assert_eq!(trades[1].transaction_hash, "");
        assert_eq!(trades[1].title, "Odd hash");
    }

    #[test]
    fn client_uses_settings() {
        let settings = Settings {
            data_api_base: "http://localhost:9/".to_string(),
            fetch_limit: 7,
            fetch_timeout_secs: 3,
            ..Settings::default()
        };
        let client = DataApiClient::new(&settings);
        assert_eq!(client.base_url, "http://localhost:9");
        assert_eq!(client.limit, 7);
        assert_eq!(client.timeout, Duration::from_secs(3));
    }

    // ── DataApiClient over HTTP ────────────────────────────────────

    #[tokio::test]
    async fn fetch_sends_activity_query() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/activity")
                    .query_param("user", "0xabcdef0000000000000000000000000000000001")
                    .query_param("type", "TRADE")
                    .query_param("limit", "20");
                then.status(200).json_body(json!([
                    { "transactionHash": "0x1", "side": "BUY", "usdcSize": 12.5, "timestamp": 1735000000 },
                    { "transactionHash": "0x2", "side": "SELL", "usdcSize": "3" }
                ]));
            })
            .await;

        let trades = client_for(&server).fetch_recent_trades(&alice()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].size_usd, dec!(12.5));
        assert_eq!(trades[0].timestamp, Some(1735000000));
        assert_eq!(trades[1].side, crate::types::TradeSide::Sell);
    }

    #[tokio::test]
    async fn fetch_non_2xx_is_status_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/activity");
                then.status(503).body("upstream unavailable");
            })
            .await;

        let err = client_for(&server).fetch_recent_trades(&alice()).await.unwrap_err();
        mock.assert_async().await;
        match err {
            FetchError::Status(status) => assert_eq!(status.as_u16(), 503),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn fetch_non_array_body_is_payload_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/activity");
                then.status(200).json_body(json!({ "error": "bad user" }));
            })
            .await;

        let err = client_for(&server).fetch_recent_trades(&alice()).await.unwrap_err();
        assert!(matches!(err, FetchError::Payload(_)), "{err}");
    }

    #[tokio::test]
    async fn fetch_invalid_json_is_payload_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/activity");
                then.status(200).body("<html>oops</html>");
            })
            .await;

        let err = client_for(&server).fetch_recent_trades(&alice()).await.unwrap_err();
        assert!(matches!(err, FetchError::Payload(_)), "{err}");
    }
}
