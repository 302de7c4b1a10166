use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::config::MatrixConfig;

pub mod types;

pub use self::types::{EventContent, RemoteEvent, SyncResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
// Added on top of the long-poll timeout so the server side, not reqwest,
// terminates an idle poll.
const LONG_POLL_MARGIN: Duration = Duration::from_secs(15);

/// Outcome of a long-poll sync request. The client is total: transport
/// faults, non-2xx statuses and unparseable bodies are converted into
/// non-batch outcomes, never raised.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// A parseable response carrying a new cursor (and possibly events).
    Batch(SyncResponse),
    /// The server answered but the body had no usable `next_batch`.
    Empty,
    /// The request was not answered usefully (transport fault or status >= 400).
    Unavailable,
}

/// Outcome of a message send. Mirrors [`SyncOutcome`]: the caller can log
/// "rejected" and "never attempted" differently but neither is an `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Accepted { event_id: Option<String> },
    Rejected,
    Unavailable,
}

impl SendOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SendOutcome::Accepted { .. })
    }
}

/// The remote-side surface the sync engine and outbound worker depend on,
/// kept as a trait so tests can substitute a scripted fake.
#[async_trait]
pub trait MatrixTransport: Send + Sync {
    async fn sync(&self, since: Option<&str>, timeout_ms: u64) -> SyncOutcome;
    async fn send_text(&self, room_id: &str, body: &str, txn_id: Option<&str>) -> SendOutcome;
}

/// Stateless request/response wrapper over the Matrix client-server API.
pub struct MatrixClient {
    client: Client,
    base_url: String,
    access_token: String,
    extra_header: Option<(String, String)>,
}

impl MatrixClient {
    pub fn new(config: &MatrixConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&config.homeserver_url)?;
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        let extra_header = match (&config.extra_header_name, &config.extra_header_value) {
            (Some(name), Some(value)) if !name.trim().is_empty() => {
                Some((name.trim().to_string(), value.clone()))
            }
            _ => None,
        };

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            extra_header,
        })
    }

    fn apply_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(self.access_token.trim());
        if let Some((name, value)) = &self.extra_header {
            request.header(name.as_str(), value.as_str())
        } else {
            request
        }
    }

    // The homeserver deduplicates on the (room, txn id) pair, so a retry
    // carrying the same txn id must target the identical URL.
    fn send_url(&self, room_id: &str, txn: &str) -> String {
        format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            self.base_url,
            urlencoding::encode(room_id),
            txn
        )
    }

    fn resolve_txn(txn_id: Option<&str>) -> String {
        txn_id
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl MatrixTransport for MatrixClient {
    async fn sync(&self, since: Option<&str>, timeout_ms: u64) -> SyncOutcome {
        let url = format!("{}/_matrix/client/v3/sync", self.base_url);

        let mut request = self
            .client
            .get(&url)
            .timeout(Duration::from_millis(timeout_ms) + LONG_POLL_MARGIN)
            .query(&[("timeout", timeout_ms)]);
        if let Some(cursor) = since {
            request = request.query(&[("since", cursor)]);
        }
        request = self.apply_headers(request);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("GET {} failed: {}", url, e);
                return SyncOutcome::Unavailable;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "GET {} returned {}: {}",
                url,
                status,
                truncate_for_log(&body)
            );
            return SyncOutcome::Unavailable;
        }

        match response.json::<SyncResponse>().await {
            Ok(parsed) => {
                debug!(
                    "sync fetched next_batch={} joined_rooms={}",
                    parsed.next_batch,
                    parsed.rooms.join.len()
                );
                SyncOutcome::Batch(parsed)
            }
            Err(e) => {
                warn!("GET {} returned an unparseable body: {}", url, e);
                SyncOutcome::Empty
            }
        }
    }

    async fn send_text(&self, room_id: &str, body: &str, txn_id: Option<&str>) -> SendOutcome {
        let txn = Self::resolve_txn(txn_id);
        let url = self.send_url(room_id, &txn);

        let payload = serde_json::json!({
            "msgtype": "m.text",
            "body": body,
        });

        let request = self
            .client
            .put(&url)
            .timeout(SEND_TIMEOUT)
            .json(&payload);
        let request = self.apply_headers(request);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("PUT {} failed: {}", url, e);
                return SendOutcome::Unavailable;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "PUT {} returned {}: {}",
                url,
                status,
                truncate_for_log(&body)
            );
            return SendOutcome::Rejected;
        }

        let event_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("event_id").and_then(|id| id.as_str()).map(ToOwned::to_owned));

        debug!("matrix message sent room_id={} txn_id={}", room_id, txn);
        SendOutcome::Accepted { event_id }
    }
}

fn truncate_for_log(body: &str) -> String {
    const MAX_LOG_BODY: usize = 300;
    let mut chars = body.chars();
    let preview: String = chars.by_ref().take(MAX_LOG_BODY).collect();
    if chars.next().is_some() {
        format!("{preview}…")
    } else {
        preview
    }
}

mod urlencoding {
    pub fn encode(s: &str) -> String {
        url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{MatrixClient, SendOutcome, truncate_for_log, urlencoding};
    use crate::config::MatrixConfig;

    fn client() -> MatrixClient {
        MatrixClient::new(&MatrixConfig {
            homeserver_url: "https://matrix.example.org".to_string(),
            access_token: "secret".to_string(),
            bot_user_id: "@bridge:example.org".to_string(),
            extra_header_name: None,
            extra_header_value: None,
            sync_timeout_ms: 25000,
        })
        .expect("valid test config")
    }

    #[test]
    fn room_ids_are_percent_encoded() {
        assert_eq!(
            urlencoding::encode("!abc:example.org"),
            "%21abc%3Aexample.org"
        );
    }

    #[test]
    fn truncate_for_log_limits_long_bodies() {
        let long = "x".repeat(500);
        let preview = truncate_for_log(&long);
        assert!(preview.chars().count() <= 301);
        assert!(preview.ends_with('…'));
        assert_eq!(truncate_for_log("short"), "short");
    }

    #[test]
    fn reused_txn_id_targets_the_identical_send_url() {
        let client = client();

        let first = client.send_url("!abc:example.org", &MatrixClient::resolve_txn(Some("txn-1")));
        let retry = client.send_url("!abc:example.org", &MatrixClient::resolve_txn(Some("txn-1")));

        assert_eq!(first, retry);
        assert_eq!(
            first,
            "https://matrix.example.org/_matrix/client/v3/rooms/%21abc%3Aexample.org/send/m.room.message/txn-1"
        );
    }

    #[test]
    fn omitted_txn_id_generates_a_fresh_one_per_send() {
        let client = client();

        let first = MatrixClient::resolve_txn(None);
        let second = MatrixClient::resolve_txn(None);

        assert_ne!(first, second);
        assert_ne!(
            client.send_url("!abc:example.org", &first),
            client.send_url("!abc:example.org", &second)
        );
    }

    #[test]
    fn accepted_outcome_reports_success() {
        assert!(SendOutcome::Accepted { event_id: None }.is_accepted());
        assert!(!SendOutcome::Rejected.is_accepted());
        assert!(!SendOutcome::Unavailable.is_accepted());
    }
}
