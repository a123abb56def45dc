//! List API client: the source of candidate URLs for a sync run.
//!
//! The endpoint answers `{ "data": [...] }` where each element is either
//! an object carrying a `url` (current format) or a bare URL string
//! (older format). Entries that are not usable http(s) URLs, and URLs
//! that belong to the media pipeline, are dropped here so the rest of
//! the run never sees them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use contentsync_shared::{Result, SyncError};

/// Budget for one list fetch.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Attempts before a persistently rate-limited fetch fails the run.
const FETCH_ATTEMPTS: u32 = 3;
/// Pause between rate-limited attempts.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);

/// One usable entry from the list API.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub url: String,
    /// Creation timestamp reported by the API, if any.
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// Client for the content list endpoint.
pub struct ListApiClient {
    client: reqwest::Client,
    endpoint: String,
    backoff: Duration,
}

impl ListApiClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("contentsync/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::ListApi(format!("client build: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            backoff: RATE_LIMIT_BACKOFF,
        })
    }

    /// Shorten the rate-limit backoff so tests stay fast.
    #[cfg(test)]
    pub(crate) fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fetch the pending URL list.
    ///
    /// HTTP 429 is retried a bounded number of times with a pause in
    /// between. Unusable entries are discarded one by one; they never
    /// fail the whole fetch. Any other failure is fatal for the run.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn fetch_entries(&self) -> Result<Vec<ListEntry>> {
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let response = self
                .client
                .get(&self.endpoint)
                .send()
                .await
                .map_err(|e| SyncError::ListApi(format!("request failed: {e}")))?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt >= FETCH_ATTEMPTS {
                    return Err(SyncError::ListApi(format!(
                        "rate limited after {attempt} attempts"
                    )));
                }
                warn!(attempt, "list api rate limited, backing off");
                tokio::time::sleep(self.backoff).await;
                continue;
            }
            break response;
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::ListApi(format!("HTTP {status} from list api")));
        }

        let parsed: ListResponse = response
            .json()
            .await
            .map_err(|e| SyncError::ListApi(format!("invalid response body: {e}")))?;

        let mut entries = Vec::new();
        for value in &parsed.data {
            match parse_entry(value) {
                Some(entry) => entries.push(entry),
                None => debug!(%value, "discarding list entry"),
            }
        }

        debug!(
            received = parsed.data.len(),
            usable = entries.len(),
            "list fetched"
        );
        Ok(entries)
    }
}

fn parse_entry(value: &serde_json::Value) -> Option<ListEntry> {
    let (raw_url, created_at) = match value {
        serde_json::Value::String(s) => (s.as_str(), None),
        serde_json::Value::Object(map) => (
            map.get("url")?.as_str()?,
            map.get("createdAt").and_then(|v| v.as_str()),
        ),
        _ => return None,
    };

    let url = Url::parse(raw_url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if is_media_url(&url) {
        return None;
    }

    Some(ListEntry {
        url: raw_url.to_string(),
        consumed_at: created_at
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

/// YouTube links belong to the media pipeline, not this one.
fn is_media_url(url: &Url) -> bool {
    match url.host_str() {
        Some(host) => host == "youtube.com" || host == "youtu.be" || host.ends_with(".youtube.com"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(value: serde_json::Value) -> Option<ListEntry> {
        parse_entry(&value)
    }

    #[test]
    fn object_and_string_entries_are_accepted() {
        let entry = parse(json!({
            "url": "https://example.com/post",
            "createdAt": "2024-05-01T12:00:00Z"
        }))
        .expect("object entry");
        assert_eq!(entry.url, "https://example.com/post");
        assert_eq!(
            entry.consumed_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );

        let entry = parse(json!("https://example.com/bare")).expect("string entry");
        assert_eq!(entry.url, "https://example.com/bare");
        assert_eq!(entry.consumed_at, None);
    }

    #[test]
    fn unusable_entries_are_rejected() {
        assert!(parse(json!(42)).is_none());
        assert!(parse(json!({ "title": "no url" })).is_none());
        assert!(parse(json!("not a url")).is_none());
        assert!(parse(json!("ftp://example.com/file")).is_none());
    }

    #[test]
    fn media_urls_are_rejected() {
        assert!(parse(json!("https://www.youtube.com/watch?v=abc")).is_none());
        assert!(parse(json!("https://youtube.com/watch?v=abc")).is_none());
        assert!(parse(json!("https://youtu.be/abc")).is_none());
        assert!(parse(json!("https://notyoutube.com/page")).is_some());
    }

    #[test]
    fn bad_created_at_is_dropped_not_fatal() {
        let entry = parse(json!({
            "url": "https://example.com/post",
            "createdAt": "yesterday-ish"
        }))
        .expect("entry still usable");
        assert_eq!(entry.consumed_at, None);
    }

    #[tokio::test]
    async fn fetches_and_filters_the_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "url": "https://example.com/a", "createdAt": "2024-05-01T12:00:00Z" },
                    "https://example.com/b",
                    "https://youtu.be/abc",
                    42,
                ]
            })))
            .mount(&server)
            .await;

        let client = ListApiClient::new(format!("{}/v1/web", server.uri())).unwrap();
        let entries = client.fetch_entries().await.expect("fetch");

        let urls: Vec<&str> = entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
        assert!(entries[0].consumed_at.is_some());
    }

    #[tokio::test]
    async fn rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/web"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/web"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": ["https://example.com/a"] })),
            )
            .mount(&server)
            .await;

        let client = ListApiClient::new(format!("{}/v1/web", server.uri()))
            .unwrap()
            .with_backoff(Duration::from_millis(10));
        let entries = client.fetch_entries().await.expect("fetch after backoff");
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn persistent_rate_limit_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/web"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = ListApiClient::new(format!("{}/v1/web", server.uri()))
            .unwrap()
            .with_backoff(Duration::from_millis(10));
        let err = client.fetch_entries().await.unwrap_err();
        assert!(matches!(err, SyncError::ListApi(_)));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn server_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/web"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ListApiClient::new(format!("{}/v1/web", server.uri())).unwrap();
        assert!(matches!(
            client.fetch_entries().await,
            Err(SyncError::ListApi(_))
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/web"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = ListApiClient::new(format!("{}/v1/web", server.uri())).unwrap();
        assert!(matches!(
            client.fetch_entries().await,
            Err(SyncError::ListApi(_))
        ));
    }

    #[tokio::test]
    async fn empty_and_missing_data_are_fine() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = ListApiClient::new(format!("{}/empty", server.uri())).unwrap();
        assert!(client.fetch_entries().await.unwrap().is_empty());

        let client = ListApiClient::new(format!("{}/missing", server.uri())).unwrap();
        assert!(client.fetch_entries().await.unwrap().is_empty());
    }
}
