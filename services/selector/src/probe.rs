//! Scheduler liveness probe over HTTP.
//!
//! Expects the scheduler to expose:
//! - `GET {base}/tasks/{task_id}/running` → `{"running": bool}`
//! - `GET {base}/queue/{item_id}` → `{"queued": bool}`
//!
//! A `404` from either endpoint means "no". Task IDs carry the build's display
//! name verbatim, so path segments are percent-encoded.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use servsel_core::{ItemId, ProbeError, SchedulerProbe, TaskId};
use thiserror::Error;
use tracing::debug;

/// Errors constructing a probe.
#[derive(Debug, Error)]
pub enum ProbeSetupError {
    #[error("invalid scheduler URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct RunningResponse {
    running: bool,
}

#[derive(Debug, Deserialize)]
struct QueuedResponse {
    queued: bool,
}

/// [`SchedulerProbe`] backed by the scheduler's HTTP API.
pub struct HttpSchedulerProbe {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSchedulerProbe {
    /// Create a probe for the scheduler at `base_url`. The base may carry a
    /// path prefix; a trailing slash is ignored.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ProbeSetupError> {
        let raw = base_url.as_ref();
        let invalid = |reason: String| ProbeSetupError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };

        let base_url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("server-selector/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Appends encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Fetches a JSON document, mapping `404` to `None`.
    async fn get_json<T>(&self, url: Url) -> Result<Option<T>, ProbeError>
    where
        T: for<'de> Deserialize<'de>,
    {
        debug!(url = %url, "Probing scheduler");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::Unexpected(format!("{status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| ProbeError::Unexpected(e.to_string()))
    }
}

#[async_trait]
impl SchedulerProbe for HttpSchedulerProbe {
    async fn is_task_running(&self, task_id: &TaskId) -> Result<bool, ProbeError> {
        let task_id = task_id.to_string();
        let url = self.endpoint(&["tasks", &task_id, "running"]);
        let response: Option<RunningResponse> = self.get_json(url).await?;
        Ok(response.is_some_and(|r| r.running))
    }

    async fn item_still_queued(&self, item: ItemId) -> Result<bool, ProbeError> {
        let item = item.to_string();
        let url = self.endpoint(&["queue", &item]);
        let response: Option<QueuedResponse> = self.get_json(url).await?;
        Ok(response.is_some_and(|r| r.queued))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() {
        let probe = HttpSchedulerProbe::new("http://ci.local:8080/api/").unwrap();
        let task_id = TaskId::new("nightly #42 what?", 1).unwrap().to_string();

        let url = probe.endpoint(&["tasks", &task_id, "running"]);
        assert_eq!(
            url.as_str(),
            "http://ci.local:8080/api/tasks/nightly_%2342_what%3F_num_1/running"
        );
        assert!(url.fragment().is_none());
        assert!(url.query().is_none());
    }

    #[test]
    fn test_rejects_invalid_base() {
        assert!(matches!(
            HttpSchedulerProbe::new("not a url"),
            Err(ProbeSetupError::InvalidUrl { .. })
        ));
        assert!(matches!(
            HttpSchedulerProbe::new("mailto:ci@example.net"),
            Err(ProbeSetupError::InvalidUrl { .. })
        ));
    }
}
