// Fire-and-forget progress telemetry. The funnel backend's response is never
// interpreted; a failed delivery is a logged warning and nothing else.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

const PROGRESS_PATH: &str = "/landing/resource/push-to-sqs";

/// One watch-progress report, form-encoded onto the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPing {
    pub resource_id: String,
    pub contact_id: String,
    pub user_id: String,
    pub percentage_watched: u8,
    pub media_hash: String,
    pub duration: f64,
    pub visitor_key: Uuid,
    pub event_key: Uuid,
    /// Queue-side processing hint, always 1 (deferred).
    pub delay_process: u8,
    pub webinar: String,
    /// Client clock at send time, epoch milliseconds.
    pub sent_at: i64,
}

#[derive(Clone, Debug)]
pub struct TelemetryClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl TelemetryClient {
    /// Create a new client with the given base URL (e.g. "https://my.funnel.example.com").
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let base_url_str = base_url.into();
        tracing::debug!(base_url = %base_url_str, "creating TelemetryClient");
        Ok(TelemetryClient {
            base_url: base_url_str.trim_end_matches('/').to_string(),
            api_key: None,
            client,
        })
    }

    /// Return a client with the provided API key set (Bearer)
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// POST one progress report and surface any transport or status error.
    #[tracing::instrument(level = "debug", skip(self, ping))]
    pub async fn post_progress(&self, ping: &ProgressPing) -> anyhow::Result<()> {
        let url = self.url(PROGRESS_PATH);
        tracing::debug!(%url, resource_id = %ping.resource_id, percentage = ping.percentage_watched, "POST progress");
        let mut req = self.client.post(&url).form(ping);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        let resp = req.send().await?;
        resp.error_for_status()?;
        Ok(())
    }

    /// Fire-and-forget delivery: spawn, log on failure, never block the
    /// caller. Lock state is derived from local numbers only, so the
    /// outcome here is deliberately invisible to the rest of the engine.
    pub fn send_progress(self: &Arc<Self>, ping: ProgressPing) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = client.post_progress(&ping).await {
                tracing::warn!(
                    error = %e,
                    resource_id = %ping.resource_id,
                    "progress ping failed"
                );
            }
        });
    }
}

impl ProgressPing {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resource_id: impl Into<String>,
        contact_id: impl Into<String>,
        user_id: impl Into<String>,
        percentage_watched: u8,
        media_hash: impl Into<String>,
        duration: f64,
        visitor_key: Uuid,
        webinar: impl Into<String>,
    ) -> Self {
        ProgressPing {
            resource_id: resource_id.into(),
            contact_id: contact_id.into(),
            user_id: user_id.into(),
            percentage_watched,
            media_hash: media_hash.into(),
            duration,
            visitor_key,
            event_key: Uuid::new_v4(),
            delay_process: 1,
            webinar: webinar.into(),
            sent_at: Utc::now().timestamp_millis(),
        }
    }
}
