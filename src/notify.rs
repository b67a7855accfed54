use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A pipeline stage that failed after exhausting its retries.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEvent {
    pub endpoint: String,
    pub task_id: String,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: String,
}

impl FailureEvent {
    /// Identifier of the pipeline the task belongs to, one per endpoint.
    pub fn pipeline_id(&self) -> String {
        format!("genesys_{}_etl", self.endpoint)
    }

    pub fn message(&self) -> String {
        format!(
            ":red_circle: Task Failed.\n\t\t*Task id*: {}\n\t\t*Pipeline id*: {}\n\t\t*Run id*: {}\n\t\t*Execution Date*: {}",
            self.task_id,
            self.pipeline_id(),
            self.run_id,
            self.timestamp.to_rfc3339()
        )
    }
}

#[async_trait]
pub trait FailureNotifier: Send + Sync {
    async fn notify(&self, event: &FailureEvent) -> Result<()>;
}

/// Writes failures to the log only.
pub struct LogNotifier;

#[async_trait]
impl FailureNotifier for LogNotifier {
    async fn notify(&self, event: &FailureEvent) -> Result<()> {
        error!(
            task_id = %event.task_id,
            run_id = %event.run_id,
            "Stage failed for {}: {}",
            event.endpoint,
            event.error
        );
        Ok(())
    }
}

/// Posts the failure message to a Slack incoming webhook.
pub struct SlackWebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
    channel: Option<String>,
    username: String,
}

impl SlackWebhookNotifier {
    pub fn new(webhook_url: String, channel: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
            channel,
            username: "genesys_etl".to_string(),
        }
    }

    fn payload(&self, event: &FailureEvent) -> serde_json::Value {
        let mut body = json!({
            "text": event.message(),
            "username": self.username,
        });
        if let Some(channel) = &self.channel {
            body["channel"] = json!(channel);
        }
        body
    }
}

#[async_trait]
impl FailureNotifier for SlackWebhookNotifier {
    async fn notify(&self, event: &FailureEvent) -> Result<()> {
        let resp = self.client.post(&self.webhook_url).json(&self.payload(event)).send().await;
        match resp {
            Ok(r) if r.status().is_success() => {
                info!("Sent failure notification for task {}", event.task_id);
            }
            Ok(r) => {
                warn!("Slack webhook responded with status {} for task {}", r.status().as_u16(), event.task_id);
            }
            Err(e) => {
                warn!("Failed to send Slack notification for task {}: {}", event.task_id, e);
            }
        }
        Ok(())
    }
}
