// Outbound notifications: one short text per trade or notable decision
use async_trait::async_trait;
use reqwest::Client;

/// Fire-and-forget notification sink. Delivery failures are logged and
/// swallowed so they can never affect engine state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// POSTs `{"text": ...}` to a configured webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) {
        let payload = serde_json::json!({ "text": message });
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(status = %response.status(), "notification webhook returned an error");
            }
            Err(e) => {
                tracing::warn!(error = %e, "notification delivery failed");
            }
        }
    }
}

/// Writes notifications to the log. Used when no webhook is configured.
#[derive(Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        tracing::info!(target: "crossbot::notify", "{message}");
    }
}
