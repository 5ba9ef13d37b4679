use serde_json::json;
use tracing::{debug, warn};

/// Best-effort bridge to the external notification service. Delivery is
/// fire-and-forget: a failed send is logged and never rolls back the domain
/// transition that triggered it. With no webhook configured, messages are
/// logged and dropped.
#[derive(Clone)]
pub struct Notifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn send(&self, subject: &str, detail: String) {
        let Some(url) = self.webhook_url.clone() else {
            debug!(subject, detail = %detail, "no notification webhook configured, dropping message");
            return;
        };

        let client = self.client.clone();
        let subject = subject.to_string();
        tokio::spawn(async move {
            let payload = json!({
                "subject": subject,
                "detail": detail,
            });
            match client.post(&url).json(&payload).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(subject, status = %response.status(), "notification rejected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(subject, error = %err, "notification delivery failed");
                }
            }
        });
    }
}
