use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::Serialize;

use crate::error::NotifyError;
use crate::notifier::{Ack, Notifier};

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Posts alerts as `{"text": "..."}` to an HTTP endpoint (Slack/Discord style
/// incoming webhooks and most chat bridges accept this shape).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, Report<NotifyError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .change_context(NotifyError::Unreachable)
            .attach("failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, message: &str) -> BoxFuture<'_, Result<Ack, Report<NotifyError>>> {
        let message = message.to_owned();
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&WebhookPayload { text: &message })
                .send()
                .await
                .change_context(NotifyError::Unreachable)
                .attach_with(|| format!("webhook: {}", self.url))?;

            if !response.status().is_success() {
                return Err(Report::new(NotifyError::Rejected)
                    .attach(format!("HTTP status: {}", response.status())));
            }

            Ok(Ack)
        })
    }
}
