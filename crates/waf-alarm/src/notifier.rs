// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Alarm delivery.

use crate::errors::PublishError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, subject: &str, body: &str) -> Result<(), PublishError>;
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    topic: &'a str,
    subject: &'a str,
    message: &'a str,
}

/// Posts alarms as JSON to an HTTP endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    topic: String,
}

impl WebhookNotifier {
    pub fn new(
        topic: String,
        https_proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(proxy) = https_proxy {
            let proxy =
                reqwest::Proxy::https(proxy).map_err(|e| PublishError::Client(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| PublishError::Client(e.to_string()))?;
        Ok(Self { client, topic })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, subject: &str, body: &str) -> Result<(), PublishError> {
        let payload = WebhookPayload {
            topic: &self.topic,
            subject,
            message: body,
        };
        let resp = self
            .client
            .post(&self.topic)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PublishError::Destination(e.status(), e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            debug!("Published alarm '{subject}' ({status})");
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        error!("{status}: Failed to publish alarm: {text:?}");
        Err(PublishError::Destination(Some(status), text))
    }
}

/// Writes alarms to the log. Used when no destination is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, subject: &str, body: &str) -> Result<(), PublishError> {
        warn!("{subject}\n{body}");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_webhook_posts_subject_and_message() {
        let mut server = Server::new_async().await;
        let url = format!("{}/alarms", server.url());
        let mock = server
            .mock("POST", "/alarms")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({
                "topic": url,
                "subject": "WAF alert for frequent blocking 10.0.0.1 at t0",
                "message": "{\n\t\"a\": 1\n}",
            })))
            .with_status(200)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(url.clone(), None, Duration::from_secs(5)).unwrap();
        notifier
            .publish(
                "WAF alert for frequent blocking 10.0.0.1 at t0",
                "{\n\t\"a\": 1\n}",
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_rejection_is_an_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/alarms")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(
            format!("{}/alarms", server.url()),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = notifier.publish("subject", "{}").await.unwrap_err();
        match err {
            PublishError::Destination(status, text) => {
                assert_eq!(status.map(|s| s.as_u16()), Some(500));
                assert_eq!(text, "Internal Server Error");
            }
            other => panic!("unexpected error {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_log_notifier_logs_subject() {
        LogNotifier
            .publish("WAF alert for frequent blocking 10.0.0.1 at t0", "{}")
            .await
            .unwrap();
        assert!(logs_contain("frequent blocking 10.0.0.1"));
    }
}
