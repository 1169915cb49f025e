// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use waf_alarm::errors::PublishError;
use waf_alarm::notifier::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct MockNotifier {
    published: Arc<Mutex<Vec<Published>>>,
}

impl MockNotifier {
    #[allow(clippy::unwrap_used)]
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    #[allow(clippy::unwrap_used)]
    async fn publish(&self, subject: &str, body: &str) -> Result<(), PublishError> {
        self.published.lock().unwrap().push(Published {
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
