// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(clippy::unwrap_used)]

use crate::errors::{PublishError, StoreError};
use crate::notifier::Notifier;
use crate::store::{AlarmStatus, ClientRecord, InMemoryStore, RecordKey, StateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub(crate) struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub(crate) fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, subject: &str, body: &str) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Destination(None, "connection refused".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Delegates to an [`InMemoryStore`] but fails the chosen operations.
#[derive(Clone, Default)]
pub(crate) struct FlakyStore {
    pub(crate) inner: InMemoryStore,
    pub(crate) fail_upsert_for: Option<String>,
    pub(crate) fail_query_for: Option<String>,
    pub(crate) fail_list: bool,
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("throttled".into())
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn upsert(&self, record: &ClientRecord) -> Result<(), StoreError> {
        if self.fail_upsert_for.as_deref() == Some(record.key.client_ip.as_str()) {
            return Err(unavailable());
        }
        self.inner.upsert(record).await
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<ClientRecord>, StoreError> {
        self.inner.get(key).await
    }

    async fn query_window(
        &self,
        client_ip: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClientRecord>, StoreError> {
        if self.fail_query_for.as_deref() == Some(client_ip) {
            return Err(unavailable());
        }
        self.inner.query_window(client_ip, start, end).await
    }

    async fn list_distinct_clients(&self) -> Result<BTreeSet<String>, StoreError> {
        if self.fail_list {
            return Err(unavailable());
        }
        self.inner.list_distinct_clients().await
    }

    async fn transition_status(
        &self,
        key: &RecordKey,
        from: AlarmStatus,
        to: AlarmStatus,
    ) -> Result<bool, StoreError> {
        self.inner.transition_status(key, from, to).await
    }
}

/// A WAF log line for `client_ip` at `millis`.
pub(crate) fn waf_line(client_ip: &str, millis: i64) -> String {
    format!(
        r#"{{"timestamp":{millis},"action":"BLOCK","httpRequest":{{"clientIp":"{client_ip}","country":"US","headers":[],"uri":"/login","args":"","httpVersion":"HTTP/1.1","httpMethod":"POST","requestId":"req-{millis}"}}}}"#
    )
}
