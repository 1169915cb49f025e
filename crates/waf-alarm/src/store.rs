// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Persistent per-client state.
//!
//! Records are keyed by `(client ip, event timestamp in millis)`. The store is the only
//! state shared between concurrent stream invocations and the reconciler, so the alarm
//! status transition goes through [`StateStore::transition_status`], which only succeeds
//! when the stored status still matches what the caller expects.

use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum AlarmStatus {
    #[default]
    #[display("Unalarmed")]
    Unalarmed,
    #[display("Alarmed")]
    Alarmed,
}

impl FromStr for AlarmStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unalarmed" => Ok(Self::Unalarmed),
            "Alarmed" => Ok(Self::Alarmed),
            other => Err(StoreError::Corrupt(format!("unknown alarm status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub client_ip: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl RecordKey {
    pub fn new(client_ip: impl Into<String>, timestamp: i64) -> Self {
        Self {
            client_ip: client_ip.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub key: RecordKey,
    pub formatted_timestamp: String,
    /// Raw JSON of the originating log line.
    pub detail: String,
    pub status: AlarmStatus,
    /// Epoch seconds; honoured by external retention, never by this crate.
    pub expire_time: i64,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Writes every attribute of `record` under its key, replacing any previous version.
    async fn upsert(&self, record: &ClientRecord) -> Result<(), StoreError>;

    async fn get(&self, key: &RecordKey) -> Result<Option<ClientRecord>, StoreError>;

    /// Records of `client_ip` with `start <= timestamp <= end`, oldest first.
    async fn query_window(
        &self,
        client_ip: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClientRecord>, StoreError>;

    /// Every client ip ever written.
    async fn list_distinct_clients(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Sets the status of `key` to `to` only if it is currently `from`.
    ///
    /// Returns `false` when the stored status differs or the record does not exist.
    async fn transition_status(
        &self,
        key: &RecordKey,
        from: AlarmStatus,
        to: AlarmStatus,
    ) -> Result<bool, StoreError>;
}

#[derive(Default)]
struct Tables {
    events: BTreeMap<RecordKey, ClientRecord>,
    clients: BTreeSet<String>,
}

/// Process-local [`StateStore`]. Clones share the same tables.
#[derive(Clone)]
pub struct InMemoryStore {
    event_table: Arc<str>,
    client_table: Arc<str>,
    tables: Arc<Mutex<Tables>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("events", "clients")
    }
}

impl InMemoryStore {
    pub fn new(event_table: &str, client_table: &str) -> Self {
        Self {
            event_table: Arc::from(event_table),
            client_table: Arc::from(client_table),
            tables: Arc::new(Mutex::new(Tables::default())),
        }
    }

    pub fn event_table(&self) -> &str {
        &self.event_table
    }

    /// Name of the client inventory read by [`StateStore::list_distinct_clients`].
    pub fn client_table(&self) -> &str {
        &self.client_table
    }

    pub async fn len(&self) -> usize {
        self.tables.lock().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn upsert(&self, record: &ClientRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.clients.insert(record.key.client_ip.clone()) {
            debug!("{}: registered {}", self.client_table, record.key.client_ip);
        }
        tables.events.insert(record.key.clone(), record.clone());
        debug!(
            "{}: upserted {} @ {} as {}",
            self.event_table, record.key.client_ip, record.key.timestamp, record.status
        );
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<ClientRecord>, StoreError> {
        Ok(self.tables.lock().await.events.get(key).cloned())
    }

    async fn query_window(
        &self,
        client_ip: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClientRecord>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let low = RecordKey::new(client_ip, start.timestamp_millis());
        let high = RecordKey::new(client_ip, end.timestamp_millis());
        let tables = self.tables.lock().await;
        Ok(tables.events.range(low..=high).map(|(_, r)| r.clone()).collect())
    }

    async fn list_distinct_clients(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.tables.lock().await.clients.clone())
    }

    async fn transition_status(
        &self,
        key: &RecordKey,
        from: AlarmStatus,
        to: AlarmStatus,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.events.get_mut(key) {
            Some(record) if record.status == from => {
                record.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
