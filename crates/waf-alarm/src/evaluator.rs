// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Alarm decisions for a single client.
//!
//! The streaming path and the reconciler look at different data (a batch-local tally vs. a
//! persisted window) and so carry independent thresholds in [`AlarmPolicy`].

use crate::counter::CounterEntry;
use crate::errors::PublishError;
use crate::store::{AlarmStatus, ClientRecord, RecordKey};
use serde::Serialize;

pub const DEFAULT_STREAM_THRESHOLD: u32 = 5;
pub const DEFAULT_RECONCILE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmPolicy {
    /// Repeat sightings within one batch (the first sighting is not counted).
    pub stream_threshold: u32,
    /// Persisted records within one reconcile window.
    pub reconcile_threshold: usize,
}

impl Default for AlarmPolicy {
    fn default() -> Self {
        Self {
            stream_threshold: DEFAULT_STREAM_THRESHOLD,
            reconcile_threshold: DEFAULT_RECONCILE_THRESHOLD,
        }
    }
}

/// What gets sent for one offending client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmNotification {
    pub client_ip: String,
    pub formatted_timestamp: String,
    pub detail: String,
}

impl AlarmNotification {
    pub fn subject(&self) -> String {
        format!(
            "WAF alert for frequent blocking {} at {}",
            self.client_ip, self.formatted_timestamp
        )
    }

    /// The detail payload re-indented with tabs, keys in their original order.
    pub fn body(&self) -> Result<String, PublishError> {
        let value: serde_json::Value =
            serde_json::from_str(&self.detail).map_err(PublishError::Format)?;
        let mut buf = Vec::with_capacity(self.detail.len() * 2);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value
            .serialize(&mut serializer)
            .map_err(PublishError::Format)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// A positive decision: the notification plus the records whose status it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub notification: AlarmNotification,
    /// Claimed `Unalarmed -> Alarmed` before publishing; released if publishing fails.
    pub claim: RecordKey,
    /// Marked `Alarmed` once the notification went out.
    pub covered: Vec<RecordKey>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlarmEvaluator {
    policy: AlarmPolicy,
}

impl AlarmEvaluator {
    pub fn new(policy: AlarmPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> AlarmPolicy {
        self.policy
    }

    pub fn should_alarm_stream(&self, count: u32, status: AlarmStatus) -> bool {
        count >= self.policy.stream_threshold && status != AlarmStatus::Alarmed
    }

    /// Streaming decision for a client whose latest sighting is `trigger`.
    pub fn evaluate_batch(&self, entry: &CounterEntry, trigger: RecordKey) -> Option<Alarm> {
        if !self.should_alarm_stream(entry.count, entry.status) {
            return None;
        }
        Some(Alarm {
            notification: AlarmNotification {
                client_ip: entry.earliest.client_ip.clone(),
                formatted_timestamp: entry.earliest.formatted_timestamp.clone(),
                detail: entry.earliest.detail.clone(),
            },
            claim: trigger,
            covered: Vec::new(),
        })
    }

    /// Reconcile decision over one client's persisted window, oldest record first.
    ///
    /// Fires when the window is large enough and nothing in it has been alarmed yet.
    pub fn evaluate_window(&self, records: &[ClientRecord]) -> Option<Alarm> {
        if records.len() < self.policy.reconcile_threshold {
            return None;
        }
        if records.iter().any(|r| r.status == AlarmStatus::Alarmed) {
            return None;
        }
        let (first, rest) = records.split_first()?;
        Some(Alarm {
            notification: AlarmNotification {
                client_ip: first.key.client_ip.clone(),
                formatted_timestamp: first.formatted_timestamp.clone(),
                detail: first.detail.clone(),
            },
            claim: first.key.clone(),
            covered: rest.iter().map(|r| r.key.clone()).collect(),
        })
    }
}
