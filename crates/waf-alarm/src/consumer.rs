// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Streaming path: one call to [`StreamConsumer::process_batch`] per delivered batch.
//!
//! Every record is persisted as `Unalarmed` before it is counted. The counter is created
//! fresh for each batch and dropped at the end, so nothing carries over between batches;
//! clients that cross the threshold across batches are left to the reconciler.
//! A failing record is reported and skipped, the rest of the batch still runs.

use crate::counter::WindowedCounter;
use crate::dispatch::{dispatch, Dispatched};
use crate::errors::RecordError;
use crate::evaluator::{AlarmEvaluator, AlarmNotification};
use crate::event::{expiry_marker, Decoder};
use crate::notifier::Notifier;
use crate::store::{AlarmStatus, ClientRecord, RecordKey, StateStore};
use chrono::TimeDelta;
use std::sync::Arc;
use tracing::{debug, error, info_span, Instrument};

pub const DEFAULT_RETENTION_HOURS: i64 = 8;

#[derive(Debug)]
pub enum RecordOutcome {
    Stored,
    Alarmed(AlarmNotification),
    Failed(RecordError),
}

#[derive(Debug, Default)]
pub struct BatchReport {
    outcomes: Vec<RecordOutcome>,
}

impl BatchReport {
    pub fn outcomes(&self) -> &[RecordOutcome] {
        &self.outcomes
    }

    pub fn stored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o, RecordOutcome::Failed(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RecordOutcome::Failed(_)))
            .count()
    }

    pub fn alarms(&self) -> Vec<&AlarmNotification> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                RecordOutcome::Alarmed(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }
}

pub struct StreamConsumer {
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    decoder: Decoder,
    evaluator: AlarmEvaluator,
    retention: TimeDelta,
}

impl StreamConsumer {
    pub fn new(
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        decoder: Decoder,
        evaluator: AlarmEvaluator,
    ) -> Self {
        Self {
            store,
            notifier,
            decoder,
            evaluator,
            retention: TimeDelta::hours(DEFAULT_RETENTION_HOURS),
        }
    }

    #[must_use]
    pub fn with_retention(mut self, retention: TimeDelta) -> Self {
        self.retention = retention;
        self
    }

    pub async fn process_batch<S: AsRef<str>>(&self, records: &[S]) -> BatchReport {
        let span = info_span!("process_batch", records = records.len());
        async {
            let mut counter = WindowedCounter::new();
            let mut report = BatchReport {
                outcomes: Vec::with_capacity(records.len()),
            };
            for (index, raw) in records.iter().enumerate() {
                let outcome = match self.process_record(raw.as_ref(), &mut counter).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Failed to process record {index}: {e}");
                        RecordOutcome::Failed(e)
                    }
                };
                report.outcomes.push(outcome);
            }
            debug!(
                "Processed batch: {} stored, {} failed, {} alarms, {} clients",
                report.stored(),
                report.failed(),
                report.alarms().len(),
                counter.len()
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn process_record(
        &self,
        raw: &str,
        counter: &mut WindowedCounter,
    ) -> Result<RecordOutcome, RecordError> {
        let event = self.decoder.decode(raw)?;
        let record = ClientRecord {
            key: RecordKey::new(event.client_ip.clone(), event.timestamp_millis()),
            formatted_timestamp: event.formatted_timestamp.clone(),
            detail: event.detail.clone(),
            status: AlarmStatus::Unalarmed,
            expire_time: expiry_marker(event.timestamp, self.retention)?,
        };
        self.store.upsert(&record).await?;

        if !counter.observe(&event) {
            return Ok(RecordOutcome::Stored);
        }
        let Some(entry) = counter.get(&event.client_ip) else {
            return Ok(RecordOutcome::Stored);
        };
        debug!("{}: {} repeat sightings", event.client_ip, entry.count);

        let Some(alarm) = self.evaluator.evaluate_batch(entry, record.key) else {
            return Ok(RecordOutcome::Stored);
        };

        let dispatched = dispatch(self.store.as_ref(), self.notifier.as_ref(), &alarm).await?;
        counter.mark_alarmed(&event.client_ip);
        match dispatched {
            Dispatched::Published => Ok(RecordOutcome::Alarmed(alarm.notification)),
            Dispatched::AlreadyClaimed => Ok(RecordOutcome::Stored),
        }
    }
}
