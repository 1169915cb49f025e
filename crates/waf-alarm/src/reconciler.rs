// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic sweep over persisted state.
//!
//! Catches clients whose blocked requests were spread over several stream batches and so
//! never crossed the batch-local threshold. Single-flight execution is the caller's job.

use crate::dispatch::{dispatch, Dispatched};
use crate::errors::ReconcileError;
use crate::evaluator::{Alarm, AlarmEvaluator, AlarmNotification};
use crate::notifier::Notifier;
use crate::store::StateStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

pub const DEFAULT_WINDOW_SECS: i64 = 300;

pub struct Reconciler {
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    evaluator: AlarmEvaluator,
    window: TimeDelta,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        evaluator: AlarmEvaluator,
    ) -> Self {
        Self {
            store,
            notifier,
            evaluator,
            window: TimeDelta::seconds(DEFAULT_WINDOW_SECS),
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: TimeDelta) -> Self {
        self.window = window;
        self
    }

    pub async fn run(&self) -> Result<Vec<AlarmNotification>, ReconcileError> {
        self.run_at(Utc::now()).await
    }

    /// Evaluates every known client over `[now - window, now]` and publishes the alarms.
    ///
    /// The first store or publish error aborts the sweep.
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AlarmNotification>, ReconcileError> {
        let span = info_span!("reconcile", now = %now);
        async {
            let alarms = self.collect(now).await?;
            debug!("{} clients over threshold", alarms.len());

            let mut delivered = Vec::with_capacity(alarms.len());
            for alarm in alarms {
                match dispatch(self.store.as_ref(), self.notifier.as_ref(), &alarm).await? {
                    Dispatched::Published => delivered.push(alarm.notification),
                    Dispatched::AlreadyClaimed => {}
                }
            }
            info!("Reconcile delivered {} alarms", delivered.len());
            Ok(delivered)
        }
        .instrument(span)
        .await
    }

    async fn collect(&self, now: DateTime<Utc>) -> Result<Vec<Alarm>, ReconcileError> {
        let start = now
            .checked_sub_signed(self.window)
            .ok_or(ReconcileError::Window(self.window))?;
        let clients = self.store.list_distinct_clients().await?;
        debug!("Reconciling {} clients", clients.len());

        let mut alarms = Vec::new();
        for client_ip in &clients {
            let records = self.store.query_window(client_ip, start, now).await?;
            if let Some(alarm) = self.evaluator.evaluate_window(&records) {
                alarms.push(alarm);
            }
        }
        Ok(alarms)
    }
}
