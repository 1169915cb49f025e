// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    time::interval,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use waf_alarm::{
    config::Config,
    consumer::StreamConsumer,
    evaluator::AlarmEvaluator,
    event::Decoder,
    logger::Formatter,
    notifier::{LogNotifier, Notifier, WebhookNotifier},
    reconciler::Reconciler,
    store::{InMemoryStore, StateStore},
};

// Upper bound on records handed to one streaming invocation
const MAX_BATCH_RECORDS: usize = 500;

#[tokio::main]
pub async fn main() {
    let log_level = env::var("WAF_ALARM_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,reqwest=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .event_format(Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on startup: {e}");
            return;
        }
    };

    let notifier: Arc<dyn Notifier> = match config.topic.clone() {
        Some(topic) => match WebhookNotifier::new(
            topic,
            config.https_proxy.as_deref(),
            config.publish_timeout,
        ) {
            Ok(notifier) => Arc::new(notifier),
            Err(e) => {
                error!("Error creating notifier: {e}");
                return;
            }
        },
        None => {
            warn!("TOPIC not set, alarms will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new(
        &config.event_table,
        &config.client_table,
    ));
    let evaluator = AlarmEvaluator::new(config.policy);

    let consumer = StreamConsumer::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        Decoder::new(config.display_offset),
        evaluator,
    )
    .with_retention(config.retention);
    let reconciler = Arc::new(
        Reconciler::new(Arc::clone(&store), Arc::clone(&notifier), evaluator)
            .with_window(config.window),
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                shutdown_token.cancel();
            }
            Err(e) => error!("Unable to listen for shutdown signal: {e}"),
        }
    });

    let reconcile_task = tokio::spawn(run_reconciler(
        Arc::clone(&reconciler),
        config.reconcile_interval,
        cancel_token.clone(),
    ));

    info!(
        "Consuming WAF records from stdin (events: {}, clients: {})",
        config.event_table, config.client_table
    );
    consume_stdin(&consumer, cancel_token.clone()).await;

    // pick up whatever the last batches left behind
    if let Err(e) = reconciler.run().await {
        error!("Final reconcile failed: {e}");
    }
    cancel_token.cancel();
    if let Err(e) = reconcile_task.await {
        error!("Reconciler task failed: {e}");
    }
}

async fn run_reconciler(
    reconciler: Arc<Reconciler>,
    period: std::time::Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("Running reconciler");
                if let Err(e) = reconciler.run().await {
                    error!("{e}");
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
    debug!("Reconciler stopped");
}

/// Reads line-delimited records; a blank line or EOF closes the current batch.
async fn consume_stdin(consumer: &StreamConsumer, cancel_token: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut batch: Vec<String> = Vec::with_capacity(MAX_BATCH_RECORDS);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = cancel_token.cancelled() => break,
        };

        match line {
            Ok(Some(line)) if line.trim().is_empty() => {
                flush_batch(consumer, &mut batch).await;
            }
            Ok(Some(line)) => {
                batch.push(line);
                if batch.len() >= MAX_BATCH_RECORDS {
                    flush_batch(consumer, &mut batch).await;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {e}");
                break;
            }
        }
    }
    flush_batch(consumer, &mut batch).await;
}

async fn flush_batch(consumer: &StreamConsumer, batch: &mut Vec<String>) {
    if batch.is_empty() {
        return;
    }
    let records = std::mem::take(batch);
    let report = consumer.process_batch(&records).await;
    if report.is_clean() {
        debug!(
            "Batch done: {} records, {} alarms",
            records.len(),
            report.alarms().len()
        );
    } else {
        warn!(
            "Batch done with failures: {} stored, {} failed, {} alarms",
            report.stored(),
            report.failed(),
            report.alarms().len()
        );
    }
}
