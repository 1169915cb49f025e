// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Frequent-blocking alarms for web application firewall logs.
//!
//! Two paths share one [`store::StateStore`]:
//! - [`consumer::StreamConsumer`] counts sightings per client within each delivered batch
//!   and alarms as soon as a client repeats often enough.
//! - [`reconciler::Reconciler`] periodically re-reads a trailing window per client and
//!   alarms on patterns that were split across batches.
//!
//! Both hand positive decisions to [`dispatch::dispatch`], which flips the alarm status
//! with a conditional update before publishing so a window alarms at most once.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod consumer;
pub mod counter;
pub mod dispatch;
pub mod errors;
pub mod evaluator;
pub mod event;
pub mod logger;
pub mod notifier;
pub mod reconciler;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
