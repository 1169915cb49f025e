// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the alarm pipeline.

use reqwest::StatusCode;

/// A raw firewall log record could not be turned into an [`crate::event::Event`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed log record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timestamp {0} is out of range")]
    Timestamp(i64),

    #[error("log record has no client ip")]
    MissingClientIp,
}

/// A read or write against the state store failed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error("state store returned a corrupt record: {0}")]
    Corrupt(String),
}

/// An alarm could not be formatted or delivered.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("alarm detail is not valid JSON: {0}")]
    Format(#[source] serde_json::Error),

    #[error("failed to build notification client: {0}")]
    Client(String),

    #[error("notification destination rejected alarm ({0:?}): {1}")]
    Destination(Option<StatusCode>, String),
}

/// An alarm could not be dispatched; the claimed record has been released.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Why a single record of a streaming batch failed.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl From<DispatchError> for RecordError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Store(e) => Self::Store(e),
            DispatchError::Publish(e) => Self::Publish(e),
        }
    }
}

/// A reconciler sweep was aborted.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("reconcile aborted: window of {0} reaches outside the supported time range")]
    Window(chrono::TimeDelta),

    #[error("reconcile aborted: {0}")]
    Store(#[from] StoreError),

    #[error("reconcile aborted: {0}")]
    Publish(#[from] PublishError),
}

impl From<DispatchError> for ReconcileError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Store(e) => Self::Store(e),
            DispatchError::Publish(e) => Self::Publish(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
