// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turning an [`Alarm`] into a delivered notification exactly once.
//!
//! The claimed record moves `Unalarmed -> Alarmed` before anything is published, so two
//! evaluators racing on the same record cannot both notify. A failed publish moves it back.

use crate::errors::DispatchError;
use crate::evaluator::Alarm;
use crate::notifier::Notifier;
use crate::store::{AlarmStatus, StateStore};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Published,
    /// Someone else already alarmed the claimed record; nothing was sent.
    AlreadyClaimed,
}

pub async fn dispatch(
    store: &dyn StateStore,
    notifier: &dyn Notifier,
    alarm: &Alarm,
) -> Result<Dispatched, DispatchError> {
    // formatting problems must not leave anything marked
    let body = alarm.notification.body()?;
    let subject = alarm.notification.subject();

    let claimed = store
        .transition_status(&alarm.claim, AlarmStatus::Unalarmed, AlarmStatus::Alarmed)
        .await?;
    if !claimed {
        warn!(
            "Alarm for {} @ {} already claimed, skipping",
            alarm.claim.client_ip, alarm.claim.timestamp
        );
        return Ok(Dispatched::AlreadyClaimed);
    }

    if let Err(e) = notifier.publish(&subject, &body).await {
        error!("Failed to publish '{subject}': {e}");
        if let Err(release) = store
            .transition_status(&alarm.claim, AlarmStatus::Alarmed, AlarmStatus::Unalarmed)
            .await
        {
            error!(
                "Failed to release claim on {} @ {}: {release}",
                alarm.claim.client_ip, alarm.claim.timestamp
            );
        }
        return Err(e.into());
    }

    for key in &alarm.covered {
        store
            .transition_status(key, AlarmStatus::Unalarmed, AlarmStatus::Alarmed)
            .await?;
    }

    info!("{subject}");
    Ok(Dispatched::Published)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::errors::PublishError;
    use crate::evaluator::AlarmNotification;
    use crate::store::{ClientRecord, InMemoryStore, RecordKey};
    use crate::test_support::RecordingNotifier;

    async fn seeded_store(keys: &[RecordKey]) -> InMemoryStore {
        let store = InMemoryStore::default();
        for key in keys {
            store
                .upsert(&ClientRecord {
                    key: key.clone(),
                    formatted_timestamp: "t0".to_string(),
                    detail: r#"{"a":1}"#.to_string(),
                    status: AlarmStatus::Unalarmed,
                    expire_time: 0,
                })
                .await
                .unwrap();
        }
        store
    }

    fn alarm(detail: &str, claim: RecordKey, covered: Vec<RecordKey>) -> Alarm {
        Alarm {
            notification: AlarmNotification {
                client_ip: claim.client_ip.clone(),
                formatted_timestamp: "t0".to_string(),
                detail: detail.to_string(),
            },
            claim,
            covered,
        }
    }

    async fn status(store: &InMemoryStore, key: &RecordKey) -> AlarmStatus {
        store.get(key).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_dispatch_marks_claim_and_covered() {
        let keys = [
            RecordKey::new("10.0.0.1", 0),
            RecordKey::new("10.0.0.1", 1),
            RecordKey::new("10.0.0.1", 2),
        ];
        let store = seeded_store(&keys).await;
        let notifier = RecordingNotifier::default();

        let result = dispatch(
            &store,
            &notifier,
            &alarm(r#"{"a":1}"#, keys[0].clone(), keys[1..].to_vec()),
        )
        .await
        .unwrap();

        assert_eq!(result, Dispatched::Published);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "WAF alert for frequent blocking 10.0.0.1 at t0");
        assert_eq!(sent[0].1, "{\n\t\"a\": 1\n}");
        for key in &keys {
            assert_eq!(status(&store, key).await, AlarmStatus::Alarmed);
        }
    }

    #[tokio::test]
    async fn test_second_dispatch_is_suppressed() {
        let key = RecordKey::new("10.0.0.1", 0);
        let store = seeded_store(&[key.clone()]).await;
        let notifier = RecordingNotifier::default();
        let alarm = alarm("{}", key, Vec::new());

        assert_eq!(
            dispatch(&store, &notifier, &alarm).await.unwrap(),
            Dispatched::Published
        );
        assert_eq!(
            dispatch(&store, &notifier, &alarm).await.unwrap(),
            Dispatched::AlreadyClaimed
        );
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_releases_claim() {
        let keys = [RecordKey::new("10.0.0.1", 0), RecordKey::new("10.0.0.1", 1)];
        let store = seeded_store(&keys).await;
        let notifier = RecordingNotifier::failing();

        let err = dispatch(
            &store,
            &notifier,
            &alarm("{}", keys[0].clone(), vec![keys[1].clone()]),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Publish(PublishError::Destination(..))
        ));
        for key in &keys {
            assert_eq!(status(&store, key).await, AlarmStatus::Unalarmed);
        }
    }

    #[tokio::test]
    async fn test_invalid_detail_marks_nothing() {
        let key = RecordKey::new("10.0.0.1", 0);
        let store = seeded_store(&[key.clone()]).await;
        let notifier = RecordingNotifier::default();

        let err = dispatch(&store, &notifier, &alarm("{broken", key.clone(), Vec::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Publish(PublishError::Format(_))));
        assert!(notifier.sent().is_empty());
        assert_eq!(status(&store, &key).await, AlarmStatus::Unalarmed);
    }
}
