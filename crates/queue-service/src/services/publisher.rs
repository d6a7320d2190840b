//! Realtime publication of queue views.
//!
//! The engine publishes a fresh provider and/or student view after every
//! committed change. Delivery is fire-and-forget: publish errors are logged
//! by the engine and never fail the operation that triggered them.

use crate::services::view_projector::{ProviderView, StudentView};
use common::types::{OfficeHourId, UserId};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Delivery(String),
}

/// A view update addressed to one audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "audience", rename_all = "snake_case")]
pub enum QueueUpdate {
    Provider {
        office_hour_id: OfficeHourId,
        view: ProviderView,
    },
    Student {
        student_user_id: UserId,
        office_hour_id: OfficeHourId,
        view: StudentView,
    },
}

/// Outbound realtime channel (enables mocking).
#[async_trait::async_trait]
pub trait RealtimePublisher: Send + Sync {
    async fn publish_provider_view(
        &self,
        office_hour_id: OfficeHourId,
        view: &ProviderView,
    ) -> Result<(), PublishError>;

    async fn publish_student_view(
        &self,
        student_user_id: UserId,
        office_hour_id: OfficeHourId,
        view: &StudentView,
    ) -> Result<(), PublishError>;
}

/// In-process fan-out over a `tokio::sync::broadcast` channel.
///
/// Whatever transport delivers updates to browsers subscribes here. Slow
/// subscribers lose the oldest updates (`RecvError::Lagged`), which is fine
/// since every update is a full snapshot.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<QueueUpdate>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueUpdate> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn send(&self, update: QueueUpdate) {
        // SendError only means nobody is subscribed right now
        let _ = self.sender.send(update);
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait::async_trait]
impl RealtimePublisher for BroadcastPublisher {
    async fn publish_provider_view(
        &self,
        office_hour_id: OfficeHourId,
        view: &ProviderView,
    ) -> Result<(), PublishError> {
        self.send(QueueUpdate::Provider {
            office_hour_id,
            view: view.clone(),
        });
        Ok(())
    }

    async fn publish_student_view(
        &self,
        student_user_id: UserId,
        office_hour_id: OfficeHourId,
        view: &StudentView,
    ) -> Result<(), PublishError> {
        self.send(QueueUpdate::Student {
            student_user_id,
            office_hour_id,
            view: view.clone(),
        });
        Ok(())
    }
}

/// Mock publisher module for testing.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Publisher that records every update it is handed.
    #[derive(Default)]
    pub struct RecordingPublisher {
        updates: Mutex<Vec<QueueUpdate>>,
        fail: bool,
    }

    impl RecordingPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Records updates but reports every publish as failed.
        pub fn failing() -> Self {
            Self {
                updates: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn updates(&self) -> Vec<QueueUpdate> {
            self.updates
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        }

        pub fn provider_views(&self) -> Vec<ProviderView> {
            self.updates()
                .into_iter()
                .filter_map(|u| match u {
                    QueueUpdate::Provider { view, .. } => Some(view),
                    QueueUpdate::Student { .. } => None,
                })
                .collect()
        }

        pub fn student_views_for(&self, student: UserId) -> Vec<StudentView> {
            self.updates()
                .into_iter()
                .filter_map(|u| match u {
                    QueueUpdate::Student {
                        student_user_id,
                        view,
                        ..
                    } if student_user_id == student => Some(view),
                    _ => None,
                })
                .collect()
        }

        pub fn clear(&self) {
            self.updates
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
        }

        fn record(&self, update: QueueUpdate) -> Result<(), PublishError> {
            self.updates
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(update);
            if self.fail {
                return Err(PublishError::Delivery("mock publisher failure".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl RealtimePublisher for RecordingPublisher {
        async fn publish_provider_view(
            &self,
            office_hour_id: OfficeHourId,
            view: &ProviderView,
        ) -> Result<(), PublishError> {
            self.record(QueueUpdate::Provider {
                office_hour_id,
                view: view.clone(),
            })
        }

        async fn publish_student_view(
            &self,
            student_user_id: UserId,
            office_hour_id: OfficeHourId,
            view: &StudentView,
        ) -> Result<(), PublishError> {
            self.record(QueueUpdate::Student {
                student_user_id,
                office_hour_id,
                view: view.clone(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::mock::RecordingPublisher;
    use super::*;
    use chrono::Utc;

    fn student_view(office_hour_id: OfficeHourId) -> StudentView {
        StudentView {
            session_id: None,
            office_hour_id,
            server_time: Utc::now(),
            entry: None,
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let publisher = BroadcastPublisher::default();
        let mut rx = publisher.subscribe();
        let office_hour_id = OfficeHourId::new();
        let student = UserId::new();

        publisher
            .publish_student_view(student, office_hour_id, &student_view(office_hour_id))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            QueueUpdate::Student {
                student_user_id, ..
            } => assert_eq!(student_user_id, student),
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let publisher = BroadcastPublisher::new(4);
        assert_eq!(publisher.subscriber_count(), 0);

        let office_hour_id = OfficeHourId::new();
        let result = publisher
            .publish_student_view(UserId::new(), office_hour_id, &student_view(office_hour_id))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_recording_publisher_filters_by_student() {
        let publisher = RecordingPublisher::new();
        let office_hour_id = OfficeHourId::new();
        let a = UserId::new();
        let b = UserId::new();

        publisher
            .publish_student_view(a, office_hour_id, &student_view(office_hour_id))
            .await
            .unwrap();
        publisher
            .publish_student_view(b, office_hour_id, &student_view(office_hour_id))
            .await
            .unwrap();

        assert_eq!(publisher.student_views_for(a).len(), 1);
        assert_eq!(publisher.updates().len(), 2);
        assert!(publisher.provider_views().is_empty());

        publisher.clear();
        assert!(publisher.updates().is_empty());
    }

    #[tokio::test]
    async fn test_failing_publisher_still_records() {
        let publisher = RecordingPublisher::failing();
        let office_hour_id = OfficeHourId::new();

        let result = publisher
            .publish_student_view(UserId::new(), office_hour_id, &student_view(office_hour_id))
            .await;

        assert!(result.is_err());
        assert_eq!(publisher.updates().len(), 1);
    }

    #[test]
    fn test_update_serializes_with_audience_tag() {
        let office_hour_id = OfficeHourId::new();
        let update = QueueUpdate::Student {
            student_user_id: UserId::new(),
            office_hour_id,
            view: student_view(office_hour_id),
        };

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["audience"], "student");
        assert!(json["view"]["entry"].is_null());
    }
}
