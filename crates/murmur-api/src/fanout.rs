//! Status-change notifications.
//!
//! A status change is pushed to live subscribers immediately and persisted
//! for every active user on a background task. Neither step can fail the
//! request that triggered it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use murmur_db::Database;
use murmur_db::models::NewNotification;
use murmur_types::Status;
use murmur_types::events::{LiveEvent, NotificationPayload};

use crate::live::Broker;
use crate::retry::retry_with_backoff;

pub const STATUS_UPDATE_KIND: &str = "status_update";
pub const STATUS_UPDATE_TITLE: &str = "Complaint status updated";

const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    broker: Broker,
}

impl Notifier {
    pub fn new(db: Arc<Database>, broker: Broker) -> Self {
        Self { db, broker }
    }

    /// Announce that `complaint_id` moved to `status`.
    ///
    /// The returned handle resolves once persistence has finished or given
    /// up; callers are free to drop it.
    pub fn status_changed(&self, complaint_id: &str, complaint_title: &str, status: Status) -> JoinHandle<()> {
        let payload = NotificationPayload {
            id: Uuid::new_v4(),
            title: STATUS_UPDATE_TITLE.to_string(),
            message: format!(
                "Complaint \"{}\" status changed to {}",
                complaint_title,
                status.as_str()
            ),
            kind: STATUS_UPDATE_KIND.to_string(),
            complaint_id: complaint_id.parse().ok(),
            created_at: Utc::now(),
        };

        let delivered = self.broker.publish(LiveEvent::NotificationCreate(payload.clone()));
        debug!("Status notification pushed to {} live subscriber(s)", delivered);

        let db = self.db.clone();
        let complaint_id = complaint_id.to_string();
        tokio::spawn(async move {
            let result = retry_with_backoff(PERSIST_ATTEMPTS, PERSIST_BASE_DELAY, || {
                let db = db.clone();
                let payload = payload.clone();
                let complaint_id = complaint_id.clone();
                async move {
                    tokio::task::spawn_blocking(move || persist(&db, &payload, &complaint_id))
                        .await
                        .map_err(anyhow::Error::from)?
                }
            })
            .await;

            match result {
                Ok(recipients) => info!(
                    "Notification {} stored for {} active user(s)",
                    payload.id, recipients
                ),
                Err(e) => error!("Failed to store notification {}: {:#}", payload.id, e),
            }
        })
    }
}

fn persist(db: &Database, payload: &NotificationPayload, complaint_id: &str) -> anyhow::Result<usize> {
    db.create_notification_for_active_users(&NewNotification {
        id: &payload.id.to_string(),
        title: &payload.title,
        message: &payload.message,
        kind: &payload.kind,
        complaint_id: Some(complaint_id),
        created_at: &murmur_db::timestamp::format(payload.created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_db::models::NewComplaint;
    use murmur_types::{Category, Priority, Role};

    fn setup() -> (Arc<Database>, String) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for (i, active) in [true, true, true, false].into_iter().enumerate() {
            db.create_user(&format!("u{i}"), &format!("u{i}@example.com"), "x", Role::Viewer, active)
                .unwrap();
        }
        let id = Uuid::new_v4().to_string();
        db.insert_complaint(&NewComplaint {
            id: &id,
            tracking_code: "TRK-1-AAAAAA",
            title: "Broken light",
            description: "d",
            category: Category::Facility,
            priority: Priority::Low,
        })
        .unwrap();
        (db, id)
    }

    #[tokio::test]
    async fn publishes_then_persists_for_active_users() {
        let (db, complaint_id) = setup();
        let broker = Broker::default();
        let mut rx = broker.subscribe();
        let notifier = Notifier::new(db.clone(), broker);

        notifier
            .status_changed(&complaint_id, "Broken light", Status::Resolved)
            .await
            .unwrap();

        let LiveEvent::NotificationCreate(pushed) = rx.recv().await.unwrap();
        assert_eq!(pushed.kind, STATUS_UPDATE_KIND);
        assert!(pushed.message.contains("Broken light"));
        assert!(pushed.message.contains("RESOLVED"));

        for user in ["u0", "u1", "u2"] {
            assert_eq!(db.unread_notification_count(user).unwrap(), 1);
        }
        assert_eq!(db.unread_notification_count("u3").unwrap(), 0);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_panic() {
        let (db, _) = setup();
        let notifier = Notifier::new(db.clone(), Broker::default());

        // Unknown complaint id violates the foreign key on every attempt.
        let handle = notifier.status_changed(&Uuid::new_v4().to_string(), "x", Status::Closed);
        assert!(handle.await.is_ok());
        assert_eq!(db.unread_notification_count("u0").unwrap(), 0);
    }
}
