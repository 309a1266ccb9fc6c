//! Notifications to users about lineage requests and sales
//!
//! Delivery is fire-and-forget from the caller's point of view: services send
//! after their transaction commits and only log failures.

use crate::db::{last_insert_id, now, Database, NewNotification, Notification};
use crate::error::{AppError, Result};
use crate::schema::notifications;
use crate::service::Service;
use crate::types::NotificationType;
use diesel::prelude::*;
use serde_json::Value;

/// One message for one receiver
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub receiver_id: String,
    pub kind: NotificationType,
    pub target_id: i32,
    pub detail: Value,
}

/// Where notices go. Implementations must not block for long.
pub trait NotificationSink: Send + Sync {
    fn send(&self, notice: &Notice) -> Result<()>;
}

/// Sink that stores notices in the `notifications` table for clients to poll
pub struct StoreNotifier {
    db: Database,
}

impl StoreNotifier {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl NotificationSink for StoreNotifier {
    fn send(&self, notice: &Notice) -> Result<()> {
        let detail_json = notice.detail.to_string();
        self.db.write(|conn| {
            let now = now();
            diesel::insert_into(notifications::table)
                .values(&NewNotification {
                    receiver_id: &notice.receiver_id,
                    notification_type: notice.kind.as_str(),
                    target_id: notice.target_id,
                    detail_json: &detail_json,
                    is_read: false,
                    created_at: &now,
                })
                .execute(conn)?;
            Ok(last_insert_id(conn)?)
        })?;
        Ok(())
    }
}

impl Service {
    /// Deliver a notice; failures are logged and swallowed
    pub(crate) fn notify(&self, notice: Notice) {
        match self.notifier().send(&notice) {
            Ok(()) => tracing::debug!(
                receiver = %notice.receiver_id,
                kind = %notice.kind,
                target_id = notice.target_id,
                "notification sent"
            ),
            Err(e) => tracing::warn!(
                receiver = %notice.receiver_id,
                kind = %notice.kind,
                target_id = notice.target_id,
                error = %e,
                "notification delivery failed"
            ),
        }
    }

    /// Notifications for `user`, newest first
    pub fn list_notifications(&self, user: &str, unread_only: bool) -> Result<Vec<Notification>> {
        self.db().read(|conn| {
            let mut query = notifications::table
                .filter(notifications::receiver_id.eq(user))
                .into_boxed();
            if unread_only {
                query = query.filter(notifications::is_read.eq(false));
            }
            Ok(query
                .order(notifications::id.desc())
                .load::<Notification>(conn)?)
        })
    }

    /// Mark one of `user`'s notifications read
    pub fn mark_notification_read(&self, notification_id: i32, user: &str) -> Result<Notification> {
        self.db().write(|conn| {
            let notification = notifications::table
                .find(notification_id)
                .first::<Notification>(conn)
                .optional()?
                .ok_or_else(|| AppError::not_found("Notification", notification_id))?;
            if notification.receiver_id != user {
                // Someone else's notification: do not confirm it exists
                return Err(AppError::not_found("Notification", notification_id));
            }
            diesel::update(notifications::table.find(notification_id))
                .set(notifications::is_read.eq(true))
                .execute(conn)?;
            Ok(Notification { is_read: true, ..notification })
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps notices in memory
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Notice>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<Notice> {
            self.sent.lock().map(|v| v.clone()).unwrap_or_default()
        }
    }

    impl NotificationSink for RecordingNotifier {
        fn send(&self, notice: &Notice) -> Result<()> {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(notice.clone());
            }
            Ok(())
        }
    }

    /// Sink that always fails
    pub struct BrokenNotifier;

    impl NotificationSink for BrokenNotifier {
        fn send(&self, _notice: &Notice) -> Result<()> {
            Err(AppError::BadRequest("push gateway unavailable".to_string()))
        }
    }
}
