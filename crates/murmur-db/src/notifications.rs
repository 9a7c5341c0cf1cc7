use anyhow::Result;
use rusqlite::{Row, params};

use crate::Database;
use crate::models::{NewNotification, UserNotificationRow};

impl Database {
    /// Insert a notification and one unread row per currently active user,
    /// in one transaction. Returns the number of recipient rows created.
    ///
    /// Users activated later never receive rows for earlier notifications.
    pub fn create_notification_for_active_users(&self, new: &NewNotification<'_>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO notifications (id, title, message, type, complaint_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.id,
                    new.title,
                    new.message,
                    new.kind,
                    new.complaint_id,
                    new.created_at
                ],
            )?;
            let recipients = tx.execute(
                "INSERT OR IGNORE INTO user_notifications (user_id, notification_id, is_read, created_at)
                 SELECT id, ?1, 0, ?2 FROM users WHERE is_active = 1",
                params![new.id, new.created_at],
            )?;
            tx.commit()?;
            Ok(recipients)
        })
    }

    pub fn list_user_notifications(&self, user_id: &str, limit: u32) -> Result<Vec<UserNotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT n.id, n.title, n.message, n.type, n.complaint_id, un.is_read, n.created_at
                 FROM user_notifications un
                 JOIN notifications n ON n.id = un.notification_id
                 WHERE un.user_id = ?1
                 ORDER BY n.created_at DESC, n.id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![user_id, limit], map_user_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn unread_notification_count(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM user_notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |r| r.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }

    /// Mark one of the user's notifications read. Returns `false` if the row
    /// was already read or does not belong to the user.
    pub fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE user_notifications SET is_read = 1
                 WHERE user_id = ?1 AND notification_id = ?2 AND is_read = 0",
                params![user_id, notification_id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE user_notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?)
        })
    }

    /// Drop the user's copy of a notification. Other recipients keep theirs.
    pub fn remove_user_notification(&self, user_id: &str, notification_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM user_notifications WHERE user_id = ?1 AND notification_id = ?2",
                params![user_id, notification_id],
            )?;
            Ok(n > 0)
        })
    }
}

fn map_user_notification(row: &Row<'_>) -> rusqlite::Result<UserNotificationRow> {
    Ok(UserNotificationRow {
        id: row.get(0)?,
        title: row.get(1)?,
        message: row.get(2)?,
        kind: row.get(3)?,
        complaint_id: row.get(4)?,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
    })
}
