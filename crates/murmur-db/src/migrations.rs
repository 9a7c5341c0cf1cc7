use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                role            TEXT NOT NULL,
                is_active       INTEGER NOT NULL DEFAULT 1,
                last_login_at   TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE complaints (
                id              TEXT PRIMARY KEY,
                tracking_code   TEXT NOT NULL UNIQUE,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                category        TEXT NOT NULL,
                priority        TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'NEW',
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_complaints_created ON complaints(created_at);
            CREATE INDEX idx_complaints_status ON complaints(status);
            CREATE INDEX idx_complaints_category ON complaints(category);

            CREATE TABLE attachments (
                id              TEXT PRIMARY KEY,
                complaint_id    TEXT NOT NULL REFERENCES complaints(id) ON DELETE CASCADE,
                file_name       TEXT NOT NULL,
                storage_key     TEXT NOT NULL,
                file_size       INTEGER NOT NULL,
                mime_type       TEXT NOT NULL,
                sha256          TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_attachments_complaint ON attachments(complaint_id);

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                message         TEXT NOT NULL,
                type            TEXT NOT NULL,
                complaint_id    TEXT REFERENCES complaints(id) ON DELETE SET NULL,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE user_notifications (
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                notification_id TEXT NOT NULL REFERENCES notifications(id) ON DELETE CASCADE,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                PRIMARY KEY (user_id, notification_id)
            );

            CREATE INDEX idx_user_notifications_unread
                ON user_notifications(user_id, is_read);

            CREATE TABLE rate_limits (
                key             TEXT PRIMARY KEY,
                count           INTEGER NOT NULL,
                expires_at_ms   INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
