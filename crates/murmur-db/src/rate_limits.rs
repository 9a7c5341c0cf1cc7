use anyhow::Result;
use rusqlite::params;

use crate::Database;

impl Database {
    /// Atomically increment the counter stored under `key` and return the new
    /// value. The expiry is set only when a fresh window starts (first
    /// increment, or first increment after the previous window expired), so
    /// later increments never extend the window.
    pub fn increment_rate_counter(&self, key: &str, window_ms: u64, now_ms: i64) -> Result<u64> {
        let expires_at = now_ms.saturating_add(window_ms.min(i64::MAX as u64) as i64);
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "INSERT INTO rate_limits (key, count, expires_at_ms) VALUES (?1, 1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    count = CASE WHEN expires_at_ms <= ?3 THEN 1 ELSE count + 1 END,
                    expires_at_ms = CASE WHEN expires_at_ms <= ?3 THEN ?2 ELSE expires_at_ms END
                 RETURNING count",
                params![key, expires_at, now_ms],
                |r| r.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }

    /// Remove expired counters. Returns the number of rows deleted.
    pub fn purge_expired_rate_counters(&self, now_ms: i64) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM rate_limits WHERE expires_at_ms <= ?1", [now_ms])?)
        })
    }
}
