use anyhow::Result;
use rusqlite::Connection;

use crate::Database;
use crate::models::ComplaintCounts;

impl Database {
    /// Complaint counts grouped by category, status and priority for
    /// complaints created at or after `since` (a stored timestamp string).
    pub fn complaint_counts_since(&self, since: &str) -> Result<ComplaintCounts> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM complaints WHERE created_at >= ?1",
                [since],
                |r| r.get(0),
            )?;

            Ok(ComplaintCounts {
                total: total.max(0) as u64,
                by_category: grouped(conn, "category", since)?,
                by_status: grouped(conn, "status", since)?,
                by_priority: grouped(conn, "priority", since)?,
            })
        })
    }
}

/// `column` is always one of the fixed names above, never user input.
fn grouped(conn: &Connection, column: &str, since: &str) -> Result<Vec<(String, u64)>> {
    let sql = format!(
        "SELECT {column}, COUNT(*) FROM complaints
         WHERE created_at >= ?1
         GROUP BY {column} ORDER BY {column}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([since], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewComplaint;
    use murmur_types::{Category, Priority};

    #[test]
    fn counts_group_by_each_dimension() {
        let db = Database::open_in_memory().unwrap();
        let seeds = [
            ("c1", Category::Technical, Priority::High),
            ("c2", Category::Technical, Priority::Low),
            ("c3", Category::Safety, Priority::High),
        ];
        for (id, category, priority) in seeds {
            db.insert_complaint(&NewComplaint {
                id,
                tracking_code: &format!("TRK-X-{id}"),
                title: "t",
                description: "d",
                category,
                priority,
            })
            .unwrap();
        }

        let counts = db.complaint_counts_since("2000-01-01T00:00:00.000Z").unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(
            counts.by_category,
            vec![("SAFETY".to_string(), 1), ("TECHNICAL".to_string(), 2)]
        );
        assert_eq!(counts.by_status, vec![("NEW".to_string(), 3)]);
        assert_eq!(
            counts.by_priority,
            vec![("HIGH".to_string(), 2), ("LOW".to_string(), 1)]
        );

        let future = db.complaint_counts_since("2999-01-01T00:00:00.000Z").unwrap();
        assert_eq!(future.total, 0);
        assert!(future.by_category.is_empty());
    }
}
