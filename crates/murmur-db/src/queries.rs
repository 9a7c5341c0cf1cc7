use anyhow::Result;
use murmur_types::api::{SortField, SortOrder};
use murmur_types::Role;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::Database;
use crate::models::{
    AttachmentRow, ComplaintChanges, ComplaintFilter, ComplaintRow, ComplaintUpdate,
    NewAttachment, NewComplaint, UserRow,
};
use crate::timestamp;

const COMPLAINT_COLUMNS: &str = "c.id, c.tracking_code, c.title, c.description, c.category,
     c.priority, c.status,
     (SELECT COUNT(*) FROM attachments a WHERE a.complaint_id = c.id),
     c.created_at, c.updated_at";

const ATTACHMENT_COLUMNS: &str =
    "id, complaint_id, file_name, storage_key, file_size, mime_type, sha256, created_at";

const USER_COLUMNS: &str = "id, email, password, role, is_active, last_login_at, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        role: Role,
        is_active: bool,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, role, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, email, password_hash, role.as_str(), is_active, timestamp::now()],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            Ok(conn.query_row(&sql, [email], map_user).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], map_user).optional()?)
        })
    }

    pub fn touch_last_login(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login_at = ?1 WHERE id = ?2",
                params![timestamp::now(), id],
            )?;
            Ok(())
        })
    }

    pub fn set_user_active(&self, id: &str, is_active: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET is_active = ?1 WHERE id = ?2",
                params![is_active, id],
            )?;
            Ok(n > 0)
        })
    }

    // -- Complaints --

    pub fn insert_complaint(&self, new: &NewComplaint<'_>) -> Result<()> {
        self.with_conn(|conn| insert_complaint_row(conn, new, &timestamp::now()))
    }

    /// Record a new complaint and its already stored files atomically.
    pub fn insert_complaint_with_attachments(
        &self,
        complaint: &NewComplaint<'_>,
        attachments: &[NewAttachment<'_>],
    ) -> Result<Vec<AttachmentRow>> {
        let now = timestamp::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_complaint_row(&tx, complaint, &now)?;
            let rows = attachments
                .iter()
                .map(|new| insert_attachment_row(&tx, new, &now))
                .collect::<Result<Vec<_>>>()?;
            tx.commit()?;
            Ok(rows)
        })
    }

    pub fn get_complaint(&self, id: &str) -> Result<Option<ComplaintRow>> {
        self.with_conn(|conn| query_complaint(conn, "c.id = ?1", id))
    }

    pub fn get_complaint_by_tracking_code(&self, code: &str) -> Result<Option<ComplaintRow>> {
        self.with_conn(|conn| query_complaint(conn, "c.tracking_code = ?1", code))
    }

    /// One page of complaints matching `filter`, plus the total match count.
    pub fn list_complaints(&self, filter: &ComplaintFilter) -> Result<(Vec<ComplaintRow>, u64)> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("c.status = ?");
            values.push(Value::Text(status.as_str().into()));
        }
        if let Some(category) = filter.category {
            clauses.push("c.category = ?");
            values.push(Value::Text(category.as_str().into()));
        }
        if let Some(priority) = filter.priority {
            clauses.push("c.priority = ?");
            values.push(Value::Text(priority.as_str().into()));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push(
                "(instr(lower(c.title), ?) > 0
                  OR instr(lower(c.description), ?) > 0
                  OR instr(lower(c.tracking_code), ?) > 0)",
            );
            let needle = search.to_lowercase();
            for _ in 0..3 {
                values.push(Value::Text(needle.clone()));
            }
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM complaints c {where_sql}"),
                params_from_iter(values.iter()),
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT {COMPLAINT_COLUMNS} FROM complaints c {where_sql}
                 ORDER BY {} {dir}, c.id {dir}
                 LIMIT ? OFFSET ?",
                sort_expression(filter.sort_by),
                dir = sort_direction(filter.sort_order),
            );
            let mut page_values = values.clone();
            page_values.push(Value::Integer(i64::from(filter.limit)));
            page_values.push(Value::Integer(filter.offset.min(i64::MAX as u64) as i64));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(page_values.iter()), map_complaint)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total.max(0) as u64))
        })
    }

    /// Apply administrator changes. Returns `None` when the complaint does not exist.
    pub fn update_complaint(
        &self,
        id: &str,
        changes: &ComplaintChanges,
    ) -> Result<Option<ComplaintUpdate>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(before) = query_complaint(&tx, "c.id = ?1", id)? else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE complaints SET
                    status = COALESCE(?1, status),
                    priority = COALESCE(?2, priority),
                    category = COALESCE(?3, category),
                    updated_at = ?4
                 WHERE id = ?5",
                params![
                    changes.status.map(|s| s.as_str()),
                    changes.priority.map(|p| p.as_str()),
                    changes.category.map(|c| c.as_str()),
                    timestamp::now(),
                    id,
                ],
            )?;

            let after = query_complaint(&tx, "c.id = ?1", id)?
                .ok_or_else(|| anyhow::anyhow!("Complaint {} vanished during update", id))?;
            tx.commit()?;

            Ok(Some(ComplaintUpdate { before, after }))
        })
    }

    /// Delete a complaint (attachments cascade). Returns the storage keys of
    /// the removed attachments, or `None` when nothing was deleted.
    pub fn delete_complaint(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let keys = {
                let mut stmt =
                    tx.prepare("SELECT storage_key FROM attachments WHERE complaint_id = ?1")?;
                stmt.query_map([id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let deleted = tx.execute("DELETE FROM complaints WHERE id = ?1", [id])?;
            tx.commit()?;

            Ok((deleted > 0).then_some(keys))
        })
    }

    // -- Attachments --

    /// Record several stored files in one transaction: all rows or none.
    pub fn insert_attachments(&self, attachments: &[NewAttachment<'_>]) -> Result<Vec<AttachmentRow>> {
        let now = timestamp::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let rows = attachments
                .iter()
                .map(|new| insert_attachment_row(&tx, new, &now))
                .collect::<Result<Vec<_>>>()?;
            tx.commit()?;
            Ok(rows)
        })
    }

    pub fn list_attachments(&self, complaint_id: &str) -> Result<Vec<AttachmentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM attachments
                 WHERE complaint_id = ?1 ORDER BY created_at, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([complaint_id], map_attachment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Fetch an attachment together with its owning complaint's tracking code.
    pub fn get_attachment_with_owner(&self, id: &str) -> Result<Option<(AttachmentRow, String)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, c.tracking_code FROM attachments a
                 JOIN complaints c ON c.id = a.complaint_id
                 WHERE a.id = ?1",
                ATTACHMENT_COLUMNS
                    .split(", ")
                    .map(|col| format!("a.{col}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let row = conn
                .query_row(&sql, [id], |row| Ok((map_attachment(row)?, row.get(8)?)))
                .optional()?;
            Ok(row)
        })
    }
}

fn insert_complaint_row(conn: &Connection, new: &NewComplaint<'_>, now: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO complaints
            (id, tracking_code, title, description, category, priority, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'NEW', ?7, ?7)",
        params![
            new.id,
            new.tracking_code,
            new.title,
            new.description,
            new.category.as_str(),
            new.priority.as_str(),
            now,
        ],
    )?;
    Ok(())
}

/// Returns the row as inserted.
fn insert_attachment_row(conn: &Connection, new: &NewAttachment<'_>, created_at: &str) -> Result<AttachmentRow> {
    conn.execute(
        "INSERT INTO attachments
            (id, complaint_id, file_name, storage_key, file_size, mime_type, sha256, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            new.id,
            new.complaint_id,
            new.file_name,
            new.storage_key,
            new.file_size,
            new.mime_type,
            new.sha256,
            created_at,
        ],
    )?;

    Ok(AttachmentRow {
        id: new.id.to_string(),
        complaint_id: new.complaint_id.to_string(),
        file_name: new.file_name.to_string(),
        storage_key: new.storage_key.to_string(),
        file_size: new.file_size,
        mime_type: new.mime_type.to_string(),
        sha256: new.sha256.to_string(),
        created_at: created_at.to_string(),
    })
}

fn query_complaint(conn: &Connection, predicate: &str, value: &str) -> Result<Option<ComplaintRow>> {
    let sql = format!("SELECT {COMPLAINT_COLUMNS} FROM complaints c WHERE {predicate}");
    Ok(conn.query_row(&sql, [value], map_complaint).optional()?)
}

/// Priority and status sort by their lifecycle rank rather than alphabetically.
fn sort_expression(field: SortField) -> &'static str {
    match field {
        SortField::CreatedAt => "c.created_at",
        SortField::UpdatedAt => "c.updated_at",
        SortField::Title => "c.title",
        SortField::Category => "c.category",
        SortField::Priority => {
            "CASE c.priority WHEN 'LOW' THEN 0 WHEN 'MEDIUM' THEN 1 WHEN 'HIGH' THEN 2 ELSE 3 END"
        }
        SortField::Status => {
            "CASE c.status WHEN 'NEW' THEN 0 WHEN 'RECEIVED' THEN 1 WHEN 'IN_PROGRESS' THEN 2
                 WHEN 'RESOLVED' THEN 3 ELSE 4 END"
        }
    }
}

fn sort_direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

fn map_complaint(row: &Row<'_>) -> rusqlite::Result<ComplaintRow> {
    Ok(ComplaintRow {
        id: row.get(0)?,
        tracking_code: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        priority: row.get(5)?,
        status: row.get(6)?,
        attachment_count: row.get::<_, i64>(7)?.max(0) as u32,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn map_attachment(row: &Row<'_>) -> rusqlite::Result<AttachmentRow> {
    Ok(AttachmentRow {
        id: row.get(0)?,
        complaint_id: row.get(1)?,
        file_name: row.get(2)?,
        storage_key: row.get(3)?,
        file_size: row.get(4)?,
        mime_type: row.get(5)?,
        sha256: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        role: row.get(3)?,
        is_active: row.get(4)?,
        last_login_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}
