use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::models::Notification;
use super::Db;
use crate::error::VigilResult;

fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        kind: row.get("type")?,
        title: row.get("title")?,
        body: row.get("body")?,
        reference_id: row.get("reference_id")?,
        read: row.get::<_, i64>("read")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl Db {
    pub async fn create_notification(
        &self,
        project_id: String,
        kind: String,
        title: String,
        body: String,
        reference_id: Option<String>,
    ) -> VigilResult<Notification> {
        self.run("create notification", move |conn| {
            let now = Utc::now();
            let n = Notification {
                id: Uuid::new_v4().to_string(),
                project_id,
                kind,
                title,
                body,
                reference_id,
                read: false,
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO notifications (id, project_id, type, title, body, reference_id, read, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![n.id, n.project_id, n.kind, n.title, n.body, n.reference_id, n.read as i64, n.created_at, n.updated_at],
            )?;
            Ok(n)
        })
        .await
    }

    pub async fn list_notifications(
        &self,
        project_id: &str,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> VigilResult<Vec<Notification>> {
        let project_id = project_id.to_string();
        self.run("list notifications", move |conn| {
            let sql = if unread_only {
                "SELECT id, project_id, type, title, body, reference_id, read, created_at, updated_at
                 FROM notifications WHERE project_id = ?1 AND read = 0
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
            } else {
                "SELECT id, project_id, type, title, body, reference_id, read, created_at, updated_at
                 FROM notifications WHERE project_id = ?1
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params![project_id, limit, offset], row_to_notification)?;
            rows.collect()
        })
        .await
    }

    pub async fn unread_count(&self, project_id: &str) -> VigilResult<i64> {
        let project_id = project_id.to_string();
        self.run("count unread notifications", move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE project_id = ?1 AND read = 0",
                params![project_id],
                |r| r.get(0),
            )
        })
        .await
    }

    /// Monotone: marking an already-read notification read again is a no-op,
    /// but still requires the notification to exist so the caller can 404.
    pub async fn mark_read(&self, project_id: &str, id: &str) -> VigilResult<bool> {
        let project_id = project_id.to_string();
        let id = id.to_string();
        self.run("mark notification read", move |conn| {
            let updated = conn.execute(
                "UPDATE notifications SET read = 1, updated_at = ?1 WHERE id = ?2 AND project_id = ?3 AND read = 0",
                params![Utc::now(), id, project_id],
            )?;
            if updated > 0 {
                return Ok(true);
            }
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM notifications WHERE id = ?1 AND project_id = ?2)",
                params![id, project_id],
                |r| r.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    pub async fn mark_all_read(&self, project_id: &str) -> VigilResult<()> {
        let project_id = project_id.to_string();
        self.run("mark all notifications read", move |conn| {
            conn.execute(
                "UPDATE notifications SET read = 1, updated_at = ?1 WHERE project_id = ?2 AND read = 0",
                params![Utc::now(), project_id],
            )?;
            Ok(())
        })
        .await
    }
}
