//! Notification inbox service — thin validation layer over
//! `db::notifications`, mirroring `services/notification_service.py`.

use crate::db::models::Notification;
use crate::db::Db;
use crate::error::{VigilError, VigilResult};

const MAX_LIMIT: i64 = 200;
const DEFAULT_LIMIT: i64 = 50;

pub async fn list(
    db: &Db,
    project_id: &str,
    unread_only: bool,
    limit: Option<i64>,
    offset: Option<i64>,
) -> VigilResult<Vec<Notification>> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(VigilError::Validation(format!("limit must be between 1 and {MAX_LIMIT}")));
    }
    let offset = offset.unwrap_or(0).max(0);
    db.list_notifications(project_id, unread_only, limit, offset).await
}

pub async fn unread_count(db: &Db, project_id: &str) -> VigilResult<i64> {
    db.unread_count(project_id).await
}

pub async fn mark_read(db: &Db, project_id: &str, id: &str) -> VigilResult<()> {
    if db.mark_read(project_id, id).await? {
        Ok(())
    } else {
        Err(VigilError::not_found("notification", id.to_string()))
    }
}

pub async fn mark_all_read(db: &Db, project_id: &str) -> VigilResult<()> {
    db.mark_all_read(project_id).await
}
