use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::models::User;
use super::Db;
use crate::error::{VigilError, VigilResult};

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        hashed_password: row.get("hashed_password")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl Db {
    pub async fn create_user(&self, email: String, hashed_password: String) -> VigilResult<User> {
        let email = email.to_lowercase();
        self.run("create user", move |conn| {
            let now = Utc::now();
            let user = User {
                id: Uuid::new_v4().to_string(),
                email,
                hashed_password,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO users (id, email, hashed_password, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![user.id, user.email, user.hashed_password, user.is_active as i64, user.created_at, user.updated_at],
            )?;
            Ok(user)
        })
        .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> VigilResult<Option<User>> {
        let email = email.to_lowercase();
        self.run("get user by email", move |conn| {
            conn.query_row(
                "SELECT id, email, hashed_password, is_active, created_at, updated_at FROM users WHERE email = ?1",
                params![email],
                row_to_user,
            )
            .optional()
        })
        .await
    }

    pub async fn get_user(&self, id: &str) -> VigilResult<User> {
        let id = id.to_string();
        let lookup_id = id.clone();
        let user = self
            .run("get user", move |conn| {
                conn.query_row(
                    "SELECT id, email, hashed_password, is_active, created_at, updated_at FROM users WHERE id = ?1",
                    params![lookup_id],
                    row_to_user,
                )
                .optional()
            })
            .await?;
        user.ok_or_else(|| VigilError::not_found("user", id))
    }
}
