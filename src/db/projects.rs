use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::models::{ApiKey, Project, ProjectSettings};
use super::Db;
use crate::error::{VigilError, VigilResult};

fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_key(row: &Row) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        key: row.get("key")?,
        name: row.get("name")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_settings(row: &Row) -> rusqlite::Result<ProjectSettings> {
    Ok(ProjectSettings {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        openai_api_key_encrypted: row.get("openai_api_key_encrypted")?,
        anthropic_api_key_encrypted: row.get("anthropic_api_key_encrypted")?,
        default_openai_model: row.get("default_openai_model")?,
        default_anthropic_model: row.get("default_anthropic_model")?,
        drift_check_interval_minutes: row.get("drift_check_interval_minutes")?,
        drift_check_enabled: row.get::<_, i64>("drift_check_enabled")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// `vgl_` + 32 bytes of URL-safe random, matching the original key format.
pub fn generate_api_key() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut rng = rand::thread_rng();
    let tail: String = (0..32)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("vgl_{tail}")
}

impl Db {
    pub async fn create_project(&self, name: String, description: String) -> VigilResult<(Project, ApiKey)> {
        self.run("create project", move |conn| {
            let now = Utc::now();
            let project = Project {
                id: Uuid::new_v4().to_string(),
                name,
                description,
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO projects (id, name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![project.id, project.name, project.description, project.created_at, project.updated_at],
            )?;
            let key = ApiKey {
                id: Uuid::new_v4().to_string(),
                project_id: project.id.clone(),
                key: generate_api_key(),
                name: "default".to_string(),
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO api_keys (id, project_id, key, name, is_active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![key.id, key.project_id, key.key, key.name, key.is_active as i64, key.created_at, key.updated_at],
            )?;
            Ok((project, key))
        })
        .await
    }

    pub async fn list_projects(&self) -> VigilResult<Vec<Project>> {
        self.run("list projects", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, created_at, updated_at FROM projects ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map([], row_to_project)?;
            rows.collect()
        })
        .await
    }

    pub async fn get_project(&self, id: &str) -> VigilResult<Project> {
        let id = id.to_string();
        let lookup_id = id.clone();
        let project = self
            .run("get project", move |conn| {
                conn.query_row(
                    "SELECT id, name, description, created_at, updated_at FROM projects WHERE id = ?1",
                    params![lookup_id],
                    row_to_project,
                )
                .optional()
            })
            .await?;
        project.ok_or_else(|| VigilError::not_found("project", id))
    }

    /// Resolve a bearer API key string to its owning project id, only if active.
    pub async fn resolve_api_key(&self, key: &str) -> VigilResult<Option<String>> {
        let key = key.to_string();
        self.run("resolve api key", move |conn| {
            conn.query_row(
                "SELECT project_id FROM api_keys WHERE key = ?1 AND is_active = 1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .await
    }

    pub async fn rotate_key(&self, project_id: &str) -> VigilResult<ApiKey> {
        // Ensure project exists first so rotation 404s cleanly.
        self.get_project(project_id).await?;
        let project_id = project_id.to_string();
        self.run("rotate api key", move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE api_keys SET is_active = 0, updated_at = ?1 WHERE project_id = ?2",
                params![Utc::now(), project_id],
            )?;
            let now = Utc::now();
            let key = ApiKey {
                id: Uuid::new_v4().to_string(),
                project_id: project_id.clone(),
                key: generate_api_key(),
                name: "default".to_string(),
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            tx.execute(
                "INSERT INTO api_keys (id, project_id, key, name, is_active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![key.id, key.project_id, key.key, key.name, key.is_active as i64, key.created_at, key.updated_at],
            )?;
            tx.commit()?;
            Ok(key)
        })
        .await
    }

    pub async fn get_or_create_settings(&self, project_id: &str) -> VigilResult<ProjectSettings> {
        self.get_project(project_id).await?;
        let project_id = project_id.to_string();
        self.run("get or create project settings", move |conn| {
            let existing = conn
                .query_row(
                    "SELECT id, project_id, openai_api_key_encrypted, anthropic_api_key_encrypted,
                            default_openai_model, default_anthropic_model,
                            drift_check_interval_minutes, drift_check_enabled, created_at, updated_at
                     FROM project_settings WHERE project_id = ?1",
                    params![project_id],
                    row_to_settings,
                )
                .optional()?;
            if let Some(settings) = existing {
                return Ok(settings);
            }
            let now = Utc::now();
            let settings = ProjectSettings {
                id: Uuid::new_v4().to_string(),
                project_id: project_id.clone(),
                openai_api_key_encrypted: None,
                anthropic_api_key_encrypted: None,
                default_openai_model: "gpt-4o".to_string(),
                default_anthropic_model: "claude-sonnet-4-5-20250929".to_string(),
                drift_check_interval_minutes: 60,
                drift_check_enabled: false,
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO project_settings
                    (id, project_id, openai_api_key_encrypted, anthropic_api_key_encrypted,
                     default_openai_model, default_anthropic_model,
                     drift_check_interval_minutes, drift_check_enabled, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    settings.id,
                    settings.project_id,
                    settings.openai_api_key_encrypted,
                    settings.anthropic_api_key_encrypted,
                    settings.default_openai_model,
                    settings.default_anthropic_model,
                    settings.drift_check_interval_minutes,
                    settings.drift_check_enabled as i64,
                    settings.created_at,
                    settings.updated_at,
                ],
            )?;
            Ok(settings)
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_settings(
        &self,
        project_id: &str,
        openai_api_key_encrypted: Option<Option<String>>,
        anthropic_api_key_encrypted: Option<Option<String>>,
        default_openai_model: Option<String>,
        default_anthropic_model: Option<String>,
        drift_check_interval_minutes: Option<i64>,
        drift_check_enabled: Option<bool>,
    ) -> VigilResult<ProjectSettings> {
        let mut settings = self.get_or_create_settings(project_id).await?;
        if let Some(v) = openai_api_key_encrypted {
            settings.openai_api_key_encrypted = v;
        }
        if let Some(v) = anthropic_api_key_encrypted {
            settings.anthropic_api_key_encrypted = v;
        }
        if let Some(v) = default_openai_model {
            settings.default_openai_model = v;
        }
        if let Some(v) = default_anthropic_model {
            settings.default_anthropic_model = v;
        }
        if let Some(v) = drift_check_interval_minutes {
            settings.drift_check_interval_minutes = v.clamp(5, 1440);
        }
        if let Some(v) = drift_check_enabled {
            settings.drift_check_enabled = v;
        }
        settings.updated_at = Utc::now();

        let s = settings.clone();
        self.run("update project settings", move |conn| {
            conn.execute(
                "UPDATE project_settings SET
                    openai_api_key_encrypted = ?1,
                    anthropic_api_key_encrypted = ?2,
                    default_openai_model = ?3,
                    default_anthropic_model = ?4,
                    drift_check_interval_minutes = ?5,
                    drift_check_enabled = ?6,
                    updated_at = ?7
                 WHERE project_id = ?8",
                params![
                    s.openai_api_key_encrypted,
                    s.anthropic_api_key_encrypted,
                    s.default_openai_model,
                    s.default_anthropic_model,
                    s.drift_check_interval_minutes,
                    s.drift_check_enabled as i64,
                    s.updated_at,
                    s.project_id,
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(settings)
    }

    pub async fn list_enabled_drift_settings(&self) -> VigilResult<Vec<ProjectSettings>> {
        self.run("list drift-enabled settings", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, openai_api_key_encrypted, anthropic_api_key_encrypted,
                        default_openai_model, default_anthropic_model,
                        drift_check_interval_minutes, drift_check_enabled, created_at, updated_at
                 FROM project_settings WHERE drift_check_enabled = 1",
            )?;
            let rows = stmt.query_map([], row_to_settings)?;
            rows.collect()
        })
        .await
    }
}
