use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub mod captions;
pub mod segments;
pub mod videos;

pub use captions::Caption;
pub use segments::VideoSegmentRecord;
pub use videos::{NewVideo, Video, VideoStatus};

pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Cascades from projects to videos to captions/segments rely on this.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection mutex poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                script TEXT,
                medium TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS videos (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                filename TEXT NOT NULL,
                original_url TEXT NOT NULL DEFAULT '',
                processed_url TEXT NOT NULL DEFAULT '',
                duration REAL,
                size INTEGER,
                format TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS captions (
                id TEXT PRIMARY KEY,
                video_id TEXT NOT NULL,
                text TEXT NOT NULL,
                start_time REAL NOT NULL,
                end_time REAL NOT NULL,
                language TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (video_id) REFERENCES videos(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_captions_video_start
             ON captions(video_id, start_time)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS video_segments (
                id TEXT PRIMARY KEY,
                video_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL,
                thumbnail TEXT,
                start_time REAL NOT NULL,
                end_time REAL NOT NULL,
                duration REAL NOT NULL,
                keywords_json TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                FOREIGN KEY (video_id) REFERENCES videos(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_video_segments_video_start
             ON video_segments(video_id, start_time)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pipeline_runs (
                id TEXT PRIMARY KEY,
                video_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (video_id) REFERENCES videos(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // At most one running pipeline per video.
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_pipeline_runs_active
             ON pipeline_runs(video_id) WHERE status = 'running'",
            [],
        )?;

        Ok(())
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(idx, "TEXT".to_string(), rusqlite::types::Type::Text)
        })
}

/// Trimmed value, or `None` when nothing is left after trimming.
pub(crate) fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub script: Option<String>,
    pub medium: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Project {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            script: row.get(4)?,
            medium: row.get(5)?,
            created_at: parse_timestamp(row, 6)?,
            updated_at: parse_timestamp(row, 7)?,
        })
    }
}

const PROJECT_COLUMNS: &str =
    "id, owner_id, name, description, script, medium, created_at, updated_at";

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub script: Option<String>,
    pub medium: Option<String>,
}

/// Partial update; `None` leaves a field untouched. Blank optional fields are
/// cleared, a blank name is ignored.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub script: Option<String>,
    pub medium: Option<String>,
}

impl Database {
    pub fn create_project(&self, owner_id: &str, project: &NewProject) -> Result<Project> {
        let id = new_id();
        let now = now_rfc3339();
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO projects (id, owner_id, name, description, script, medium, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id,
                    owner_id,
                    project.name.trim(),
                    project.description.as_deref().and_then(non_blank),
                    project.script.as_deref().and_then(non_blank),
                    project.medium.as_deref().and_then(non_blank),
                    now
                ],
            )?;
        }
        self.get_project(owner_id, &id)?
            .ok_or_else(|| anyhow!("Project {} vanished after insert", id))
    }

    pub fn get_project(&self, owner_id: &str, id: &str) -> Result<Option<Project>> {
        let conn = self.conn()?;
        let project = conn
            .query_row(
                &format!(
                    "SELECT {} FROM projects WHERE id = ?1 AND owner_id = ?2",
                    PROJECT_COLUMNS
                ),
                params![id, owner_id],
                Project::from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM projects WHERE owner_id = ?1 ORDER BY created_at DESC",
            PROJECT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner_id], Project::from_row)?;

        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    /// Returns `false` when the project does not exist for this owner.
    pub fn update_project(&self, owner_id: &str, id: &str, update: &ProjectUpdate) -> Result<bool> {
        let Some(current) = self.get_project(owner_id, id)? else {
            return Ok(false);
        };

        let name = update
            .name
            .as_deref()
            .and_then(non_blank)
            .unwrap_or(current.name);
        let description = match &update.description {
            Some(value) => non_blank(value),
            None => current.description,
        };
        let script = match &update.script {
            Some(value) => non_blank(value),
            None => current.script,
        };
        let medium = match &update.medium {
            Some(value) => non_blank(value),
            None => current.medium,
        };

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE projects SET name = ?1, description = ?2, script = ?3, medium = ?4, updated_at = ?5
             WHERE id = ?6 AND owner_id = ?7",
            params![name, description, script, medium, now_rfc3339(), id, owner_id],
        )?;
        Ok(changed > 0)
    }

    /// Deletes the project and, through cascades, its videos, captions and segments.
    pub fn delete_project(&self, owner_id: &str, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM projects WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;
        Ok(changed > 0)
    }
}
