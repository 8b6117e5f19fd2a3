use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{new_id, non_blank, now_rfc3339, parse_timestamp, Database};

/// Lifecycle of a video record.
///
/// Generation moves `PROCESSING -> READY`, transcription moves
/// `UPLOADING|PROCESSING -> TRANSCRIBING -> READY`, and any in-flight state may
/// fall into `ERROR`. `READY` and `ERROR` end a run; only an explicit
/// regeneration leaves them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    Uploading,
    Processing,
    Transcribing,
    Ready,
    Error,
}

impl VideoStatus {
    pub const ALL: [VideoStatus; 5] = [
        VideoStatus::Uploading,
        VideoStatus::Processing,
        VideoStatus::Transcribing,
        VideoStatus::Ready,
        VideoStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploading => "UPLOADING",
            VideoStatus::Processing => "PROCESSING",
            VideoStatus::Transcribing => "TRANSCRIBING",
            VideoStatus::Ready => "READY",
            VideoStatus::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Ready | VideoStatus::Error)
    }

    /// Transitions allowed within a single pipeline run.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        use VideoStatus::*;
        matches!(
            (*self, next),
            (Uploading, Processing)
                | (Uploading, Transcribing)
                | (Uploading, Error)
                | (Processing, Transcribing)
                | (Processing, Ready)
                | (Processing, Error)
                | (Transcribing, Ready)
                | (Transcribing, Error)
        )
    }

    /// Transcription may only start from these states.
    pub fn accepts_transcription(&self) -> bool {
        self.can_transition_to(VideoStatus::Transcribing)
    }

    fn predecessors(next: VideoStatus) -> Vec<VideoStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| status.can_transition_to(next))
            .collect()
    }
}

fn status_from_row(row: &Row, idx: usize) -> rusqlite::Result<VideoStatus> {
    let value: String = row.get(idx)?;
    VideoStatus::parse(&value).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(idx, "TEXT".to_string(), rusqlite::types::Type::Text)
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub owner_id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub filename: String,
    pub original_url: String,
    pub processed_url: String,
    pub duration: Option<f64>,
    pub size: Option<i64>,
    pub format: Option<String>,
    pub status: VideoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Video {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            project_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            filename: row.get(5)?,
            original_url: row.get(6)?,
            processed_url: row.get(7)?,
            duration: row.get(8)?,
            size: row.get(9)?,
            format: row.get(10)?,
            status: status_from_row(row, 11)?,
            created_at: parse_timestamp(row, 12)?,
            updated_at: parse_timestamp(row, 13)?,
        })
    }
}

pub(crate) const VIDEO_COLUMNS: &str = "id, owner_id, project_id, title, description, filename, \
     original_url, processed_url, duration, size, format, status, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct NewVideo {
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub filename: String,
    pub original_url: String,
    pub size: Option<i64>,
    pub format: Option<String>,
    pub status: VideoStatus,
}

impl NewVideo {
    /// Tracking record for a script-driven generation run.
    pub fn generated(project_id: &str, script: &str) -> Self {
        let excerpt: String = script.chars().take(100).collect();
        NewVideo {
            project_id: project_id.to_string(),
            title: "AI Generated Video from Script".to_string(),
            description: Some(format!("Generated from script: \"{}...\"", excerpt)),
            filename: format!("ai_video_{}.mp4", Utc::now().timestamp_millis()),
            original_url: String::new(),
            size: None,
            format: Some("mp4".to_string()),
            status: VideoStatus::Processing,
        }
    }
}

/// Inserts a video row on an open connection or transaction and returns its id.
pub(crate) fn insert_video(conn: &Connection, owner_id: &str, video: &NewVideo) -> Result<String> {
    let id = new_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO videos (id, owner_id, project_id, title, description, filename,
            original_url, processed_url, size, format, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '', ?8, ?9, ?10, ?11, ?11)",
        params![
            id,
            owner_id,
            video.project_id,
            video.title,
            video.description,
            video.filename,
            video.original_url,
            video.size,
            video.format,
            video.status.as_str(),
            now
        ],
    )?;
    Ok(id)
}

/// Moves the video to `next` only if `VideoStatus::can_transition_to` allows it
/// from the current status. Runs on an open connection or transaction; returns
/// `false` when the transition was refused.
pub(crate) fn advance_status(conn: &Connection, id: &str, next: VideoStatus) -> Result<bool> {
    let predecessors = VideoStatus::predecessors(next);
    if predecessors.is_empty() {
        return Ok(false);
    }
    let placeholders = (0..predecessors.len())
        .map(|i| format!("?{}", i + 4))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE videos SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status IN ({})",
        placeholders
    );

    let mut values: Vec<String> = vec![next.as_str().to_string(), now_rfc3339(), id.to_string()];
    values.extend(predecessors.iter().map(|status| status.as_str().to_string()));

    let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(changed > 0)
}

impl Database {
    pub fn create_video(&self, owner_id: &str, video: &NewVideo) -> Result<Video> {
        let id = {
            let conn = self.conn()?;
            insert_video(&conn, owner_id, video)?
        };
        self.get_video_by_id(&id)?
            .ok_or_else(|| anyhow!("Video {} vanished after insert", id))
    }

    pub fn get_video(&self, owner_id: &str, id: &str) -> Result<Option<Video>> {
        let conn = self.conn()?;
        let video = conn
            .query_row(
                &format!(
                    "SELECT {} FROM videos WHERE id = ?1 AND owner_id = ?2",
                    VIDEO_COLUMNS
                ),
                params![id, owner_id],
                Video::from_row,
            )
            .optional()?;
        Ok(video)
    }

    /// Unscoped lookup for pipelines that already passed the ownership check.
    pub fn get_video_by_id(&self, id: &str) -> Result<Option<Video>> {
        let conn = self.conn()?;
        let video = conn
            .query_row(
                &format!("SELECT {} FROM videos WHERE id = ?1", VIDEO_COLUMNS),
                params![id],
                Video::from_row,
            )
            .optional()?;
        Ok(video)
    }

    pub fn list_videos(&self, owner_id: &str, project_id: Option<&str>) -> Result<Vec<Video>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM videos
             WHERE owner_id = ?1 AND (?2 IS NULL OR project_id = ?2)
             ORDER BY created_at DESC",
            VIDEO_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner_id, project_id], Video::from_row)?;

        let mut videos = Vec::new();
        for row in rows {
            videos.push(row?);
        }
        Ok(videos)
    }

    /// Owner edits; blank values leave the field unchanged.
    pub fn update_video_details(
        &self,
        owner_id: &str,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE videos SET title = COALESCE(?1, title), description = COALESCE(?2, description),
                updated_at = ?3
             WHERE id = ?4 AND owner_id = ?5",
            params![
                title.and_then(non_blank),
                description.and_then(non_blank),
                now_rfc3339(),
                id,
                owner_id
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_video(&self, owner_id: &str, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM videos WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;
        Ok(changed > 0)
    }

    /// Final step of a generation run: `PROCESSING -> READY` with artifacts.
    pub fn complete_generation(&self, id: &str, artifact_url: &str, duration: f64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE videos SET status = ?1, original_url = ?2, processed_url = ?2, duration = ?3,
                updated_at = ?4
             WHERE id = ?5 AND status = ?6",
            params![
                VideoStatus::Ready.as_str(),
                artifact_url,
                duration,
                now_rfc3339(),
                id,
                VideoStatus::Processing.as_str()
            ],
        )?;
        Ok(changed > 0)
    }
}
