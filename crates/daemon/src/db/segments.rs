use anyhow::Result;
use engine::timeline::{MediaKind, TimelineEntry};
use rusqlite::{params, Row};
use serde::Serialize;

use super::{new_id, now_rfc3339, Database};

/// A persisted timeline entry of a generated video.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSegmentRecord {
    pub id: String,
    pub video_id: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub title: String,
    pub description: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub keywords: Vec<String>,
}

impl VideoSegmentRecord {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind_str: String = row.get(2)?;
        let kind = MediaKind::parse(&kind_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(2, "TEXT".to_string(), rusqlite::types::Type::Text)
        })?;
        let keywords_json: String = row.get(10)?;
        let keywords = serde_json::from_str(&keywords_json).map_err(|_| {
            rusqlite::Error::InvalidColumnType(10, "TEXT".to_string(), rusqlite::types::Type::Text)
        })?;

        Ok(VideoSegmentRecord {
            id: row.get(0)?,
            video_id: row.get(1)?,
            kind,
            title: row.get(3)?,
            description: row.get(4)?,
            url: row.get(5)?,
            thumbnail: row.get(6)?,
            start_time: row.get(7)?,
            end_time: row.get(8)?,
            duration: row.get(9)?,
            keywords,
        })
    }
}

impl Database {
    /// Swaps the whole timeline of a video in one transaction, so readers never
    /// see entries from two different runs.
    pub fn replace_video_segments(&self, video_id: &str, entries: &[TimelineEntry]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();

        tx.execute("DELETE FROM video_segments WHERE video_id = ?1", params![video_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO video_segments (id, video_id, kind, title, description, url, thumbnail,
                    start_time, end_time, duration, keywords_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for entry in entries {
                insert.execute(params![
                    new_id(),
                    video_id,
                    entry.kind.as_str(),
                    entry.title,
                    entry.description,
                    entry.url,
                    entry.thumbnail,
                    entry.start_time,
                    entry.end_time,
                    entry.duration,
                    serde_json::to_string(&entry.keywords)?,
                    now
                ])?;
            }
        }

        tx.commit()?;
        Ok(entries.len())
    }

    pub fn list_video_segments(&self, video_id: &str) -> Result<Vec<VideoSegmentRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, video_id, kind, title, description, url, thumbnail, start_time, end_time,
                duration, keywords_json
             FROM video_segments WHERE video_id = ?1 ORDER BY start_time ASC",
        )?;
        let rows = stmt.query_map(params![video_id], VideoSegmentRecord::from_row)?;

        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?);
        }
        Ok(segments)
    }
}
