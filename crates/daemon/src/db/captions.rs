use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{new_id, now_rfc3339, parse_timestamp, Database, VideoStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Caption {
    pub id: String,
    pub video_id: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl Caption {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Caption {
            id: row.get(0)?,
            video_id: row.get(1)?,
            text: row.get(2)?,
            start_time: row.get(3)?,
            end_time: row.get(4)?,
            language: row.get(5)?,
            created_at: parse_timestamp(row, 6)?,
        })
    }
}

const CAPTION_COLUMNS: &str = "c.id, c.video_id, c.text, c.start_time, c.end_time, c.language, c.created_at";

#[derive(Debug, Clone, PartialEq)]
pub struct NewCaption {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

impl Database {
    pub fn list_captions(&self, video_id: &str) -> Result<Vec<Caption>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM captions c WHERE c.video_id = ?1 ORDER BY c.start_time ASC",
            CAPTION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![video_id], Caption::from_row)?;

        let mut captions = Vec::new();
        for row in rows {
            captions.push(row?);
        }
        Ok(captions)
    }

    /// Caption lookup through the owning video's owner.
    pub fn get_caption(&self, owner_id: &str, caption_id: &str) -> Result<Option<Caption>> {
        let conn = self.conn()?;
        let caption = conn
            .query_row(
                &format!(
                    "SELECT {} FROM captions c JOIN videos v ON v.id = c.video_id
                     WHERE c.id = ?1 AND v.owner_id = ?2",
                    CAPTION_COLUMNS
                ),
                params![caption_id, owner_id],
                Caption::from_row,
            )
            .optional()?;
        Ok(caption)
    }

    pub fn update_caption(
        &self,
        caption_id: &str,
        text: &str,
        start_time: f64,
        end_time: f64,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE captions SET text = ?1, start_time = ?2, end_time = ?3 WHERE id = ?4",
            params![text, start_time, end_time, caption_id],
        )?;
        Ok(())
    }

    pub fn delete_caption(&self, owner_id: &str, caption_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM captions WHERE id = ?1
               AND video_id IN (SELECT id FROM videos WHERE owner_id = ?2)",
            params![caption_id, owner_id],
        )?;
        Ok(changed > 0)
    }

    /// Replaces every caption of the video and moves it `TRANSCRIBING -> READY`
    /// in one transaction. Any failure rolls back to the previous caption set.
    pub fn complete_transcription(
        &self,
        video_id: &str,
        language: &str,
        captions: &[NewCaption],
        duration: Option<f64>,
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();

        tx.execute("DELETE FROM captions WHERE video_id = ?1", params![video_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO captions (id, video_id, text, start_time, end_time, language, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for caption in captions {
                insert.execute(params![
                    new_id(),
                    video_id,
                    caption.text,
                    caption.start_time,
                    caption.end_time,
                    language,
                    now
                ])?;
            }
        }

        let changed = tx.execute(
            "UPDATE videos SET status = ?1, duration = COALESCE(?2, duration), updated_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                VideoStatus::Ready.as_str(),
                duration,
                now,
                video_id,
                VideoStatus::Transcribing.as_str()
            ],
        )?;
        if changed == 0 {
            // Dropping the transaction rolls the caption swap back.
            return Err(anyhow!("Video {} is no longer transcribing", video_id));
        }

        tx.commit()?;
        Ok(captions.len())
    }
}
