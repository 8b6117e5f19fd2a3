use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, Row};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::videos::{advance_status, insert_video};
use crate::db::{new_id, now_rfc3339, parse_timestamp, Database, NewVideo, VideoStatus};

pub mod generate;
pub mod transcribe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Generate,
    Transcribe,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Generate => "generate",
            PipelineKind::Transcribe => "transcribe",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "generate" => Some(PipelineKind::Generate),
            "transcribe" => Some(PipelineKind::Transcribe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// One execution of a pipeline against one video.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: String,
    pub video_id: String,
    pub kind: PipelineKind,
    pub status: RunStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind_str: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let kind = PipelineKind::parse(&kind_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(2, "TEXT".to_string(), rusqlite::types::Type::Text)
        })?;
        let status = RunStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(3, "TEXT".to_string(), rusqlite::types::Type::Text)
        })?;

        Ok(PipelineRun {
            id: row.get(0)?,
            video_id: row.get(1)?,
            kind,
            status,
            error: row.get(4)?,
            created_at: parse_timestamp(row, 5)?,
            updated_at: parse_timestamp(row, 6)?,
        })
    }
}

const RUN_COLUMNS: &str = "id, video_id, kind, status, error, created_at, updated_at";

/// Failures inside a background pipeline. Never reach the HTTP caller; they
/// only show up as an `ERROR` video and a failed run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A third-party provider was unreachable, timed out, or answered garbage.
    #[error("provider error: {0:#}")]
    Provider(anyhow::Error),

    #[error("pipeline failed: {0:#}")]
    Fatal(#[from] anyhow::Error),
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn insert_run(conn: &rusqlite::Connection, video_id: &str, kind: PipelineKind) -> rusqlite::Result<String> {
    let id = new_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO pipeline_runs (id, video_id, kind, status, error, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)",
        params![id, video_id, kind.as_str(), RunStatus::Running.as_str(), now],
    )?;
    Ok(id)
}

/// Bookkeeping for pipeline runs and the background tasks executing them.
///
/// Every `start_*` call moves the video into its in-flight status and opens a
/// `running` row in one transaction. The partial unique index on running rows
/// keeps it to one active run per video; a start that would violate it, or
/// that finds the video in the wrong status, changes nothing and returns
/// `None`.
pub struct RunManager {
    db: Arc<Database>,
}

impl RunManager {
    pub fn new(db: Arc<Database>) -> Self {
        RunManager { db }
    }

    /// Creates a `PROCESSING` video for a script together with its run.
    pub fn start_generation(&self, owner_id: &str, video: &NewVideo) -> Result<PipelineRun> {
        let run_id = {
            let mut conn = self.db.conn()?;
            let tx = conn.transaction()?;
            let video_id = insert_video(&tx, owner_id, video)?;
            let run_id = insert_run(&tx, &video_id, PipelineKind::Generate)?;
            tx.commit()?;
            run_id
        };
        self.get_run(&run_id)?
            .ok_or_else(|| anyhow!("Run {} vanished after insert", run_id))
    }

    /// Re-enters `PROCESSING` from `READY` or `ERROR` with a new script. Only
    /// videos that came out of a generation run qualify; uploads keep their
    /// file and captions.
    pub fn restart_generation(
        &self,
        owner_id: &str,
        video_id: &str,
        description: &str,
    ) -> Result<Option<PipelineRun>> {
        let run_id = {
            let mut conn = self.db.conn()?;
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE videos SET status = ?1, description = ?2, updated_at = ?3
                 WHERE id = ?4 AND owner_id = ?5 AND status IN (?6, ?7)
                   AND EXISTS (SELECT 1 FROM pipeline_runs r WHERE r.video_id = videos.id AND r.kind = ?8)",
                params![
                    VideoStatus::Processing.as_str(),
                    description,
                    now_rfc3339(),
                    video_id,
                    owner_id,
                    VideoStatus::Ready.as_str(),
                    VideoStatus::Error.as_str(),
                    PipelineKind::Generate.as_str()
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            match insert_run(&tx, video_id, PipelineKind::Generate) {
                Ok(run_id) => {
                    tx.commit()?;
                    run_id
                }
                Err(e) if is_constraint_violation(&e) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };
        self.get_run(&run_id)
    }

    /// Moves an `UPLOADING`/`PROCESSING` video to `TRANSCRIBING` with a run.
    pub fn start_transcription(&self, video_id: &str) -> Result<Option<PipelineRun>> {
        let run_id = {
            let mut conn = self.db.conn()?;
            let tx = conn.transaction()?;
            if !advance_status(&tx, video_id, VideoStatus::Transcribing)? {
                return Ok(None);
            }
            match insert_run(&tx, video_id, PipelineKind::Transcribe) {
                Ok(run_id) => {
                    tx.commit()?;
                    run_id
                }
                Err(e) if is_constraint_violation(&e) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        };
        self.get_run(&run_id)
    }

    /// Whether the video was produced by a generation run rather than uploaded.
    pub fn is_generated(&self, video_id: &str) -> Result<bool> {
        let conn = self.db.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pipeline_runs WHERE video_id = ?1 AND kind = ?2",
            params![video_id, PipelineKind::Generate.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<PipelineRun>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pipeline_runs WHERE id = ?1",
            RUN_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![run_id], PipelineRun::from_row)?;

        match rows.next() {
            Some(Ok(run)) => Ok(Some(run)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Newest first.
    pub fn list_runs(&self, video_id: &str) -> Result<Vec<PipelineRun>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pipeline_runs WHERE video_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![video_id], PipelineRun::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    pub fn finish_run(&self, run_id: &str) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "UPDATE pipeline_runs SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                RunStatus::Completed.as_str(),
                now_rfc3339(),
                run_id,
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(())
    }

    /// Records the failure and moves an in-flight video to `ERROR`.
    pub fn fail_run(&self, run_id: &str, video_id: &str, reason: &str) -> Result<()> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        tx.execute(
            "UPDATE pipeline_runs SET status = ?1, error = ?2, updated_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                RunStatus::Failed.as_str(),
                reason,
                now,
                run_id,
                RunStatus::Running.as_str()
            ],
        )?;
        // Terminal videos keep their status; a late failure only closes the run.
        advance_status(&tx, video_id, VideoStatus::Error)?;
        tx.commit()?;
        Ok(())
    }

    /// Fails every run a previous process left `running`. Returns how many.
    pub fn recover_interrupted_runs(&self) -> Result<usize> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        tx.execute(
            "UPDATE videos SET status = ?1, updated_at = ?2
             WHERE status IN (?3, ?4)
               AND id IN (SELECT video_id FROM pipeline_runs WHERE status = ?5)",
            params![
                VideoStatus::Error.as_str(),
                now,
                VideoStatus::Processing.as_str(),
                VideoStatus::Transcribing.as_str(),
                RunStatus::Running.as_str()
            ],
        )?;
        let recovered = tx.execute(
            "UPDATE pipeline_runs SET status = ?1, error = 'interrupted by restart', updated_at = ?2
             WHERE status = ?3",
            params![RunStatus::Failed.as_str(), now, RunStatus::Running.as_str()],
        )?;
        tx.commit()?;
        Ok(recovered)
    }

    /// Runs `pipeline` in the background under a supervisor that owns its
    /// handle. An error or a panic fails the run and marks the video `ERROR`.
    pub fn spawn<F>(self: &Arc<Self>, run: PipelineRun, pipeline: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match tokio::spawn(pipeline).await {
                Ok(result) => result,
                Err(join_error) => Err(PipelineError::Fatal(anyhow!(
                    "pipeline task aborted: {}",
                    join_error
                ))),
            };

            match outcome {
                Ok(()) => {
                    if let Err(e) = manager.finish_run(&run.id) {
                        warn!(run_id = %run.id, error = %e, "failed to close pipeline run");
                    }
                    info!(video_id = %run.video_id, run_id = %run.id, kind = run.kind.as_str(), "pipeline run completed");
                }
                Err(e) => {
                    error!(video_id = %run.video_id, run_id = %run.id, kind = run.kind.as_str(), error = %e, "pipeline run failed");
                    if let Err(db_err) = manager.fail_run(&run.id, &run.video_id, &e.to_string()) {
                        error!(run_id = %run.id, error = %db_err, "failed to record pipeline failure");
                    }
                }
            }
        })
    }
}
