use std::sync::Arc;
use tracing::info;

use crate::db::captions::NewCaption;
use crate::db::Database;
use crate::jobs::PipelineError;
use crate::transcription::Transcriber;

/// Transcribes a `TRANSCRIBING` video and swaps in the resulting captions.
pub async fn run_transcription(
    db: Arc<Database>,
    transcriber: Arc<dyn Transcriber>,
    video_id: String,
    run_id: String,
    media_url: String,
    language: Option<String>,
) -> Result<(), PipelineError> {
    info!(
        video_id = %video_id,
        run_id = %run_id,
        provider = transcriber.name(),
        language = language.as_deref().unwrap_or("auto"),
        "requesting transcription"
    );

    let result = transcriber
        .transcribe(&media_url, language.as_deref())
        .await
        .map_err(PipelineError::Provider)?;
    result.validate().map_err(PipelineError::Provider)?;

    let captions: Vec<NewCaption> = result
        .segments
        .iter()
        .map(|segment| NewCaption {
            text: segment.text.trim().to_string(),
            start_time: segment.start,
            end_time: segment.end,
        })
        .collect();

    let stored = db.complete_transcription(&video_id, &result.language, &captions, result.duration())?;
    info!(
        video_id = %video_id,
        run_id = %run_id,
        captions = stored,
        language = %result.language,
        "transcription complete"
    );
    Ok(())
}
