use anyhow::{anyhow, bail, Context, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{
    language_code, provider_hint, TranscriptSegment, TranscriptionResult, Transcriber,
    DEFAULT_LANGUAGE,
};

const OPENAI_TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const WHISPER_MODEL: &str = "whisper-1";
const UPLOADS_PREFIX: &str = "/uploads/";

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    language: Option<String>,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    text: String,
    avg_logprob: Option<f64>,
}

impl VerboseTranscription {
    fn into_result(self, hint: Option<&str>) -> TranscriptionResult {
        let language = self
            .language
            .as_deref()
            .filter(|reported| !reported.trim().is_empty())
            .map(language_code)
            .or_else(|| hint.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        TranscriptionResult {
            text: self.text,
            language,
            segments: self
                .segments
                .into_iter()
                .map(|segment| TranscriptSegment {
                    start: segment.start,
                    end: segment.end,
                    text: segment.text.trim().to_string(),
                    confidence: segment.avg_logprob,
                })
                .collect(),
        }
    }
}

/// OpenAI Whisper over the `audio/transcriptions` endpoint.
pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_key: Option<String>,
    upload_dir: PathBuf,
}

impl WhisperTranscriber {
    pub fn new(api_key: Option<String>, upload_dir: PathBuf, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build transcription HTTP client")?;
        Ok(WhisperTranscriber {
            client,
            api_key,
            upload_dir,
        })
    }

    /// Reads uploaded files from disk and downloads anything else.
    async fn load_media(&self, media_url: &str) -> Result<(String, Vec<u8>)> {
        if let Some(name) = media_url.strip_prefix(UPLOADS_PREFIX) {
            let path = upload_path(&self.upload_dir, name)?;
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read uploaded media {:?}", path))?;
            return Ok((name.to_string(), bytes));
        }

        if !(media_url.starts_with("http://") || media_url.starts_with("https://")) {
            bail!("Unsupported media location '{}'", media_url);
        }

        let response = self
            .client
            .get(media_url)
            .send()
            .await
            .context("Failed to download media for transcription")?;
        if !response.status().is_success() {
            bail!("Media download failed: {}", response.status());
        }
        let bytes = response.bytes().await?;
        let name = media_url
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("media.mp4")
            .to_string();
        Ok((name, bytes.to_vec()))
    }
}

/// Resolves a file name under the upload directory, refusing traversal.
pub(crate) fn upload_path(upload_dir: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        bail!("Invalid upload name '{}'", name);
    }
    Ok(upload_dir.join(name))
}

#[async_trait::async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &'static str {
        "whisper"
    }

    async fn transcribe(&self, media_url: &str, language: Option<&str>) -> Result<TranscriptionResult> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY not set"))?;
        let hint = provider_hint(language);

        let (file_name, bytes) = self.load_media(media_url).await?;
        let file = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;

        let mut form = Form::new()
            .text("model", WHISPER_MODEL)
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .part("file", file);
        if let Some(code) = hint {
            form = form.text("language", code.to_string());
        }

        let response = self
            .client
            .post(OPENAI_TRANSCRIPTIONS_URL)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .context("Transcription request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            bail!("Whisper API error: {} - {}", status, error_text);
        }

        let body: VerboseTranscription = response
            .json()
            .await
            .context("Failed to parse transcription response")?;
        Ok(body.into_result(hint))
    }
}
