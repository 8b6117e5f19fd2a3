use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::config::{Config, TranscriptionBackend};

pub mod fixture;
pub mod whisper;

pub use fixture::FixtureTranscriber;
pub use whisper::WhisperTranscriber;

/// Hint value meaning "let the provider detect the language".
pub const AUTO_DETECT: &str = "auto";
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

pub const SUPPORTED_LANGUAGES: &[Language] = &[
    Language { code: "en", name: "English" },
    Language { code: "es", name: "Spanish" },
    Language { code: "fr", name: "French" },
    Language { code: "de", name: "German" },
    Language { code: "it", name: "Italian" },
    Language { code: "pt", name: "Portuguese" },
    Language { code: "ru", name: "Russian" },
    Language { code: "ja", name: "Japanese" },
    Language { code: "ko", name: "Korean" },
    Language { code: "zh", name: "Chinese" },
    Language { code: "ar", name: "Arabic" },
    Language { code: "hi", name: "Hindi" },
    Language { code: "nl", name: "Dutch" },
    Language { code: "sv", name: "Swedish" },
    Language { code: "no", name: "Norwegian" },
    Language { code: "da", name: "Danish" },
    Language { code: "fi", name: "Finnish" },
    Language { code: "pl", name: "Polish" },
    Language { code: "tr", name: "Turkish" },
    Language { code: "he", name: "Hebrew" },
    Language { code: "th", name: "Thai" },
    Language { code: "vi", name: "Vietnamese" },
    Language { code: "id", name: "Indonesian" },
    Language { code: "ms", name: "Malay" },
    Language { code: AUTO_DETECT, name: "Auto-detect" },
];

pub fn is_supported_language(code: &str) -> bool {
    SUPPORTED_LANGUAGES.iter().any(|language| language.code == code)
}

/// Normalizes a provider-reported language ("english", "EN") to its code.
/// Unknown values pass through lowercased.
pub fn language_code(reported: &str) -> String {
    let reported = reported.trim();
    SUPPORTED_LANGUAGES
        .iter()
        .filter(|language| language.code != AUTO_DETECT)
        .find(|language| {
            language.code.eq_ignore_ascii_case(reported)
                || language.name.eq_ignore_ascii_case(reported)
        })
        .map(|language| language.code.to_string())
        .unwrap_or_else(|| reported.to_lowercase())
}

/// Language hint to forward to a provider; `None` means auto-detect.
pub fn provider_hint(language: Option<&str>) -> Option<&str> {
    language
        .map(str::trim)
        .filter(|code| !code.is_empty() && *code != AUTO_DETECT)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
}

impl TranscriptionResult {
    /// Rejects results with inverted or non-finite spans, or starts that go
    /// backwards.
    pub fn validate(&self) -> Result<()> {
        let mut previous_start = f64::NEG_INFINITY;
        for (index, segment) in self.segments.iter().enumerate() {
            if !segment.start.is_finite() || !segment.end.is_finite() {
                bail!("segment {} has a non-finite timestamp", index);
            }
            if segment.start < 0.0 || segment.start >= segment.end {
                bail!(
                    "segment {} has an invalid span {}..{}",
                    index,
                    segment.start,
                    segment.end
                );
            }
            if segment.start < previous_start {
                bail!("segment {} starts before segment {}", index, index - 1);
            }
            previous_start = segment.start;
        }
        Ok(())
    }

    /// End of the last segment, if any.
    pub fn duration(&self) -> Option<f64> {
        self.segments.last().map(|segment| segment.end)
    }
}

/// Speech-to-text capability.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &'static str;

    /// `media_url` is either an `/uploads/...` path or an absolute URL.
    async fn transcribe(&self, media_url: &str, language: Option<&str>) -> Result<TranscriptionResult>;
}

pub fn from_config(config: &Config) -> Result<Arc<dyn Transcriber>> {
    let transcriber: Arc<dyn Transcriber> = match config.transcription_backend {
        TranscriptionBackend::Fixture => Arc::new(FixtureTranscriber::sample()),
        TranscriptionBackend::Whisper => {
            if config.openai_api_key.is_none() {
                warn!("OPENAI_API_KEY not configured, transcription runs will fail");
            }
            Arc::new(WhisperTranscriber::new(
                config.openai_api_key.clone(),
                config.upload_dir.clone(),
                config.transcription_timeout,
            )?)
        }
    };
    Ok(transcriber)
}
