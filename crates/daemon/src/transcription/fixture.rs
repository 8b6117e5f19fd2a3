use anyhow::Result;

use super::{provider_hint, TranscriptSegment, TranscriptionResult, Transcriber, DEFAULT_LANGUAGE};

/// Deterministic transcriber that returns the same segments for every input.
#[derive(Debug, Clone)]
pub struct FixtureTranscriber {
    segments: Vec<TranscriptSegment>,
}

impl FixtureTranscriber {
    pub fn new(segments: Vec<TranscriptSegment>) -> Self {
        FixtureTranscriber { segments }
    }

    /// Three sentences spanning twelve seconds.
    pub fn sample() -> Self {
        let lines = [
            (0.0, 3.5, "Welcome to the project overview."),
            (3.5, 7.2, "Here is what we built this week."),
            (7.2, 12.0, "Thanks for watching."),
        ];
        Self::new(
            lines
                .iter()
                .map(|&(start, end, text)| TranscriptSegment {
                    start,
                    end,
                    text: text.to_string(),
                    confidence: Some(-0.2),
                })
                .collect(),
        )
    }
}

#[async_trait::async_trait]
impl Transcriber for FixtureTranscriber {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn transcribe(&self, _media_url: &str, language: Option<&str>) -> Result<TranscriptionResult> {
        let text = self
            .segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(TranscriptionResult {
            text,
            language: provider_hint(language).unwrap_or(DEFAULT_LANGUAGE).to_string(),
            segments: self.segments.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sample_covers_twelve_seconds() {
        let result = FixtureTranscriber::sample()
            .transcribe("/uploads/video_1.mp4", Some("auto"))
            .await
            .unwrap();

        assert_eq!(result.segments.len(), 3);
        assert_eq!(result.duration(), Some(12.0));
        assert_eq!(result.language, "en");
        assert!(result.validate().is_ok());
    }

    #[tokio::test]
    async fn language_hint_is_echoed() {
        let result = FixtureTranscriber::sample()
            .transcribe("https://cdn.example/a.mp4", Some("es"))
            .await
            .unwrap();
        assert_eq!(result.language, "es");
    }
}
