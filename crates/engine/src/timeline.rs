use serde::{Deserialize, Serialize};

use crate::script::ScriptSegment;

pub const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "video" => Some(MediaKind::Video),
            "image" => Some(MediaKind::Image),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }
}

/// A stock media candidate chosen for one narration segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaClip {
    pub id: String,
    pub url: String,
    pub kind: MediaKind,
    /// Seconds this clip occupies on the timeline.
    pub duration: f64,
    pub keywords: Vec<String>,
    pub thumbnail: Option<String>,
    pub segment_id: String,
}

/// A positioned entry of an assembled timeline, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
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

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
    pub total_duration: f64,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Source URL of the first entry, standing in for a composed artifact.
    pub fn representative_url(&self) -> Option<&str> {
        self.entries.first().map(|entry| entry.url.as_str())
    }
}

/// Lay clips end to end starting at zero, in the order given.
///
/// `narration` supplies titles and descriptions; a clip whose segment is not
/// found gets a `Segment N` title and an empty description.
pub fn assemble(clips: &[MediaClip], narration: &[ScriptSegment]) -> Timeline {
    let mut cursor = 0.0;
    let mut entries = Vec::with_capacity(clips.len());

    for (index, clip) in clips.iter().enumerate() {
        let text = narration
            .iter()
            .find(|segment| segment.id == clip.segment_id)
            .map(|segment| segment.text.as_str())
            .filter(|text| !text.is_empty());

        let start_time = cursor;
        let end_time = start_time + clip.duration;
        cursor = end_time;

        entries.push(TimelineEntry {
            kind: clip.kind,
            title: text
                .map(|text| text.chars().take(TITLE_MAX_CHARS).collect())
                .unwrap_or_else(|| format!("Segment {}", index + 1)),
            description: text.unwrap_or_default().to_string(),
            url: clip.url.clone(),
            thumbnail: clip.thumbnail.clone(),
            start_time,
            end_time,
            duration: clip.duration,
            keywords: clip.keywords.clone(),
        });
    }

    Timeline {
        entries,
        total_duration: cursor,
    }
}
