use serde::{Deserialize, Serialize};

/// Roughly ten characters of narration per second of speech.
pub const CHARS_PER_SECOND: f64 = 10.0;

/// No narration beat is shorter than this, so every beat has time to show media.
pub const MIN_SEGMENT_SECONDS: f64 = 3.0;

pub const MAX_KEYWORDS: usize = 5;

pub const DEFAULT_VISUAL_INTENT: &str = "nature landscape";

/// Articles, conjunctions and common prepositions.
pub const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "nor", "yet", "so", "in", "on", "at", "to", "for",
    "of", "with", "by", "from", "into", "onto", "upon", "over", "under", "above", "below",
    "about", "after", "before", "through", "across", "around", "between", "during", "without",
    "within", "toward", "towards", "against", "along", "behind", "beyond", "near", "because",
    "while", "although", "though", "unless",
];

// Ordered: the first rule with any matching trigger wins.
const VISUAL_INTENT_RULES: &[(&[&str], &str)] = &[
    (&["sunset", "sun"], "sunset landscape"),
    (&["ocean", "sea", "wave"], "ocean waves"),
    (&["mountain"], "mountain landscape"),
    (&["bird", "fly"], "birds flying"),
    (&["night", "dark"], "night sky"),
    (&["city", "urban"], "city skyline"),
    (&["forest", "tree"], "forest nature"),
    (&["car", "road"], "road driving"),
];

/// One sentence-level narration beat of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSegment {
    pub id: String,
    pub text: String,
    /// Estimated spoken duration in seconds.
    pub duration: f64,
    pub keywords: Vec<String>,
    pub visual_intent: String,
}

impl ScriptSegment {
    /// Free-text stock media query: the visual intent followed by the keywords.
    pub fn search_query(&self) -> String {
        let mut query = self.visual_intent.clone();
        for keyword in &self.keywords {
            query.push(' ');
            query.push_str(keyword);
        }
        query
    }
}

/// Split a script into ordered narration segments.
///
/// Sentences end at runs of `.`, `!` or `?`. Blank fragments are dropped, so an
/// empty or whitespace-only script yields no segments.
pub fn segment_script(script: &str) -> Vec<ScriptSegment> {
    script
        .split(|c| matches!(c, '.' | '!' | '?'))
        .filter(|fragment| !fragment.trim().is_empty())
        .enumerate()
        .map(|(index, fragment)| ScriptSegment {
            id: format!("segment-{}", index),
            text: fragment.trim().to_string(),
            duration: estimate_duration(fragment),
            keywords: extract_keywords(fragment),
            visual_intent: visual_intent(fragment).to_string(),
        })
        .collect()
}

/// Spoken duration estimate for a raw sentence fragment.
pub fn estimate_duration(fragment: &str) -> f64 {
    let chars = fragment.chars().count() as f64;
    (chars / CHARS_PER_SECOND).max(MIN_SEGMENT_SECONDS)
}

/// The first five lowercase, purely alphabetic, non-stopword tokens longer
/// than three characters, in their original order.
pub fn extract_keywords(fragment: &str) -> Vec<String> {
    fragment
        .to_lowercase()
        .split_whitespace()
        .filter(|word| {
            word.chars().count() > 3
                && word.chars().all(|c| c.is_ascii_alphabetic())
                && !STOPWORDS.contains(word)
        })
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

pub fn visual_intent(fragment: &str) -> &'static str {
    let lower = fragment.to_lowercase();
    VISUAL_INTENT_RULES
        .iter()
        .find(|(triggers, _)| triggers.iter().any(|trigger| lower.contains(trigger)))
        .map(|(_, label)| *label)
        .unwrap_or(DEFAULT_VISUAL_INTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_sunset_script_into_two_beats() {
        let segments = segment_script("A beautiful sunset over the ocean. Birds fly overhead.");

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].id, "segment-0");
        assert_eq!(segments[0].text, "A beautiful sunset over the ocean");
        assert_eq!(segments[0].keywords, vec!["beautiful", "sunset", "ocean"]);
        assert_eq!(segments[0].visual_intent, "sunset landscape");
        assert_eq!(segments[1].text, "Birds fly overhead");
        assert_eq!(segments[1].visual_intent, "birds flying");
    }

    #[test]
    fn blank_scripts_yield_no_segments() {
        assert!(segment_script("").is_empty());
        assert!(segment_script("   \n\t ").is_empty());
        assert!(segment_script("...!?").is_empty());
    }

    #[test]
    fn repeated_terminators_do_not_create_empty_beats() {
        let segments = segment_script("Wait... What?! Really!!!");
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Wait", "What", "Really"]);
    }

    #[test]
    fn trailing_text_without_terminator_is_kept() {
        let segments = segment_script("First line. second line without a stop");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].text, "second line without a stop");
    }

    #[test]
    fn duration_has_a_three_second_floor() {
        assert_eq!(estimate_duration("Hi"), 3.0);
        let long = "x".repeat(95);
        assert!((estimate_duration(&long) - 9.5).abs() < 1e-9);

        for segment in segment_script("Go. Stop. A much longer sentence that takes a while to say out loud.") {
            assert!(segment.duration >= MIN_SEGMENT_SECONDS);
        }
    }

    #[test]
    fn keywords_are_capped_and_skip_stopwords() {
        let keywords = extract_keywords(
            "with without these mountains rivers valleys forests deserts glaciers",
        );
        assert_eq!(keywords.len(), MAX_KEYWORDS);
        assert_eq!(keywords, vec!["these", "mountains", "rivers", "valleys", "forests"]);
        for keyword in &keywords {
            assert!(!STOPWORDS.contains(&keyword.as_str()));
        }
    }

    #[test]
    fn keywords_reject_punctuated_and_short_tokens() {
        let keywords = extract_keywords("The car's engine roared, loudly into 2024 night");
        assert_eq!(keywords, vec!["engine", "loudly", "night"]);
    }

    #[test]
    fn visual_intent_first_rule_wins() {
        assert_eq!(visual_intent("The sea at sunset"), "sunset landscape");
        assert_eq!(visual_intent("Waves crash"), "ocean waves");
        assert_eq!(visual_intent("A dark alley"), "night sky");
        assert_eq!(visual_intent("Urban sprawl"), "city skyline");
        assert_eq!(visual_intent("Trees sway"), "forest nature");
        assert_eq!(visual_intent("Open road"), "road driving");
        assert_eq!(visual_intent("Nothing in particular"), DEFAULT_VISUAL_INTENT);
    }

    #[test]
    fn search_query_joins_intent_and_keywords() {
        let segment = ScriptSegment {
            id: "segment-0".to_string(),
            text: "City lights glow".to_string(),
            duration: 3.0,
            keywords: vec!["city".to_string(), "lights".to_string()],
            visual_intent: "city skyline".to_string(),
        };
        assert_eq!(segment.search_query(), "city skyline city lights");
    }
}
