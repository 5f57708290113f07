//! Transcript data model.
//!
//! A [`Transcript`] is the durable record of what was said and when: an
//! ordered list of time-coded [`TranscriptSegment`]s plus the chapter-style
//! [`KeyMoment`]s derived from them. The serialized JSON shape of
//! [`StoredTranscript`] is the wire contract between the processing
//! pipeline and the downstream artifact generators, and must round-trip
//! losslessly.

mod align;

pub use align::align_key_moments;

use serde::{Deserialize, Serialize};

/// A single segment of recognized speech with timestamps in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Transcribed text content.
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A labeled anchor point into the transcript timeline ("chapter marker").
///
/// The timestamp always equals the formatted `start` of some segment in the
/// same transcript, except for the diagnostic moment carried by a
/// placeholder transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMoment {
    pub label: String,
    pub timestamp_start: String,
}

/// An unanchored chapter suggestion from the text-generation service,
/// prior to alignment. Transient; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedMoment {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub starting_phrase: String,
}

/// A complete transcript for one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Segments ordered by non-decreasing start time.
    pub segments: Vec<TranscriptSegment>,
    /// Key moments ordered by timestamp, no duplicates.
    pub key_moments: Vec<KeyMoment>,
}

impl Transcript {
    pub fn new(segments: Vec<TranscriptSegment>, key_moments: Vec<KeyMoment>) -> Self {
        Self {
            segments,
            key_moments,
        }
    }

    /// Placeholder transcript recorded for failed pipeline runs, carrying a
    /// single diagnostic key moment so the UI has something to render.
    pub fn placeholder(label: impl Into<String>) -> Self {
        Self {
            segments: Vec::new(),
            key_moments: vec![KeyMoment {
                label: label.into(),
                timestamp_start: format_timestamp(0.0),
            }],
        }
    }

    /// Full transcript text, concatenated from segments.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Duration estimate: end of the last segment.
    pub fn duration_seconds(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }
}

/// Durable JSON form of a segment, with formatted timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSegment {
    pub timestamp_start: String,
    pub timestamp_end: String,
    pub text: String,
}

/// Durable JSON form of a [`Transcript`]:
/// `{"key_moments": [...], "segments": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTranscript {
    pub key_moments: Vec<KeyMoment>,
    pub segments: Vec<StoredSegment>,
}

impl StoredTranscript {
    /// Full transcript text reassembled from stored segments.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<&Transcript> for StoredTranscript {
    fn from(t: &Transcript) -> Self {
        Self {
            key_moments: t.key_moments.clone(),
            segments: t
                .segments
                .iter()
                .map(|s| StoredSegment {
                    timestamp_start: format_timestamp(s.start),
                    timestamp_end: format_timestamp(s.end),
                    text: s.text.trim().to_string(),
                })
                .collect(),
        }
    }
}

/// Format a seconds offset as a fixed-width `HH:MM:SS.mmm` string.
///
/// Milliseconds are truncated, not rounded. Hours are unbounded (a value
/// past 100 hours simply widens the field). Negative or non-finite input
/// clamps to zero.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };

    let total_millis = (seconds * 1000.0) as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00.000");
        assert_eq!(format_timestamp(3725.4), "01:02:05.400");
        assert_eq!(format_timestamp(59.999), "00:00:59.999");
    }

    #[test]
    fn test_format_timestamp_large_hours() {
        assert_eq!(format_timestamp(360_000.0), "100:00:00.000");
    }

    #[test]
    fn test_format_timestamp_clamps_bad_input() {
        assert_eq!(format_timestamp(-3.2), "00:00:00.000");
        assert_eq!(format_timestamp(f64::NAN), "00:00:00.000");
        assert_eq!(format_timestamp(f64::INFINITY), "00:00:00.000");
    }

    #[test]
    fn test_full_text() {
        let transcript = Transcript::new(
            vec![
                TranscriptSegment::new(0.0, 5.0, "Hello world"),
                TranscriptSegment::new(5.0, 10.0, "This is a test"),
            ],
            Vec::new(),
        );
        assert_eq!(transcript.full_text(), "Hello world This is a test");
        assert_eq!(transcript.duration_seconds(), 10.0);
    }

    #[test]
    fn test_placeholder_shape() {
        let transcript = Transcript::placeholder("Processing error");
        assert!(transcript.segments.is_empty());
        assert_eq!(transcript.key_moments.len(), 1);
        assert_eq!(transcript.key_moments[0].label, "Processing error");
        assert_eq!(transcript.key_moments[0].timestamp_start, "00:00:00.000");
    }

    #[test]
    fn test_stored_transcript_round_trip() {
        let transcript = Transcript::new(
            vec![
                TranscriptSegment::new(0.0, 4.5, "Welcome to the show"),
                TranscriptSegment::new(4.5, 9.25, "Today we cover alignment"),
            ],
            vec![KeyMoment {
                label: "Intro".to_string(),
                timestamp_start: "00:00:00.000".to_string(),
            }],
        );

        let stored = StoredTranscript::from(&transcript);
        let json = serde_json::to_string(&stored).unwrap();
        let parsed: StoredTranscript = serde_json::from_str(&json).unwrap();

        assert_eq!(stored, parsed);
        assert_eq!(parsed.segments[0].timestamp_start, "00:00:00.000");
        assert_eq!(parsed.segments[1].timestamp_end, "00:00:09.250");
        assert_eq!(
            parsed.full_text(),
            "Welcome to the show Today we cover alignment"
        );
    }

    #[test]
    fn test_stored_transcript_wire_shape() {
        let stored = StoredTranscript {
            key_moments: vec![KeyMoment {
                label: "Intro".to_string(),
                timestamp_start: "00:00:00.000".to_string(),
            }],
            segments: vec![StoredSegment {
                timestamp_start: "00:00:00.000".to_string(),
                timestamp_end: "00:00:05.000".to_string(),
                text: "Hello".to_string(),
            }],
        };

        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["key_moments"][0]["label"], "Intro");
        assert_eq!(value["key_moments"][0]["timestamp_start"], "00:00:00.000");
        assert_eq!(value["segments"][0]["timestamp_end"], "00:00:05.000");
    }
}
