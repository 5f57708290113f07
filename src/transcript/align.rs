//! Key-moment alignment.
//!
//! Maps chapter proposals from the text-generation service onto concrete
//! segment start times. Proposals arrive as (label, starting phrase) pairs
//! and may be noisy: hallucinated phrases that never occur, duplicate
//! phrases, blank entries, or out-of-order lists. Alignment degrades to a
//! partial or empty result rather than erroring.

use super::{format_timestamp, KeyMoment, ProposedMoment, TranscriptSegment};
use tracing::debug;

/// Sentinel "before time zero": every valid segment start is forward of it.
const BEFORE_TIME_ZERO: f64 = -1.0;

/// Align proposed moments to segment start times.
///
/// Each proposal is matched by scanning for the earliest segment, strictly
/// after the previously accepted moment, whose text contains the proposal's
/// starting phrase (case-insensitive substring). The forward-only cursor
/// keeps moments spread across the timeline: a phrase repeated early and
/// late cannot collapse two chapters onto its first occurrence. Proposals
/// with blank fields, no forward match, or a timestamp already taken are
/// dropped silently.
///
/// The output is sorted by timestamp and deduplicated as a final guard, so
/// the ordering invariant holds even if the proposal list was badly out of
/// order. This is a pure function: identical inputs yield identical output.
pub fn align_key_moments(
    segments: &[TranscriptSegment],
    proposed: &[ProposedMoment],
) -> Vec<KeyMoment> {
    let mut moments: Vec<KeyMoment> = Vec::new();
    let mut last_accepted_start = BEFORE_TIME_ZERO;

    for proposal in proposed {
        let label = proposal.label.trim();
        let phrase = proposal.starting_phrase.trim();
        if label.is_empty() || phrase.is_empty() {
            debug!("Skipping proposal with blank label or phrase");
            continue;
        }

        let phrase_lower = phrase.to_lowercase();
        let mut best_start: Option<f64> = None;

        for segment in segments {
            if segment.start <= last_accepted_start {
                continue;
            }
            if !segment.text.to_lowercase().contains(&phrase_lower) {
                continue;
            }
            // Earliest forward occurrence wins, regardless of scan order.
            if best_start.is_some_and(|best| segment.start >= best) {
                continue;
            }
            let timestamp = format_timestamp(segment.start);
            if moments.iter().any(|m| m.timestamp_start == timestamp) {
                continue;
            }
            best_start = Some(segment.start);
        }

        match best_start {
            Some(start) => {
                moments.push(KeyMoment {
                    label: label.to_string(),
                    timestamp_start: format_timestamp(start),
                });
                last_accepted_start = start;
            }
            None => {
                debug!(label, phrase, "No forward match for proposal, dropping");
            }
        }
    }

    // The forward cursor already yields monotonic output; re-sort and dedupe
    // anyway so the invariant survives any upstream ordering surprise.
    moments.sort_by(|a, b| a.timestamp_start.cmp(&b.timestamp_start));

    let mut unique: Vec<KeyMoment> = Vec::with_capacity(moments.len());
    for moment in moments {
        if !unique
            .iter()
            .any(|m| m.timestamp_start == moment.timestamp_start)
        {
            unique.push(moment);
        }
    }

    unique
}
