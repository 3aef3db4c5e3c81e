// Groove matching - compares detected rhythm against every library pattern
// Both sides are folded onto one bar and quantized into 16 slots

use serde::{Deserialize, Serialize};

use super::rhythm::RhythmPattern;
use crate::library::{Pattern, PatternId, PatternStore};

/// Histogram slots per bar
pub const SLOTS_PER_BAR: usize = 16;

/// Weight of cosine similarity in the final score (position agreement gets the rest)
const COSINE_WEIGHT: f64 = 0.6;

/// Hit counts per slot of one folded bar
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RhythmHistogram {
    pub slots: [f64; SLOTS_PER_BAR],
}

impl RhythmHistogram {
    /// Fold beat times onto one bar and count hits per slot
    pub fn fold(times_beats: impl IntoIterator<Item = f64>, bar_beats: f64) -> Self {
        let mut histogram = RhythmHistogram::default();
        if bar_beats <= 0.0 {
            return histogram;
        }

        for t in times_beats {
            let position = t.rem_euclid(bar_beats);
            let slot = ((position / bar_beats) * SLOTS_PER_BAR as f64).floor() as usize;
            histogram.slots[slot.min(SLOTS_PER_BAR - 1)] += 1.0;
        }
        histogram
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|v| *v == 0.0)
    }

    /// Scaled so the fullest slot is 1.0
    pub fn normalized(&self) -> Self {
        let max = self.slots.iter().copied().fold(0.0, f64::max);
        if max <= 0.0 {
            return *self;
        }
        let mut slots = self.slots;
        for v in &mut slots {
            *v /= max;
        }
        RhythmHistogram { slots }
    }

    fn hit(&self, slot: usize) -> bool {
        self.slots[slot] > 0.0
    }

    /// Hit at the slot or an immediate neighbour within the bar
    fn hit_near(&self, slot: usize) -> bool {
        self.hit(slot)
            || (slot > 0 && self.hit(slot - 1))
            || (slot + 1 < SLOTS_PER_BAR && self.hit(slot + 1))
    }
}

pub fn cosine_similarity(a: &RhythmHistogram, b: &RhythmHistogram) -> f64 {
    let dot: f64 = a.slots.iter().zip(&b.slots).map(|(x, y)| x * y).sum();
    let norm_a = a.slots.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.slots.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Share of occupied slots where the other side hits the same or an adjacent slot
pub fn position_score(a: &RhythmHistogram, b: &RhythmHistogram) -> f64 {
    let mut occupied = 0;
    let mut matched = 0;

    for slot in 0..SLOTS_PER_BAR {
        let (in_a, in_b) = (a.hit(slot), b.hit(slot));
        if !in_a && !in_b {
            continue;
        }
        occupied += 1;
        if (in_a && b.hit_near(slot)) || (in_b && a.hit_near(slot)) {
            matched += 1;
        }
    }

    if occupied == 0 {
        return 0.0;
    }
    matched as f64 / occupied as f64
}

/// Match score 0-100 between detected onsets and a pattern's note-starts
///
/// No onsets, or a pattern without note-starts, scores 0.
pub fn pattern_similarity(onset_beats: &[f64], pattern: &Pattern, bar_beats: f64) -> f64 {
    if onset_beats.is_empty() || pattern.note_on_count() == 0 {
        return 0.0;
    }

    let detected = RhythmHistogram::fold(onset_beats.iter().copied(), bar_beats).normalized();
    let reference = RhythmHistogram::fold(
        pattern
            .events
            .iter()
            .filter(|e| e.event.is_note_on())
            .map(|e| e.time_beats),
        bar_beats,
    )
    .normalized();

    let cosine = cosine_similarity(&detected, &reference);
    let positions = position_score(&detected, &reference);
    100.0 * (COSINE_WEIGHT * cosine + (1.0 - COSINE_WEIGHT) * positions)
}

/// One ranked library match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrooveMatch {
    pub pattern: PatternId,
    pub category_name: String,
    pub pattern_name: String,

    /// Similarity 0-100
    pub match_score: f64,

    /// Detected bpm minus the pattern's own tempo (0 when the pattern has none)
    pub bpm_delta: f64,
}

/// Score every library pattern against a rhythm, best first
///
/// Patterns that fail to load are skipped.
pub fn rank_matches(rhythm: &RhythmPattern, store: &PatternStore, max_count: usize) -> Vec<GrooveMatch> {
    let bar_beats = rhythm.bar_beats();
    let mut matches: Vec<GrooveMatch> = Vec::new();

    for id in store.catalog().ids() {
        let Some(info) = store.catalog().info(id) else {
            continue;
        };
        let pattern = match store.load(id) {
            Ok(pattern) => pattern,
            Err(e) => {
                log::debug!("Skipping '{}/{}' in matching: {}", info.category, info.name, e);
                continue;
            }
        };

        matches.push(GrooveMatch {
            pattern: id,
            category_name: info.category.clone(),
            pattern_name: info.name.clone(),
            match_score: pattern_similarity(&rhythm.onset_beats, &pattern, bar_beats),
            bpm_delta: pattern.tempo_bpm.map_or(0.0, |tempo| rhythm.bpm - tempo),
        });
    }

    // Stable: equal scores keep catalog order
    matches.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
    matches.truncate(max_count);
    matches
}
