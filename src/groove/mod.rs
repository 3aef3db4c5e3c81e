// Groove analysis - tempo, rhythm extraction and library matching

pub mod matcher;
pub mod rhythm;
pub mod tempo;

pub use matcher::{pattern_similarity, rank_matches, GrooveMatch, RhythmHistogram, SLOTS_PER_BAR};
pub use rhythm::{analyze_rhythm, detect_tempo, place_onsets, RhythmError, RhythmPattern};
pub use tempo::{estimate_tempo, extract_tempo, tempo_from_filename, TempoConfig, TempoEstimate, TempoSource};
