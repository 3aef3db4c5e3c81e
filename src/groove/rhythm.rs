// Rhythm analysis - tempo plus onset positions in beats for one audio clip

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tempo::{extract_tempo, TempoConfig, TempoEstimate, TempoSource};
use crate::audio::onsets::{detect_onsets, onsets_to_beats, Onset, OnsetConfig};

#[derive(Debug, Error)]
pub enum RhythmError {
    #[error("No tempo could be determined")]
    NoTempo,

    #[error("No onsets detected")]
    NoOnsets,
}

/// Meter assumed for analysed audio
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

/// Result of one analysis run, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmPattern {
    pub bpm: f64,

    /// Confidence in the tempo [0.0, 1.0]
    pub confidence: f32,

    /// Up to three ranked tempo candidates
    pub candidates: Vec<f64>,

    pub tempo_source: TempoSource,

    /// Onset times in beats, ascending
    pub onset_beats: Vec<f64>,

    pub beats_per_bar: u32,

    /// Clip length in beats
    pub length_beats: f64,
}

impl RhythmPattern {
    /// Combine a tempo estimate and detected onsets
    pub fn assemble(
        tempo: TempoEstimate,
        onsets: &[Onset],
        duration_secs: f64,
    ) -> Result<Self, RhythmError> {
        if onsets.is_empty() {
            return Err(RhythmError::NoOnsets);
        }

        Ok(RhythmPattern {
            onset_beats: onsets_to_beats(onsets, tempo.bpm),
            length_beats: duration_secs * tempo.bpm / 60.0,
            bpm: tempo.bpm,
            confidence: tempo.confidence,
            candidates: tempo.candidates,
            tempo_source: tempo.source,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
        })
    }

    /// Rhythm from known parts, mostly for matching against hand-made input
    pub fn from_parts(bpm: f64, onset_beats: Vec<f64>) -> Self {
        let length_beats = onset_beats.iter().copied().fold(0.0, f64::max);
        RhythmPattern {
            bpm,
            confidence: 1.0,
            candidates: vec![bpm],
            tempo_source: TempoSource::Filename,
            onset_beats,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
            length_beats,
        }
    }

    pub fn bar_beats(&self) -> f64 {
        self.beats_per_bar.max(1) as f64
    }
}

/// Tempo stage: the filename hint if it names a tempo, otherwise the estimator
pub fn detect_tempo(
    samples: &[f32],
    sample_rate: u32,
    filename_hint: Option<&str>,
    config: &TempoConfig,
) -> Result<TempoEstimate, RhythmError> {
    extract_tempo(samples, sample_rate, filename_hint, config).ok_or(RhythmError::NoTempo)
}

/// Onset stage: detect attacks and place them on the beat grid of `tempo`
pub fn place_onsets(
    tempo: TempoEstimate,
    samples: &[f32],
    sample_rate: u32,
    config: &OnsetConfig,
) -> Result<RhythmPattern, RhythmError> {
    let onsets = detect_onsets(samples, sample_rate, config);
    let duration_secs = if sample_rate > 0 {
        samples.len() as f64 / sample_rate as f64
    } else {
        0.0
    };
    RhythmPattern::assemble(tempo, &onsets, duration_secs)
}

/// Full rhythm analysis of a mono buffer
pub fn analyze_rhythm(
    samples: &[f32],
    sample_rate: u32,
    filename_hint: Option<&str>,
    tempo_config: &TempoConfig,
    onset_config: &OnsetConfig,
) -> Result<RhythmPattern, RhythmError> {
    let tempo = detect_tempo(samples, sample_rate, filename_hint, tempo_config)?;
    place_onsets(tempo, samples, sample_rate, onset_config)
}
