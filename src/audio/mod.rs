// Audio processing module
// WAV ingestion and onset detection for rhythm analysis

pub mod ingest;
pub mod onsets;

pub use ingest::{ingest_wav, ingest_wav_file, AudioData, AudioError};
pub use onsets::{detect_onsets, onsets_to_beats, Onset, OnsetConfig};
