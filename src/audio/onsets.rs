// Onset detection - RMS energy envelope with adaptive attack thresholding
// Only rising energy counts; a minimum gap suppresses double hits on one transient

use serde::{Deserialize, Serialize};

/// Detected attack in the signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Onset {
    /// Seconds from the start of the clip
    pub time_secs: f64,
}

/// Configuration for onset detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// RMS window in samples
    pub window_size: usize,

    /// Advance between windows in samples
    pub hop_size: usize,

    /// Minimum time between accepted onsets
    pub min_onset_gap_ms: f64,

    /// Threshold factor applied to the mean attack
    pub mean_factor: f32,

    /// Threshold factor applied to the largest attack
    pub peak_factor: f32,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        OnsetConfig {
            window_size: 1024,
            hop_size: 512,
            min_onset_gap_ms: 80.0,
            mean_factor: 1.5,
            peak_factor: 0.1,
        }
    }
}

/// Short-time RMS energy, one value per full window
pub fn energy_envelope(samples: &[f32], window_size: usize, hop_size: usize) -> Vec<f32> {
    if window_size == 0 || hop_size == 0 || samples.len() < window_size {
        return Vec::new();
    }

    samples
        .windows(window_size)
        .step_by(hop_size)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|s| s * s).sum();
            (sum / window_size as f32).sqrt()
        })
        .collect()
}

/// Frame-to-frame energy rise, clamped at zero
pub fn attack_deltas(envelope: &[f32]) -> Vec<f32> {
    envelope
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).max(0.0))
        .collect()
}

/// Detect onsets in a mono buffer
pub fn detect_onsets(samples: &[f32], sample_rate: u32, config: &OnsetConfig) -> Vec<Onset> {
    if sample_rate == 0 {
        return Vec::new();
    }

    let envelope = energy_envelope(samples, config.window_size, config.hop_size);
    let deltas = attack_deltas(&envelope);
    if deltas.len() < 3 {
        return Vec::new();
    }

    let mean = deltas.iter().sum::<f32>() / deltas.len() as f32;
    let max = deltas.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = (config.mean_factor * mean).max(config.peak_factor * max);

    let hop_secs = config.hop_size as f64 / sample_rate as f64;
    let min_gap = config.min_onset_gap_ms / 1000.0;

    let mut onsets: Vec<Onset> = Vec::new();

    for i in 1..deltas.len() - 1 {
        let d = deltas[i];
        if d <= threshold || d < deltas[i - 1] || d < deltas[i + 1] {
            continue;
        }

        // Delta i is the rise into frame i + 1
        let time_secs = (i + 1) as f64 * hop_secs;
        if let Some(last) = onsets.last() {
            if time_secs - last.time_secs <= min_gap {
                continue;
            }
        }

        onsets.push(Onset { time_secs });
    }

    onsets
}

/// Onset times in beats at a given tempo
pub fn onsets_to_beats(onsets: &[Onset], bpm: f64) -> Vec<f64> {
    let beats_per_sec = bpm / 60.0;
    onsets.iter().map(|o| o.time_secs * beats_per_sec).collect()
}
