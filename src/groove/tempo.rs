// Tempo Estimation - BPM from filename hints or onset-strength autocorrelation
// The autocorrelation runs through realfft and is weighted by a tempo prior

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

use crate::audio::onsets::{attack_deltas, energy_envelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoSource {
    Filename,
    Estimated,
}

/// Tempo estimation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Estimated beats per minute
    pub bpm: f64,

    /// Confidence in the estimate [0.0, 1.0]
    /// Lower when several candidates are comparably strong
    pub confidence: f32,

    /// Ranked tempo candidates, strongest first (the estimate itself included)
    pub candidates: Vec<f64>,

    pub source: TempoSource,
}

/// Configuration for tempo estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Slowest tempo the estimator considers
    pub min_bpm: f64,

    /// Fastest tempo the estimator considers
    pub max_bpm: f64,

    /// Energy window for the onset-strength signal, in samples
    pub window_size: usize,

    /// Hop for the onset-strength signal, in samples
    pub hop_size: usize,

    /// Centre of the log-tempo prior
    pub prior_bpm: f64,

    /// Width of the log-tempo prior in octaves
    pub prior_octaves: f64,

    pub max_candidates: usize,
}

impl Default for TempoConfig {
    fn default() -> Self {
        TempoConfig {
            min_bpm: 55.0,
            max_bpm: 190.0,
            window_size: 256,
            hop_size: 128,
            prior_bpm: 120.0,
            prior_octaves: 1.4,
            max_candidates: 3,
        }
    }
}

/// Explicit tempo range for a number next to "bpm"
const TAGGED_RANGE: (f64, f64) = (40.0, 250.0);

/// Narrower range for a bare number, a weaker signal
const BARE_RANGE: (f64, f64) = (60.0, 200.0);

/// Candidates closer than this ratio are treated as the same tempo
const CANDIDATE_TOLERANCE: f64 = 0.03;

/// Tempo from a filename such as `groove_120bpm.wav` or `bpm140_loop.wav`
pub fn tempo_from_filename(name: &str) -> Option<f64> {
    let lower = name.to_lowercase();
    let stem = match lower.rfind('.') {
        Some(dot) if dot > 0 => &lower[..dot],
        _ => lower.as_str(),
    };
    let text: String = stem
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();

    let in_range = |bpm: f64, (lo, hi): (f64, f64)| bpm >= lo && bpm <= hi;

    if let Some(marker) = text.find("bpm") {
        let before = text[..marker].trim_end();
        let digits = before.len() - before.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        if let Ok(bpm) = before[before.len() - digits..].parse::<f64>() {
            if in_range(bpm, TAGGED_RANGE) {
                return Some(bpm);
            }
        }

        let after = text[marker + 3..].trim_start();
        let digits = after.len() - after.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if let Ok(bpm) = after[..digits].parse::<f64>() {
            if in_range(bpm, TAGGED_RANGE) {
                return Some(bpm);
            }
        }
    }

    text.split_whitespace()
        .filter(|token| token.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|token| token.parse::<f64>().ok())
        .find(|bpm| in_range(*bpm, BARE_RANGE))
}

/// Estimate tempo from the signal alone
///
/// Algorithm:
/// 1. Onset strength = rising energy per hop, mean removed
/// 2. Autocorrelation through a zero-padded real FFT
/// 3. Weight lags in the tempo range by a log-Gaussian tempo prior
/// 4. Pick local maxima, refine with parabolic interpolation
/// 5. Confidence falls as the runner-up approaches the winner
pub fn estimate_tempo(samples: &[f32], sample_rate: u32, config: &TempoConfig) -> Option<TempoEstimate> {
    if sample_rate == 0 || config.hop_size == 0 || config.min_bpm <= 0.0 || config.max_bpm <= config.min_bpm {
        return None;
    }

    let envelope = energy_envelope(samples, config.window_size, config.hop_size);
    let strength = attack_deltas(&envelope);
    if strength.len() < 3 {
        return None;
    }

    let mean = strength.iter().sum::<f32>() / strength.len() as f32;
    let centered: Vec<f32> = strength.iter().map(|s| s - mean).collect();
    let acf = autocorrelate(&centered)?;
    if acf[0] <= 0.0 {
        return None;
    }

    let frame_rate = sample_rate as f64 / config.hop_size as f64;
    let lag_for = |bpm: f64| 60.0 * frame_rate / bpm;
    let min_lag = (lag_for(config.max_bpm).floor() as usize).max(1);
    let max_lag = (lag_for(config.min_bpm).ceil() as usize).min(centered.len().saturating_sub(2));
    if max_lag < min_lag + 2 {
        return None;
    }

    let scored: Vec<f64> = (min_lag..=max_lag)
        .map(|lag| acf[lag] as f64 * tempo_prior(60.0 * frame_rate / lag as f64, config))
        .collect();

    let mut peaks: Vec<(f64, f64)> = Vec::new();
    for i in 1..scored.len() - 1 {
        let (a, b, c) = (scored[i - 1], scored[i], scored[i + 1]);
        if b <= 0.0 || b <= a || b < c {
            continue;
        }
        let curvature = a - 2.0 * b + c;
        let offset = if curvature < 0.0 { 0.5 * (a - c) / curvature } else { 0.0 };
        let lag = (min_lag + i) as f64 + offset.clamp(-0.5, 0.5);
        peaks.push((60.0 * frame_rate / lag, b));
    }

    peaks.sort_by(|x, y| y.1.total_cmp(&x.1));

    let mut candidates: Vec<(f64, f64)> = Vec::new();
    for (bpm, score) in peaks {
        let duplicate = candidates
            .iter()
            .any(|(kept, _)| (bpm - kept).abs() / kept < CANDIDATE_TOLERANCE);
        if !duplicate {
            candidates.push((bpm, score));
        }
        if candidates.len() >= config.max_candidates.max(1) {
            break;
        }
    }

    let (bpm, best) = *candidates.first()?;
    let confidence = match candidates.get(1) {
        None => 0.9,
        Some((_, runner_up)) => (0.9 - 0.3 * (runner_up / best)).clamp(0.5, 0.9),
    };

    Some(TempoEstimate {
        bpm,
        confidence: confidence as f32,
        candidates: candidates.into_iter().map(|(bpm, _)| bpm).collect(),
        source: TempoSource::Estimated,
    })
}

/// Tempo from the filename hint when present, otherwise from the signal
pub fn extract_tempo(
    samples: &[f32],
    sample_rate: u32,
    filename_hint: Option<&str>,
    config: &TempoConfig,
) -> Option<TempoEstimate> {
    if let Some(bpm) = filename_hint.and_then(tempo_from_filename) {
        log::debug!("Tempo {} bpm taken from filename", bpm);
        return Some(TempoEstimate {
            bpm,
            confidence: 1.0,
            candidates: vec![bpm],
            source: TempoSource::Filename,
        });
    }

    estimate_tempo(samples, sample_rate, config)
}

/// Log-Gaussian weight favouring tempos near the prior centre
fn tempo_prior(bpm: f64, config: &TempoConfig) -> f64 {
    let octaves = (bpm / config.prior_bpm).log2() / config.prior_octaves.max(f64::EPSILON);
    (-0.5 * octaves * octaves).exp()
}

/// Linear (non-circular) autocorrelation via FFT
fn autocorrelate(signal: &[f32]) -> Option<Vec<f32>> {
    let n = (signal.len() * 2).next_power_of_two();

    let mut planner = RealFftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut input = vec![0.0f32; n];
    input[..signal.len()].copy_from_slice(signal);

    let mut spectrum = forward.make_output_vec();
    forward.process(&mut input, &mut spectrum).ok()?;

    for bin in spectrum.iter_mut() {
        *bin = Complex::new(bin.norm_sqr(), 0.0);
    }

    let mut output = inverse.make_output_vec();
    inverse.process(&mut spectrum, &mut output).ok()?;

    let scale = 1.0 / n as f32;
    Some(output.into_iter().map(|v| v * scale).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::onsets::tests::click_track;

    #[test]
    fn test_filename_tagged_tempo() {
        assert_eq!(tempo_from_filename("groove_120bpm.wav"), Some(120.0));
        assert_eq!(tempo_from_filename("beat 85 bpm.mp3"), Some(85.0));
        assert_eq!(tempo_from_filename("bpm140_loop.wav"), Some(140.0));
        assert_eq!(tempo_from_filename("Funk-96-BPM.wav"), Some(96.0));
    }

    #[test]
    fn test_filename_without_tempo() {
        assert_eq!(tempo_from_filename("track7.wav"), None);
        assert_eq!(tempo_from_filename("loop.wav"), None);
        // Out of range next to the marker, and no bare fallback in range
        assert_eq!(tempo_from_filename("take_300bpm.wav"), None);
    }

    #[test]
    fn test_filename_bare_number_fallback() {
        assert_eq!(tempo_from_filename("drums 128 final.wav"), Some(128.0));
        assert_eq!(tempo_from_filename("drums_42_final.wav"), None);
        assert_eq!(tempo_from_filename("take 2 of 95.wav"), Some(95.0));
    }

    #[test]
    fn test_autocorrelation_of_impulse_train() {
        let mut signal = vec![0.0f32; 64];
        for i in (0..64).step_by(8) {
            signal[i] = 1.0;
        }
        let acf = autocorrelate(&signal).unwrap();

        assert!((acf[0] - 8.0).abs() < 1e-3);
        assert!((acf[8] - 7.0).abs() < 1e-3);
        assert!(acf[4].abs() < 1e-3);
    }

    #[test]
    fn test_estimate_click_track_tempo() {
        let samples = click_track(44100, 0.5, 0.1, 8.0);
        let estimate = estimate_tempo(&samples, 44100, &TempoConfig::default()).unwrap();

        assert!((estimate.bpm - 120.0).abs() < 3.0, "bpm {}", estimate.bpm);
        assert_eq!(estimate.source, TempoSource::Estimated);
        assert!(!estimate.candidates.is_empty() && estimate.candidates.len() <= 3);
        assert_eq!(estimate.candidates[0], estimate.bpm);
        assert!(estimate.confidence >= 0.5 && estimate.confidence <= 0.9);
    }

    #[test]
    fn test_silence_has_no_tempo() {
        let samples = vec![0.0f32; 44100 * 2];
        assert!(estimate_tempo(&samples, 44100, &TempoConfig::default()).is_none());
        assert!(estimate_tempo(&[], 44100, &TempoConfig::default()).is_none());
    }

    #[test]
    fn test_extract_prefers_filename() {
        let samples = click_track(44100, 0.5, 0.1, 4.0);
        let estimate = extract_tempo(&samples, 44100, Some("loop_90bpm.wav"), &TempoConfig::default())
            .unwrap();

        assert_eq!(estimate.bpm, 90.0);
        assert_eq!(estimate.confidence, 1.0);
        assert_eq!(estimate.source, TempoSource::Filename);
    }
}
