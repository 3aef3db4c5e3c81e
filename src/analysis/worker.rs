// Background analysis worker - rhythm extraction and library matching off the audio path
// The latest request wins; superseded runs finish with an error and publish nothing

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::trace::{AnalysisStage, TraceEntry, TraceWriter};
use crate::audio::ingest::{ingest_wav, AudioData, AudioError};
use crate::audio::onsets::OnsetConfig;
use crate::groove::matcher::{rank_matches, GrooveMatch};
use crate::groove::rhythm::{detect_tempo, place_onsets, RhythmError, RhythmPattern};
use crate::groove::tempo::TempoConfig;
use crate::library::PatternStore;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Rhythm analysis failed: {0}")]
    Rhythm(#[from] RhythmError),

    #[error("Failed to read audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Analysis superseded by a newer request")]
    Superseded,

    #[error("Analysis worker failed: {0}")]
    Worker(String),
}

/// Mono audio to analyse, with an optional file name used as a tempo hint
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub file_name: Option<String>,
}

impl AnalysisRequest {
    /// Analyse the first channel of decoded audio
    pub fn from_audio(audio: &AudioData, file_name: Option<String>) -> Self {
        AnalysisRequest {
            samples: audio.left_channel(),
            sample_rate: audio.sample_rate,
            file_name,
        }
    }
}

/// Published result of a completed analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub request_id: Uuid,
    pub rhythm: RhythmPattern,
    pub matches: Vec<GrooveMatch>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub tempo: TempoConfig,
    pub onsets: OnsetConfig,
    pub max_matches: usize,

    /// JSONL trace file, if tracing is wanted
    pub trace_path: Option<PathBuf>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            tempo: TempoConfig::default(),
            onsets: OnsetConfig::default(),
            max_matches: 15,
            trace_path: None,
        }
    }
}

/// Identity and cancel flag of one in-flight request
#[derive(Debug, Clone)]
struct Ticket {
    id: Uuid,
    superseded: Arc<AtomicBool>,
}

impl Ticket {
    fn check(&self) -> Result<(), AnalysisError> {
        if self.superseded.load(Ordering::Acquire) {
            return Err(AnalysisError::Superseded);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Shared {
    store: Arc<PatternStore>,
    settings: AnalysisSettings,
    trace: Option<TraceWriter>,
    progress: AtomicU8,
    current: Mutex<Option<Ticket>>,
    latest: RwLock<Option<Arc<AnalysisReport>>>,
}

/// Runs analyses on the blocking thread pool and publishes the latest report
#[derive(Debug, Clone)]
pub struct AnalysisWorker {
    shared: Arc<Shared>,
}

impl AnalysisWorker {
    pub fn new(store: Arc<PatternStore>, settings: AnalysisSettings) -> Self {
        let trace = settings.trace_path.clone().map(TraceWriter::new);
        AnalysisWorker {
            shared: Arc::new(Shared {
                store,
                settings,
                trace,
                progress: AtomicU8::new(0),
                current: Mutex::new(None),
                latest: RwLock::new(None),
            }),
        }
    }

    /// Progress of the current request, 0-100
    pub fn progress(&self) -> u8 {
        self.shared.progress.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.shared.current.lock().is_some()
    }

    /// Report of the most recent successful analysis
    pub fn latest_report(&self) -> Option<Arc<AnalysisReport>> {
        self.shared.latest.read().clone()
    }

    /// Analyse audio in the background and return the ranked matches
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<Arc<AnalysisReport>, AnalysisError> {
        let ticket = self.begin();
        let worker = self.clone();

        tokio::task::spawn_blocking(move || worker.run(&ticket, request))
            .await
            .map_err(|e| AnalysisError::Worker(e.to_string()))?
    }

    /// Read a WAV file and analyse its first channel, using the file name as tempo hint
    pub async fn analyze_file(&self, path: &Path) -> Result<Arc<AnalysisReport>, AnalysisError> {
        let bytes = tokio::fs::read(path).await?;
        let audio = ingest_wav(&bytes)?;
        let file_name = path.file_name().map(|n| n.to_string_lossy().to_string());
        self.analyze(AnalysisRequest::from_audio(&audio, file_name)).await
    }

    /// Register a new request, superseding any in-flight one
    fn begin(&self) -> Ticket {
        let ticket = Ticket {
            id: Uuid::new_v4(),
            superseded: Arc::new(AtomicBool::new(false)),
        };

        let mut current = self.shared.current.lock();
        if let Some(previous) = current.replace(ticket.clone()) {
            previous.superseded.store(true, Ordering::Release);
            log::info!("Analysis {} superseded by {}", previous.id, ticket.id);
        }
        self.shared.progress.store(0, Ordering::Release);
        ticket
    }

    fn run(&self, ticket: &Ticket, request: AnalysisRequest) -> Result<Arc<AnalysisReport>, AnalysisError> {
        let result = self.run_stages(ticket, &request);

        match &result {
            Ok(report) => {
                log::info!(
                    "Analysis {} complete: {:.1} bpm, {} matches",
                    ticket.id,
                    report.rhythm.bpm,
                    report.matches.len()
                );
            }
            Err(AnalysisError::Superseded) => {
                self.trace(ticket, AnalysisStage::Superseded, "Superseded by a newer request", None);
            }
            Err(e) => {
                log::warn!("Analysis {} failed: {}", ticket.id, e);
                self.trace(ticket, AnalysisStage::Failed, e.to_string(), None);
                self.finish(ticket);
            }
        }

        result
    }

    fn run_stages(&self, ticket: &Ticket, request: &AnalysisRequest) -> Result<Arc<AnalysisReport>, AnalysisError> {
        let settings = &self.shared.settings;

        self.advance(ticket, AnalysisStage::Started, "Analysis started", None)?;

        let tempo = detect_tempo(
            &request.samples,
            request.sample_rate,
            request.file_name.as_deref(),
            &settings.tempo,
        )?;
        self.advance(
            ticket,
            AnalysisStage::Tempo,
            format!("Tempo {:.1} bpm", tempo.bpm),
            Some(serde_json::json!({
                "bpm": tempo.bpm,
                "confidence": tempo.confidence,
                "source": tempo.source,
            })),
        )?;

        let rhythm = place_onsets(tempo, &request.samples, request.sample_rate, &settings.onsets)?;
        self.advance(
            ticket,
            AnalysisStage::Onsets,
            format!("{} onsets", rhythm.onset_beats.len()),
            Some(serde_json::json!({ "onsets": rhythm.onset_beats.len() })),
        )?;

        let matches = rank_matches(&rhythm, &self.shared.store, settings.max_matches);
        ticket.check()?;

        let report = Arc::new(AnalysisReport {
            request_id: ticket.id,
            rhythm,
            matches,
            completed_at: Utc::now(),
        });
        self.publish(ticket, report.clone())?;
        self.trace(
            ticket,
            AnalysisStage::Matching,
            format!("{} matches", report.matches.len()),
            None,
        );
        Ok(report)
    }

    /// Mark a stage complete, bailing out if a newer request took over
    fn advance(
        &self,
        ticket: &Ticket,
        stage: AnalysisStage,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Result<(), AnalysisError> {
        {
            let current = self.shared.current.lock();
            ticket.check()?;
            if !current.as_ref().is_some_and(|active| active.id == ticket.id) {
                return Err(AnalysisError::Superseded);
            }
            self.shared.progress.store(stage.progress(), Ordering::Release);
        }
        log::debug!("Analysis {} at {}%", ticket.id, stage.progress());
        self.trace(ticket, stage, message, data);
        Ok(())
    }

    fn publish(&self, ticket: &Ticket, report: Arc<AnalysisReport>) -> Result<(), AnalysisError> {
        let mut current = self.shared.current.lock();
        match current.as_ref() {
            Some(active) if active.id == ticket.id => {
                *self.shared.latest.write() = Some(report);
                self.shared.progress.store(AnalysisStage::Matching.progress(), Ordering::Release);
                *current = None;
                Ok(())
            }
            _ => Err(AnalysisError::Superseded),
        }
    }

    /// Clear a failed request if it is still the current one
    fn finish(&self, ticket: &Ticket) {
        let mut current = self.shared.current.lock();
        if current.as_ref().is_some_and(|active| active.id == ticket.id) {
            *current = None;
            self.shared.progress.store(0, Ordering::Release);
        }
    }

    fn trace(
        &self,
        ticket: &Ticket,
        stage: AnalysisStage,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        let Some(writer) = &self.shared.trace else {
            return;
        };
        let mut entry = TraceEntry::new(ticket.id, stage, message);
        if let Some(data) = data {
            entry = entry.with_data(data);
        }
        if let Err(e) = writer.write(&entry) {
            log::warn!("Failed to write analysis trace {}: {}", writer.path().display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::trace::read_trace_file;
    use crate::audio::onsets::tests::click_track;
    use crate::library::test_support::{note, write_groove, GrooveFixture};
    use tempfile::TempDir;

    fn library() -> (TempDir, Arc<PatternStore>) {
        let root = TempDir::new().unwrap();
        write_groove(
            &root.path().join("Basic"),
            "quarters.mid",
            &GrooveFixture {
                notes: (0..4).map(|i| note(i as f64, i as f64 + 0.25, 36)).collect(),
                ..Default::default()
            },
        );
        write_groove(
            &root.path().join("Basic"),
            "offbeats.mid",
            &GrooveFixture {
                notes: vec![note(0.5, 0.75, 42), note(2.5, 2.75, 42)],
                ..Default::default()
            },
        );
        let store = Arc::new(PatternStore::scan(root.path()).unwrap());
        (root, store)
    }

    fn clicks() -> AnalysisRequest {
        AnalysisRequest {
            samples: click_track(44100, 0.5, 0.1, 4.0),
            sample_rate: 44100,
            file_name: Some("clicks_120bpm.wav".to_string()),
        }
    }

    #[tokio::test]
    async fn test_analyze_publishes_report() {
        let (_root, store) = library();
        let trace_dir = TempDir::new().unwrap();
        let trace_path = trace_dir.path().join("analysis.jsonl");
        let worker = AnalysisWorker::new(
            store,
            AnalysisSettings {
                trace_path: Some(trace_path.clone()),
                ..Default::default()
            },
        );

        let report = worker.analyze(clicks()).await.unwrap();

        assert_eq!(report.rhythm.bpm, 120.0);
        assert_eq!(report.matches.len(), 2);
        assert_eq!(report.matches[0].pattern_name, "quarters");
        assert_eq!(worker.progress(), 100);
        assert!(!worker.is_busy());
        assert_eq!(worker.latest_report().unwrap().request_id, report.request_id);

        let stages: Vec<AnalysisStage> = read_trace_file(&trace_path)
            .unwrap()
            .into_iter()
            .map(|e| e.stage)
            .collect();
        assert_eq!(
            stages,
            vec![
                AnalysisStage::Started,
                AnalysisStage::Tempo,
                AnalysisStage::Onsets,
                AnalysisStage::Matching
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_analysis_publishes_nothing() {
        let (_root, store) = library();
        let worker = AnalysisWorker::new(store, AnalysisSettings::default());

        let silence = AnalysisRequest {
            samples: vec![0.0; 44100],
            sample_rate: 44100,
            file_name: None,
        };
        let result = worker.analyze(silence).await;

        assert!(matches!(result, Err(AnalysisError::Rhythm(RhythmError::NoTempo))));
        assert!(worker.latest_report().is_none());
        assert_eq!(worker.progress(), 0);
        assert!(!worker.is_busy());
    }

    #[test]
    fn test_newer_request_supersedes_older() {
        let (_root, store) = library();
        let worker = AnalysisWorker::new(store, AnalysisSettings::default());

        let first = worker.begin();
        let second = worker.begin();

        let stale = worker.run(&first, clicks());
        assert!(matches!(stale, Err(AnalysisError::Superseded)));
        assert!(worker.latest_report().is_none());
        assert!(worker.is_busy());

        let fresh = worker.run(&second, clicks()).unwrap();
        assert_eq!(worker.latest_report().unwrap().request_id, second.id);
        assert_eq!(fresh.request_id, second.id);
        assert!(!worker.is_busy());
    }

    #[test]
    fn test_stale_ticket_leaves_progress_alone() {
        let (_root, store) = library();
        let worker = AnalysisWorker::new(store, AnalysisSettings::default());

        let first = worker.begin();
        let second = worker.begin();
        worker.advance(&second, AnalysisStage::Tempo, "tempo", None).unwrap();
        assert_eq!(worker.progress(), AnalysisStage::Tempo.progress());

        let result = worker.advance(&first, AnalysisStage::Onsets, "onsets", None);
        assert!(matches!(result, Err(AnalysisError::Superseded)));
        assert_eq!(worker.progress(), AnalysisStage::Tempo.progress());

        // Unregistered ticket with its flag still clear
        let orphan = Ticket {
            id: Uuid::new_v4(),
            superseded: Arc::new(AtomicBool::new(false)),
        };
        let result = worker.advance(&orphan, AnalysisStage::Onsets, "onsets", None);
        assert!(matches!(result, Err(AnalysisError::Superseded)));
        assert_eq!(worker.progress(), AnalysisStage::Tempo.progress());
    }

    #[tokio::test]
    async fn test_analyze_file_uses_name_as_hint() {
        let (_root, store) = library();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loop_100bpm.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in click_track(44100, 0.6, 0.1, 3.0) {
            let v = (s * 32767.0) as i16;
            writer.write_sample(v).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let worker = AnalysisWorker::new(store, AnalysisSettings::default());
        let report = worker.analyze_file(&path).await.unwrap();

        assert_eq!(report.rhythm.bpm, 100.0);
        assert_eq!(report.rhythm.onset_beats.len(), 5);
    }
}
