// Groove engine - command surface over the library, composer, scheduler and analysis
// Lock order is timeline before scheduler; the audio path only ever try-locks the scheduler

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::analysis::{AnalysisError, AnalysisReport, AnalysisRequest, AnalysisWorker};
use crate::composer::{export_composition, ComposerItem, ComposerTimeline, ExportError, MidiExportOptions};
use crate::config::{resolve_library_root, ConfigError, EngineConfig};
use crate::library::{Catalog, LibraryError, Pattern, PatternId, PatternStore};
use crate::playback::{HostTransport, PlaybackState, Scheduler, TriggerEvent};
use crate::storage::{cleanup_old_exports, copy_pattern_file, default_export_dir, write_export, StorageError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub struct GrooveEngine {
    config: EngineConfig,
    store: Arc<PatternStore>,
    timeline: Mutex<ComposerTimeline>,
    scheduler: Mutex<Scheduler>,
    analysis: AnalysisWorker,
}

impl GrooveEngine {
    /// Scan the configured library (or the first one found) and build an engine
    ///
    /// An explicitly configured root must exist. With no root configured and none found,
    /// the engine starts with an empty library.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let store = match config.library_root.clone().or_else(resolve_library_root) {
            Some(root) => {
                let store = PatternStore::scan(&root)?;
                log::info!(
                    "Library {}: {} categories, {} patterns",
                    root.display(),
                    store.catalog().categories().len(),
                    store.catalog().pattern_count()
                );
                store
            }
            None => PatternStore::default(),
        };
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: EngineConfig, store: PatternStore) -> Self {
        let store = Arc::new(store);
        let mut scheduler = Scheduler::new(config.sample_rate, config.preview_bpm);
        scheduler.set_looping(config.looping);
        let analysis = AnalysisWorker::new(store.clone(), config.analysis_settings());

        let engine = GrooveEngine {
            config,
            store,
            timeline: Mutex::new(ComposerTimeline::new()),
            scheduler: Mutex::new(scheduler),
            analysis,
        };
        engine.cleanup_exports();
        engine
    }

    fn cleanup_exports(&self) {
        let dir = match self.export_dir() {
            Ok(dir) => dir,
            Err(e) => {
                log::debug!("Skipping export cleanup: {}", e);
                return;
            }
        };
        if let Err(e) = cleanup_old_exports(&dir, self.config.export_max_age()) {
            log::warn!("Failed to clean up exports in {}: {}", dir.display(), e);
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        self.store.catalog()
    }

    pub fn load_pattern(&self, category: usize, pattern: usize) -> Result<Arc<Pattern>, LibraryError> {
        self.store.load(PatternId::new(category, pattern))
    }

    pub fn export_dir(&self) -> Result<PathBuf, StorageError> {
        match &self.config.export_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_export_dir(),
        }
    }

    // Playback

    /// Loop one pattern; `Ok(false)` when the indices name no pattern
    pub fn start_pattern(&self, category: usize, pattern: usize) -> Result<bool, LibraryError> {
        let id = PatternId::new(category, pattern);
        if self.catalog().info(id).is_none() {
            return Ok(false);
        }
        let body = self.store.load(id)?;
        self.scheduler.lock().start_single(id, body);
        Ok(true)
    }

    pub fn stop_pattern(&self) {
        self.scheduler.lock().stop();
    }

    /// Play the composer timeline; `Ok(false)` when it is empty
    pub fn start_composer(&self) -> Result<bool, LibraryError> {
        let timeline = self.timeline.lock();
        let composition = timeline.resolve(&self.store)?;
        let mut scheduler = self.scheduler.lock();
        scheduler.set_composition(composition);
        Ok(scheduler.start_composer())
    }

    pub fn stop_composer(&self) {
        self.scheduler.lock().stop_composer();
    }

    pub fn set_looping(&self, looping: bool) {
        self.scheduler.lock().set_looping(looping);
    }

    /// Tempo of the internal clock when neither a preview nor a host tempo applies
    pub fn set_internal_bpm(&self, bpm: f64) {
        self.scheduler.lock().clock_mut().set_internal_bpm(bpm);
    }

    /// Force the internal clock at `bpm`, or follow the host again with `None`
    pub fn set_preview_tempo(&self, bpm: Option<f64>) {
        self.scheduler.lock().clock_mut().set_preview_tempo(bpm);
    }

    pub fn set_sample_rate(&self, sample_rate: f64) {
        self.scheduler.lock().clock_mut().set_sample_rate(sample_rate);
    }

    /// Restart the active mode at beat 0
    pub fn reset_position(&self) {
        self.scheduler.lock().reset_position();
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.scheduler.lock().state()
    }

    /// Run one audio block, returning how many events it emitted
    ///
    /// Never blocks: if a command holds the scheduler, the block emits nothing.
    /// Collect the events with `drain_events_into` from the same thread.
    pub fn process_block(&self, host: &HostTransport, block_samples: usize) -> usize {
        match self.scheduler.try_lock() {
            Some(mut scheduler) => scheduler.tick(host, block_samples),
            None => 0,
        }
    }

    /// Move the last block's events into `out`, in time order
    ///
    /// Appends to `out` without clearing it; reserve capacity up front to keep the audio path allocation free.
    pub fn drain_events_into(&self, out: &mut Vec<TriggerEvent>) -> usize {
        let Some(mut scheduler) = self.scheduler.try_lock() else {
            return 0;
        };
        let before = out.len();
        out.extend(scheduler.drain_events());
        out.len() - before
    }

    // Composer

    /// Append a pattern (or its first `bar_count` bars) to the timeline
    ///
    /// `Ok(None)` when the indices name no pattern.
    pub fn add_item(
        &self,
        category: usize,
        pattern: usize,
        bar_count: u32,
    ) -> Result<Option<ComposerItem>, LibraryError> {
        let id = PatternId::new(category, pattern);
        let Some(info) = self.catalog().info(id) else {
            return Ok(None);
        };
        let body = self.store.load(id)?;

        let mut timeline = self.timeline.lock();
        let item = timeline.add_item(id, &body, bar_count);
        self.sync_composition(&timeline);
        log::info!(
            "Added '{}/{}' to composer at beat {} ({} beats)",
            info.category,
            info.name,
            item.start_beat,
            item.length_beats
        );
        Ok(Some(item))
    }

    /// Remove the item at `index`; false when out of range
    pub fn remove_item(&self, index: usize) -> bool {
        let mut timeline = self.timeline.lock();
        if timeline.remove_item(index).is_none() {
            return false;
        }
        self.sync_composition(&timeline);
        log::info!("Removed composer item {}", index);
        true
    }

    /// Move an item to a new position; false when either index is out of range
    pub fn move_item(&self, from: usize, to: usize) -> bool {
        let mut timeline = self.timeline.lock();
        if !timeline.move_item(from, to) {
            return false;
        }
        self.sync_composition(&timeline);
        log::info!("Moved composer item {} to {}", from, to);
        true
    }

    /// Empty the timeline, halting composer playback
    pub fn clear_composer(&self) {
        let mut timeline = self.timeline.lock();
        timeline.clear();
        self.sync_composition(&timeline);
        log::info!("Cleared composer");
    }

    pub fn composer_items(&self) -> Vec<ComposerItem> {
        self.timeline.lock().items().to_vec()
    }

    pub fn composer_length(&self) -> f64 {
        self.timeline.lock().total_length()
    }

    /// Push a fresh composition snapshot to the scheduler; caller holds the timeline lock
    fn sync_composition(&self, timeline: &ComposerTimeline) {
        match timeline.resolve(&self.store) {
            Ok(composition) => self.scheduler.lock().set_composition(composition),
            Err(e) => log::warn!("Composer not updated for playback: {}", e),
        }
    }

    // Analysis

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<Arc<AnalysisReport>, EngineError> {
        Ok(self.analysis.analyze(request).await?)
    }

    pub async fn analyze_file(&self, path: &Path) -> Result<Arc<AnalysisReport>, EngineError> {
        Ok(self.analysis.analyze_file(path).await?)
    }

    pub fn analysis_progress(&self) -> u8 {
        self.analysis.progress()
    }

    pub fn latest_report(&self) -> Option<Arc<AnalysisReport>> {
        self.analysis.latest_report()
    }

    // Export

    pub fn export_composition_bytes(&self, options: &MidiExportOptions) -> Result<Vec<u8>, ExportError> {
        let composition = self.scheduler.lock().composition().clone();
        export_composition(&composition, options)
    }

    /// Write the composition into the export directory and return its path
    pub fn export_composition_file(&self, options: &MidiExportOptions) -> Result<PathBuf, ExportError> {
        let bytes = self.export_composition_bytes(options)?;
        let dir = self.export_dir()?;
        let (path, _hash) = write_export(&dir, &bytes)?;
        Ok(path)
    }

    /// Copy a library pattern's file into the export directory
    pub fn export_pattern_file(&self, category: usize, pattern: usize) -> Result<PathBuf, EngineError> {
        let info = self.store.info(PatternId::new(category, pattern))?;
        let dir = self.export_dir()?;
        Ok(copy_pattern_file(&info.path, &dir, &info.category, &info.name)?)
    }
}
