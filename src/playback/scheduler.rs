// Event scheduler - per-block trigger emission for pattern and composer playback
// Runs on the audio path: no I/O, no parsing, no logging inside tick()

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::clock::{ClockArbiter, ClockSource, HostTransport};
use super::events::TriggerEvent;
use crate::composer::Composition;
use crate::library::{Pattern, PatternId, TimedEvent};

/// Events a single block can hold before later ones are dropped
pub const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PlaybackMode {
    Idle,
    PlayingSingle { pattern: PatternId },
    PlayingComposer,
}

/// Published snapshot of the scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub mode: PlaybackMode,
    pub source: ClockSource,
    pub position_beats: f64,
    pub looping: bool,
    pub preview_bpm: Option<f64>,
}

/// Scan bounds and sample mapping for one sub-interval of a block
#[derive(Debug, Clone, Copy)]
struct Window {
    lo: f64,
    hi: f64,
    include_lo: bool,

    /// Beats from the block start to position 0 of this sub-interval
    shift: f64,
}

#[derive(Debug, Clone, Copy)]
struct BlockSpan {
    beats: f64,
    samples: usize,
}

impl BlockSpan {
    fn sample_offset(&self, beats_into_block: f64) -> u32 {
        if self.beats <= 0.0 || self.samples == 0 {
            return 0;
        }
        let offset = (beats_into_block * self.samples as f64 / self.beats).floor();
        offset.clamp(0.0, (self.samples - 1) as f64) as u32
    }
}

/// Playback state machine: Idle, one pattern, or the composer timeline
#[derive(Debug)]
pub struct Scheduler {
    clock: ClockArbiter,
    mode: PlaybackMode,
    single: Option<Arc<Pattern>>,
    composition: Composition,
    looping: bool,
    source: ClockSource,

    /// Next scan includes beat 0 (downbeat after a start)
    fresh_start: bool,

    events: Vec<TriggerEvent>,
}

impl Scheduler {
    pub fn new(sample_rate: f64, internal_bpm: f64) -> Self {
        Scheduler {
            clock: ClockArbiter::new(sample_rate, internal_bpm),
            mode: PlaybackMode::Idle,
            single: None,
            composition: Composition::default(),
            looping: true,
            source: ClockSource::Internal,
            fresh_start: false,
            events: Vec::with_capacity(EVENT_CAPACITY),
        }
    }

    pub fn clock(&self) -> &ClockArbiter {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut ClockArbiter {
        &mut self.clock
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            mode: self.mode,
            source: self.source,
            position_beats: self.clock.position(),
            looping: self.looping,
            preview_bpm: self.clock.preview_tempo(),
        }
    }

    /// Start looping one pattern, stopping composer playback
    pub fn start_single(&mut self, id: PatternId, pattern: Arc<Pattern>) {
        self.single = Some(pattern);
        self.mode = PlaybackMode::PlayingSingle { pattern: id };
        self.restart();
        log::info!("Started pattern playback ({}, {})", id.category, id.pattern);
    }

    /// Stop single-pattern playback; no-op in any other mode
    pub fn stop(&mut self) {
        if let PlaybackMode::PlayingSingle { .. } = self.mode {
            self.mode = PlaybackMode::Idle;
            self.single = None;
            log::info!("Stopped pattern playback");
        }
    }

    /// Replace the composition snapshot; an empty one halts composer playback
    pub fn set_composition(&mut self, composition: Composition) {
        if composition.is_empty() && self.mode == PlaybackMode::PlayingComposer {
            self.mode = PlaybackMode::Idle;
            log::info!("Composer emptied, playback stopped");
        }
        self.composition = composition;
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Start composer playback, stopping single-pattern playback
    ///
    /// Returns false when the timeline is empty.
    pub fn start_composer(&mut self) -> bool {
        if self.composition.is_empty() {
            return false;
        }
        self.single = None;
        self.mode = PlaybackMode::PlayingComposer;
        self.restart();
        log::info!(
            "Started composer playback ({} items, {} beats)",
            self.composition.items.len(),
            self.composition.total_length
        );
        true
    }

    /// Stop composer playback; no-op in any other mode
    pub fn stop_composer(&mut self) {
        if self.mode == PlaybackMode::PlayingComposer {
            self.mode = PlaybackMode::Idle;
            log::info!("Stopped composer playback");
        }
    }

    /// Takes effect on the next block without moving the position
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Restart the active mode at beat 0
    pub fn reset_position(&mut self) {
        if self.mode != PlaybackMode::Idle {
            self.restart();
        }
    }

    fn restart(&mut self) {
        self.clock.restart();
        self.fresh_start = true;
    }

    /// Events emitted by the last block
    pub fn emitted(&self) -> &[TriggerEvent] {
        &self.events
    }

    /// Take the events emitted by the last block
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, TriggerEvent> {
        self.events.drain(..)
    }

    /// Process one audio block, returning how many events were emitted
    pub fn tick(&mut self, host: &HostTransport, block_samples: usize) -> usize {
        self.events.clear();

        let active = self.mode != PlaybackMode::Idle;
        let tick = self.clock.advance(host, block_samples, active);
        self.source = tick.source;
        if !active {
            return 0;
        }

        let length = match self.mode {
            PlaybackMode::PlayingSingle { .. } => self.single.as_ref().map_or(0.0, |p| p.length_beats),
            PlaybackMode::PlayingComposer => self.composition.total_length,
            PlaybackMode::Idle => 0.0,
        };
        if length <= 0.0 {
            self.mode = PlaybackMode::Idle;
            return 0;
        }

        let include_start = self.fresh_start || tick.restarted;
        self.fresh_start = false;

        let span = BlockSpan {
            beats: tick.current - tick.previous,
            samples: block_samples,
        };
        let mut previous = tick.previous;
        let mut current = tick.current;
        let mut shift = -tick.previous;

        // The content shrank underneath the playhead
        if previous >= length {
            if !self.looping {
                self.mode = PlaybackMode::Idle;
                return 0;
            }
            let wraps = (previous / length).floor() * length;
            self.clock.rewind(wraps);
            previous -= wraps;
            current -= wraps;
            shift += wraps;
        }

        if current < length {
            self.scan(Window { lo: previous, hi: current, include_lo: include_start, shift }, span);
            return self.events.len();
        }

        self.scan(Window { lo: previous, hi: length, include_lo: include_start, shift }, span);

        if !self.looping {
            self.mode = PlaybackMode::Idle;
            return self.events.len();
        }

        // Wrap: every further traversal starts inclusively at beat 0
        while current >= length {
            current -= length;
            shift += length;
            self.clock.rewind(length);

            let hi = current.min(length);
            self.scan(Window { lo: 0.0, hi, include_lo: true, shift }, span);
        }

        self.events.len()
    }

    fn scan(&mut self, window: Window, span: BlockSpan) {
        match self.mode {
            PlaybackMode::PlayingSingle { .. } => {
                let Some(pattern) = self.single.as_ref() else {
                    return;
                };
                let hits = pattern.events_between(window.lo, window.hi, window.include_lo);
                push_events(&mut self.events, hits, 0.0, window.shift, span, None);
            }
            PlaybackMode::PlayingComposer => {
                for (index, scheduled) in self.composition.items.iter().enumerate() {
                    let start = scheduled.item.start_beat;
                    let length = scheduled.item.length_beats;
                    if window.hi < start || window.lo > start + length {
                        continue;
                    }

                    let mut local_lo = window.lo - start;
                    let mut include_lo = window.include_lo;
                    if local_lo < 0.0 {
                        local_lo = 0.0;
                        include_lo = true;
                    }
                    let local_hi = (window.hi - start).min(length);

                    let hits = scheduled
                        .pattern
                        .events_between(local_lo, local_hi, include_lo)
                        .iter()
                        .filter(|e| !e.event.is_note_on() || e.time_beats < length);
                    push_events(&mut self.events, hits, start, window.shift, span, Some(index));
                }
            }
            PlaybackMode::Idle => {}
        }
    }
}

fn push_events<'a>(
    out: &mut Vec<TriggerEvent>,
    hits: impl IntoIterator<Item = &'a TimedEvent>,
    origin: f64,
    shift: f64,
    span: BlockSpan,
    item: Option<usize>,
) {
    for hit in hits {
        // Never grow the buffer on the audio path
        if out.len() == out.capacity() {
            return;
        }
        let time_beats = origin + hit.time_beats;
        out.push(TriggerEvent {
            time_beats,
            sample_offset: span.sample_offset(time_beats + shift),
            event: hit.event,
            item,
        });
    }
}
