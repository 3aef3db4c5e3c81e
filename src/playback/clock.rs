// Playback clock - picks host or internal timing for every audio block
// Positions are relative to the active mode's anchor, never absolute host beats

use serde::{Deserialize, Serialize};

/// Transport information reported by the host for one block
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HostTransport {
    pub bpm: Option<f64>,
    pub position_beats: Option<f64>,
    pub is_playing: bool,
}

impl HostTransport {
    /// No host, or a host that is not playing
    pub fn stopped() -> Self {
        HostTransport::default()
    }

    pub fn playing(bpm: f64, position_beats: f64) -> Self {
        HostTransport {
            bpm: Some(bpm),
            position_beats: Some(position_beats),
            is_playing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    Internal,
    Host,
}

/// Beat interval covered by one block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    pub previous: f64,
    pub current: f64,
    pub bpm: f64,
    pub source: ClockSource,

    /// The clock re-anchored at 0 during this block (host jumped backwards)
    pub restarted: bool,
}

/// Resolves tempo and position from the host transport or an internal accumulator
#[derive(Debug, Clone)]
pub struct ClockArbiter {
    sample_rate: f64,
    internal_bpm: f64,
    preview_override: Option<f64>,

    /// Internal position in beats since the anchor
    accumulator: f64,

    /// Host beat that maps to relative position 0
    host_anchor: f64,
    needs_anchor: bool,

    position: f64,
    last_source: Option<ClockSource>,
}

impl ClockArbiter {
    pub fn new(sample_rate: f64, internal_bpm: f64) -> Self {
        ClockArbiter {
            sample_rate: if sample_rate > 0.0 { sample_rate } else { 44100.0 },
            internal_bpm: if internal_bpm > 0.0 { internal_bpm } else { 120.0 },
            preview_override: None,
            accumulator: 0.0,
            host_anchor: 0.0,
            needs_anchor: true,
            position: 0.0,
            last_source: None,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate > 0.0 {
            self.sample_rate = sample_rate;
        }
    }

    pub fn set_internal_bpm(&mut self, bpm: f64) {
        if bpm > 0.0 {
            self.internal_bpm = bpm;
        }
    }

    /// Force the internal clock at a fixed tempo, or `None` to follow the host again
    pub fn set_preview_tempo(&mut self, bpm: Option<f64>) {
        self.preview_override = bpm.filter(|b| *b > 0.0);
    }

    pub fn preview_tempo(&self) -> Option<f64> {
        self.preview_override
    }

    pub fn source_for(&self, host: &HostTransport) -> ClockSource {
        if self.preview_override.is_some() || !host.is_playing || host.position_beats.is_none() {
            ClockSource::Internal
        } else {
            ClockSource::Host
        }
    }

    /// Preview override if set, else the host tempo (even while stopped), else the internal bpm
    pub fn effective_bpm(&self, host: &HostTransport) -> f64 {
        if let Some(bpm) = self.preview_override {
            return bpm;
        }
        host.bpm.filter(|b| *b > 0.0).unwrap_or(self.internal_bpm)
    }

    pub fn internal_bpm(&self) -> f64 {
        self.internal_bpm
    }

    /// Re-anchor at beat 0; the host anchor is taken on the next host block
    pub fn restart(&mut self) {
        self.accumulator = 0.0;
        self.position = 0.0;
        self.needs_anchor = true;
    }

    /// Move the relative position back by `beats` (loop wrap)
    pub fn rewind(&mut self, beats: f64) {
        self.accumulator -= beats;
        self.host_anchor += beats;
        self.position -= beats;
    }

    /// Current relative position
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Advance by one block and report the covered `(previous, current)` pair
    pub fn advance(&mut self, host: &HostTransport, block_samples: usize, active: bool) -> ClockTick {
        let source = self.source_for(host);
        let bpm = self.effective_bpm(host);
        let previous = self.position;

        if !active {
            self.last_source = Some(source);
            return ClockTick {
                previous,
                current: previous,
                bpm,
                source,
                restarted: false,
            };
        }

        let switched = self.last_source.is_some_and(|last| last != source);
        self.last_source = Some(source);

        let mut restarted = false;
        let current = match (source, host.position_beats) {
            (ClockSource::Host, Some(host_position)) => {
                if self.needs_anchor {
                    self.host_anchor = host_position - self.position;
                    self.needs_anchor = false;
                } else if switched {
                    // Keep the relative position continuous across the handover
                    self.host_anchor = host_position - self.position;
                }

                let relative = host_position - self.host_anchor;
                if relative < previous - 1e-9 {
                    // Host relocated backwards: restart from the new host position
                    self.host_anchor = host_position;
                    restarted = true;
                    0.0
                } else {
                    relative
                }
            }
            _ => {
                if switched {
                    self.accumulator = self.position;
                }
                // Re-anchor against the host again once it takes over
                self.needs_anchor = true;
                self.accumulator += (bpm / 60.0) * (block_samples as f64 / self.sample_rate);
                self.accumulator
            }
        };

        self.position = current;
        ClockTick {
            previous: if restarted { 0.0 } else { previous },
            current,
            bpm,
            source,
            restarted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_selection() {
        let mut clock = ClockArbiter::new(44100.0, 120.0);
        let host = HostTransport::playing(100.0, 8.0);

        assert_eq!(clock.source_for(&host), ClockSource::Host);
        assert_eq!(clock.source_for(&HostTransport::stopped()), ClockSource::Internal);

        clock.set_preview_tempo(Some(90.0));
        assert_eq!(clock.source_for(&host), ClockSource::Internal);
        assert_eq!(clock.effective_bpm(&host), 90.0);

        clock.set_preview_tempo(None);
        assert_eq!(clock.effective_bpm(&host), 100.0);
    }

    #[test]
    fn test_host_without_tempo_uses_internal_bpm() {
        let clock = ClockArbiter::new(44100.0, 96.0);
        let host = HostTransport {
            bpm: Some(0.0),
            position_beats: Some(1.0),
            is_playing: true,
        };
        assert_eq!(clock.source_for(&host), ClockSource::Host);
        assert_eq!(clock.effective_bpm(&host), 96.0);
    }

    #[test]
    fn test_stopped_host_tempo_drives_internal_clock() {
        let mut clock = ClockArbiter::new(48000.0, 120.0);
        let host = HostTransport {
            bpm: Some(90.0),
            position_beats: Some(0.0),
            is_playing: false,
        };
        assert_eq!(clock.source_for(&host), ClockSource::Internal);
        assert_eq!(clock.effective_bpm(&host), 90.0);

        let tick = clock.advance(&host, 48000, true);
        assert!((tick.current - 1.5).abs() < 1e-9);
        assert_eq!(tick.bpm, 90.0);

        // No host tempo at all falls back to the internal bpm
        clock.set_internal_bpm(100.0);
        assert_eq!(clock.effective_bpm(&HostTransport::stopped()), 100.0);

        clock.set_preview_tempo(Some(60.0));
        assert_eq!(clock.effective_bpm(&host), 60.0);
    }

    #[test]
    fn test_internal_advance() {
        let mut clock = ClockArbiter::new(44100.0, 120.0);
        let host = HostTransport::stopped();

        let tick = clock.advance(&host, 44100, true);
        assert_eq!(tick.previous, 0.0);
        assert!((tick.current - 2.0).abs() < 1e-9);

        let tick = clock.advance(&host, 22050, true);
        assert!((tick.previous - 2.0).abs() < 1e-9);
        assert!((tick.current - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_inactive_clock_holds_position() {
        let mut clock = ClockArbiter::new(44100.0, 120.0);
        let tick = clock.advance(&HostTransport::stopped(), 44100, false);
        assert_eq!(tick.previous, tick.current);
        assert_eq!(clock.position(), 0.0);
    }

    #[test]
    fn test_host_positions_are_anchored() {
        let mut clock = ClockArbiter::new(48000.0, 120.0);

        let tick = clock.advance(&HostTransport::playing(120.0, 16.0), 512, true);
        assert_eq!((tick.previous, tick.current), (0.0, 0.0));

        let tick = clock.advance(&HostTransport::playing(120.0, 16.5), 512, true);
        assert_eq!((tick.previous, tick.current), (0.0, 0.5));
        assert_eq!(tick.source, ClockSource::Host);

        clock.rewind(0.5);
        let tick = clock.advance(&HostTransport::playing(120.0, 17.0), 512, true);
        assert_eq!((tick.previous, tick.current), (0.0, 0.5));
    }

    #[test]
    fn test_host_backward_jump_restarts() {
        let mut clock = ClockArbiter::new(48000.0, 120.0);
        clock.advance(&HostTransport::playing(120.0, 4.0), 512, true);
        clock.advance(&HostTransport::playing(120.0, 6.0), 512, true);

        let tick = clock.advance(&HostTransport::playing(120.0, 1.0), 512, true);
        assert!(tick.restarted);
        assert_eq!((tick.previous, tick.current), (0.0, 0.0));

        let tick = clock.advance(&HostTransport::playing(120.0, 1.25), 512, true);
        assert!(!tick.restarted);
        assert_eq!(tick.current, 0.25);
    }

    #[test]
    fn test_source_switch_keeps_position() {
        let mut clock = ClockArbiter::new(48000.0, 120.0);
        clock.advance(&HostTransport::stopped(), 24000, true);
        assert!((clock.position() - 1.0).abs() < 1e-9);

        // Host takes over at an arbitrary song position
        let tick = clock.advance(&HostTransport::playing(120.0, 32.0), 512, true);
        assert!((tick.previous - 1.0).abs() < 1e-9);
        assert!((tick.current - 1.0).abs() < 1e-9);

        let tick = clock.advance(&HostTransport::playing(120.0, 32.5), 512, true);
        assert!((tick.current - 1.5).abs() < 1e-9);

        // Host stops; the internal clock continues from the same place
        let tick = clock.advance(&HostTransport::stopped(), 24000, true);
        assert!((tick.previous - 1.5).abs() < 1e-9);
        assert!((tick.current - 2.5).abs() < 1e-9);
    }
}
