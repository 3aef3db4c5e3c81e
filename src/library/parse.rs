// Groove file parsing - standard MIDI files into beat-relative patterns
// Only note-start/note-stop events are kept; everything else is discarded

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::pattern::{NoteEvent, Pattern, TimeSignature, TimedEvent};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Failed to read groove file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unparsable MIDI data: {0}")]
    Format(#[from] midly::Error),

    #[error("Groove library root not found: {0}")]
    MissingRoot(PathBuf),

    #[error("No pattern at category {category}, index {pattern}")]
    OutOfRange { category: usize, pattern: usize },
}

/// Tempo assumed until the first tempo marker (MIDI default)
const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Read and parse a groove file from disk
pub fn load_pattern_file(path: &Path) -> Result<Pattern, LibraryError> {
    let data = std::fs::read(path)?;
    parse_pattern(&data)
}

/// Parse MIDI bytes into a pattern body
///
/// Metrical files convert ticks to beats directly (`ticks / ticks_per_quarter`),
/// which stays exact across tempo changes. Timecode files go through seconds and
/// use the most recent tempo marker seen while walking the tracks.
pub fn parse_pattern(data: &[u8]) -> Result<Pattern, LibraryError> {
    let smf = Smf::parse(data)?;

    let mut events = Vec::new();
    let mut time_signature: Option<TimeSignature> = None;
    let mut first_tempo: Option<f64> = None;
    let mut running_bpm = DEFAULT_TEMPO_BPM;

    for track in &smf.tracks {
        let mut tick: u64 = 0;

        for event in track {
            tick += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    let us = us_per_quarter.as_int();
                    if us > 0 {
                        running_bpm = 60_000_000.0 / us as f64;
                        first_tempo.get_or_insert(running_bpm);
                    }
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denominator_pow, _, _)) => {
                    if time_signature.is_none() && numerator > 0 {
                        time_signature = Some(TimeSignature {
                            numerator,
                            denominator: 1u8.checked_shl(denominator_pow as u32).unwrap_or(4),
                        });
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    let note = match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => NoteEvent::On {
                            channel: channel.as_int(),
                            key: key.as_int(),
                            velocity: vel.as_int(),
                        },
                        // NoteOn with zero velocity is a note-stop
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            NoteEvent::Off {
                                channel: channel.as_int(),
                                key: key.as_int(),
                            }
                        }
                        _ => continue,
                    };

                    events.push(TimedEvent {
                        time_beats: ticks_to_beats(tick, smf.header.timing, running_bpm),
                        event: note,
                    });
                }
                _ => {}
            }
        }
    }

    Ok(Pattern::new(
        events,
        time_signature.unwrap_or_default(),
        first_tempo,
    ))
}

fn ticks_to_beats(tick: u64, timing: Timing, running_bpm: f64) -> f64 {
    match timing {
        Timing::Metrical(ticks_per_quarter) => {
            let tpq = ticks_per_quarter.as_int().max(1) as f64;
            tick as f64 / tpq
        }
        Timing::Timecode(fps, ticks_per_frame) => {
            let ticks_per_second = fps.as_f32() as f64 * ticks_per_frame.max(1) as f64;
            let seconds = tick as f64 / ticks_per_second;
            seconds * running_bpm / 60.0
        }
    }
}
