// Test fixtures - writes small MIDI groove files with midly

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use std::path::{Path, PathBuf};

use super::pattern::{NoteEvent, Pattern, TimeSignature, TimedEvent};

#[derive(Debug, Clone, Copy)]
pub struct FixtureNote {
    pub on_beats: f64,
    pub off_beats: f64,
    pub key: u8,
}

pub fn note(on_beats: f64, off_beats: f64, key: u8) -> FixtureNote {
    FixtureNote {
        on_beats,
        off_beats,
        key,
    }
}

#[derive(Debug, Clone)]
pub struct GrooveFixture {
    pub notes: Vec<FixtureNote>,
    /// (numerator, denominator as power of two)
    pub time_signature: Option<(u8, u8)>,
    pub tempo_bpm: Option<f64>,
    pub ppq: u16,
}

impl Default for GrooveFixture {
    fn default() -> Self {
        GrooveFixture {
            notes: Vec::new(),
            time_signature: None,
            tempo_bpm: None,
            ppq: 480,
        }
    }
}

pub fn write_groove_bytes(fixture: &GrooveFixture) -> Vec<u8> {
    let ppq = fixture.ppq as f64;
    let mut events: Vec<(u32, TrackEventKind)> = Vec::new();

    if let Some(bpm) = fixture.tempo_bpm {
        let us = (60_000_000.0 / bpm) as u32;
        events.push((0, TrackEventKind::Meta(MetaMessage::Tempo(us.into()))));
    }
    if let Some((numerator, denominator_pow)) = fixture.time_signature {
        events.push((
            0,
            TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denominator_pow, 24, 8)),
        ));
    }
    for n in &fixture.notes {
        events.push((
            (n.on_beats * ppq).round() as u32,
            TrackEventKind::Midi {
                channel: 9.into(),
                message: MidiMessage::NoteOn {
                    key: n.key.into(),
                    vel: 100.into(),
                },
            },
        ));
        events.push((
            (n.off_beats * ppq).round() as u32,
            TrackEventKind::Midi {
                channel: 9.into(),
                message: MidiMessage::NoteOff {
                    key: n.key.into(),
                    vel: 0.into(),
                },
            },
        ));
    }
    events.sort_by_key(|(tick, _)| *tick);

    let mut track: Track = Track::new();
    let mut last_tick = 0;
    for (tick, kind) in events {
        track.push(TrackEvent {
            delta: (tick - last_tick).into(),
            kind,
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(fixture.ppq.into()),
        },
        tracks: vec![track],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes).expect("write fixture midi");
    bytes
}

pub fn write_groove(dir: &Path, file_name: &str, fixture: &GrooveFixture) -> PathBuf {
    std::fs::create_dir_all(dir).expect("create fixture dir");
    let path = dir.join(file_name);
    std::fs::write(&path, write_groove_bytes(fixture)).expect("write fixture file");
    path
}

/// In-memory pattern with note-on/note-off pairs of the given length
pub fn pattern_from_notes(notes: &[FixtureNote], time_signature: TimeSignature) -> Pattern {
    let mut events = Vec::new();
    for n in notes {
        events.push(TimedEvent {
            time_beats: n.on_beats,
            event: NoteEvent::On {
                channel: 9,
                key: n.key,
                velocity: 100,
            },
        });
        events.push(TimedEvent {
            time_beats: n.off_beats,
            event: NoteEvent::Off {
                channel: 9,
                key: n.key,
            },
        });
    }
    Pattern::new(events, time_signature, None)
}

/// In-memory pattern of note-starts only
pub fn pattern_from_hits(hits: &[(f64, u8)]) -> Pattern {
    let events = hits
        .iter()
        .map(|&(time_beats, key)| TimedEvent {
            time_beats,
            event: NoteEvent::On {
                channel: 9,
                key,
                velocity: 100,
            },
        })
        .collect();
    Pattern::new(events, TimeSignature::default(), None)
}
