//! MIDI loader rendering note and tempo sequences.
//!
//! A standard MIDI file is rendered into two frame-level int32 sequences of
//! equal length at a fixed frame rate: the sounding note number (0 is a
//! rest) and the tempo in beats per minute.

use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::error::{DatasetError, Result};
use crate::types::{Array, Payload};

use super::{Index, Loader, Query};

/// Tempo assumed before the first tempo event, in microseconds per beat (120 BPM).
const DEFAULT_TEMPO: u32 = 500_000;

/// Loads `(note_seq, tempo_seq)` per utterance from an index of MIDI paths.
pub struct MidiLoader {
    index: Index,
    rate: u32,
}

impl MidiLoader {
    pub fn open(path: &Path, rate: u32) -> Result<Self> {
        Ok(Self {
            index: Index::read(path)?,
            rate,
        })
    }
}

impl Loader for MidiLoader {
    fn get(&self, query: &Query<'_>) -> Result<Payload> {
        let midi_path = self.index.get(query.id)?;
        let bytes = std::fs::read(midi_path).map_err(|e| DatasetError::io(midi_path, e))?;
        let augment = query.augment_or_identity();

        let (notes, tempo) = render(&bytes, self.rate, augment.time_factor)
            .map_err(|e| DatasetError::decode_failed(format!("{}: {}", midi_path, e.message)))?;
        let notes = shift_notes(notes, augment.pitch_shift);

        Ok(Payload::Tuple(vec![
            Payload::Array(Array::from_i32(notes)),
            Payload::Array(Array::from_i32(tempo)),
        ]))
    }

    fn keys(&self) -> &[String] {
        self.index.keys()
    }
}

#[derive(Debug, Clone, Copy)]
enum NoteEvent {
    Off(u8),
    On(u8),
}

/// Renders MIDI bytes into frame-level note and tempo sequences.
///
/// `time_factor` scales the time axis (1.1 renders 10% more frames).
pub fn render(bytes: &[u8], rate: u32, time_factor: f64) -> Result<(Vec<i32>, Vec<i32>)> {
    let smf = Smf::parse(bytes).map_err(|e| DatasetError::decode_failed(e.to_string()))?;

    let mut tempos: Vec<(u64, u32)> = Vec::new();
    let mut events: Vec<(u64, NoteEvent)> = Vec::new();

    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(t)) => tempos.push((tick, t.as_int())),
                TrackEventKind::Midi { message, .. } => match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        events.push((tick, NoteEvent::On(key.as_int())))
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        events.push((tick, NoteEvent::Off(key.as_int())))
                    }
                    _ => {}
                },
                _ => {}
            }
        }
    }

    tempos.sort_by_key(|(tick, _)| *tick);
    // Offs sort before ons at the same tick so back-to-back notes hand over cleanly.
    events.sort_by_key(|(tick, e)| (*tick, matches!(e, NoteEvent::On(_))));

    let clock = Clock::new(smf.header.timing, &tempos);
    let to_frame = |tick: u64| -> usize {
        (clock.seconds(tick) * time_factor * rate as f64).round() as usize
    };

    let end_tick = events
        .last()
        .map(|(t, _)| *t)
        .into_iter()
        .chain(tempos.last().map(|(t, _)| *t))
        .max()
        .unwrap_or(0);
    let total = to_frame(end_tick);

    let mut notes = vec![0i32; total];
    let mut active: Vec<u8> = Vec::new();
    let mut cursor = 0usize;
    for (tick, event) in &events {
        let frame = to_frame(*tick).min(total);
        if frame > cursor {
            let current = active.last().copied().unwrap_or(0) as i32;
            notes[cursor..frame].fill(current);
            cursor = frame;
        }
        match event {
            NoteEvent::On(key) => active.push(*key),
            NoteEvent::Off(key) => {
                if let Some(pos) = active.iter().rposition(|k| k == key) {
                    active.remove(pos);
                }
            }
        }
    }

    let mut tempo = vec![bpm(DEFAULT_TEMPO); total];
    for (i, (tick, us)) in tempos.iter().enumerate() {
        let start = to_frame(*tick).min(total);
        let end = tempos
            .get(i + 1)
            .map_or(total, |(next, _)| to_frame(*next).min(total));
        tempo[start..end.max(start)].fill(bpm(*us));
    }

    Ok((notes, tempo))
}

/// Adds `semitones` to every sounding note, keeping rests at 0.
fn shift_notes(mut notes: Vec<i32>, semitones: i32) -> Vec<i32> {
    if semitones != 0 {
        for note in notes.iter_mut().filter(|n| **n > 0) {
            *note = (*note + semitones).clamp(1, 127);
        }
    }
    notes
}

fn bpm(us_per_beat: u32) -> i32 {
    if us_per_beat == 0 {
        return 0;
    }
    (60_000_000.0 / us_per_beat as f64).round() as i32
}

/// Converts ticks to seconds through the tempo map.
struct Clock<'a> {
    timing: Timing,
    tempos: &'a [(u64, u32)],
}

impl<'a> Clock<'a> {
    fn new(timing: Timing, tempos: &'a [(u64, u32)]) -> Self {
        Self { timing, tempos }
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self.timing {
            Timing::Timecode(fps, subframes) => {
                tick as f64 / (fps.as_f32() as f64 * subframes as f64)
            }
            Timing::Metrical(ppq) => {
                let ppq = ppq.as_int().max(1) as f64;
                let mut seconds = 0.0;
                let mut last_tick = 0u64;
                let mut us_per_beat = DEFAULT_TEMPO;
                for &(change, us) in self.tempos.iter().take_while(|(t, _)| *t < tick) {
                    seconds += (change - last_tick) as f64 * us_per_beat as f64 / ppq / 1e6;
                    last_tick = change;
                    us_per_beat = us;
                }
                seconds + (tick - last_tick) as f64 * us_per_beat as f64 / ppq / 1e6
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u15, u24, u28, u4, u7};
    use midly::{Format, Header, TrackEvent};
    use tempfile::tempdir;

    fn event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::from(delta),
            kind,
        }
    }

    fn note(delta: u32, key: u8, on: bool) -> TrackEvent<'static> {
        let message = if on {
            MidiMessage::NoteOn {
                key: u7::from(key),
                vel: u7::from(100),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::from(key),
                vel: u7::from(0),
            }
        };
        event(
            delta,
            TrackEventKind::Midi {
                channel: u4::from(0),
                message,
            },
        )
    }

    /// One beat (0.5 s at 120 BPM) of key 60, then one beat of key 64 at 60 BPM.
    fn two_notes() -> Vec<u8> {
        let track = vec![
            event(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::from(500_000)))),
            note(0, 60, true),
            note(480, 60, false),
            event(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::from(1_000_000)))),
            note(0, 64, true),
            note(480, 64, false),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];
        let smf = Smf {
            header: Header::new(Format::SingleTrack, Timing::Metrical(u15::from(480))),
            tracks: vec![track],
        };
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn renders_notes_and_tempo() {
        let (notes, tempo) = render(&two_notes(), 100, 1.0).unwrap();
        assert_eq!(notes.len(), 150);
        assert_eq!(tempo.len(), 150);
        assert!(notes[..50].iter().all(|&n| n == 60));
        assert!(notes[50..].iter().all(|&n| n == 64));
        assert!(tempo[..50].iter().all(|&t| t == 120));
        assert!(tempo[50..].iter().all(|&t| t == 60));
    }

    #[test]
    fn time_factor_scales_frames() {
        let (notes, _) = render(&two_notes(), 100, 2.0).unwrap();
        assert_eq!(notes.len(), 300);
    }

    #[test]
    fn pitch_shift_skips_rests() {
        assert_eq!(shift_notes(vec![0, 60, 126], 3), vec![0, 63, 127]);
        assert_eq!(shift_notes(vec![2, 0], -5), vec![1, 0]);
    }

    #[test]
    fn loader_applies_augmentation() {
        let dir = tempdir().unwrap();
        let mid = dir.path().join("a.mid");
        std::fs::write(&mid, two_notes()).unwrap();
        let scp = dir.path().join("midi.scp");
        std::fs::write(&scp, format!("u1 {}\n", mid.display())).unwrap();

        let loader = MidiLoader::open(&scp, 100).unwrap();
        let payload = loader
            .get(&Query::augmented("u1", crate::loader::Augment::new(2, 1.0)))
            .unwrap();
        let Payload::Tuple(items) = payload else {
            panic!("expected tuple");
        };
        let Payload::Array(notes) = &items[0] else {
            panic!("expected notes array");
        };
        assert_eq!(notes.as_i32().unwrap()[[0]], 62);
        assert_eq!(notes.mean().map(|m| m.round()), Some(65.0));
    }

    #[test]
    fn garbage_is_decode_error() {
        let err = render(b"not a midi file", 100, 1.0).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::DecodeFailed);
    }
}
