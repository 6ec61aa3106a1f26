//! Audio loader over an index of WAV paths.

use std::path::Path;

use crate::audio::{augment_wave, read_wav};
use crate::error::Result;
use crate::types::{Array, Payload};

use super::{Index, Loader, Query};

/// Loads `(rate, wave)` per utterance from an index such as:
///
/// ```text
/// utterance_id_a /some/where/a.wav
/// utterance_id_b /some/where/b.wav
/// ```
///
/// Waves are normalized to [-1, 1]. Queries that carry augmentation get a
/// pitch-shifted and time-stretched wave.
pub struct SoundLoader {
    index: Index,
}

impl SoundLoader {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            index: Index::read(path)?,
        })
    }
}

impl Loader for SoundLoader {
    fn get(&self, query: &Query<'_>) -> Result<Payload> {
        let wav_path = self.index.get(query.id)?;
        let (wave, rate) = read_wav(Path::new(wav_path))?;

        let wave = match query.augment {
            Some(augment) if !augment.is_identity() => augment_wave(&wave, augment)?,
            _ => wave,
        };

        Ok(Payload::Tuple(vec![
            Payload::Int(rate as i64),
            Payload::Array(Array::F32(wave)),
        ]))
    }

    fn keys(&self) -> &[String] {
        self.index.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav;
    use crate::loader::Augment;
    use tempfile::tempdir;

    #[test]
    fn two_column_index_round_trip() {
        let dir = tempdir().unwrap();
        let mut index = String::new();
        for (id, name) in [("u1", "a.wav"), ("u2", "b.wav")] {
            let path = dir.path().join(name);
            write_wav(&path, &[0.0, 0.1, 0.2], 24000, 1).unwrap();
            index.push_str(&format!("{} {}\n", id, path.display()));
        }
        let scp = dir.path().join("wav.scp");
        std::fs::write(&scp, index).unwrap();

        let loader = SoundLoader::open(&scp).unwrap();
        assert_eq!(loader.len(), 2);
        assert_eq!(loader.keys(), &["u1", "u2"]);

        for id in ["u1", "u2"] {
            match loader.get(&Query::plain(id)).unwrap() {
                Payload::Tuple(items) => {
                    assert_eq!(items[0], Payload::Int(24000));
                    assert!(matches!(&items[1], Payload::Array(a) if a.len() == 3));
                }
                other => panic!("unexpected payload {:?}", other),
            }
        }
    }

    #[test]
    fn augmented_query_stretches() {
        let dir = tempdir().unwrap();
        let wav = dir.path().join("a.wav");
        let samples: Vec<f32> = (0..4000).map(|i| (i as f32 * 0.05).sin()).collect();
        write_wav(&wav, &samples, 16000, 1).unwrap();
        let scp = dir.path().join("wav.scp");
        std::fs::write(&scp, format!("u1 {}\n", wav.display())).unwrap();

        let loader = SoundLoader::open(&scp).unwrap();
        let payload = loader
            .get(&Query::augmented("u1", Augment::new(0, 1.1)))
            .unwrap();
        let Payload::Tuple(items) = payload else {
            panic!("expected tuple");
        };
        assert!(matches!(&items[1], Payload::Array(a) if a.len() == 4400));
    }
}
