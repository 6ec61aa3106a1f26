//! Loader-type registry.
//!
//! Resolves a loader-type tag such as `sound` or `rand_int_0_10` to a
//! [`LoaderKind`] and builds the adapter-wrapped loader for a path. Tags are
//! probed in a fixed order against patterns compiled once.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::adapter::{Adapter, LabelAdapter, MidiAdapter, PlainAdapter, SoundAdapter};
use crate::config::DatasetConfig;
use crate::error::{DatasetError, Result};
use crate::types::FloatPrecision;

use super::kaldi::KaldiArkLoader;
use super::label::LabelLoader;
use super::midi::MidiLoader;
use super::npy::NpyLoader;
use super::random::{RandomKind, RandomLoader};
use super::sound::SoundLoader;
use super::text::{NumericFormat, NumericTextLoader, TextLoader};

/// A construction parameter a loader type draws from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    FloatDtype,
    MaxCacheFd,
    LoaderType,
    MidiRate,
    Seed,
}

impl Param {
    /// Name of the setting, as spelled in the configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Param::FloatDtype => "float_dtype",
            Param::MaxCacheFd => "max_cache_fd",
            Param::LoaderType => "loader_type",
            Param::MidiRate => "midi_rate",
            Param::Seed => "seed",
        }
    }
}

/// Resolved loader type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoaderKind {
    Sound,
    Midi,
    Duration,
    KaldiArk,
    Npy,
    Numeric(NumericFormat),
    Text,
    RandFloat,
    RandInt { low: i64, high: i64 },
}

/// Values available to loader constructors.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildContext {
    pub float_dtype: FloatPrecision,
    pub max_cache_fd: usize,
    pub midi_rate: u32,
    pub seed: Option<u64>,
}

impl BuildContext {
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            float_dtype: config.float_dtype,
            max_cache_fd: config.max_cache_fd,
            midi_rate: config.midi_rate,
            seed: config.seed,
        }
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::from_config(&DatasetConfig::default())
    }
}

struct Entry {
    pattern: &'static str,
    params: &'static [Param],
    help: &'static str,
    resolve: fn(&str) -> Result<LoaderKind>,
}

/// Registered types in probe order.
static ENTRIES: &[Entry] = &[
    Entry {
        pattern: "sound",
        params: &[Param::FloatDtype],
        help: "Audio files (WAV).\n\n   utterance_id_a a.wav\n   utterance_id_b b.wav\n   ...",
        resolve: |_| Ok(LoaderKind::Sound),
    },
    Entry {
        pattern: "midi",
        params: &[Param::MidiRate],
        help: "Standard MIDI files, rendered to note and tempo sequences.\n\n   \
               utterance_id_a a.mid\n   utterance_id_b b.mid\n   ...",
        resolve: |_| Ok(LoaderKind::Midi),
    },
    Entry {
        pattern: "duration",
        params: &[],
        help: "Phone intervals as start/end/phone triples.\n\n   \
               utterance_id_A start_time_1 end_time_1 phone_1 start_time_2 end_time_2 phone_2 ...\n   ...",
        resolve: |_| Ok(LoaderKind::Duration),
    },
    Entry {
        pattern: "kaldi_ark",
        params: &[Param::MaxCacheFd, Param::FloatDtype],
        help: "Kaldi-ark file type.\n\n   utterance_id_A /some/where/a.ark:123\n   \
               utterance_id_B /some/where/a.ark:456\n   ...",
        resolve: |_| Ok(LoaderKind::KaldiArk),
    },
    Entry {
        pattern: "npy",
        params: &[],
        help: "Npy file format.\n\n   utterance_id_A /some/where/a.npy\n   \
               utterance_id_B /some/where/b.npy\n   ...",
        resolve: |_| Ok(LoaderKind::Npy),
    },
    Entry {
        pattern: "text_int",
        params: &[],
        help: "Integer sequences separated by space.\n\n   utterance_id_A 12 0 1 3\n   \
               utterance_id_B 3 3 1\n   ...",
        resolve: |_| Ok(LoaderKind::Numeric(NumericFormat::TextInt)),
    },
    Entry {
        pattern: "csv_int",
        params: &[],
        help: "Integer sequences separated by comma.\n\n   utterance_id_A 100,80\n   \
               utterance_id_B 143,80\n   ...",
        resolve: |_| Ok(LoaderKind::Numeric(NumericFormat::CsvInt)),
    },
    Entry {
        pattern: "text_float",
        params: &[],
        help: "Float sequences separated by space.\n\n   utterance_id_A 12. 3.1 3.4 4.4\n   \
               utterance_id_B 3. 3.12 1.1\n   ...",
        resolve: |_| Ok(LoaderKind::Numeric(NumericFormat::TextFloat)),
    },
    Entry {
        pattern: "csv_float",
        params: &[],
        help: "Float sequences separated by comma.\n\n   utterance_id_A 12.,3.1,3.4,4.4\n   \
               utterance_id_B 3.,3.12,1.1\n   ...",
        resolve: |_| Ok(LoaderKind::Numeric(NumericFormat::CsvFloat)),
    },
    Entry {
        pattern: "text",
        params: &[],
        help: "Text returned as is; preprocessing must encode it.\n\n   \
               utterance_id_A hello world\n   utterance_id_B foo bar\n   ...",
        resolve: |_| Ok(LoaderKind::Text),
    },
    Entry {
        pattern: "rand_float",
        params: &[Param::Seed],
        help: "Random float arrays of the given shapes.\n\n   utterance_id_A 3,4\n   \
               utterance_id_B 10,4\n   ...",
        resolve: |_| Ok(LoaderKind::RandFloat),
    },
    Entry {
        pattern: r"rand_int_\d+_\d+",
        params: &[Param::LoaderType, Param::Seed],
        help: "e.g. 'rand_int_0_10'. Random integer arrays of the given shapes, \
               drawn from [low, high).\n\n   utterance_id_A 3,4\n   utterance_id_B 10,4\n   ...",
        resolve: parse_rand_int,
    },
];

/// Anchored patterns, parallel to `ENTRIES`.
static PATTERNS: Lazy<Vec<Option<Regex>>> = Lazy::new(|| {
    ENTRIES
        .iter()
        .map(|e| Regex::new(&format!("^(?:{})$", e.pattern)).ok())
        .collect()
});

fn entry_for(loader_type: &str) -> Result<&'static Entry> {
    PATTERNS
        .iter()
        .position(|re| re.as_ref().is_some_and(|re| re.is_match(loader_type)))
        .map(|i| &ENTRIES[i])
        .ok_or_else(|| DatasetError::unknown_loader_type(loader_type))
}

fn parse_rand_int(loader_type: &str) -> Result<LoaderKind> {
    let bounds = loader_type.trim_start_matches("rand_int_");
    let parsed = bounds
        .split_once('_')
        .and_then(|(low, high)| Some((low.parse::<i64>().ok()?, high.parse::<i64>().ok()?)));
    match parsed {
        Some((low, high)) if low < high => Ok(LoaderKind::RandInt { low, high }),
        Some((low, high)) => Err(DatasetError::malformed_loader_type(
            loader_type,
            format!("low ({}) must be < high ({})", low, high),
        )),
        None => Err(DatasetError::malformed_loader_type(
            loader_type,
            "e.g. rand_int_3_10",
        )),
    }
}

/// Resolves a loader-type tag.
///
/// Fails with UNKNOWN_LOADER_TYPE when no pattern matches and with
/// MALFORMED_LOADER_TYPE when a parametrized tag has invalid parameters.
pub fn resolve(loader_type: &str) -> Result<LoaderKind> {
    (entry_for(loader_type)?.resolve)(loader_type)
}

/// Construction parameters the matching loader type needs.
pub fn required_params(loader_type: &str) -> Result<&'static [Param]> {
    Ok(entry_for(loader_type)?.params)
}

/// Registered patterns with their help texts, in probe order. Each help text
/// ends with the settings the loader type is built from.
pub fn describe_loader_types() -> Vec<(&'static str, String)> {
    ENTRIES
        .iter()
        .map(|e| {
            let params: Vec<&str> = e.params.iter().map(Param::as_str).collect();
            let help = if params.is_empty() {
                format!("{}\nparameters: none", e.help)
            } else {
                format!("{}\nparameters: {}", e.help, params.join(", "))
            };
            (e.pattern, help)
        })
        .collect()
}

impl LoaderKind {
    /// Opens the loader over `path` and wraps it in the matching adapter.
    pub fn build(&self, path: &Path, ctx: &BuildContext) -> Result<Box<dyn Adapter>> {
        tracing::debug!(path = %path.display(), kind = ?self, "building loader");
        let adapter: Box<dyn Adapter> = match *self {
            LoaderKind::Sound => Box::new(SoundAdapter::new(
                Box::new(SoundLoader::open(path)?),
                Some(ctx.float_dtype),
            )),
            LoaderKind::Midi => Box::new(MidiAdapter::new(Box::new(MidiLoader::open(
                path,
                ctx.midi_rate,
            )?))),
            LoaderKind::Duration => Box::new(LabelAdapter::new(Box::new(LabelLoader::open(path)?))),
            LoaderKind::KaldiArk => Box::new(SoundAdapter::features(
                Box::new(KaldiArkLoader::open(path, ctx.max_cache_fd)?),
                Some(ctx.float_dtype),
            )),
            LoaderKind::Npy => Box::new(PlainAdapter::new(Box::new(NpyLoader::open(path)?))),
            LoaderKind::Numeric(format) => Box::new(PlainAdapter::new(Box::new(
                NumericTextLoader::open(path, format)?,
            ))),
            LoaderKind::Text => Box::new(PlainAdapter::new(Box::new(TextLoader::open(path)?))),
            LoaderKind::RandFloat => Box::new(PlainAdapter::new(Box::new(RandomLoader::open(
                path,
                RandomKind::Float,
                ctx.seed,
            )?))),
            LoaderKind::RandInt { low, high } => Box::new(PlainAdapter::new(Box::new(
                RandomLoader::open(path, RandomKind::Int { low, high }, ctx.seed)?,
            ))),
        };
        Ok(adapter)
    }
}

/// Resolves `loader_type` and builds its adapter over `path`.
///
/// Failures are logged with the loader type and path before propagating.
pub fn build_adapter(path: &Path, loader_type: &str, ctx: &BuildContext) -> Result<Box<dyn Adapter>> {
    resolve(loader_type)
        .and_then(|kind| kind.build(path, ctx))
        .map_err(|e| {
            tracing::error!(path = %path.display(), loader_type, error = %e, "failed to build loader");
            e
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn resolves_exact_tags() {
        assert_eq!(resolve("sound").unwrap(), LoaderKind::Sound);
        assert_eq!(resolve("duration").unwrap(), LoaderKind::Duration);
        assert_eq!(
            resolve("csv_float").unwrap(),
            LoaderKind::Numeric(NumericFormat::CsvFloat)
        );
        assert_eq!(resolve("text").unwrap(), LoaderKind::Text);
    }

    #[test]
    fn patterns_are_anchored() {
        assert_eq!(resolve("sounds").unwrap_err().code, ErrorCode::UnknownLoaderType);
        assert_eq!(resolve("text_int2").unwrap_err().code, ErrorCode::UnknownLoaderType);
        assert_eq!(resolve("hdf5").unwrap_err().code, ErrorCode::UnknownLoaderType);
    }

    #[test]
    fn rand_int_bounds() {
        assert_eq!(
            resolve("rand_int_3_10").unwrap(),
            LoaderKind::RandInt { low: 3, high: 10 }
        );
        assert_eq!(
            resolve("rand_int_10_3").unwrap_err().code,
            ErrorCode::MalformedLoaderType
        );
        assert_eq!(
            resolve("rand_int_5_5").unwrap_err().code,
            ErrorCode::MalformedLoaderType
        );
        assert_eq!(
            resolve("rand_int_99999999999999999999_1").unwrap_err().code,
            ErrorCode::MalformedLoaderType
        );
    }

    #[test]
    fn params_per_type() {
        assert_eq!(required_params("sound").unwrap(), &[Param::FloatDtype]);
        assert_eq!(
            required_params("rand_int_0_1").unwrap(),
            &[Param::LoaderType, Param::Seed]
        );
        assert!(required_params("wat").is_err());
    }

    #[test]
    fn every_type_is_described() {
        let described = describe_loader_types();
        assert_eq!(described.len(), 12);
        assert!(described.iter().all(|(_, help)| !help.is_empty()));

        let (_, sound) = described.iter().find(|(p, _)| *p == "sound").unwrap();
        assert!(sound.ends_with("parameters: float_dtype"));
        let (_, rand_int) = described
            .iter()
            .find(|(p, _)| p.starts_with("rand_int"))
            .unwrap();
        assert!(rand_int.ends_with("parameters: loader_type, seed"));
    }

    #[test]
    fn build_over_missing_index_fails() {
        let err = build_adapter(
            Path::new("/nonexistent/wav.scp"),
            "sound",
            &BuildContext::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.code, ErrorCode::IoFailed);
    }

    #[test]
    fn build_text_adapter() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "u1 hello\n").unwrap();
        let adapter = build_adapter(file.path(), "text", &BuildContext::default()).unwrap();
        assert_eq!(adapter.keys(), &["u1"]);
        assert!(!adapter.is_augmentable());
    }
}
