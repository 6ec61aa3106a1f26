//! Dataset configuration module.
//!
//! Contains every knob of the dataset engine: numeric precisions, cache
//! budget and placement, alignment exemptions, mode and augmentation bounds.
//! The configuration is plain serde data; it can be built in code, read from
//! a JSON file, or overridden from environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DatasetError, Result};
pub use crate::types::{FloatPrecision, IntPrecision};

/// Default frame rate of rendered MIDI sequences (one frame per audio sample at 24kHz).
pub const DEFAULT_MIDI_RATE: u32 = 24000;

/// Dataset mode. Only training mode samples augmentation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Mode {
    Train,
    #[default]
    Valid,
    /// Any other evaluation mode (e.g. `plot_att`); behaves like `Valid`.
    Other(String),
}

impl Mode {
    pub fn parse(s: &str) -> Self {
        match s {
            "train" => Mode::Train,
            "valid" => Mode::Valid,
            other => Mode::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Mode::Train => "train",
            Mode::Valid => "valid",
            Mode::Other(s) => s,
        }
    }

    pub fn is_training(&self) -> bool {
        matches!(self, Mode::Train)
    }
}

impl From<String> for Mode {
    fn from(s: String) -> Self {
        Mode::parse(&s)
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.as_str().to_string()
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target mean note value of one speaker, matched by substring of the utterance id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerPitch {
    pub tag: String,
    pub mean: f64,
}

/// Corpus pitch-mean target driving pitch augmentation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "PitchMeanSpec", into = "PitchMeanSpec")]
pub enum PitchMeanTarget {
    /// Pitch shifts are drawn from `[pitch_aug_min, pitch_aug_max]`.
    #[default]
    Disabled,
    /// One target for every utterance.
    Global(f64),
    /// One target per speaker; exactly one tag must occur in each utterance id.
    PerSpeaker(Vec<SpeakerPitch>),
}

impl PitchMeanTarget {
    /// Parses the literal forms `None`, `62.5` and `[61.0, 63.5]`.
    ///
    /// The list form is zipped with `speaker_tags`, which must have the same
    /// length. The literal is parsed, never evaluated.
    pub fn parse(literal: &str, speaker_tags: &[String]) -> Result<Self> {
        let literal = literal.trim();
        if literal.is_empty() || literal.eq_ignore_ascii_case("none") {
            return Ok(PitchMeanTarget::Disabled);
        }

        if let Some(inner) = literal.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let means = inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    DatasetError::invalid_config(format!("pitch_mean list {}: {}", literal, e))
                })?;
            if means.len() != speaker_tags.len() {
                return Err(DatasetError::invalid_config(format!(
                    "pitch_mean lists {} values but {} speaker tags are configured",
                    means.len(),
                    speaker_tags.len()
                )));
            }
            let speakers = speaker_tags
                .iter()
                .zip(means)
                .map(|(tag, mean)| SpeakerPitch { tag: tag.clone(), mean })
                .collect();
            return Ok(PitchMeanTarget::PerSpeaker(speakers));
        }

        literal
            .parse::<f64>()
            .map(PitchMeanTarget::Global)
            .map_err(|e| DatasetError::invalid_config(format!("pitch_mean {}: {}", literal, e)))
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, PitchMeanTarget::Disabled)
    }

    /// Target mean for one utterance, `None` when targeting is disabled.
    pub fn target_for(&self, id: &str) -> Result<Option<f64>> {
        match self {
            PitchMeanTarget::Disabled => Ok(None),
            PitchMeanTarget::Global(mean) => Ok(Some(*mean)),
            PitchMeanTarget::PerSpeaker(speakers) => {
                let mut found = speakers.iter().filter(|s| id.contains(s.tag.as_str()));
                match (found.next(), found.next()) {
                    (Some(speaker), None) => Ok(Some(speaker.mean)),
                    (None, _) => Err(DatasetError::speaker_tag_mismatch(id, 0)),
                    (Some(_), Some(_)) => Err(DatasetError::speaker_tag_mismatch(
                        id,
                        speakers.iter().filter(|s| id.contains(s.tag.as_str())).count(),
                    )),
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PitchMeanSpec {
    Off(Option<()>),
    Number(f64),
    Speakers(Vec<SpeakerPitch>),
    Literal(String),
}

impl TryFrom<PitchMeanSpec> for PitchMeanTarget {
    type Error = DatasetError;

    fn try_from(spec: PitchMeanSpec) -> Result<Self> {
        match spec {
            PitchMeanSpec::Off(_) => Ok(PitchMeanTarget::Disabled),
            PitchMeanSpec::Number(mean) => Ok(PitchMeanTarget::Global(mean)),
            PitchMeanSpec::Speakers(speakers) => Ok(PitchMeanTarget::PerSpeaker(speakers)),
            PitchMeanSpec::Literal(s) => PitchMeanTarget::parse(&s, &[]),
        }
    }
}

impl From<PitchMeanTarget> for PitchMeanSpec {
    fn from(target: PitchMeanTarget) -> Self {
        match target {
            PitchMeanTarget::Disabled => PitchMeanSpec::Off(None),
            PitchMeanTarget::Global(mean) => PitchMeanSpec::Number(mean),
            PitchMeanTarget::PerSpeaker(speakers) => PitchMeanSpec::Speakers(speakers),
        }
    }
}

/// Where assembled records are cached.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheMode {
    /// In-process map, private to one worker.
    #[default]
    Local,
    /// Directory of record entries visible to every worker process.
    Shared {
        /// If None, uses the platform-specific default cache location.
        #[serde(default)]
        dir: Option<PathBuf>,
    },
}

/// Configuration for [`SvsDataset`](crate::SvsDataset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Precision every float array is cast to.
    pub float_dtype: FloatPrecision,

    /// Precision every integer array is cast to.
    pub int_dtype: IntPrecision,

    /// Record cache budget in bytes. 0 disables caching.
    /// Accepts a number or a size string such as "1.5GB" or "512MiB".
    #[serde(deserialize_with = "deserialize_size")]
    pub max_cache_size: u64,

    /// Placement of the record cache.
    pub cache_mode: CacheMode,

    /// Maximum open file descriptors kept by lazily reading loaders.
    /// 0 opens a fresh handle per query.
    pub max_cache_fd: usize,

    /// Modality names exempt from length alignment.
    pub not_align: Vec<String>,

    /// Dataset mode; augmentation only runs in "train".
    pub mode: Mode,

    /// Inclusive bounds of uniformly drawn pitch shifts.
    pub pitch_aug_min: i32,
    pub pitch_aug_max: i32,

    /// Pitch-mean target; requires both pitch bounds to be 0.
    pub pitch_mean: PitchMeanTarget,

    /// Inclusive bounds of the time factor, drawn in steps of 0.01.
    pub time_aug_min: f64,
    pub time_aug_max: f64,

    /// Crop a random 80-100% window of every aligned modality.
    pub random_crop: bool,

    /// Zero a random span of up to 20% of every aligned modality.
    pub mask_aug: bool,

    /// Frames per second of rendered MIDI sequences.
    pub midi_rate: u32,

    /// Seed for augmentation and random loaders. If None, seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            float_dtype: FloatPrecision::Float32,
            int_dtype: IntPrecision::Int64,
            max_cache_size: 0,
            cache_mode: CacheMode::Local,
            max_cache_fd: 0,
            not_align: vec!["text".to_string()],
            mode: Mode::Valid,
            pitch_aug_min: 0,
            pitch_aug_max: 0,
            pitch_mean: PitchMeanTarget::Disabled,
            time_aug_min: 1.0,
            time_aug_max: 1.0,
            random_crop: false,
            mask_aug: false,
            midi_rate: DEFAULT_MIDI_RATE,
            seed: None,
        }
    }
}

impl DatasetConfig {
    /// Creates a new DatasetConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| DatasetError::io(path.display(), e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Applies environment variable overrides.
    ///
    /// Reads the following environment variables:
    /// - `SVS_MAX_CACHE_SIZE` - Cache budget, bytes or size string
    /// - `SVS_MAX_CACHE_FD` - Maximum open file descriptors
    /// - `SVS_SEED` - Augmentation seed
    /// - `SVS_CACHE_DIR` - Switches to the shared cache in this directory
    /// - `SVS_MODE` - Dataset mode (train, valid, ...)
    ///
    /// Unset or unparsable variables leave the current value.
    pub fn with_env(mut self) -> Self {
        if let Ok(size) = std::env::var("SVS_MAX_CACHE_SIZE") {
            if let Some(bytes) = parse_size(&size) {
                self.max_cache_size = bytes;
            }
        }

        if let Ok(fd) = std::env::var("SVS_MAX_CACHE_FD") {
            if let Ok(fd) = fd.parse::<usize>() {
                self.max_cache_fd = fd;
            }
        }

        if let Ok(seed) = std::env::var("SVS_SEED") {
            if let Ok(seed) = seed.parse::<u64>() {
                self.seed = Some(seed);
            }
        }

        if let Ok(dir) = std::env::var("SVS_CACHE_DIR") {
            self.cache_mode = CacheMode::Shared {
                dir: Some(PathBuf::from(dir)),
            };
        }

        if let Ok(mode) = std::env::var("SVS_MODE") {
            if !mode.is_empty() {
                self.mode = Mode::parse(&mode);
            }
        }

        self
    }

    /// Creates a DatasetConfig from defaults plus environment overrides.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Returns the effective shared cache directory, using platform defaults if not specified.
    pub fn effective_cache_dir(&self) -> PathBuf {
        match &self.cache_mode {
            CacheMode::Shared { dir: Some(dir) } => dir.clone(),
            _ => default_cache_dir(),
        }
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.pitch_aug_min > self.pitch_aug_max {
            return Some(format!(
                "pitch_aug_min ({}) must be <= pitch_aug_max ({})",
                self.pitch_aug_min, self.pitch_aug_max
            ));
        }

        if !self.time_aug_min.is_finite() || !self.time_aug_max.is_finite() {
            return Some(format!(
                "time augmentation bounds must be finite, got {}..{}",
                self.time_aug_min, self.time_aug_max
            ));
        }

        if !(self.time_aug_min > 0.0) {
            return Some(format!("time_aug_min must be > 0, got {}", self.time_aug_min));
        }

        if self.time_aug_min > self.time_aug_max {
            return Some(format!(
                "time_aug_min ({}) must be <= time_aug_max ({})",
                self.time_aug_min, self.time_aug_max
            ));
        }

        if self.pitch_mean.is_enabled() && (self.pitch_aug_min != 0 || self.pitch_aug_max != 0) {
            return Some("pitch_mean requires pitch_aug_min == pitch_aug_max == 0".to_string());
        }

        if let PitchMeanTarget::PerSpeaker(speakers) = &self.pitch_mean {
            if speakers.is_empty() {
                return Some("pitch_mean speaker list is empty".to_string());
            }
            if speakers.iter().any(|s| s.tag.is_empty()) {
                return Some("pitch_mean speaker tags must be non-empty".to_string());
            }
        }

        if self.midi_rate == 0 {
            return Some("midi_rate must be > 0".to_string());
        }

        None
    }
}

/// Parses a byte count such as `1024`, `"1.5GB"`, `"512 MiB"` or `"10k"`.
///
/// Units without `i` are decimal (1 KB = 1000 bytes), units with `i` are
/// binary (1 KiB = 1024 bytes). A bare number is a byte count.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: f64 = number.parse().ok()?;
    let unit = unit.trim().to_ascii_lowercase();

    let multiplier: f64 = match unit.as_str() {
        "" | "b" | "byte" | "bytes" => 1.0,
        "k" | "kb" => 1e3,
        "m" | "mb" => 1e6,
        "g" | "gb" => 1e9,
        "t" | "tb" => 1e12,
        "p" | "pb" => 1e15,
        "ki" | "kib" => 1024.0,
        "mi" | "mib" => 1024f64.powi(2),
        "gi" | "gib" => 1024f64.powi(3),
        "ti" | "tib" => 1024f64.powi(4),
        "pi" | "pib" => 1024f64.powi(5),
        _ => return None,
    };

    Some((number * multiplier).round() as u64)
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Float(f64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Bytes(n) => Ok(n),
        Size::Float(f) if f >= 0.0 => Ok(f.round() as u64),
        Size::Float(f) => Err(serde::de::Error::custom(format!("negative cache size {}", f))),
        Size::Text(s) => parse_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid cache size {:?}", s))),
    }
}

/// Returns the platform-specific default shared cache path.
///
/// Uses the `directories` crate to find appropriate locations:
/// - macOS: ~/Library/Caches/svs-dataset/records
/// - Linux: ~/.cache/svs-dataset/records
/// - Windows: C:\Users\<user>\AppData\Local\svs-dataset\cache\records
fn default_cache_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "svs-dataset") {
        proj_dirs.cache_dir().join("records")
    } else {
        // Fallback to current directory
        PathBuf::from("./svs-cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!(Mode::parse("train"), Mode::Train);
        assert_eq!(Mode::parse("valid"), Mode::Valid);
        assert_eq!(Mode::parse("plot_att"), Mode::Other("plot_att".into()));
        assert!(Mode::Train.is_training());
        assert!(!Mode::parse("plot_att").is_training());
    }

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("0"), Some(0));
        assert_eq!(parse_size("1024"), Some(1024));
        assert_eq!(parse_size("10k"), Some(10_000));
        assert_eq!(parse_size("1.5GB"), Some(1_500_000_000));
        assert_eq!(parse_size("512 MiB"), Some(512 * 1024 * 1024));
        assert_eq!(parse_size("3 parsecs"), None);
        assert_eq!(parse_size("MB"), None);
    }

    #[test]
    fn pitch_mean_literals() {
        assert_eq!(PitchMeanTarget::parse("None", &[]).unwrap(), PitchMeanTarget::Disabled);
        assert_eq!(PitchMeanTarget::parse("62.5", &[]).unwrap(), PitchMeanTarget::Global(62.5));

        let tags = vec!["alto".to_string(), "tenor".to_string()];
        let target = PitchMeanTarget::parse("[60.0, 55.5]", &tags).unwrap();
        assert_eq!(target.target_for("alto_song3_0001").unwrap(), Some(60.0));
        assert_eq!(target.target_for("tenor_song1_0002").unwrap(), Some(55.5));

        assert!(PitchMeanTarget::parse("[60.0]", &tags).is_err());
        assert!(PitchMeanTarget::parse("__import__('os')", &[]).is_err());
    }

    #[test]
    fn speaker_tag_must_match_exactly_once() {
        let target = PitchMeanTarget::PerSpeaker(vec![
            SpeakerPitch { tag: "ann".into(), mean: 60.0 },
            SpeakerPitch { tag: "anna".into(), mean: 64.0 },
        ]);
        let none = target.target_for("bob_0001").unwrap_err();
        assert_eq!(none.code, crate::error::ErrorCode::SpeakerTagMismatch);
        let both = target.target_for("anna_0001").unwrap_err();
        assert!(both.message.contains("matches 2"));
        assert_eq!(target.target_for("ann_0001").unwrap(), Some(60.0));
    }

    #[test]
    fn config_validation() {
        let mut config = DatasetConfig::new();
        assert!(config.validate().is_none());

        config.pitch_aug_min = 3;
        config.pitch_aug_max = -3;
        assert!(config.validate().is_some());

        config.pitch_aug_min = -2;
        config.pitch_aug_max = 2;
        config.pitch_mean = PitchMeanTarget::Global(60.0);
        assert!(config.validate().is_some());

        config.pitch_aug_min = 0;
        config.pitch_aug_max = 0;
        assert!(config.validate().is_none());

        config.time_aug_min = 1.2;
        config.time_aug_max = 1.1;
        assert!(config.validate().is_some());

        config.time_aug_min = 1.0;
        config.time_aug_max = f64::NAN;
        assert!(config.validate().is_some());

        config.time_aug_max = f64::INFINITY;
        assert!(config.validate().is_some());

        config.time_aug_min = f64::NAN;
        config.time_aug_max = 1.1;
        assert!(config.validate().is_some());

        config.time_aug_min = 0.9;
        assert!(config.validate().is_none());
    }

    #[test]
    fn deserialize_with_defaults_and_size_string() {
        let json = r#"{
            "mode": "train",
            "max_cache_size": "2MB",
            "pitch_mean": 61.0,
            "cache_mode": {"kind": "shared", "dir": "/tmp/svs"}
        }"#;
        let config: DatasetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, Mode::Train);
        assert_eq!(config.max_cache_size, 2_000_000);
        assert_eq!(config.pitch_mean, PitchMeanTarget::Global(61.0));
        assert_eq!(config.not_align, vec!["text".to_string()]);
        assert_eq!(config.effective_cache_dir(), PathBuf::from("/tmp/svs"));
        assert_eq!(config.int_dtype, IntPrecision::Int64);
    }

    #[test]
    fn pitch_mean_null_and_none_string() {
        let config: DatasetConfig = serde_json::from_str(r#"{"pitch_mean": null}"#).unwrap();
        assert_eq!(config.pitch_mean, PitchMeanTarget::Disabled);
        let config: DatasetConfig = serde_json::from_str(r#"{"pitch_mean": "None"}"#).unwrap();
        assert_eq!(config.pitch_mean, PitchMeanTarget::Disabled);
    }

    #[test]
    fn effective_cache_dir_default() {
        let config = DatasetConfig::new();
        assert!(!config.effective_cache_dir().as_os_str().is_empty());
    }
}
