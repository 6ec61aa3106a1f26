//! Error types for svs-dataset.
//!
//! Every failure in the dataset engine is fatal: configuration errors surface
//! at construction, consistency and type errors at record access. Nothing is
//! retried, so each code carries a hint about what to fix upstream.

use std::fmt;

/// Broad class of an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad dataset declaration or configuration, raised at construction.
    Configuration,
    /// Data that contradicts itself across calls or against the configuration.
    Consistency,
    /// A loader or preprocessing step produced a value of the wrong shape or kind.
    Type,
    /// Underlying storage failed or a file could not be decoded.
    Io,
}

/// Error codes for dataset operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Two modalities were declared with the same name.
    DuplicateModality,

    /// One index file lists the same utterance id twice.
    DuplicateKey,

    /// An index file has no entries.
    EmptyIndex,

    /// No registered loader type matches the declared tag.
    UnknownLoaderType,

    /// A parametrized loader tag matched but its parameters are invalid.
    /// Trigger: `rand_int_10_3` (low >= high) or out-of-range bounds.
    MalformedLoaderType,

    /// Dataset configuration values are inconsistent.
    InvalidConfig,

    /// The requested utterance id is not in a modality's index.
    KeyNotFound,

    /// An ordinal index is past the end of the dataset.
    IndexOutOfRange,

    /// One audio loader served two different sample rates.
    SampleRateMismatch,

    /// Per-speaker pitch targeting found zero or several speaker tags in an id.
    SpeakerTagMismatch,

    /// A loader or preprocessor returned a value of the wrong shape or kind.
    UnexpectedValueType,

    /// An array has an element type that cannot be cast to the target precision.
    UnsupportedDtype,

    /// The preprocessing function changed the set of modality keys.
    PreprocessContract,

    /// A file was readable but its contents could not be decoded.
    DecodeFailed,

    /// Reading from storage failed.
    IoFailed,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DuplicateModality => "DUPLICATE_MODALITY",
            ErrorCode::DuplicateKey => "DUPLICATE_KEY",
            ErrorCode::EmptyIndex => "EMPTY_INDEX",
            ErrorCode::UnknownLoaderType => "UNKNOWN_LOADER_TYPE",
            ErrorCode::MalformedLoaderType => "MALFORMED_LOADER_TYPE",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::KeyNotFound => "KEY_NOT_FOUND",
            ErrorCode::IndexOutOfRange => "INDEX_OUT_OF_RANGE",
            ErrorCode::SampleRateMismatch => "SAMPLE_RATE_MISMATCH",
            ErrorCode::SpeakerTagMismatch => "SPEAKER_TAG_MISMATCH",
            ErrorCode::UnexpectedValueType => "UNEXPECTED_VALUE_TYPE",
            ErrorCode::UnsupportedDtype => "UNSUPPORTED_DTYPE",
            ErrorCode::PreprocessContract => "PREPROCESS_CONTRACT",
            ErrorCode::DecodeFailed => "DECODE_FAILED",
            ErrorCode::IoFailed => "IO_FAILED",
        }
    }

    /// Returns the category this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::DuplicateModality
            | ErrorCode::DuplicateKey
            | ErrorCode::EmptyIndex
            | ErrorCode::UnknownLoaderType
            | ErrorCode::MalformedLoaderType
            | ErrorCode::InvalidConfig => ErrorCategory::Configuration,
            ErrorCode::KeyNotFound
            | ErrorCode::IndexOutOfRange
            | ErrorCode::SampleRateMismatch
            | ErrorCode::SpeakerTagMismatch => ErrorCategory::Consistency,
            ErrorCode::UnexpectedValueType
            | ErrorCode::UnsupportedDtype
            | ErrorCode::PreprocessContract => ErrorCategory::Type,
            ErrorCode::DecodeFailed | ErrorCode::IoFailed => ErrorCategory::Io,
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::DuplicateModality => "A modality name is declared more than once",
            ErrorCode::DuplicateKey => "An utterance id appears twice in one index file",
            ErrorCode::EmptyIndex => "An index file has no samples",
            ErrorCode::UnknownLoaderType => "No loader is registered for the given type",
            ErrorCode::MalformedLoaderType => "The parametrized loader type is malformed",
            ErrorCode::InvalidConfig => "The dataset configuration is inconsistent",
            ErrorCode::KeyNotFound => "The utterance id is missing from a modality index",
            ErrorCode::IndexOutOfRange => "The ordinal index is past the end of the dataset",
            ErrorCode::SampleRateMismatch => "Sampling rates differ within one audio loader",
            ErrorCode::SpeakerTagMismatch => "The utterance id must contain exactly one speaker tag",
            ErrorCode::UnexpectedValueType => "A value has an unexpected shape or kind",
            ErrorCode::UnsupportedDtype => "An array element type cannot be cast",
            ErrorCode::PreprocessContract => "Preprocessing changed the modality keys",
            ErrorCode::DecodeFailed => "File contents could not be decoded",
            ErrorCode::IoFailed => "Reading from storage failed",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::DuplicateModality => "Give every (path, name, type) declaration a unique name",
            ErrorCode::DuplicateKey => "Remove the repeated line from the index file",
            ErrorCode::EmptyIndex => {
                "Check that the index file exists and lists at least one `utterance_id value` line"
            }
            ErrorCode::UnknownLoaderType => {
                "Use one of the registered types (sound, midi, duration, kaldi_ark, npy, \
                 text_int, csv_int, text_float, csv_float, text, rand_float, rand_int_<low>_<high>)"
            }
            ErrorCode::MalformedLoaderType => "Write random integer types as rand_int_<low>_<high> with low < high",
            ErrorCode::InvalidConfig => "Fix the reported configuration value",
            ErrorCode::KeyNotFound => "Make every modality index list the same utterance ids",
            ErrorCode::IndexOutOfRange => "Use an index smaller than the dataset length",
            ErrorCode::SampleRateMismatch => "Resample all audio of one modality to a single rate",
            ErrorCode::SpeakerTagMismatch => {
                "Make speaker tags unambiguous so that exactly one occurs in each utterance id"
            }
            ErrorCode::UnexpectedValueType => "Check the loader type declared for this modality",
            ErrorCode::UnsupportedDtype => "Store arrays as float or signed integer data",
            ErrorCode::PreprocessContract => {
                "Return a record with exactly the modality keys the preprocessor received"
            }
            ErrorCode::DecodeFailed => "Regenerate the file or check its format against the loader type",
            ErrorCode::IoFailed => "Check that the file exists and is readable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for dataset operations.
#[derive(Debug)]
pub struct DatasetError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DatasetError {
    /// Creates a new DatasetError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new DatasetError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the category of this error.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Creates a DUPLICATE_MODALITY error.
    pub fn duplicate_modality(name: &str) -> Self {
        Self::new(
            ErrorCode::DuplicateModality,
            format!("\"{}\" is duplicated for data-key", name),
        )
    }

    /// Creates a DUPLICATE_KEY error.
    pub fn duplicate_key(key: &str, path: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::DuplicateKey,
            format!("{} is duplicated ({})", key, path),
        )
    }

    /// Creates an EMPTY_INDEX error.
    pub fn empty_index(path: impl fmt::Display) -> Self {
        Self::new(ErrorCode::EmptyIndex, format!("{} has no samples", path))
    }

    /// Creates an UNKNOWN_LOADER_TYPE error.
    pub fn unknown_loader_type(loader_type: &str) -> Self {
        Self::new(
            ErrorCode::UnknownLoaderType,
            format!("Not supported: loader_type={}", loader_type),
        )
    }

    /// Creates a MALFORMED_LOADER_TYPE error.
    pub fn malformed_loader_type(loader_type: &str, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::MalformedLoaderType,
            format!("{}: {}", loader_type, reason.into()),
        )
    }

    /// Creates an INVALID_CONFIG error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, reason)
    }

    /// Creates a KEY_NOT_FOUND error.
    pub fn key_not_found(key: &str, path: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::KeyNotFound,
            format!("{} is not found in {}", key, path),
        )
    }

    /// Creates an INDEX_OUT_OF_RANGE error.
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::new(
            ErrorCode::IndexOutOfRange,
            format!("Index {} is out of range for {} utterances", index, len),
        )
    }

    /// Creates a SAMPLE_RATE_MISMATCH error.
    pub fn sample_rate_mismatch(expected: u32, got: u32) -> Self {
        Self::new(
            ErrorCode::SampleRateMismatch,
            format!("Sampling rates are mismatched: {} != {}", expected, got),
        )
    }

    /// Creates a SPEAKER_TAG_MISMATCH error.
    pub fn speaker_tag_mismatch(id: &str, matches: usize) -> Self {
        Self::new(
            ErrorCode::SpeakerTagMismatch,
            format!(
                "Utterance \"{}\" matches {} speaker tags (exactly 1 required)",
                id, matches
            ),
        )
    }

    /// Creates an UNEXPECTED_VALUE_TYPE error.
    pub fn unexpected_value(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnexpectedValueType, reason)
    }

    /// Creates an UNSUPPORTED_DTYPE error.
    pub fn unsupported_dtype(name: &str, dtype: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedDtype,
            format!("Not supported dtype for \"{}\": {}", name, dtype),
        )
    }

    /// Creates a PREPROCESS_CONTRACT error.
    pub fn preprocess_contract(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::PreprocessContract, reason)
    }

    /// Creates a DECODE_FAILED error.
    pub fn decode_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::DecodeFailed, reason)
    }

    /// Creates an IO_FAILED error wrapping the underlying I/O error.
    pub fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        Self::with_source(
            ErrorCode::IoFailed,
            format!("Failed to read {}: {}", path, source),
            source,
        )
    }
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<hound::Error> for DatasetError {
    fn from(error: hound::Error) -> Self {
        match error {
            hound::Error::IoError(e) => Self::with_source(ErrorCode::IoFailed, e.to_string(), e),
            other => Self::decode_failed(format!("wav: {}", other)),
        }
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::DecodeFailed, format!("json: {}", error), error)
    }
}

/// Result type alias using DatasetError.
pub type Result<T> = std::result::Result<T, DatasetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_as_str() {
        assert_eq!(ErrorCode::DuplicateModality.as_str(), "DUPLICATE_MODALITY");
        assert_eq!(ErrorCode::EmptyIndex.as_str(), "EMPTY_INDEX");
        assert_eq!(ErrorCode::UnknownLoaderType.as_str(), "UNKNOWN_LOADER_TYPE");
        assert_eq!(ErrorCode::SampleRateMismatch.as_str(), "SAMPLE_RATE_MISMATCH");
        assert_eq!(ErrorCode::UnsupportedDtype.as_str(), "UNSUPPORTED_DTYPE");
    }

    #[test]
    fn error_categories() {
        assert_eq!(ErrorCode::DuplicateModality.category(), ErrorCategory::Configuration);
        assert_eq!(ErrorCode::MalformedLoaderType.category(), ErrorCategory::Configuration);
        assert_eq!(ErrorCode::SampleRateMismatch.category(), ErrorCategory::Consistency);
        assert_eq!(ErrorCode::SpeakerTagMismatch.category(), ErrorCategory::Consistency);
        assert_eq!(ErrorCode::UnsupportedDtype.category(), ErrorCategory::Type);
        assert_eq!(ErrorCode::IoFailed.category(), ErrorCategory::Io);
    }

    #[test]
    fn error_code_recovery_hints_not_empty() {
        for code in [
            ErrorCode::DuplicateModality,
            ErrorCode::DuplicateKey,
            ErrorCode::EmptyIndex,
            ErrorCode::UnknownLoaderType,
            ErrorCode::MalformedLoaderType,
            ErrorCode::InvalidConfig,
            ErrorCode::KeyNotFound,
            ErrorCode::IndexOutOfRange,
            ErrorCode::SampleRateMismatch,
            ErrorCode::SpeakerTagMismatch,
            ErrorCode::UnexpectedValueType,
            ErrorCode::UnsupportedDtype,
            ErrorCode::PreprocessContract,
            ErrorCode::DecodeFailed,
            ErrorCode::IoFailed,
        ] {
            assert!(!code.recovery_hint().is_empty());
            assert!(!code.description().is_empty());
        }
    }

    #[test]
    fn dataset_error_display() {
        let err = DatasetError::duplicate_modality("input");
        assert!(err.to_string().contains("DUPLICATE_MODALITY"));
        assert!(err.to_string().contains("input"));
        assert!(err.to_string().contains("Recovery:"));
    }

    #[test]
    fn io_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = DatasetError::io("a.wav", io);
        assert_eq!(err.code, ErrorCode::IoFailed);
        assert!(std::error::Error::source(&err).is_some());
    }
}
