//! Error types for the sora-watermark-removal crate.

/// Errors that can occur while validating input, resolving a remote source,
/// or running the removal pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file's MIME type is not a video type.
    #[error("unsupported media type: {mime} (expected video/*)")]
    UnsupportedMediaType {
        /// The offending MIME type.
        mime: String,
    },

    /// The file exceeds the upload size limit.
    #[error("file too large: {size_bytes} bytes (limit {limit_bytes})")]
    FileTooLarge {
        /// Actual file size in bytes.
        size_bytes: u64,
        /// Maximum accepted size in bytes.
        limit_bytes: u64,
    },

    /// The page URL failed scheme, domain, or address validation.
    #[error("disallowed URL {url}: {reason}")]
    DisallowedUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The preset name is not one of the recognized corner presets.
    #[error("unrecognized preset: {0}")]
    InvalidPreset(String),

    /// A region field was set to a value outside its valid range.
    #[error("invalid value {value} for region field {field}")]
    InvalidRegionField {
        /// The field being set (`x`, `y`, `width`, `height`).
        field: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// A network request for the page or media failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The fetched page contained no recognizable media URL.
    #[error("no media URL found in page")]
    NoMediaUrl,

    /// The processing engine failed to initialize.
    #[error("engine failed to initialize: {0}")]
    EngineInit(String),

    /// The processing engine failed during execution.
    #[error("engine execution failed: {message}")]
    EngineFailed {
        /// What the engine was doing when it failed.
        message: String,
        /// Captured stderr from the engine process, if any.
        stderr: Option<String>,
    },

    /// The source video could not be loaded for processing.
    #[error("failed to load source: {0}")]
    Load(String),

    /// The pipeline was cancelled between stages.
    #[error("processing cancelled")]
    Cancelled,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
