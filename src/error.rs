//! Error types for bija-aug.

/// Result type alias
pub type Result<T> = std::result::Result<T, AugError>;

/// Augmentation pipeline error types.
///
/// Every variant is fatal: the sampler refuses to degrade silently, since a
/// half-applied augmentation corrupts the training signal it is supposed to
/// enrich. Soft conditions (a sample group naming an absent class, a
/// per-call target of zero, no candidate surviving collision resolution)
/// are not errors and are handled inline.
#[derive(Debug, thiserror::Error)]
pub enum AugError {
    /// Invalid configuration (unregistered prefilter, malformed group spec, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed serialized data
    #[error("Parse error: {0}")]
    Parse(String),

    /// Buffer length incompatible with the expected row width
    #[error("Shape mismatch in {context}: {len} values do not fit rows of width {width}")]
    Shape {
        /// What was being reshaped (file path or field name)
        context: String,
        /// Number of values found
        len: usize,
        /// Expected row width
        width: usize,
    },

    /// A scene is missing a field an enabled feature requires
    #[error("Scene missing required field: {0}")]
    MissingField(&'static str),
}

impl From<serde_json::Error> for AugError {
    fn from(err: serde_json::Error) -> Self {
        AugError::Parse(err.to_string())
    }
}

impl From<image::ImageError> for AugError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => AugError::Io(e),
            other => AugError::Parse(other.to_string()),
        }
    }
}
