use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a save invocation.
///
/// Every variant is fatal: images written before the failure stay on disk and
/// the remaining images of the batch are not processed.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Invalid JSON in custom metadata: {0}")]
    InvalidMetadata(#[source] serde_json::Error),

    #[error("Custom metadata must be a JSON object, got {0}")]
    MetadataNotObject(&'static str),

    #[error("Invalid metadata key `{0}`: PNG text keywords must be 1-79 Latin-1 characters")]
    InvalidKeyword(String),

    #[error("Metadata value for `{0}` contains a NUL character")]
    InvalidValue(String),

    #[error("Unsupported file extension `{0}` (supported: jpeg, jpg, png, webp)")]
    UnsupportedFormat(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Invalid image tensor: {0}")]
    InvalidTensor(String),

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("WebP encoding failed: {0}")]
    WebPEncode(String),

    #[error("Failed to embed metadata: {0}")]
    Container(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SaveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SaveError>;
