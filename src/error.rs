use std::path::PathBuf;
use thiserror::Error;

/// Error type produced by an [`crate::pipeline::ImagePipeline`].
///
/// Kept as a boxed trait object so host errors pass through untouched.
pub type PipelineError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by expression pack operations.
#[derive(Error, Debug)]
pub enum ExpressionError {
    /// Bad flag, unknown catalog label, unreadable preset.
    #[error("{0}")]
    Config(String),

    /// A directory or file could not be created or written.
    #[error("Failed to write {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A generated image could not be encoded to disk.
    #[error("Failed to save image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    /// Failure raised by the image pipeline, forwarded as-is.
    #[error(transparent)]
    Pipeline(PipelineError),
}

impl ExpressionError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ExpressionError>;
