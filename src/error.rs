use burn::record::RecorderError;
use std::path::PathBuf;

/// Failures that abort a training run.
///
/// Shape mismatches between chained layers are not represented here: they surface as panics from
/// the tensor backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A model or loss was configured in a way that violates one of its invariants.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("checkpoint record error: {0:?}")]
    Recorder(RecorderError),

    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to export the loss history: {0}")]
    Json(#[from] serde_json::Error),

    /// No epoch produced a validation loss that could be checkpointed.
    #[error("no checkpoint was saved at {0:?}")]
    MissingCheckpoint(PathBuf),
}

impl From<RecorderError> for Error {
    fn from(err: RecorderError) -> Self {
        Error::Recorder(err)
    }
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
