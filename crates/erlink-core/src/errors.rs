//! Error types for the erlink core library.

/// Top-level error enum for the erlink core library.
#[derive(Debug, thiserror::Error)]
pub enum ErlinkError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Clustering error: {0}")]
    Clustering(String),

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Filter error: {0}")]
    Filter(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ErlinkError {
    /// True for errors that abort only the current stage, not the whole run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErlinkError::Clustering(_) | ErlinkError::Signature(_) | ErlinkError::Exchange(_)
        )
    }
}

#[cfg(feature = "python")]
impl From<ErlinkError> for pyo3::PyErr {
    fn from(err: ErlinkError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
        match &err {
            ErlinkError::InvalidArgument(_) | ErlinkError::Filter(_) => {
                PyValueError::new_err(err.to_string())
            }
            ErlinkError::Clustering(_) | ErlinkError::Signature(_) => {
                PyRuntimeError::new_err(err.to_string())
            }
            ErlinkError::Exchange(_) => PyRuntimeError::new_err(err.to_string()),
            ErlinkError::Io(_) => PyIOError::new_err(err.to_string()),
            ErlinkError::Json(_) => PyValueError::new_err(err.to_string()),
        }
    }
}

pub type ErlinkResult<T> = Result<T, ErlinkError>;
