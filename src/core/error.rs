use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Failures raised by generators and the registry.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator '{0}' is not registered")]
    UnknownGenerator(String),

    #[error("generator for '{0}' was used before load() completed")]
    NotLoaded(String),

    #[error("failed to initialize backend for '{checkpoint}'")]
    BackendInitialization {
        checkpoint: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("'{checkpoint}' does not support {operation}")]
    UnsupportedOperation {
        operation: &'static str,
        checkpoint: String,
    },

    #[error("backend failure: {0}")]
    Backend(#[source] anyhow::Error),
}

impl GeneratorError {
    /// True for errors caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GeneratorError::UnknownGenerator(_) | GeneratorError::UnsupportedOperation { .. }
        )
    }
}

#[derive(Debug, Error)]
#[error("unknown device '{0}', expected cpu, cuda, cuda:<n> or metal")]
pub struct ParseDeviceError(pub String);
