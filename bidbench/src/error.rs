//! Error types for bidbench.

use thiserror::Error;

use crate::operation::TemplateId;

/// Failure raised by an executor while talking to its backend.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The backend could not be reached or the session could not be opened.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend rejected the operation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The operation carries no payload this executor can send.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("executor is closed")]
    Closed,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type ExecResult<T> = std::result::Result<T, ExecutorError>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed properties or profile. Raised before anything is executed.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("executor failure: {0}")]
    Executor(#[from] ExecutorError),

    /// An executor failure while running one workload item.
    #[error("{template} (template {template_id}) failed: {source}")]
    Operation {
        template: String,
        template_id: TemplateId,
        #[source]
        source: ExecutorError,
    },

    #[error("generation invariant violated: {0}")]
    GenerationInvariant(String),

    /// A worker failed and the whole run was stopped. Wraps the first failure.
    #[error("run aborted: {0}")]
    Aborted(#[source] Box<Error>),

    #[error("worker thread panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// The first failure of an aborted run, or `None` for any other error.
    pub fn abort_cause(&self) -> Option<&Error> {
        match self {
            Error::Aborted(cause) => Some(cause),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_error_names_template() {
        let err = Error::Operation {
            template: "sql:InsertRandomBid".to_string(),
            template_id: TemplateId(3),
            source: ExecutorError::Protocol("duplicate key".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "sql:InsertRandomBid (template #3) failed: protocol error: duplicate key"
        );
    }

    #[test]
    fn abort_cause_unwraps_first_failure() {
        let err = Error::Aborted(Box::new(Error::GenerationInvariant(
            "no users".to_string(),
        )));
        assert!(matches!(
            err.abort_cause(),
            Some(Error::GenerationInvariant(msg)) if msg == "no users"
        ));
        assert!(Error::WorkerPanicked.abort_cause().is_none());
    }
}
