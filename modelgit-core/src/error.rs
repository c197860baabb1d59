use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage access failed while {operation}: {message}")]
    StorageAccess { operation: String, message: String },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Web request failed{}: {message}", status_suffix(.status))]
    WebRequest { status: Option<u16>, message: String },

    #[error("Library check returned unknown ref id: {0}")]
    PolicyContract(String),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Another commit is already in progress")]
    CommitInProgress,

    #[error("Operation cancelled")]
    Cancelled,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl Error {
    /// HTTP status of a failed web request, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::WebRequest { status, .. } => *status,
            _ => None,
        }
    }
}

/// Attaches the name of the step that touched the store to low-level failures.
pub trait StorageContext<T> {
    fn during(self, operation: &str) -> Result<T>;
}

impl<T> StorageContext<T> for Result<T> {
    fn during(self, operation: &str) -> Result<T> {
        self.map_err(|e| match e {
            Error::Database(_) | Error::Io(_) | Error::Serialization(_) | Error::ObjectNotFound(_) => {
                Error::StorageAccess {
                    operation: operation.to_string(),
                    message: e.to_string(),
                }
            }
            other => other,
        })
    }
}
