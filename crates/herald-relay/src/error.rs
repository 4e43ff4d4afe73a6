use herald_core::ids::ExecutionId;
use herald_core::ValidationError;
use herald_store::StoreError;

/// Failures of connect/disconnect handling.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The connection store could not be read or written.
    #[error("database error: {0}")]
    Database(#[source] StoreError),
}

impl RegistryError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Database(_) => "database",
        }
    }
}

/// Failures of result dispatch. Transport failures are not errors; they are
/// reported in the dispatch outcome.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Dispatch was requested for an execution with no recorded result.
    #[error("no available results for execution {0}")]
    NoAvailableResults(ExecutionId),

    #[error("unable to access database: {0}")]
    UnableToAccessDatabase(#[source] StoreError),

    #[error("failed to encode result payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DispatchError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NoAvailableResults(_) => "no_available_results",
            Self::UnableToAccessDatabase(_) => "database",
            Self::Encode(_) => "encode",
        }
    }
}
