use serde_json::json;
use thiserror::Error;

/// Failures raised by the data-store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("column {column} of {table} is not an array column")]
    NotAnArrayColumn { table: String, column: String },

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("row shape mismatch in {table}: {message}")]
    RowShape { table: String, message: String },
}

/// Assembly failures. Each variant maps to a stable wire code.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("cannot resolve class label {label:?}: {reason}")]
    UnresolvedIdentity { label: String, reason: String },

    #[error("no scope: {0}")]
    NoScope(String),

    #[error("fetch from {table} failed: {source}")]
    FetchFailed {
        table: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{kind} {id} not found")]
    UnmatchedForeignKey { kind: &'static str, id: String },
}

impl AssembleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnresolvedIdentity { .. } => "unresolved_identity",
            Self::NoScope(_) => "no_scope",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::UnmatchedForeignKey { .. } => "unmatched_foreign_key",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::UnresolvedIdentity { label, .. } => Some(json!({ "label": label })),
            Self::FetchFailed { table, .. } => Some(json!({ "table": table })),
            Self::UnmatchedForeignKey { kind, id } => Some(json!({ "kind": kind, "id": id })),
            Self::NoScope(_) => None,
        }
    }

    pub fn fetch(table: &'static str) -> impl FnOnce(StoreError) -> AssembleError {
        move |source| AssembleError::FetchFailed { table, source }
    }
}
