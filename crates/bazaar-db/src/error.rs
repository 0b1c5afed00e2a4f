use thiserror::Error;

/// Why an operation was refused without touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("self not allowed")]
    SelfTarget,
    #[error("already friends")]
    AlreadyFriends,
    #[error("blocked")]
    Blocked,
    #[error("request is no longer pending")]
    NotPending,
}

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed or missing input.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(#[from] Conflict),

    /// The named entity does not exist (or is soft-deleted).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The caller is not the actor allowed to perform this operation.
    #[error("forbidden: {0}")]
    Permission(&'static str),

    /// The store contradicted itself, e.g. an idempotent insert succeeded but
    /// the follow-up resolve found nothing. Not user-actionable.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Lock poisoning and similar process-level failures.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
