use thiserror::Error;

/// Failure taxonomy of the invitation workflow and the store adapters.
/// The matcher has no error channel; the dispatch layer renders these as
/// `ERR:` lines.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Membership for this (group, user) pair already exists.
    #[error("already a member of this group")]
    Duplicate,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Accept's membership insert succeeded but the invitation row could
    /// not be removed, even after one retry. The join is durable; the
    /// invitation is still visible.
    #[error("joined the group but invitation {0} could not be removed")]
    PartialFailure(i64),
}

impl CoreError {
    pub fn precondition(reason: impl Into<String>) -> Self {
        CoreError::PreconditionFailed(reason.into())
    }

    /// True when the underlying store rejected an insert on a UNIQUE
    /// constraint.
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => db.message().contains("UNIQUE constraint failed"),
            _ => false,
        }
    }
}
