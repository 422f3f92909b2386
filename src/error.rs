use thiserror::Error;

use crate::{
    form::ValidationError,
    record::RecordId,
    role::{Operation, Role},
    store::StoreError,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced to the user by the records controller.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("record {0} no longer exists")]
    NotFound(RecordId),

    #[error("select a record to {0} first")]
    Selection(Operation),

    #[error("{role} is not allowed to {operation} records")]
    Forbidden { role: String, operation: Operation },

    #[error("another change is still being saved")]
    Busy,
}

impl Error {
    pub(crate) fn forbidden(role: Option<Role>, operation: Operation) -> Self {
        Error::Forbidden {
            role: role
                .map(|role| role.label().to_string())
                .unwrap_or_else(|| "This session".to_string()),
            operation,
        }
    }

    /// Warnings are user mistakes that need no store round trip to recover
    /// from; everything else is reported as an error.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Error::Selection(_) | Error::Forbidden { .. } | Error::Busy | Error::Validation(_)
        )
    }
}
