use thiserror::Error;

use crate::eligibility::Rejection;
use crate::model::UserId;

/// Failures raised by a ledger store. All of them are transient from the
/// caller's point of view: nothing was written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transaction did not complete before its deadline")]
    Timeout,
    #[error("ledger store is offline")]
    Offline,
    #[error("account {0} does not exist")]
    MissingAccount(UserId),
    #[error("failed to persist ledger snapshot: {0}")]
    Persist(#[from] std::io::Error),
    #[error("failed to encode ledger snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("ledger writer task failed: {0}")]
    Writer(#[from] tokio::task::JoinError),
    #[error("injected fault: {0}")]
    Injected(&'static str),
}

/// Errors returned by the game transaction and the read paths around it.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("user is not registered")]
    UnknownUser,
    #[error("user is blocked")]
    Blocked,
    #[error("phone number has not been verified")]
    PhoneNotVerified,
    #[error("daily play limit reached")]
    DailyLimitReached,
    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl GameError {
    /// Only store failures are worth retrying; the rest are final for today.
    pub fn is_retriable(&self) -> bool {
        matches!(self, GameError::StoreUnavailable(_))
    }
}

impl From<Rejection> for GameError {
    fn from(r: Rejection) -> Self {
        match r {
            Rejection::UnknownUser => GameError::UnknownUser,
            Rejection::Blocked => GameError::Blocked,
            Rejection::PhoneNotVerified => GameError::PhoneNotVerified,
            Rejection::DailyLimitReached => GameError::DailyLimitReached,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("daily reset failed: {0}")]
    StoreUnavailable(#[from] StoreError),
}
