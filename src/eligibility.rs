use thiserror::Error;

use crate::model::{Account, DAILY_PLAY_LIMIT};

/// Why an account may not play right now
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum Rejection {
    #[error("unknown user")]
    UnknownUser,
    #[error("blocked")]
    Blocked,
    #[error("phone not verified")]
    PhoneNotVerified,
    #[error("daily limit reached")]
    DailyLimitReached,
}

/// Decide whether `account` may play a round. Checks run in a fixed order and
/// the first failing one is reported.
pub fn check_eligibility(account: Option<&Account>) -> Result<(), Rejection> {
    let account = account.ok_or(Rejection::UnknownUser)?;
    if account.is_blocked {
        return Err(Rejection::Blocked);
    }
    if !account.has_phone() {
        return Err(Rejection::PhoneNotVerified);
    }
    if account.plays >= DAILY_PLAY_LIMIT {
        return Err(Rejection::DailyLimitReached);
    }
    Ok(())
}
