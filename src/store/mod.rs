//! Ledger store: accounts plus the append-only round history.
//!
//! All balance and play-count mutation goes through a [`LedgerTxn`] (one
//! round) or [`LedgerStore::reset_all_plays`] (the daily reset). The other
//! writers only touch onboarding, phone and block fields.

mod memory;

pub use memory::MemoryLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::error::StoreError;
use crate::model::{Account, HistoryRecord, NewHistoryRecord, Profile, UserId};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a transaction on one account. Waits for any other transaction on
    /// the same user; never waits on other users.
    async fn begin(&self, user_id: UserId) -> Result<Box<dyn LedgerTxn>, StoreError>;

    async fn account(&self, user_id: UserId) -> Result<Option<Account>, StoreError>;

    /// History for one user, oldest first.
    async fn history(&self, user_id: UserId) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Set `plays = 0` on every account in one step. Returns the number of rows touched.
    async fn reset_all_plays(&self) -> Result<usize, StoreError>;

    /// Create the account if missing. Returns `true` when a row was created.
    async fn ensure_account(&self, user_id: UserId, profile: Profile) -> Result<bool, StoreError>;

    async fn set_phone(&self, user_id: UserId, phone: String) -> Result<(), StoreError>;

    async fn set_blocked(&self, user_id: UserId, blocked: bool) -> Result<(), StoreError>;
}

/// An open, per-user transaction. Writes are staged and only become visible
/// on [`commit`](LedgerTxn::commit); dropping the transaction discards them.
#[async_trait]
pub trait LedgerTxn: Send {
    /// Account snapshot taken when the transaction began.
    fn account(&self) -> Option<&Account>;

    /// Stage `points += points_change`, `plays += 1` and `last_play`.
    fn apply_round(&mut self, points_change: i64);

    fn append_history(&mut self, record: NewHistoryRecord);

    /// Apply every staged write, or none of them.
    ///
    /// The commit time is taken once the store's write lock is held and goes
    /// to both `last_play` and the history record, so it orders correctly
    /// against a concurrent daily reset. Fails with [`StoreError::Timeout`] if
    /// the write lock is not available by `deadline`; after that point the
    /// commit runs to completion.
    async fn commit(self: Box<Self>, deadline: Instant) -> Result<Committed, StoreError>;
}

/// Result of a successful commit
#[derive(Clone, Debug)]
pub struct Committed {
    pub account: Account,
    pub history: Option<HistoryRecord>,
    pub committed_at: DateTime<Utc>,
}
