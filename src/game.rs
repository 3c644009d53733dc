use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::eligibility::check_eligibility;
use crate::error::{GameError, ResetError, StoreError};
use crate::model::{
    Account, HistoryRecord, NewHistoryRecord, PlayerStats, Profile, RoundOutcome, UserId,
};
use crate::round::{DiceSource, ThreadRngDice, roll_round};
use crate::store::LedgerStore;

pub const DEFAULT_TXN_TIMEOUT: Duration = Duration::from_secs(5);

/// Entry point shared by every front-end (bot, web, scheduler).
#[derive(Clone)]
pub struct GameService {
    store: Arc<dyn LedgerStore>,
    dice: Arc<dyn DiceSource>,
    txn_timeout: Duration,
}

impl GameService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            dice: Arc::new(ThreadRngDice),
            txn_timeout: DEFAULT_TXN_TIMEOUT,
        }
    }

    pub fn with_dice(mut self, dice: Arc<dyn DiceSource>) -> Self {
        self.dice = dice;
        self
    }

    pub fn with_txn_timeout(mut self, timeout: Duration) -> Self {
        self.txn_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Play one round for `user_id`: check eligibility, roll, update the
    /// balance and append history, all in one per-user transaction.
    ///
    /// A transaction that cannot take its locks within the configured timeout
    /// is abandoned without writing anything and reported as
    /// [`GameError::StoreUnavailable`].
    pub async fn play_round(&self, user_id: UserId) -> Result<RoundOutcome, GameError> {
        let deadline = Instant::now() + self.txn_timeout;
        let result = self.play_round_txn(user_id, deadline).await;
        if let Err(GameError::StoreUnavailable(StoreError::Timeout)) = &result {
            tracing::warn!(
                "round for user {} timed out after {:?}",
                user_id,
                self.txn_timeout
            );
        }
        result
    }

    async fn play_round_txn(
        &self,
        user_id: UserId,
        deadline: Instant,
    ) -> Result<RoundOutcome, GameError> {
        let mut txn = tokio::time::timeout_at(deadline, self.store.begin(user_id))
            .await
            .map_err(|_| StoreError::Timeout)?
            .inspect_err(|e| {
                tracing::warn!("could not open transaction for user {}: {}", user_id, e);
            })?;

        // dropping `txn` on rejection releases the row without writing
        if let Err(rejection) = check_eligibility(txn.account()) {
            tracing::debug!("user {} rejected: {}", user_id, rejection);
            return Err(rejection.into());
        }

        let roll = roll_round(self.dice.as_ref());
        txn.apply_round(roll.points_change);
        txn.append_history(NewHistoryRecord {
            user_id,
            user_roll: roll.user_roll,
            bot_roll: roll.bot_roll,
            outcome: roll.outcome,
            points_change: roll.points_change,
        });
        let committed = txn.commit(deadline).await.inspect_err(|e| {
            tracing::warn!("commit failed for user {}: {}", user_id, e);
        })?;

        tracing::debug!(
            "user {} rolled {} vs {}: {:?} {:+} (total {}, plays {})",
            user_id,
            roll.user_roll,
            roll.bot_roll,
            roll.outcome,
            roll.points_change,
            committed.account.points,
            committed.account.plays
        );
        Ok(RoundOutcome {
            user_roll: roll.user_roll,
            bot_roll: roll.bot_roll,
            outcome: roll.outcome,
            points_change: roll.points_change,
            new_total_points: committed.account.points,
            played_at: committed.committed_at,
        })
    }

    /// Create the account on first contact (refreshing the profile otherwise)
    /// and return the stored row.
    pub async fn onboard(&self, user_id: UserId, profile: Profile) -> Result<Account, GameError> {
        if self.store.ensure_account(user_id, profile).await? {
            tracing::info!("onboarded user {}", user_id);
        }
        self.store
            .account(user_id)
            .await?
            .ok_or(GameError::UnknownUser)
    }

    /// Record a phone number the user shared from their own contact card.
    pub async fn verify_phone(
        &self,
        user_id: UserId,
        profile: Profile,
        phone: String,
    ) -> Result<(), GameError> {
        self.store.ensure_account(user_id, profile).await?;
        self.store.set_phone(user_id, phone).await?;
        tracing::info!("user {} verified their phone number", user_id);
        Ok(())
    }

    pub async fn get_stats(&self, user_id: UserId) -> Result<PlayerStats, GameError> {
        let account = self
            .store
            .account(user_id)
            .await?
            .ok_or(GameError::UnknownUser)?;
        Ok(PlayerStats {
            points: account.points,
            plays: account.plays,
        })
    }

    /// Most recent rounds for `user_id`, newest first.
    pub async fn recent_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, GameError> {
        if self.store.account(user_id).await?.is_none() {
            return Err(GameError::UnknownUser);
        }
        let mut records = self.store.history(user_id).await?;
        records.sort_by(|a, b| b.seq.cmp(&a.seq));
        records.truncate(limit);
        Ok(records)
    }

    /// Zero every account's play counter. Safe to call more than once.
    pub async fn run_daily_reset(&self) -> Result<(), ResetError> {
        match self.store.reset_all_plays().await {
            Ok(rows) => {
                tracing::info!("daily reset complete: {} accounts", rows);
                Ok(())
            }
            Err(err) => {
                tracing::error!("daily reset failed: {}", err);
                Err(err.into())
            }
        }
    }
}
