use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockWriteGuard, RwLock};
use tokio::time::Instant;

use super::{Committed, LedgerStore, LedgerTxn};
use crate::error::StoreError;
use crate::model::{Account, HistoryRecord, NewHistoryRecord, Profile, UserId};

#[derive(Debug, Default)]
struct Table {
    accounts: HashMap<UserId, Account>,
    history: Vec<HistoryRecord>,
    next_seq: u64,
}

impl Table {
    /// Timestamp for a commit happening now. Never earlier than the last
    /// committed record, so history time follows commit order.
    fn commit_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.history.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        }
    }
}

#[derive(Serialize)]
struct AccountsOut<'a> {
    next_seq: u64,
    accounts: &'a HashMap<UserId, Account>,
}

#[derive(Default, Deserialize)]
struct AccountsIn {
    next_seq: u64,
    accounts: HashMap<UserId, Account>,
}

/// On-disk layout: `accounts.json` is rewritten on every write and
/// `history.jsonl` only ever gets one line appended per round.
///
/// The snapshot's `next_seq` is the commit point. Log lines at or past it
/// belong to a commit whose snapshot never landed and are dropped on load.
struct LedgerFiles {
    accounts: PathBuf,
    history: PathBuf,
}

impl LedgerFiles {
    fn in_dir(dir: &Path) -> Self {
        Self {
            accounts: dir.join("accounts.json"),
            history: dir.join("history.jsonl"),
        }
    }

    fn load(&self) -> Result<Table, StoreError> {
        let snapshot: AccountsIn = if self.accounts.exists() {
            serde_json::from_str(&fs::read_to_string(&self.accounts)?)?
        } else {
            AccountsIn::default()
        };

        let mut history = Vec::new();
        let mut dropped = 0;
        if self.history.exists() {
            let contents = fs::read_to_string(&self.history)?;
            let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
            for (i, line) in lines.iter().enumerate() {
                match serde_json::from_str::<HistoryRecord>(line) {
                    Ok(record) if record.seq < snapshot.next_seq => history.push(record),
                    Ok(_) => dropped += 1,
                    // a torn final line is an append cut short by a crash
                    Err(_) if i + 1 == lines.len() => dropped += 1,
                    Err(err) => return Err(err.into()),
                }
            }
        }
        if dropped > 0 {
            tracing::warn!(
                "dropping {} uncommitted history lines from {}",
                dropped,
                self.history.display()
            );
            self.rewrite_history(&history)?;
        }

        Ok(Table {
            accounts: snapshot.accounts,
            history,
            next_seq: snapshot.next_seq,
        })
    }

    fn save_accounts(&self, table: &Table) -> Result<(), StoreError> {
        let out = AccountsOut {
            next_seq: table.next_seq,
            accounts: &table.accounts,
        };
        write_atomic(&self.accounts, &serde_json::to_string_pretty(&out)?)
    }

    /// Append one line and return the log length before the append.
    fn append_history(&self, record: &HistoryRecord) -> Result<u64, StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        create_parent(&self.history)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history)?;
        let len = file.metadata()?.len();
        file.write_all(line.as_bytes())?;
        Ok(len)
    }

    fn rewrite_history(&self, records: &[HistoryRecord]) -> Result<(), StoreError> {
        let mut contents = String::new();
        for record in records {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }
        write_atomic(&self.history, &contents)
    }

    /// Persist one game transaction: the history line first, then the
    /// snapshot that commits it. A failed snapshot takes the line back out.
    fn save_commit(&self, table: &Table, record: Option<&HistoryRecord>) -> Result<(), StoreError> {
        let appended_at = match record {
            Some(record) => Some(self.append_history(record)?),
            None => None,
        };
        if let Err(err) = self.save_accounts(table) {
            if let Some(len) = appended_at {
                let truncated = OpenOptions::new()
                    .write(true)
                    .open(&self.history)
                    .and_then(|f| f.set_len(len));
                if let Err(e) = truncated {
                    // the next load drops the line anyway: its seq is past the snapshot
                    tracing::warn!("could not truncate {}: {}", self.history.display(), e);
                }
            }
            return Err(err);
        }
        Ok(())
    }
}

fn create_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write next to `path` and rename into place.
fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    create_parent(path)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

struct Inner {
    table: Arc<RwLock<Table>>,
    // one lock per user; held for the whole life of a transaction
    row_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
    files: Option<LedgerFiles>,
    offline: AtomicBool,
    fail_before_history: AtomicBool,
}

impl Inner {
    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Offline)
        } else {
            Ok(())
        }
    }

    async fn row_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        let mut locks = self.row_locks.lock().await;
        locks.entry(user_id).or_default().clone()
    }

    fn save_accounts(&self, table: &Table) -> Result<(), StoreError> {
        match &self.files {
            Some(files) => files.save_accounts(table),
            None => Ok(()),
        }
    }

    fn save_commit(&self, table: &Table, record: Option<&HistoryRecord>) -> Result<(), StoreError> {
        match &self.files {
            Some(files) => files.save_commit(table, record),
            None => Ok(()),
        }
    }

    /// Run `f` on the blocking pool while holding the table write lock.
    ///
    /// Once handed over, `f` runs to completion even if the caller stops
    /// waiting, so memory and disk never disagree about a write.
    async fn run_locked<R, F>(
        self: &Arc<Self>,
        guard: OwnedRwLockWriteGuard<Table>,
        f: F,
    ) -> Result<R, StoreError>
    where
        F: FnOnce(&Inner, &mut Table) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.clone();
        let mut guard = guard;
        tokio::task::spawn_blocking(move || f(&*inner, &mut *guard)).await?
    }

    async fn write<R, F>(self: &Arc<Self>, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Inner, &mut Table) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_online()?;
        let guard = self.table.clone().write_owned().await;
        self.run_locked(guard, f).await
    }
}

/// In-process ledger with optional on-disk persistence.
///
/// Every committed write reaches disk before it becomes visible; a failed
/// write rolls the in-memory change back. Cloning is cheap and clones share
/// the same table.
#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<Inner>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::from_table(Table::default(), None)
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-persistent ledger pre-populated with `accounts`.
    pub fn seeded(accounts: impl IntoIterator<Item = Account>) -> Self {
        let table = Table {
            accounts: accounts.into_iter().map(|a| (a.user_id, a)).collect(),
            ..Table::default()
        };
        Self::from_table(table, None)
    }

    /// Open (or start) a ledger persisted under `dir`. Missing files yield an
    /// empty ledger; an unreadable snapshot is an error.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        let files = LedgerFiles::in_dir(dir);
        let table = files.load()?;
        tracing::info!(
            "ledger loaded from {}: {} accounts, {} history records",
            dir.display(),
            table.accounts.len(),
            table.history.len()
        );
        Ok(Self::from_table(table, Some(files)))
    }

    fn from_table(table: Table, files: Option<LedgerFiles>) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Arc::new(RwLock::new(table)),
                row_locks: Mutex::new(HashMap::new()),
                files,
                offline: AtomicBool::new(false),
                fail_before_history: AtomicBool::new(false),
            }),
        }
    }

    /// Simulate an outage: every operation fails with [`StoreError::Offline`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next commit fail after the balance update but before the
    /// history append. One-shot.
    pub fn fail_next_history_append(&self) {
        self.inner.fail_before_history.store(true, Ordering::SeqCst);
    }

    /// Apply `f` to one row outside of a game transaction, rolling back if the
    /// snapshot cannot be written.
    async fn update_row<F>(&self, user_id: UserId, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Account) + Send + 'static,
    {
        self.inner
            .write(move |inner, table| {
                let row = table
                    .accounts
                    .get_mut(&user_id)
                    .ok_or(StoreError::MissingAccount(user_id))?;
                let before = row.clone();
                f(row);
                if let Err(err) = inner.save_accounts(table) {
                    table.accounts.insert(user_id, before);
                    return Err(err);
                }
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn begin(&self, user_id: UserId) -> Result<Box<dyn LedgerTxn>, StoreError> {
        self.inner.ensure_online()?;
        let row = self.inner.row_lock(user_id).await;
        let row_guard = row.lock_owned().await;
        let snapshot = self.inner.table.read().await.accounts.get(&user_id).cloned();
        Ok(Box::new(MemoryTxn {
            inner: self.inner.clone(),
            user_id,
            snapshot,
            pending_round: None,
            pending_history: None,
            _row: row_guard,
        }))
    }

    async fn account(&self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        self.inner.ensure_online()?;
        Ok(self.inner.table.read().await.accounts.get(&user_id).cloned())
    }

    async fn history(&self, user_id: UserId) -> Result<Vec<HistoryRecord>, StoreError> {
        self.inner.ensure_online()?;
        let table = self.inner.table.read().await;
        Ok(table
            .history
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn reset_all_plays(&self) -> Result<usize, StoreError> {
        self.inner
            .write(|inner, table| {
                let previous: Vec<(UserId, u32)> = table
                    .accounts
                    .values()
                    .filter(|a| a.plays > 0)
                    .map(|a| (a.user_id, a.plays))
                    .collect();
                for account in table.accounts.values_mut() {
                    account.plays = 0;
                }
                if let Err(err) = inner.save_accounts(table) {
                    for (user_id, plays) in previous {
                        if let Some(account) = table.accounts.get_mut(&user_id) {
                            account.plays = plays;
                        }
                    }
                    return Err(err);
                }
                Ok(table.accounts.len())
            })
            .await
    }

    async fn ensure_account(&self, user_id: UserId, profile: Profile) -> Result<bool, StoreError> {
        self.inner
            .write(move |inner, table| match table.accounts.get_mut(&user_id) {
                Some(row) => {
                    let before = row.clone();
                    if profile.first_name.is_some() {
                        row.first_name = profile.first_name;
                    }
                    if profile.last_name.is_some() {
                        row.last_name = profile.last_name;
                    }
                    if profile.username.is_some() {
                        row.username = profile.username;
                    }
                    if *row == before {
                        return Ok(false);
                    }
                    if let Err(err) = inner.save_accounts(table) {
                        table.accounts.insert(user_id, before);
                        return Err(err);
                    }
                    Ok(false)
                }
                None => {
                    table
                        .accounts
                        .insert(user_id, Account::new(user_id, profile, Utc::now()));
                    if let Err(err) = inner.save_accounts(table) {
                        table.accounts.remove(&user_id);
                        return Err(err);
                    }
                    Ok(true)
                }
            })
            .await
    }

    async fn set_phone(&self, user_id: UserId, phone: String) -> Result<(), StoreError> {
        self.update_row(user_id, move |row| row.phone = Some(phone))
            .await
    }

    async fn set_blocked(&self, user_id: UserId, blocked: bool) -> Result<(), StoreError> {
        self.update_row(user_id, move |row| row.is_blocked = blocked)
            .await
    }
}

struct MemoryTxn {
    inner: Arc<Inner>,
    user_id: UserId,
    snapshot: Option<Account>,
    pending_round: Option<i64>,
    pending_history: Option<NewHistoryRecord>,
    _row: OwnedMutexGuard<()>,
}

impl MemoryTxn {
    fn apply(&self, table: &mut Table) -> Result<Committed, StoreError> {
        let at = table.commit_time();
        if let Some(points_change) = self.pending_round {
            // delta against the current row, so a reset that landed after
            // `begin` is not overwritten
            let row = table
                .accounts
                .get_mut(&self.user_id)
                .ok_or(StoreError::MissingAccount(self.user_id))?;
            row.points += points_change;
            row.plays += 1;
            row.last_play = Some(at);
        }
        let mut history = None;
        if let Some(record) = self.pending_history.clone() {
            if self.inner.fail_before_history.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Injected("before history append"));
            }
            let record = record.into_record(table.next_seq, at);
            table.next_seq += 1;
            table.history.push(record.clone());
            history = Some(record);
        }
        let account = table
            .accounts
            .get(&self.user_id)
            .cloned()
            .ok_or(StoreError::MissingAccount(self.user_id))?;
        Ok(Committed {
            account,
            history,
            committed_at: at,
        })
    }

    /// Apply and persist under the write lock, undoing the in-memory change
    /// if either step fails. Consumes the transaction, releasing the row.
    fn finish(self, table: &mut Table) -> Result<Committed, StoreError> {
        let before = table
            .accounts
            .get(&self.user_id)
            .cloned()
            .ok_or(StoreError::MissingAccount(self.user_id))?;
        let history_len = table.history.len();
        let next_seq = table.next_seq;

        let result = match self.apply(table) {
            Ok(committed) => self
                .inner
                .save_commit(table, committed.history.as_ref())
                .map(|()| committed),
            Err(err) => Err(err),
        };
        if result.is_err() {
            table.accounts.insert(self.user_id, before);
            table.history.truncate(history_len);
            table.next_seq = next_seq;
        }
        result
    }
}

#[async_trait]
impl LedgerTxn for MemoryTxn {
    fn account(&self) -> Option<&Account> {
        self.snapshot.as_ref()
    }

    fn apply_round(&mut self, points_change: i64) {
        self.pending_round = Some(points_change);
    }

    fn append_history(&mut self, record: NewHistoryRecord) {
        self.pending_history = Some(record);
    }

    async fn commit(self: Box<Self>, deadline: Instant) -> Result<Committed, StoreError> {
        let txn = *self;
        txn.inner.ensure_online()?;
        let guard = tokio::time::timeout_at(deadline, txn.inner.table.clone().write_owned())
            .await
            .map_err(|_| StoreError::Timeout)?;
        let inner = txn.inner.clone();
        inner
            .run_locked(guard, move |_, table| txn.finish(table))
            .await
    }
}

#[cfg(test)]
mod persist_tests {
    use super::*;
    use crate::model::Outcome;
    use std::time::Duration;

    fn tmp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}_{}", name, std::process::id(), nanos))
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn verified(user_id: UserId) -> Account {
        let mut a = Account::new(user_id, Profile::default(), Utc::now());
        a.phone = Some("+100".to_string());
        a
    }

    fn win(user_id: UserId) -> NewHistoryRecord {
        NewHistoryRecord {
            user_id,
            user_roll: 6,
            bot_roll: 1,
            outcome: Outcome::Win,
            points_change: 10,
        }
    }

    async fn play(ledger: &MemoryLedger, user_id: UserId) -> Committed {
        let mut txn = ledger.begin(user_id).await.unwrap();
        txn.apply_round(10);
        txn.append_history(win(user_id));
        txn.commit(deadline()).await.unwrap()
    }

    #[tokio::test]
    async fn failed_snapshot_write_rolls_back_commit() {
        // parent of the ledger dir is a regular file, so every write fails
        let blocker = tmp_path("ledger_blocker");
        fs::write(&blocker, "x").unwrap();
        let ledger = MemoryLedger::from_table(
            Table {
                accounts: [(7, verified(7))].into_iter().collect(),
                ..Table::default()
            },
            Some(LedgerFiles::in_dir(&blocker.join("ledger"))),
        );

        let mut txn = ledger.begin(7).await.unwrap();
        txn.apply_round(10);
        txn.append_history(win(7));
        let err = txn.commit(deadline()).await.unwrap_err();
        assert!(matches!(err, StoreError::Persist(_)), "got {:?}", err);

        let account = ledger.account(7).await.unwrap().unwrap();
        assert_eq!(account.points, 0);
        assert_eq!(account.plays, 0);
        assert!(ledger.history(7).await.unwrap().is_empty());

        let _ = fs::remove_file(&blocker);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = tmp_path("ledger_snapshot");
        {
            let ledger = MemoryLedger::open(&dir).unwrap();
            assert!(ledger.ensure_account(1, Profile::default()).await.unwrap());
            ledger.set_phone(1, "+39000".to_string()).await.unwrap();
            let mut txn = ledger.begin(1).await.unwrap();
            txn.apply_round(-5);
            txn.commit(deadline()).await.unwrap();
            play(&ledger, 1).await;
        }
        let reopened = MemoryLedger::open(&dir).unwrap();
        let account = reopened.account(1).await.unwrap().unwrap();
        assert_eq!(account.points, 5);
        assert_eq!(account.plays, 2);
        assert_eq!(account.phone.as_deref(), Some("+39000"));
        let history = reopened.history(1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].seq, 0);

        // sequence numbers keep counting after a reopen
        assert_eq!(play(&reopened, 1).await.history.unwrap().seq, 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rounds_append_to_the_log_without_rewriting_it() {
        let dir = tmp_path("ledger_append");
        let ledger = MemoryLedger::open(&dir).unwrap();
        ledger.ensure_account(3, Profile::default()).await.unwrap();
        ledger.set_phone(3, "+1".to_string()).await.unwrap();

        let log = dir.join("history.jsonl");
        let mut lengths = Vec::new();
        for _ in 0..3 {
            play(&ledger, 3).await;
            lengths.push(fs::read_to_string(&log).unwrap().lines().count());
        }
        assert_eq!(lengths, vec![1, 2, 3]);

        // the first line is untouched by later commits
        let first = fs::read_to_string(&log).unwrap().lines().next().unwrap().to_string();
        play(&ledger, 3).await;
        assert!(fs::read_to_string(&log).unwrap().starts_with(&first));

        let accounts = fs::read_to_string(dir.join("accounts.json")).unwrap();
        assert!(!accounts.contains("user_roll"), "snapshot carries history");

        // a reset rewrites the snapshot only
        ledger.reset_all_plays().await.unwrap();
        assert_eq!(fs::read_to_string(&log).unwrap().lines().count(), 4);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn uncommitted_log_lines_are_dropped_on_load() {
        let dir = tmp_path("ledger_torn");
        {
            let ledger = MemoryLedger::open(&dir).unwrap();
            ledger.ensure_account(4, Profile::default()).await.unwrap();
            ledger.set_phone(4, "+1".to_string()).await.unwrap();
            play(&ledger, 4).await;
        }
        // a line whose snapshot never landed, then a torn append
        let log = dir.join("history.jsonl");
        let stray = HistoryRecord {
            seq: 1,
            ..win(4).into_record(0, Utc::now())
        };
        let mut contents = fs::read_to_string(&log).unwrap();
        contents.push_str(&serde_json::to_string(&stray).unwrap());
        contents.push_str("\n{\"seq\":2,\"user_");
        fs::write(&log, contents).unwrap();

        let reopened = MemoryLedger::open(&dir).unwrap();
        assert_eq!(reopened.history(4).await.unwrap().len(), 1);
        assert_eq!(fs::read_to_string(&log).unwrap().lines().count(), 1);
        assert_eq!(play(&reopened, 4).await.history.unwrap().seq, 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tmp_path("ledger_corrupt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("accounts.json"), "{ not json").unwrap();
        assert!(matches!(
            MemoryLedger::open(&dir),
            Err(StoreError::Encode(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}
