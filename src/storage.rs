//! SQLite storage for slips, legs and ledger movements.
//!
//! - WAL mode so statement reads don't block on settlement writes
//! - Every write runs in a `BEGIN IMMEDIATE` transaction: the write lock is
//!   taken before the balance is read, so check-then-debit cannot interleave
//! - Ledger rows are protected against UPDATE/DELETE by triggers
//! - At most one stake and one payout movement per slip (partial unique indexes)

use crate::error::EngineResult;
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{types::Type, Connection, OpenFlags, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use std::{collections::HashMap, str::FromStr, sync::Arc};
use tracing::{error, info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS ledger_movements (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('deposit', 'withdrawal', 'stake', 'payout')),
    amount TEXT NOT NULL,
    ts TEXT NOT NULL,
    reference TEXT
);

CREATE INDEX IF NOT EXISTS idx_ledger_user_ts
    ON ledger_movements(user_id, ts DESC);

CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_one_stake_per_slip
    ON ledger_movements(reference) WHERE kind = 'stake' AND reference IS NOT NULL;

CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_one_payout_per_slip
    ON ledger_movements(reference) WHERE kind = 'payout' AND reference IS NOT NULL;

CREATE TRIGGER IF NOT EXISTS ledger_movements_no_update
    BEFORE UPDATE ON ledger_movements
BEGIN
    SELECT RAISE(ABORT, 'ledger_movements is append-only');
END;

CREATE TRIGGER IF NOT EXISTS ledger_movements_no_delete
    BEFORE DELETE ON ledger_movements
BEGIN
    SELECT RAISE(ABORT, 'ledger_movements is append-only');
END;

CREATE TABLE IF NOT EXISTS bet_slips (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    stake TEXT NOT NULL,
    total_odds TEXT NOT NULL,
    potential_return TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'won', 'lost', 'cancelled')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bet_slips_user_status
    ON bet_slips(user_id, status, created_at);

CREATE TABLE IF NOT EXISTS bet_legs (
    id TEXT PRIMARY KEY,
    slip_id TEXT NOT NULL REFERENCES bet_slips(id),
    position INTEGER NOT NULL,
    competition TEXT NOT NULL,
    home_team TEXT NOT NULL,
    away_team TEXT NOT NULL,
    market TEXT NOT NULL,
    selection TEXT NOT NULL,
    line TEXT,
    odds TEXT NOT NULL,
    match_datetime TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'won', 'lost'))
);

CREATE INDEX IF NOT EXISTS idx_bet_legs_slip
    ON bet_legs(slip_id, position);
"#;

/// Shared SQLite handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(db_path: &str) -> anyhow::Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        info!(db_path, "💾 Bet slip database initialized");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` inside one IMMEDIATE transaction. Commits on Ok, rolls back on Err.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> EngineResult<T>) -> EngineResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Consistent read-only snapshot
    pub fn read<T>(&self, f: impl FnOnce(&Transaction<'_>) -> EngineResult<T>) -> EngineResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Per-user async locks. Creation and settlement for one user are serialized;
/// different users proceed independently.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl UserLocks {
    pub async fn lock(&self, user_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            if locks.len() > 4096 {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks.entry(user_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_decimal(idx: usize, raw: &str) -> rusqlite::Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn bad_enum(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unexpected value '{}'", raw).into(),
    )
}

#[cfg(test)]
pub(crate) fn temp_db() -> (Database, tempfile::NamedTempFile) {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let db = Database::open(temp_file.path().to_str().unwrap()).unwrap();
    (db, temp_file)
}
