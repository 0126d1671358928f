//! Append-only ledger of money movements.
//!
//! The balance is never stored. It is always the signed sum of a user's
//! movements, read inside whatever transaction depends on it.

use crate::{
    error::{EngineError, EngineResult},
    models::{LedgerMovement, MovementKind},
    storage::{bad_enum, fmt_ts, parse_decimal, parse_ts, Database},
};
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use tracing::{debug, info};

const MAX_STATEMENT_ROWS: usize = 1000;

#[derive(Clone)]
pub struct LedgerStore {
    db: Database,
}

impl LedgerStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Derived balance for one user
    pub fn balance_of(&self, user_id: &str) -> EngineResult<Decimal> {
        self.db.read(|tx| Self::balance_in(tx, user_id))
    }

    /// Append one movement in its own transaction
    pub fn record(&self, movement: &LedgerMovement) -> EngineResult<()> {
        self.db.write(|tx| Self::append(tx, movement))
    }

    /// Most recent movements first
    pub fn statement(&self, user_id: &str, limit: usize) -> EngineResult<Vec<LedgerMovement>> {
        let limit = limit.clamp(1, MAX_STATEMENT_ROWS) as i64;
        self.db.read(|tx| {
            let mut stmt = tx.prepare_cached(
                "SELECT id, user_id, kind, amount, ts, reference
                 FROM ledger_movements
                 WHERE user_id = ?1
                 ORDER BY ts DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let movements = stmt
                .query_map(params![user_id, limit], Self::row_to_movement)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(movements)
        })
    }

    /// Movements referencing one slip, oldest first
    pub fn movements_for_slip(&self, slip_id: &str) -> EngineResult<Vec<LedgerMovement>> {
        self.db.read(|tx| {
            let mut stmt = tx.prepare_cached(
                "SELECT id, user_id, kind, amount, ts, reference
                 FROM ledger_movements
                 WHERE reference = ?1
                 ORDER BY ts ASC, rowid ASC",
            )?;
            let movements = stmt
                .query_map([slip_id], Self::row_to_movement)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(movements)
        })
    }

    pub fn deposit(&self, user_id: &str, amount: Decimal) -> EngineResult<LedgerMovement> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::validation("deposit amount must be greater than zero"));
        }
        let movement = LedgerMovement::new(user_id, MovementKind::Deposit, amount);
        self.record(&movement)?;
        info!(user_id, %amount, "💰 Deposit recorded");
        Ok(movement)
    }

    /// Withdraw if the derived balance covers it; check and debit share one transaction
    pub fn withdraw(&self, user_id: &str, amount: Decimal) -> EngineResult<LedgerMovement> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::validation("withdrawal amount must be greater than zero"));
        }
        let movement = LedgerMovement::new(user_id, MovementKind::Withdrawal, amount);
        self.db.write(|tx| {
            let balance = Self::balance_in(tx, user_id)?;
            if balance < amount {
                return Err(EngineError::InsufficientBalance {
                    balance,
                    required: amount,
                });
            }
            Self::append(tx, &movement)
        })?;
        info!(user_id, %amount, "🏧 Withdrawal recorded");
        Ok(movement)
    }

    /// Balance as seen by the caller's transaction
    pub fn balance_in(conn: &Connection, user_id: &str) -> EngineResult<Decimal> {
        let mut stmt =
            conn.prepare_cached("SELECT kind, amount FROM ledger_movements WHERE user_id = ?1")?;
        let rows = stmt.query_map([user_id], |row| {
            let kind: String = row.get(0)?;
            let kind = MovementKind::from_str(&kind).ok_or_else(|| bad_enum(0, &kind))?;
            let amount = parse_decimal(1, &row.get::<_, String>(1)?)?;
            Ok(kind.signed(amount))
        })?;

        let mut balance = Decimal::ZERO;
        for signed in rows {
            balance += signed?;
        }
        Ok(balance)
    }

    /// Insert one movement as part of the caller's transaction
    pub fn append(conn: &Connection, movement: &LedgerMovement) -> EngineResult<()> {
        if movement.amount <= Decimal::ZERO {
            return Err(EngineError::validation("ledger amounts must be positive"));
        }
        conn.execute(
            "INSERT INTO ledger_movements (id, user_id, kind, amount, ts, reference)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &movement.id,
                &movement.user_id,
                movement.kind.as_str(),
                movement.amount.to_string(),
                fmt_ts(&movement.timestamp),
                movement.reference.as_deref(),
            ],
        )?;
        debug!(
            user_id = %movement.user_id,
            kind = movement.kind.as_str(),
            amount = %movement.amount,
            reference = ?movement.reference,
            "Ledger movement appended"
        );
        Ok(())
    }

    fn row_to_movement(row: &Row) -> rusqlite::Result<LedgerMovement> {
        let kind: String = row.get(2)?;
        Ok(LedgerMovement {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: MovementKind::from_str(&kind).ok_or_else(|| bad_enum(2, &kind))?,
            amount: parse_decimal(3, &row.get::<_, String>(3)?)?,
            timestamp: parse_ts(4, &row.get::<_, String>(4)?)?,
            reference: row.get(5)?,
        })
    }
}
