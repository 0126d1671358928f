//! Slip persistence.
//!
//! Two write paths touch the ledger: slip creation (balance check, slip + legs,
//! stake debit) and per-slip settlement (leg updates, slip status, payout or
//! refund). Each runs as a single transaction.

use crate::{
    error::{EngineError, EngineResult},
    ledger::LedgerStore,
    models::{BetLeg, BetSlip, LedgerMovement, LegStatus, MovementKind, SlipStatus},
    settlement::derive_slip_status,
    slip::PricedSlip,
    storage::{bad_enum, fmt_ts, parse_decimal, parse_ts, Database},
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

const SLIP_COLUMNS: &str = "id, user_id, stake, total_odds, potential_return, status, created_at";

#[derive(Clone)]
pub struct SlipRepository {
    db: Database,
}

impl SlipRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a validated slip and debit its stake, all or nothing.
    pub fn create_slip(&self, user_id: &str, priced: &PricedSlip) -> EngineResult<BetSlip> {
        let slip_id = uuid::Uuid::new_v4().to_string();
        let legs: Vec<BetLeg> = priced
            .legs
            .iter()
            .map(|leg| BetLeg::from_proposed(&slip_id, leg))
            .collect();
        let slip = BetSlip {
            id: slip_id,
            user_id: user_id.to_string(),
            stake: priced.stake,
            total_odds: priced.total_odds,
            potential_return: priced.potential_return,
            status: SlipStatus::Pending,
            created_at: Utc::now(),
            legs,
        };

        self.db.write(|tx| {
            let balance = LedgerStore::balance_in(tx, user_id)?;
            if balance < slip.stake {
                return Err(EngineError::InsufficientBalance {
                    balance,
                    required: slip.stake,
                });
            }

            tx.execute(
                "INSERT INTO bet_slips (id, user_id, stake, total_odds, potential_return, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &slip.id,
                    &slip.user_id,
                    slip.stake.to_string(),
                    slip.total_odds.to_string(),
                    slip.potential_return.to_string(),
                    slip.status.as_str(),
                    fmt_ts(&slip.created_at),
                ],
            )?;

            for (position, leg) in slip.legs.iter().enumerate() {
                tx.execute(
                    "INSERT INTO bet_legs (id, slip_id, position, competition, home_team, away_team,
                        market, selection, line, odds, match_datetime, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        &leg.id,
                        &leg.slip_id,
                        position as i64,
                        &leg.competition,
                        &leg.home_team,
                        &leg.away_team,
                        &leg.market,
                        &leg.selection,
                        leg.line.map(|l| l.to_string()),
                        leg.odds.to_string(),
                        fmt_ts(&leg.match_datetime),
                        leg.status.as_str(),
                    ],
                )?;
            }

            let stake = LedgerMovement::new(user_id, MovementKind::Stake, slip.stake)
                .with_reference(&slip.id);
            LedgerStore::append(tx, &stake)?;
            Ok(())
        })?;

        info!(
            user_id,
            slip_id = %slip.id,
            stake = %slip.stake,
            legs = slip.legs.len(),
            potential_return = %slip.potential_return,
            "🎫 Slip created"
        );
        Ok(slip)
    }

    /// All slips of a user with legs, newest first
    pub fn list_slips(&self, user_id: &str) -> EngineResult<Vec<BetSlip>> {
        self.db.read(|tx| {
            Self::query_slips(
                tx,
                &format!(
                    "SELECT {SLIP_COLUMNS} FROM bet_slips WHERE user_id = ?1
                     ORDER BY created_at DESC, rowid DESC"
                ),
                user_id,
            )
        })
    }

    /// Pending slips of a user, oldest first
    pub fn pending_slips(&self, user_id: &str) -> EngineResult<Vec<BetSlip>> {
        self.db.read(|tx| {
            Self::query_slips(
                tx,
                &format!(
                    "SELECT {SLIP_COLUMNS} FROM bet_slips WHERE user_id = ?1 AND status = 'pending'
                     ORDER BY created_at ASC, rowid ASC"
                ),
                user_id,
            )
        })
    }

    /// One slip owned by `user_id`
    pub fn get_slip(&self, user_id: &str, slip_id: &str) -> EngineResult<BetSlip> {
        self.db.read(|tx| {
            let slip = tx
                .query_row(
                    &format!("SELECT {SLIP_COLUMNS} FROM bet_slips WHERE id = ?1 AND user_id = ?2"),
                    params![slip_id, user_id],
                    Self::row_to_slip,
                )
                .optional()?;
            match slip {
                Some(mut slip) => {
                    slip.legs = Self::load_legs(tx, &slip.id)?;
                    Ok(slip)
                }
                None => Err(EngineError::NotFound(format!("slip {}", slip_id))),
            }
        })
    }

    /// Users that have at least one pending slip
    pub fn users_with_pending_slips(&self) -> EngineResult<Vec<String>> {
        self.db.read(|tx| {
            let mut stmt = tx.prepare_cached(
                "SELECT DISTINCT user_id FROM bet_slips WHERE status = 'pending' ORDER BY user_id",
            )?;
            let users = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(users)
        })
    }

    /// Cancel a still-pending slip and refund its stake. Returns false when the
    /// slip already left `pending`, in which case nothing is written.
    pub fn cancel_slip(&self, slip_id: &str) -> EngineResult<bool> {
        self.db.write(|tx| {
            let Some((user_id, stake)) = tx
                .query_row(
                    "SELECT user_id, stake FROM bet_slips WHERE id = ?1 AND status = 'pending'",
                    [slip_id],
                    |row| Ok((row.get::<_, String>(0)?, parse_decimal(1, &row.get::<_, String>(1)?)?)),
                )
                .optional()?
            else {
                return Ok(false);
            };

            Self::transition(tx, slip_id, SlipStatus::Cancelled)?;
            let refund =
                LedgerMovement::new(&user_id, MovementKind::Payout, stake).with_reference(slip_id);
            LedgerStore::append(tx, &refund)?;

            info!(user_id = %user_id, slip_id, refund = %stake, "↩️ Slip cancelled, stake refunded");
            Ok(true)
        })
    }

    /// Apply leg results and derive the slip status from a consistent snapshot
    /// of all its legs. A `won` transition records the payout in the same
    /// transaction. Returns the new status when the slip left `pending`.
    pub fn apply_settlement(
        &self,
        slip_id: &str,
        leg_updates: &[(String, LegStatus)],
    ) -> EngineResult<Option<SlipStatus>> {
        self.db.write(|tx| {
            let Some(slip) = tx
                .query_row(
                    &format!("SELECT {SLIP_COLUMNS} FROM bet_slips WHERE id = ?1"),
                    [slip_id],
                    Self::row_to_slip,
                )
                .optional()?
            else {
                return Err(EngineError::NotFound(format!("slip {}", slip_id)));
            };

            if slip.status.is_terminal() {
                debug!(slip_id, status = slip.status.as_str(), "Slip already settled, skipping");
                return Ok(None);
            }

            for (leg_id, status) in leg_updates {
                if *status == LegStatus::Pending {
                    continue;
                }
                let changed = tx.execute(
                    "UPDATE bet_legs SET status = ?1
                     WHERE id = ?2 AND slip_id = ?3 AND status = 'pending'",
                    params![status.as_str(), leg_id, slip_id],
                )?;
                if changed == 1 {
                    debug!(slip_id, leg_id = %leg_id, status = status.as_str(), "Leg settled");
                }
            }

            let statuses: Vec<LegStatus> = Self::load_legs(tx, slip_id)?
                .into_iter()
                .map(|leg| leg.status)
                .collect();

            match derive_slip_status(&statuses) {
                SlipStatus::Pending => Ok(None),
                SlipStatus::Won => {
                    Self::transition(tx, slip_id, SlipStatus::Won)?;
                    let payout = LedgerMovement::new(
                        &slip.user_id,
                        MovementKind::Payout,
                        slip.potential_return,
                    )
                    .with_reference(slip_id);
                    LedgerStore::append(tx, &payout)?;
                    info!(
                        user_id = %slip.user_id,
                        slip_id,
                        payout = %slip.potential_return,
                        "🏆 Slip won"
                    );
                    Ok(Some(SlipStatus::Won))
                }
                other => {
                    Self::transition(tx, slip_id, other)?;
                    info!(user_id = %slip.user_id, slip_id, status = other.as_str(), "Slip settled");
                    Ok(Some(other))
                }
            }
        })
    }

    /// pending -> terminal, guarded on the current status
    fn transition(conn: &Connection, slip_id: &str, to: SlipStatus) -> EngineResult<()> {
        let changed = conn.execute(
            "UPDATE bet_slips SET status = ?1 WHERE id = ?2 AND status = 'pending'",
            params![to.as_str(), slip_id],
        )?;
        if changed != 1 {
            return Err(EngineError::Persistence(anyhow::anyhow!(
                "slip {} is no longer pending",
                slip_id
            )));
        }
        Ok(())
    }

    fn query_slips(conn: &Connection, sql: &str, user_id: &str) -> EngineResult<Vec<BetSlip>> {
        let mut stmt = conn.prepare_cached(sql)?;
        let mut slips = stmt
            .query_map([user_id], Self::row_to_slip)?
            .collect::<Result<Vec<_>, _>>()?;
        for slip in &mut slips {
            slip.legs = Self::load_legs(conn, &slip.id)?;
        }
        Ok(slips)
    }

    fn load_legs(conn: &Connection, slip_id: &str) -> EngineResult<Vec<BetLeg>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, slip_id, competition, home_team, away_team, market, selection,
                    line, odds, match_datetime, status
             FROM bet_legs WHERE slip_id = ?1 ORDER BY position ASC",
        )?;
        let legs = stmt
            .query_map([slip_id], Self::row_to_leg)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(legs)
    }

    fn row_to_slip(row: &Row) -> rusqlite::Result<BetSlip> {
        let status: String = row.get(5)?;
        Ok(BetSlip {
            id: row.get(0)?,
            user_id: row.get(1)?,
            stake: parse_decimal(2, &row.get::<_, String>(2)?)?,
            total_odds: parse_decimal(3, &row.get::<_, String>(3)?)?,
            potential_return: parse_decimal(4, &row.get::<_, String>(4)?)?,
            status: SlipStatus::from_str(&status).ok_or_else(|| bad_enum(5, &status))?,
            created_at: parse_ts(6, &row.get::<_, String>(6)?)?,
            legs: Vec::new(),
        })
    }

    fn row_to_leg(row: &Row) -> rusqlite::Result<BetLeg> {
        let line: Option<String> = row.get(7)?;
        let status: String = row.get(10)?;
        Ok(BetLeg {
            id: row.get(0)?,
            slip_id: row.get(1)?,
            competition: row.get(2)?,
            home_team: row.get(3)?,
            away_team: row.get(4)?,
            market: row.get(5)?,
            selection: row.get(6)?,
            line: line.map(|l| parse_decimal(7, &l)).transpose()?,
            odds: parse_decimal(8, &row.get::<_, String>(8)?)?,
            match_datetime: parse_ts(9, &row.get::<_, String>(9)?)?,
            status: LegStatus::from_str(&status).ok_or_else(|| bad_enum(10, &status))?,
        })
    }
}
