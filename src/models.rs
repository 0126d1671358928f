use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of money movement recorded in the ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Deposit,
    Withdrawal,
    Stake,
    Payout,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Deposit => "deposit",
            MovementKind::Withdrawal => "withdrawal",
            MovementKind::Stake => "stake",
            MovementKind::Payout => "payout",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(MovementKind::Deposit),
            "withdrawal" => Some(MovementKind::Withdrawal),
            "stake" => Some(MovementKind::Stake),
            "payout" => Some(MovementKind::Payout),
            _ => None,
        }
    }

    /// Sign applied when deriving a balance: credits add, debits subtract.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            MovementKind::Deposit | MovementKind::Payout => amount,
            MovementKind::Withdrawal | MovementKind::Stake => -amount,
        }
    }
}

/// One immutable financial event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerMovement {
    pub id: String,
    pub user_id: String,
    pub kind: MovementKind,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Slip the movement belongs to (stakes, payouts, refunds)
    pub reference: Option<String>,
}

impl LedgerMovement {
    pub fn new(user_id: &str, kind: MovementKind, amount: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            amount,
            timestamp: Utc::now(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, slip_id: &str) -> Self {
        self.reference = Some(slip_id.to_string());
        self
    }
}

/// Slip lifecycle: pending -> {won, lost, cancelled}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlipStatus {
    Pending,
    Won,
    Lost,
    Cancelled,
}

impl SlipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlipStatus::Pending => "pending",
            SlipStatus::Won => "won",
            SlipStatus::Lost => "lost",
            SlipStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SlipStatus::Pending),
            "won" => Some(SlipStatus::Won),
            "lost" => Some(SlipStatus::Lost),
            "cancelled" => Some(SlipStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SlipStatus::Pending)
    }
}

/// Leg lifecycle: pending -> {won, lost}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Pending,
    Won,
    Lost,
}

impl LegStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegStatus::Pending => "pending",
            LegStatus::Won => "won",
            LegStatus::Lost => "lost",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LegStatus::Pending),
            "won" => Some(LegStatus::Won),
            "lost" => Some(LegStatus::Lost),
            _ => None,
        }
    }
}

/// A leg as submitted by the client, before it belongs to a slip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProposedLeg {
    pub competition: String,
    pub home_team: String,
    pub away_team: String,
    pub market: String,
    pub selection: String,
    #[serde(default)]
    pub line: Option<Decimal>,
    pub odds: Decimal,
    pub match_datetime: DateTime<Utc>,
}

/// Persisted leg of a slip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BetLeg {
    pub id: String,
    pub slip_id: String,
    pub competition: String,
    pub home_team: String,
    pub away_team: String,
    pub market: String,
    pub selection: String,
    pub line: Option<Decimal>,
    pub odds: Decimal,
    pub match_datetime: DateTime<Utc>,
    pub status: LegStatus,
}

impl BetLeg {
    pub fn from_proposed(slip_id: &str, leg: &ProposedLeg) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slip_id: slip_id.to_string(),
            competition: leg.competition.trim().to_string(),
            home_team: leg.home_team.trim().to_string(),
            away_team: leg.away_team.trim().to_string(),
            market: leg.market.trim().to_string(),
            selection: leg.selection.trim().to_string(),
            line: leg.line,
            odds: leg.odds,
            match_datetime: leg.match_datetime,
            status: LegStatus::Pending,
        }
    }
}

/// Accumulator wager; immutable except for `status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BetSlip {
    pub id: String,
    pub user_id: String,
    pub stake: Decimal,
    pub total_odds: Decimal,
    pub potential_return: Decimal,
    pub status: SlipStatus,
    pub created_at: DateTime<Utc>,
    pub legs: Vec<BetLeg>,
}

/// Returned to the caller after a successful `create_slip`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlipReceipt {
    pub slip_id: String,
    pub total_odds: Decimal,
    pub potential_return: Decimal,
}

/// One slip whose status changed during a settlement cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementUpdate {
    pub slip_id: String,
    pub new_status: SlipStatus,
}

/// Final score of a finished match
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Score {
    pub home_goals: u32,
    pub away_goals: u32,
}

impl Score {
    pub fn new(home_goals: u32, away_goals: u32) -> Self {
        Self {
            home_goals,
            away_goals,
        }
    }

    pub fn total(&self) -> u32 {
        self.home_goals + self.away_goals
    }
}

/// Result of one resolver lookup. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchOutcome {
    pub found: bool,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub ambiguous: bool,
    pub reason: Option<String>,
}

impl MatchOutcome {
    pub fn found(score: Score) -> Self {
        Self {
            found: true,
            home_goals: Some(score.home_goals),
            away_goals: Some(score.away_goals),
            ambiguous: false,
            reason: None,
        }
    }

    pub fn missing(reason: impl Into<String>) -> Self {
        Self {
            found: false,
            home_goals: None,
            away_goals: None,
            ambiguous: false,
            reason: Some(reason.into()),
        }
    }

    /// Only the reversed fixture exists in the source
    pub fn ambiguous(reason: impl Into<String>) -> Self {
        Self {
            ambiguous: true,
            ..Self::missing(reason)
        }
    }

    pub fn score(&self) -> Option<Score> {
        match (self.found, self.home_goals, self.away_goals) {
            (true, Some(h), Some(a)) => Some(Score::new(h, a)),
            _ => None,
        }
    }
}
