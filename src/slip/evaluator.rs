//! Leg evaluation against a final score.
//!
//! | Market        | Selection     | Wins when            |
//! |---------------|---------------|----------------------|
//! | 1X2           | `1`           | home > away          |
//! | 1X2           | `X`           | home == away         |
//! | 1X2           | `2`           | away > home          |
//! | Double Chance | `1X`          | home >= away         |
//! | Double Chance | `12`          | home != away         |
//! | Double Chance | `X2`          | away >= home         |
//! | Over/Under    | `Over <line>` | total goals > line   |
//! | Over/Under    | `Under <line>`| total goals < line   |
//!
//! Anything else stays pending. The evaluator never guesses.

use crate::models::{BetLeg, LegStatus, MatchOutcome, Score};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

lazy_static! {
    static ref OVER_RE: Regex = Regex::new(r"(?i)over").expect("static regex");
    static ref UNDER_RE: Regex = Regex::new(r"(?i)under").expect("static regex");
    static ref LINE_RE: Regex = Regex::new(r"(\d+(?:[.,]\d+)?)").expect("static regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    OneXTwo,
    DoubleChance,
    Totals,
    Other,
}

impl Market {
    pub fn classify(label: &str) -> Self {
        let label = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        match label.as_str() {
            "1x2" | "match result" | "full time result" | "match winner" => Market::OneXTwo,
            "double chance" | "dc" => Market::DoubleChance,
            // Full-time match goals only; corners, cards, halves and team
            // totals are other markets
            "over/under" | "over under" | "o/u" | "total" | "totals" | "goals" | "total goals"
            | "goals over/under" | "over/under goals" | "match goals" => Market::Totals,
            _ => Market::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TotalsSide {
    Over,
    Under,
}

/// Selection text mentions "over" anywhere, any case
pub fn is_over_selection(selection: &str) -> bool {
    OVER_RE.is_match(selection)
}

/// Selection text mentions "under" anywhere, any case
pub fn is_under_selection(selection: &str) -> bool {
    UNDER_RE.is_match(selection)
}

/// Canonical 1X2 pick (`1`, `X`, `2`) or None when unrecognised
pub fn one_x_two_pick(selection: &str) -> Option<&'static str> {
    match selection.trim().to_uppercase().as_str() {
        "1" | "HOME" => Some("1"),
        "X" | "DRAW" => Some("X"),
        "2" | "AWAY" => Some("2"),
        _ => None,
    }
}

fn double_chance_pick(selection: &str) -> Option<&'static str> {
    let compact: String = selection
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '/')
        .collect::<String>()
        .to_uppercase();
    match compact.as_str() {
        "1X" | "X1" => Some("1X"),
        "12" | "21" => Some("12"),
        "X2" | "2X" => Some("X2"),
        _ => None,
    }
}

/// Line declared on the leg, else the number inside the selection ("Over 2.5")
pub fn totals_line(selection: &str, line: Option<Decimal>) -> Option<Decimal> {
    if line.is_some() {
        return line;
    }
    let caps = LINE_RE.captures(selection)?;
    Decimal::from_str(&caps[1].replace(',', ".")).ok()
}

fn totals_side(selection: &str) -> Option<TotalsSide> {
    let s = selection.trim().to_lowercase();
    if s.starts_with("over") {
        Some(TotalsSide::Over)
    } else if s.starts_with("under") {
        Some(TotalsSide::Under)
    } else {
        None
    }
}

fn decided(won: bool) -> LegStatus {
    if won {
        LegStatus::Won
    } else {
        LegStatus::Lost
    }
}

/// Decide one selection against a final score
pub fn evaluate_selection(
    market: &str,
    selection: &str,
    line: Option<Decimal>,
    score: Score,
) -> LegStatus {
    let (h, a) = (score.home_goals, score.away_goals);

    match Market::classify(market) {
        Market::OneXTwo => match one_x_two_pick(selection) {
            Some("1") => decided(h > a),
            Some("X") => decided(h == a),
            Some("2") => decided(a > h),
            _ => LegStatus::Pending,
        },
        Market::DoubleChance => match double_chance_pick(selection) {
            Some("1X") => decided(h >= a),
            Some("12") => decided(h != a),
            Some("X2") => decided(a >= h),
            _ => LegStatus::Pending,
        },
        Market::Totals => {
            let (Some(side), Some(line)) = (totals_side(selection), totals_line(selection, line))
            else {
                return LegStatus::Pending;
            };
            let total = Decimal::from(score.total());
            match side {
                TotalsSide::Over => decided(total > line),
                TotalsSide::Under => decided(total < line),
            }
        }
        Market::Other => LegStatus::Pending,
    }
}

/// Decide a persisted leg; pending unless the outcome carries a score
pub fn evaluate_leg(leg: &BetLeg, outcome: &MatchOutcome) -> LegStatus {
    match outcome.score() {
        Some(score) => evaluate_selection(&leg.market, &leg.selection, leg.line, score),
        None => LegStatus::Pending,
    }
}
