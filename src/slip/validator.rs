//! Slip validation and pricing.
//!
//! Pure over its inputs: no storage access, no clock.

use super::evaluator::{is_over_selection, is_under_selection, one_x_two_pick, Market};
use crate::{
    error::{EngineError, EngineResult},
    models::{BetLeg, ProposedLeg},
    names,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, BTreeSet};

/// Read access to the fields conflict detection looks at
pub trait LegSelection {
    fn home_team(&self) -> &str;
    fn away_team(&self) -> &str;
    fn market(&self) -> &str;
    fn selection(&self) -> &str;
}

impl LegSelection for ProposedLeg {
    fn home_team(&self) -> &str {
        &self.home_team
    }
    fn away_team(&self) -> &str {
        &self.away_team
    }
    fn market(&self) -> &str {
        &self.market
    }
    fn selection(&self) -> &str {
        &self.selection
    }
}

impl LegSelection for BetLeg {
    fn home_team(&self) -> &str {
        &self.home_team
    }
    fn away_team(&self) -> &str {
        &self.away_team
    }
    fn market(&self) -> &str {
        &self.market
    }
    fn selection(&self) -> &str {
        &self.selection
    }
}

/// A slip that passed validation, with its price fixed
#[derive(Debug, Clone, PartialEq)]
pub struct PricedSlip {
    pub stake: Decimal,
    pub total_odds: Decimal,
    pub potential_return: Decimal,
    pub legs: Vec<ProposedLeg>,
}

/// Validate a proposed slip and compute its odds and potential return.
pub fn validate_slip(stake: Decimal, legs: &[ProposedLeg]) -> EngineResult<PricedSlip> {
    if stake <= Decimal::ZERO {
        return Err(EngineError::validation("stake must be greater than zero"));
    }
    if legs.is_empty() {
        return Err(EngineError::validation("slip has no legs"));
    }

    for (idx, leg) in legs.iter().enumerate() {
        check_leg_fields(idx, leg)?;
    }

    if let Some(conflict) = find_conflict(legs) {
        return Err(EngineError::Validation(conflict));
    }

    let total_odds = legs
        .iter()
        .try_fold(Decimal::ONE, |acc, leg| acc.checked_mul(leg.odds))
        .ok_or_else(|| EngineError::validation("combined odds out of range"))?;

    let potential_return = price(stake, total_odds)
        .ok_or_else(|| EngineError::validation("potential return out of range"))?;

    Ok(PricedSlip {
        stake,
        total_odds,
        potential_return,
        legs: legs.to_vec(),
    })
}

/// stake x odds, half-up to cents
pub fn price(stake: Decimal, total_odds: Decimal) -> Option<Decimal> {
    stake
        .checked_mul(total_odds)
        .map(|v| v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

fn check_leg_fields(idx: usize, leg: &ProposedLeg) -> EngineResult<()> {
    let required = [
        ("competition", &leg.competition),
        ("home_team", &leg.home_team),
        ("away_team", &leg.away_team),
        ("market", &leg.market),
        ("selection", &leg.selection),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "leg {}: {} is required",
                idx, field
            )));
        }
    }

    if leg.odds <= Decimal::ONE {
        return Err(EngineError::Validation(format!(
            "leg {}: odds must be greater than 1 (got {})",
            idx, leg.odds
        )));
    }

    if names::normalize(&leg.home_team) == names::normalize(&leg.away_team) {
        return Err(EngineError::Validation(format!(
            "leg {}: home and away team are the same",
            idx
        )));
    }

    Ok(())
}

/// Describe the first logically impossible combination, if any.
///
/// Legs are grouped per fixture. Within a fixture two different 1X2 picks
/// conflict, and any Over selection conflicts with any Under selection
/// whatever their lines.
pub fn find_conflict<L: LegSelection>(legs: &[L]) -> Option<String> {
    let mut groups: BTreeMap<String, Vec<&L>> = BTreeMap::new();
    for leg in legs {
        groups
            .entry(names::match_key(leg.home_team(), leg.away_team()))
            .or_default()
            .push(leg);
    }

    for group in groups.values() {
        let fixture = format!("{} vs {}", group[0].home_team(), group[0].away_team());

        let one_x_two: BTreeSet<String> = group
            .iter()
            .filter(|leg| Market::classify(leg.market()) == Market::OneXTwo)
            .map(|leg| {
                one_x_two_pick(leg.selection())
                    .map(str::to_string)
                    .unwrap_or_else(|| leg.selection().trim().to_uppercase())
            })
            .collect();
        if one_x_two.len() > 1 {
            return Some(format!(
                "conflicting 1X2 selections on {}: {}",
                fixture,
                one_x_two.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }

        let has_over = group.iter().any(|leg| is_over_selection(leg.selection()));
        let has_under = group.iter().any(|leg| is_under_selection(leg.selection()));
        if has_over && has_under {
            return Some(format!("conflicting Over and Under selections on {}", fixture));
        }
    }

    None
}
