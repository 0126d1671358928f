//! End-to-end: deposits, slip creation and settlement against a fixed
//! result snapshot.

use betslip_backend::{
    engine::BetEngine,
    error::EngineError,
    models::{MovementKind, ProposedLeg, SlipStatus},
    names::TeamAliases,
    results::{ResultResolver, StaticResultSource},
    storage::Database,
};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tempfile::NamedTempFile;

const ROUND_ONE: &str = "\
= Premier League 2024/25
[Sat Aug 17 2024]
  15.00  Arsenal                  2-0 (1-0)  Wolverhampton Wanderers
  15.00  Everton                  0-3 (0-1)  Brighton & Hove Albion
  17.30  Newcastle United         1-0 (0-0)  Southampton
[Sun Aug 18 2024]
  16.30  Chelsea                  0-2 (0-1)  Manchester City
[Sat Aug 24 2024]
  15.00  Fulham                   v          Leicester City
";

fn engine() -> (BetEngine, NamedTempFile) {
    let temp = NamedTempFile::new().unwrap();
    let db = Database::open(temp.path().to_str().unwrap()).unwrap();

    let source = StaticResultSource::new().with_text("Premier League", ROUND_ONE);
    let mut aliases = HashMap::new();
    aliases.insert("Wolves".to_string(), "Wolverhampton Wanderers".to_string());
    aliases.insert("Man City".to_string(), "Manchester City".to_string());
    aliases.insert("Brighton".to_string(), "Brighton & Hove Albion".to_string());

    let resolver = ResultResolver::new(
        vec![Arc::new(source)],
        TeamAliases::new(&aliases),
        Duration::from_secs(72 * 3600),
    );
    (
        BetEngine::new(db, Arc::new(resolver), Duration::from_secs(5)),
        temp,
    )
}

fn leg(home: &str, away: &str, market: &str, selection: &str, odds: Decimal, day: u32) -> ProposedLeg {
    ProposedLeg {
        competition: "Premier League".to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        market: market.to_string(),
        selection: selection.to_string(),
        line: None,
        odds,
        match_datetime: Utc.with_ymd_and_hms(2024, 8, day, 14, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_weekend_of_slips() {
    let (engine, _temp) = engine();
    engine.deposit("alice", dec!(100)).await.unwrap();

    // Wins: home win plus away win via aliases
    let winner = engine
        .create_slip(
            "alice",
            dec!(10),
            &[
                leg("Arsenal", "Wolves", "1X2", "HOME", dec!(1.50), 17),
                leg("Chelsea", "Man City", "Match Result", "2", dec!(2.00), 18),
            ],
        )
        .await
        .unwrap();
    assert_eq!(winner.potential_return, dec!(30.00));

    // Loses on the totals leg
    let loser = engine
        .create_slip(
            "alice",
            dec!(20),
            &[leg("Newcastle United", "Southampton", "Total Goals", "Over 2.5", dec!(1.90), 17)],
        )
        .await
        .unwrap();

    // Waits on a fixture without a score yet
    let waiting = engine
        .create_slip(
            "alice",
            dec!(5),
            &[
                leg("Everton", "Brighton", "Double Chance", "X2", dec!(1.20), 17),
                leg("Fulham", "Leicester City", "1X2", "1", dec!(1.80), 24),
            ],
        )
        .await
        .unwrap();

    assert_eq!(engine.get_balance("alice").unwrap(), dec!(65));

    let updates = engine.run_settlement_cycle("alice").await.unwrap();
    assert_eq!(updates.len(), 2);
    let status_of = |id: &str| {
        updates
            .iter()
            .find(|u| u.slip_id == id)
            .map(|u| u.new_status)
    };
    assert_eq!(status_of(&winner.slip_id), Some(SlipStatus::Won));
    assert_eq!(status_of(&loser.slip_id), Some(SlipStatus::Lost));
    assert_eq!(status_of(&waiting.slip_id), None);

    assert_eq!(engine.get_balance("alice").unwrap(), dec!(95.00));

    let waiting = engine.get_slip("alice", &waiting.slip_id).unwrap();
    assert_eq!(waiting.status, SlipStatus::Pending);

    // Repeat cycles change nothing
    assert!(engine.run_settlement_cycle("alice").await.unwrap().is_empty());
    assert_eq!(engine.get_balance("alice").unwrap(), dec!(95.00));
    assert_eq!(engine.users_with_pending_slips().unwrap(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_balance_equals_sum_of_movements() {
    let (engine, _temp) = engine();
    engine.deposit("bob", dec!(40)).await.unwrap();
    engine.withdraw("bob", dec!(15)).await.unwrap();
    engine
        .create_slip(
            "bob",
            dec!(10),
            &[leg("Arsenal", "Wolves", "1X2", "1", dec!(1.5), 17)],
        )
        .await
        .unwrap();
    engine.run_settlement_cycle("bob").await.unwrap();

    let statement = engine.get_statement("bob", 1000).unwrap();
    let derived: Decimal = statement.iter().map(|m| m.kind.signed(m.amount)).sum();
    assert_eq!(derived, engine.get_balance("bob").unwrap());
    assert_eq!(derived, dec!(30.00));
    assert_eq!(statement[0].kind, MovementKind::Payout);

    let err = engine.withdraw("bob", dec!(31)).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance { .. }));
}

#[tokio::test]
async fn test_users_are_isolated() {
    let (engine, _temp) = engine();
    engine.deposit("alice", dec!(10)).await.unwrap();
    let receipt = engine
        .create_slip(
            "alice",
            dec!(10),
            &[leg("Arsenal", "Wolves", "1X2", "1", dec!(1.5), 17)],
        )
        .await
        .unwrap();

    assert!(matches!(
        engine.get_slip("bob", &receipt.slip_id),
        Err(EngineError::NotFound(_))
    ));
    assert!(engine.run_settlement_cycle("bob").await.unwrap().is_empty());
    assert_eq!(engine.get_balance("bob").unwrap(), Decimal::ZERO);
    assert_eq!(
        engine.get_slip("alice", &receipt.slip_id).unwrap().status,
        SlipStatus::Pending
    );
}
