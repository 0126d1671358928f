use crate::{
    error::{EngineError, EngineResult, ResolutionError},
    models::{BetSlip, LegStatus, SettlementUpdate, SlipStatus},
    repository::SlipRepository,
    results::{FixtureQuery, ResultResolver},
    slip::{evaluate_selection, find_conflict},
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

/// Settles one user's pending slips per call. Holds no timer; see
/// [`super::SettlementScheduler`] for the recurring driver.
#[derive(Clone)]
pub struct SettlementOrchestrator {
    repo: SlipRepository,
    resolver: Arc<ResultResolver>,
    lookup_timeout: Duration,
}

impl SettlementOrchestrator {
    pub fn new(repo: SlipRepository, resolver: Arc<ResultResolver>, lookup_timeout: Duration) -> Self {
        Self {
            repo,
            resolver,
            lookup_timeout,
        }
    }

    /// One settlement pass over the user's pending slips. Returns the slips
    /// whose status changed. Per-slip failures are logged and leave that slip
    /// pending for the next cycle.
    pub async fn run_cycle(&self, user_id: &str) -> EngineResult<Vec<SettlementUpdate>> {
        let slips = self.repo.pending_slips(user_id)?;
        if slips.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut updates = Vec::new();
        for slip in slips {
            match self.settle_slip(&slip, now).await {
                Ok(Some(new_status)) => updates.push(SettlementUpdate {
                    slip_id: slip.id.clone(),
                    new_status,
                }),
                Ok(None) => {}
                Err(err) => {
                    error!(user_id, slip_id = %slip.id, error = %err, "Slip settlement failed, retrying next cycle");
                }
            }
        }

        if !updates.is_empty() {
            info!(user_id, settled = updates.len(), "Settlement cycle complete");
        }
        Ok(updates)
    }

    async fn settle_slip(&self, slip: &BetSlip, now: DateTime<Utc>) -> EngineResult<Option<SlipStatus>> {
        if let Some(conflict) = find_conflict(&slip.legs) {
            warn!(slip_id = %slip.id, conflict, "Contradictory slip found at settlement, cancelling");
            let cancelled = self.repo.cancel_slip(&slip.id)?;
            return Ok(cancelled.then_some(SlipStatus::Cancelled));
        }

        let resolver = self.resolver.clone();
        let pending = slip.clone();
        let lookups = tokio::task::spawn_blocking(move || resolve_legs(&resolver, &pending, now));

        let leg_updates = match tokio::time::timeout(self.lookup_timeout, lookups).await {
            Ok(Ok(leg_updates)) => leg_updates,
            Ok(Err(join_err)) => {
                return Err(EngineError::Persistence(anyhow::anyhow!(
                    "leg resolution task failed: {}",
                    join_err
                )));
            }
            Err(_) => {
                let err = ResolutionError::Timeout(self.lookup_timeout.as_millis() as u64);
                warn!(slip_id = %slip.id, error = %err, "Slip stays pending");
                return Ok(None);
            }
        };

        if leg_updates.is_empty() {
            return Ok(None);
        }
        self.repo.apply_settlement(&slip.id, &leg_updates)
    }
}

/// Resolve the slip's pending legs in order. Stops at the first lost leg:
/// the accumulator is lost whatever the remaining legs do.
fn resolve_legs(resolver: &ResultResolver, slip: &BetSlip, now: DateTime<Utc>) -> Vec<(String, LegStatus)> {
    let mut changed = Vec::new();

    for leg in &slip.legs {
        if leg.status == LegStatus::Lost {
            break;
        }
        if leg.status != LegStatus::Pending {
            continue;
        }

        let status = match resolver.resolve_score(&FixtureQuery::for_leg(leg), now) {
            Ok(Some(score)) => evaluate_selection(&leg.market, &leg.selection, leg.line, score),
            Ok(None) => LegStatus::Pending,
            Err(err @ EngineError::AmbiguousResult { .. }) => {
                warn!(slip_id = %slip.id, leg_id = %leg.id, error = %err, "Leg left pending");
                LegStatus::Pending
            }
            Err(err @ EngineError::Resolution(ResolutionError::NoSource)) => {
                debug!(slip_id = %slip.id, leg_id = %leg.id, error = %err, "No result for leg");
                LegStatus::Pending
            }
            Err(err) => {
                warn!(slip_id = %slip.id, leg_id = %leg.id, error = %err, "Result source failed, leg left pending");
                LegStatus::Pending
            }
        };

        if status != LegStatus::Pending {
            changed.push((leg.id.clone(), status));
        }
        if status == LegStatus::Lost {
            break;
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::LedgerStore,
        models::{MovementKind, ProposedLeg},
        names::{self, TeamAliases},
        results::{source::Fixtures, ResultSource, StaticResultSource},
        slip::{validate_slip, PricedSlip},
        storage::{temp_db, Database},
    };
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Fixture {
        db: Database,
        repo: SlipRepository,
        ledger: LedgerStore,
        orchestrator: SettlementOrchestrator,
        _temp: tempfile::NamedTempFile,
    }

    fn fixture(results: &str) -> Fixture {
        let source = StaticResultSource::new().with_text("Premier League", results);
        fixture_with(vec![Arc::new(source)], Duration::from_secs(5))
    }

    fn fixture_with(sources: Vec<Arc<dyn ResultSource>>, lookup_timeout: Duration) -> Fixture {
        let (db, temp) = temp_db();
        let repo = SlipRepository::new(db.clone());
        let resolver = Arc::new(ResultResolver::new(
            sources,
            TeamAliases::default(),
            Duration::from_secs(72 * 3600),
        ));
        Fixture {
            orchestrator: SettlementOrchestrator::new(repo.clone(), resolver, lookup_timeout),
            repo,
            ledger: LedgerStore::new(db.clone()),
            db,
            _temp: temp,
        }
    }

    /// Blocks the calling thread before answering for one competition
    struct SlowSource {
        competition: String,
        delay: Duration,
    }

    impl ResultSource for SlowSource {
        fn name(&self) -> &str {
            "slow"
        }

        fn fixtures(&self, competition: &str) -> Result<Fixtures, ResolutionError> {
            if names::normalize(competition) != names::normalize(&self.competition) {
                return Err(ResolutionError::NoSource);
            }
            std::thread::sleep(self.delay);
            Ok(Arc::new(Vec::new()))
        }
    }

    fn leg(home: &str, away: &str, market: &str, selection: &str, odds: Decimal) -> ProposedLeg {
        ProposedLeg {
            competition: "Premier League".to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            market: market.to_string(),
            selection: selection.to_string(),
            line: None,
            odds,
            match_datetime: Utc.with_ymd_and_hms(2024, 8, 17, 14, 0, 0).unwrap(),
        }
    }

    fn place(f: &Fixture, legs: &[ProposedLeg]) -> BetSlip {
        f.ledger.deposit("alice", dec!(100)).unwrap();
        f.repo
            .create_slip("alice", &validate_slip(dec!(10), legs).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_legs_won_pays_out() {
        let f = fixture("2024-08-17 Arsenal 2-1 Wolves\n2024-08-17 Chelsea 1-1 Fulham\n");
        let slip = place(
            &f,
            &[
                leg("Arsenal", "Wolves", "1X2", "1", dec!(1.8)),
                leg("Chelsea", "Fulham", "1X2", "X", dec!(2.1)),
            ],
        );

        let updates = f.orchestrator.run_cycle("alice").await.unwrap();
        assert_eq!(
            updates,
            vec![SettlementUpdate {
                slip_id: slip.id.clone(),
                new_status: SlipStatus::Won
            }]
        );
        assert_eq!(f.ledger.balance_of("alice").unwrap(), dec!(127.80));

        // Second pass is a no-op
        assert!(f.orchestrator.run_cycle("alice").await.unwrap().is_empty());
        let payouts = f
            .ledger
            .movements_for_slip(&slip.id)
            .unwrap()
            .into_iter()
            .filter(|m| m.kind == MovementKind::Payout)
            .count();
        assert_eq!(payouts, 1);
    }

    #[tokio::test]
    async fn test_first_loss_settles_slip_before_other_legs() {
        // Second fixture has not been played yet
        let f = fixture("2024-08-17 Arsenal 0-1 Wolves\n2024-08-17 Chelsea v Fulham\n");
        let slip = place(
            &f,
            &[
                leg("Arsenal", "Wolves", "1X2", "1", dec!(1.8)),
                leg("Chelsea", "Fulham", "1X2", "1", dec!(2.1)),
            ],
        );

        let updates = f.orchestrator.run_cycle("alice").await.unwrap();
        assert_eq!(updates[0].new_status, SlipStatus::Lost);

        let stored = f.repo.get_slip("alice", &slip.id).unwrap();
        assert_eq!(stored.legs[0].status, LegStatus::Lost);
        assert_eq!(stored.legs[1].status, LegStatus::Pending);
        assert_eq!(f.ledger.balance_of("alice").unwrap(), dec!(90));
    }

    #[tokio::test]
    async fn test_reversed_fixture_keeps_leg_pending() {
        let f = fixture("2024-08-17 Wolves 1-2 Arsenal\n");
        let slip = place(&f, &[leg("Arsenal", "Wolves", "1X2", "1", dec!(1.8))]);

        assert!(f.orchestrator.run_cycle("alice").await.unwrap().is_empty());
        let stored = f.repo.get_slip("alice", &slip.id).unwrap();
        assert_eq!(stored.status, SlipStatus::Pending);
        assert_eq!(stored.legs[0].status, LegStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_source_never_counts_as_loss() {
        let f = fixture("");
        let mut other = leg("Inter", "Milan", "1X2", "1", dec!(2.0));
        other.competition = "Serie A".to_string();
        let slip = place(&f, &[other]);

        assert!(f.orchestrator.run_cycle("alice").await.unwrap().is_empty());
        assert_eq!(
            f.repo.get_slip("alice", &slip.id).unwrap().status,
            SlipStatus::Pending
        );
        assert_eq!(f.ledger.balance_of("alice").unwrap(), dec!(90));
    }

    #[tokio::test]
    async fn test_totals_and_double_chance_legs() {
        let f = fixture("2024-08-17 Arsenal 2-1 Wolves\n");
        let slip = place(
            &f,
            &[
                leg("Arsenal", "Wolves", "Total", "Over 2.5", dec!(1.9)),
                leg("Arsenal", "Wolves", "Double Chance", "1X", dec!(1.2)),
            ],
        );

        let updates = f.orchestrator.run_cycle("alice").await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].slip_id, slip.id);
        assert_eq!(updates[0].new_status, SlipStatus::Won);
    }

    struct UnreadableSource;

    impl ResultSource for UnreadableSource {
        fn name(&self) -> &str {
            "unreadable"
        }

        fn fixtures(&self, _competition: &str) -> Result<Fixtures, ResolutionError> {
            Err(ResolutionError::Io("permission denied".to_string()))
        }
    }

    #[tokio::test]
    async fn test_unreadable_source_leaves_leg_pending() {
        let f = fixture_with(vec![Arc::new(UnreadableSource)], Duration::from_secs(5));
        let slip = place(&f, &[leg("Arsenal", "Wolves", "1X2", "1", dec!(1.8))]);

        assert!(f.orchestrator.run_cycle("alice").await.unwrap().is_empty());
        let stored = f.repo.get_slip("alice", &slip.id).unwrap();
        assert_eq!(stored.status, SlipStatus::Pending);
        assert_eq!(stored.legs[0].status, LegStatus::Pending);
        assert_eq!(f.ledger.balance_of("alice").unwrap(), dec!(90));
    }

    #[tokio::test]
    async fn test_contradictory_slip_is_cancelled_with_one_refund() {
        let f = fixture("2024-08-17 Arsenal 2-1 Wolves\n");
        f.ledger.deposit("alice", dec!(100)).unwrap();

        // Stored without going through validation, as an older row would be
        let priced = PricedSlip {
            stake: dec!(10),
            total_odds: dec!(6.30),
            potential_return: dec!(63.00),
            legs: vec![
                leg("Arsenal", "Wolves", "1X2", "1", dec!(1.8)),
                leg("Arsenal", "Wolves", "1X2", "2", dec!(3.5)),
            ],
        };
        let slip = f.repo.create_slip("alice", &priced).unwrap();
        assert_eq!(f.ledger.balance_of("alice").unwrap(), dec!(90));

        let updates = f.orchestrator.run_cycle("alice").await.unwrap();
        assert_eq!(
            updates,
            vec![SettlementUpdate {
                slip_id: slip.id.clone(),
                new_status: SlipStatus::Cancelled
            }]
        );
        assert_eq!(f.ledger.balance_of("alice").unwrap(), dec!(100));

        let payouts: Vec<_> = f
            .ledger
            .movements_for_slip(&slip.id)
            .unwrap()
            .into_iter()
            .filter(|m| m.kind == MovementKind::Payout)
            .collect();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].amount, dec!(10));

        // Cancelled slips are not picked up again
        assert!(f.orchestrator.run_cycle("alice").await.unwrap().is_empty());
        assert_eq!(
            f.repo.get_slip("alice", &slip.id).unwrap().status,
            SlipStatus::Cancelled
        );
        assert_eq!(f.ledger.balance_of("alice").unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn test_slow_lookup_leaves_only_its_slip_pending() {
        let slow = SlowSource {
            competition: "La Liga".to_string(),
            delay: Duration::from_millis(500),
        };
        let premier = StaticResultSource::new().with_text("Premier League", "2024-08-17 Arsenal 2-1 Wolves\n");
        let f = fixture_with(
            vec![Arc::new(slow), Arc::new(premier)],
            Duration::from_millis(50),
        );

        let mut spanish = leg("Sevilla", "Betis", "1X2", "1", dec!(2.0));
        spanish.competition = "La Liga".to_string();
        let stuck = place(&f, &[spanish]);
        let settled = place(&f, &[leg("Arsenal", "Wolves", "1X2", "1", dec!(1.8))]);

        let updates = f.orchestrator.run_cycle("alice").await.unwrap();
        assert_eq!(
            updates,
            vec![SettlementUpdate {
                slip_id: settled.id.clone(),
                new_status: SlipStatus::Won
            }]
        );

        let stuck = f.repo.get_slip("alice", &stuck.id).unwrap();
        assert_eq!(stuck.status, SlipStatus::Pending);
        assert_eq!(stuck.legs[0].status, LegStatus::Pending);
        assert_eq!(f.ledger.balance_of("alice").unwrap(), dec!(198.00));
    }

    #[tokio::test]
    async fn test_write_failure_rolls_back_only_that_slip() {
        let f = fixture("2024-08-17 Arsenal 2-1 Wolves\n2024-08-17 Chelsea 1-1 Fulham\n");
        let broken = place(&f, &[leg("Arsenal", "Wolves", "1X2", "1", dec!(1.8))]);
        let healthy = place(&f, &[leg("Chelsea", "Fulham", "1X2", "X", dec!(3.0))]);

        let sql = format!(
            "CREATE TRIGGER fail_leg_update BEFORE UPDATE ON bet_legs
             WHEN OLD.slip_id = '{}'
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            broken.id
        );
        f.db.write(|tx| {
            tx.execute_batch(&sql)?;
            Ok(())
        })
        .unwrap();

        let updates = f.orchestrator.run_cycle("alice").await.unwrap();
        assert_eq!(
            updates,
            vec![SettlementUpdate {
                slip_id: healthy.id.clone(),
                new_status: SlipStatus::Won
            }]
        );

        let broken_now = f.repo.get_slip("alice", &broken.id).unwrap();
        assert_eq!(broken_now.status, SlipStatus::Pending);
        assert!(broken_now.legs.iter().all(|l| l.status == LegStatus::Pending));
        let kinds: Vec<_> = f
            .ledger
            .movements_for_slip(&broken.id)
            .unwrap()
            .into_iter()
            .map(|m| m.kind)
            .collect();
        assert_eq!(kinds, vec![MovementKind::Stake]);

        // 200 deposited, 20 staked, 30 paid on the healthy slip
        assert_eq!(f.ledger.balance_of("alice").unwrap(), dec!(210.00));
        assert_eq!(
            f.repo.get_slip("alice", &healthy.id).unwrap().status,
            SlipStatus::Won
        );
    }
}
