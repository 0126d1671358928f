//! Public operations of the betting engine.
//!
//! Every operation that reads and then writes one user's money runs under
//! that user's lock, so a slip creation and a settlement pass for the same
//! user never interleave.

use crate::{
    config::EngineConfig,
    error::{EngineError, EngineResult},
    ledger::LedgerStore,
    models::{BetSlip, LedgerMovement, ProposedLeg, SettlementUpdate, SlipReceipt},
    names::TeamAliases,
    repository::SlipRepository,
    results::{FileResultSource, ResultCache, ResultResolver, ResultSource},
    settlement::SettlementOrchestrator,
    slip::validate_slip,
    storage::{Database, UserLocks},
};
use anyhow::Context;
use rust_decimal::Decimal;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

pub struct BetEngine {
    ledger: LedgerStore,
    slips: SlipRepository,
    settlement: SettlementOrchestrator,
    locks: UserLocks,
}

impl BetEngine {
    pub fn new(db: Database, resolver: Arc<ResultResolver>, lookup_timeout: Duration) -> Self {
        let slips = SlipRepository::new(db.clone());
        Self {
            ledger: LedgerStore::new(db),
            settlement: SettlementOrchestrator::new(slips.clone(), resolver, lookup_timeout),
            slips,
            locks: UserLocks::default(),
        }
    }

    /// Open the database and wire file-backed result sources from config
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let db = Database::open(&config.db_path)
            .with_context(|| format!("Failed to open database at {}", config.db_path))?;
        let sources = config.load_sources()?;

        let cache = Arc::new(ResultCache::new(config.source_ttl));
        let files: Arc<dyn ResultSource> = Arc::new(FileResultSource::new(
            &config.results_dir,
            &sources.competitions,
            cache,
        ));
        let resolver = ResultResolver::new(
            vec![files],
            TeamAliases::new(&sources.aliases),
            config.result_window,
        );

        info!(
            results_dir = %config.results_dir.display(),
            competitions = sources.competitions.len(),
            aliases = sources.aliases.len(),
            "📚 Result sources configured"
        );
        Ok(Self::new(db, Arc::new(resolver), config.lookup_timeout))
    }

    /// Validate, price and persist a slip, debiting the stake
    pub async fn create_slip(
        &self,
        user_id: &str,
        stake: Decimal,
        legs: &[ProposedLeg],
    ) -> EngineResult<SlipReceipt> {
        check_user(user_id)?;
        let priced = validate_slip(stake, legs)?;

        let _guard = self.locks.lock(user_id).await;
        let slip = self.slips.create_slip(user_id, &priced)?;
        Ok(SlipReceipt {
            slip_id: slip.id,
            total_odds: slip.total_odds,
            potential_return: slip.potential_return,
        })
    }

    /// Newest first, legs included
    pub fn list_slips(&self, user_id: &str) -> EngineResult<Vec<BetSlip>> {
        check_user(user_id)?;
        self.slips.list_slips(user_id)
    }

    pub fn get_slip(&self, user_id: &str, slip_id: &str) -> EngineResult<BetSlip> {
        check_user(user_id)?;
        self.slips.get_slip(user_id, slip_id)
    }

    pub async fn run_settlement_cycle(&self, user_id: &str) -> EngineResult<Vec<SettlementUpdate>> {
        check_user(user_id)?;
        let _guard = self.locks.lock(user_id).await;
        let updates = self.settlement.run_cycle(user_id).await?;
        debug!(user_id, changed = updates.len(), "Settlement cycle ran");
        Ok(updates)
    }

    pub fn get_balance(&self, user_id: &str) -> EngineResult<Decimal> {
        check_user(user_id)?;
        self.ledger.balance_of(user_id)
    }

    /// Most recent movements first
    pub fn get_statement(&self, user_id: &str, limit: usize) -> EngineResult<Vec<LedgerMovement>> {
        check_user(user_id)?;
        self.ledger.statement(user_id, limit)
    }

    pub async fn deposit(&self, user_id: &str, amount: Decimal) -> EngineResult<LedgerMovement> {
        check_user(user_id)?;
        let _guard = self.locks.lock(user_id).await;
        self.ledger.deposit(user_id, amount)
    }

    pub async fn withdraw(&self, user_id: &str, amount: Decimal) -> EngineResult<LedgerMovement> {
        check_user(user_id)?;
        let _guard = self.locks.lock(user_id).await;
        self.ledger.withdraw(user_id, amount)
    }

    pub fn users_with_pending_slips(&self) -> EngineResult<Vec<String>> {
        self.slips.users_with_pending_slips()
    }
}

fn check_user(user_id: &str) -> EngineResult<()> {
    if user_id.trim().is_empty() {
        return Err(EngineError::validation("user id must not be empty"));
    }
    Ok(())
}
