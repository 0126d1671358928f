use crate::engine::BetEngine;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinSet,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info};

/// Periodically settles every user that has pending slips
pub struct SettlementScheduler {
    engine: Arc<BetEngine>,
    period: Duration,
}

impl SettlementScheduler {
    pub fn new(engine: Arc<BetEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Run until `shutdown` flips to true. Users are settled concurrently;
    /// each user's cycle serializes on that user's lock.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(period_secs = self.period.as_secs(), "⏱️  Settlement scheduler started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Settlement scheduler stopped");
    }

    /// One pass over all users with pending slips
    pub async fn tick(&self) -> usize {
        let users = match self.engine.users_with_pending_slips() {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "Failed to list users with pending slips");
                return 0;
            }
        };
        if users.is_empty() {
            return 0;
        }
        debug!(users = users.len(), "Settlement pass");

        let mut tasks = JoinSet::new();
        for user_id in users {
            let engine = self.engine.clone();
            tasks.spawn(async move {
                let result = engine.run_settlement_cycle(&user_id).await;
                (user_id, result)
            });
        }

        let mut settled = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(updates))) => settled += updates.len(),
                Ok((user_id, Err(e))) => error!(user_id, error = %e, "Settlement cycle failed"),
                Err(e) => error!(error = %e, "Settlement task panicked"),
            }
        }
        settled
    }
}
