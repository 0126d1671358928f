//! Settlement: deriving slip status from legs, the per-user settlement pass,
//! and the background driver that runs it.

pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::SettlementOrchestrator;
pub use scheduler::SettlementScheduler;

use crate::models::{LegStatus, SlipStatus};

/// Accumulator rule: one lost leg loses the slip; every leg won wins it
pub fn derive_slip_status(legs: &[LegStatus]) -> SlipStatus {
    if legs.iter().any(|s| *s == LegStatus::Lost) {
        SlipStatus::Lost
    } else if !legs.is_empty() && legs.iter().all(|s| *s == LegStatus::Won) {
        SlipStatus::Won
    } else {
        SlipStatus::Pending
    }
}
