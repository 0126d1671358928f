//! Slip rules: validation/pricing at submission, leg evaluation at settlement.

pub mod evaluator;
pub mod validator;

pub use evaluator::{evaluate_leg, evaluate_selection, Market};
pub use validator::{find_conflict, price, validate_slip, LegSelection, PricedSlip};
