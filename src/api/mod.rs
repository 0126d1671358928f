//! HTTP surface over [`crate::engine::BetEngine`].

pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{create_router, AppState, UserId, USER_HEADER};
