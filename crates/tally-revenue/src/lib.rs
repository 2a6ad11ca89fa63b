//! # tally-revenue
//!
//! Bi-weekly revenue distribution pipeline.
//!
//! Each period pools external creator fees and internal platform revenue,
//! scores subscriber engagement, and splits the pool proportionally into
//! user and referrer payouts.
//!
//! ## Modules
//!
//! - [`periods`]: Period registry (semi-monthly windows, status flags)
//! - [`pumpfun`]: Creator-fee API client
//! - [`fees`]: External and internal pool aggregation
//! - [`scoring`]: Interaction scores
//! - [`payouts`]: Proportional payout computation and balance check
//! - [`referrals`]: Referral overrides
//! - [`notify`]: Payout notifications
//! - [`orchestrator`]: Sequential pipeline run for one period
//!
//! Every stage takes the database connection explicitly and writes through
//! keyed upserts, so re-running a stage for a period converges on the same
//! rows.

pub mod fees;
pub mod notify;
pub mod orchestrator;
pub mod payouts;
pub mod periods;
pub mod pumpfun;
pub mod referrals;
pub mod scoring;

use tally_db::DbError;

/// Share of creator fees placed in the distribution pool.
pub const PUMPFUN_POOL_RATE: f64 = 0.4;

/// Share of platform revenue placed in the distribution pool.
pub const PLATFORM_POOL_RATE: f64 = 0.5;

/// Referral override paid to a referrer, as a fraction of the referred
/// user's final payout.
pub const REFERRAL_RATE: f64 = 0.05;

/// Error types for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum RevenueError {
    /// Malformed or inconsistent input, rejected before any I/O.
    #[error("validation error: {0}")]
    Validation(String),

    /// No matching period, profile or row.
    #[error("not found: {0}")]
    NotFound(String),

    /// The creator-fee API was unreachable or answered with an error.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Storage failure.
    #[error("database error: {0}")]
    Db(DbError),
}

impl From<DbError> for RevenueError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => RevenueError::NotFound(what),
            other => RevenueError::Db(other),
        }
    }
}

impl From<tally_types::TypeError> for RevenueError {
    fn from(err: tally_types::TypeError) -> Self {
        RevenueError::Validation(err.to_string())
    }
}

impl From<tally_db::rusqlite::Error> for RevenueError {
    fn from(err: tally_db::rusqlite::Error) -> Self {
        RevenueError::Db(DbError::Sqlite(err))
    }
}

/// Convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RevenueError>;
