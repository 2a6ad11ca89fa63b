//! # tally-types
//!
//! Shared domain types used across the Tally workspace: accounting periods,
//! interaction scores, payouts, referral links and wallet addresses.

pub mod payout;
pub mod period;
pub mod score;
pub mod wallet;

pub use payout::{ClaimKind, PayoutStatus, ReferralLink, ReferralPayout, UserPayout};
pub use period::{parse_date, Period, PeriodWindow, RevenueStatus};
pub use score::InteractionScore;
pub use wallet::WalletAddress;

/// User identifiers are opaque strings issued by the auth provider.
pub type UserId = String;

/// Lamports per SOL (1 SOL = 1,000,000,000 lamports).
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Tolerance used when comparing distributed totals against a pool, in SOL.
pub const BALANCE_TOLERANCE_SOL: f64 = 1e-4;

/// Date format used on the wire and in storage.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors raised while constructing or parsing domain types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    /// A date string is not `YYYY-MM-DD`.
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Window start is not strictly before its end.
    #[error("period start {start} must be before period end {end}")]
    InvalidWindow {
        /// Requested start date.
        start: String,
        /// Requested end date.
        end: String,
    },

    /// An enum value read from storage or the wire is unknown.
    #[error("unknown {kind} '{value}'")]
    UnknownVariant {
        /// Enum name.
        kind: &'static str,
        /// Offending value.
        value: String,
    },

    /// A wallet address is not a base58-encoded 32-byte key.
    #[error("invalid wallet address '{0}'")]
    InvalidWallet(String),
}

/// Convert a SOL amount into lamports, rounding to the nearest lamport.
///
/// Negative and non-finite amounts map to zero.
pub fn sol_to_lamports(sol: f64) -> u64 {
    if !sol.is_finite() || sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}
