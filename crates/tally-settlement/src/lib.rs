//! # tally-settlement
//!
//! Claim settlement: moves a finalized payout to the recipient's wallet as
//! one on-chain SOL transfer from the custodial platform wallet.
//!
//! ## Modules
//!
//! - [`claim`]: Claim state machine (`pending → processing → claimed`)
//! - [`signer`]: Custodial ed25519 keypair
//! - [`solana`]: Transfer transactions over `solana-sdk` and RPC submission
//!
//! The ledger lock is never held across a transfer. A claim first moves its
//! rows to `processing` with a conditional update, releases the lock, sends
//! the transfer, then reacquires the lock to record the result.

pub mod claim;
pub mod signer;
pub mod solana;

use tally_db::DbError;
use tally_types::WalletAddress;

/// Error types for settlement operations.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// Malformed request, rejected before any state change.
    #[error("validation error: {0}")]
    Validation(String),

    /// No matching payout.
    #[error("not found: {0}")]
    NotFound(String),

    /// The user has no payout wallet and supplied none.
    #[error("no payout wallet address")]
    NoWalletAddress,

    /// The payout is not in a claimable state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The transfer provably moved no funds; the claim was released.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// Funds may have moved but the ledger does not say so. The claim stays
    /// in `processing` until an operator reconciles it.
    #[error(
        "critical inconsistency (signature {sig}): {reason}",
        sig = .signature.as_deref().unwrap_or("unknown")
    )]
    CriticalInconsistency {
        signature: Option<String>,
        reason: String,
    },

    /// Configuration or key material problem.
    #[error("signer error: {0}")]
    Signer(String),

    /// Storage failure.
    #[error("database error: {0}")]
    Db(DbError),
}

impl From<DbError> for SettlementError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => SettlementError::NotFound(what),
            other => SettlementError::Db(other),
        }
    }
}

impl From<tally_db::rusqlite::Error> for SettlementError {
    fn from(err: tally_db::rusqlite::Error) -> Self {
        SettlementError::Db(DbError::Sqlite(err))
    }
}

/// Convenience result type for settlement operations.
pub type Result<T> = std::result::Result<T, SettlementError>;

/// Why a transfer did not produce a confirmed signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// Never accepted by the network (preflight rejection, bad blockhash,
    /// client-side failure). No funds moved.
    #[error("transfer not submitted: {0}")]
    NotSubmitted(String),

    /// Landed on chain with an execution error. No funds moved.
    #[error("transfer {signature} failed on chain: {reason}")]
    FailedOnChain { signature: String, reason: String },

    /// Submitted, outcome unknown.
    #[error("transfer {signature} unconfirmed: {reason}")]
    Unconfirmed { signature: String, reason: String },
}

/// Sends native SOL from the platform wallet.
pub trait TransferClient {
    /// The custodial wallet funds are sent from.
    fn platform_wallet(&self) -> WalletAddress;

    /// Transfer `lamports` to `to` and wait for confirmation. Returns the
    /// transaction signature.
    fn transfer(&self, to: &WalletAddress, lamports: u64) -> std::result::Result<String, TransferError>;
}
