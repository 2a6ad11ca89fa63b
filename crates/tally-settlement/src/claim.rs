//! Claim state machine.
//!
//! ```text
//! pending ──begin──▶ processing ──finalize──▶ claimed
//!    ▲                   │
//!    └─────release───────┘      processing ──reconcile──▶ paid
//! ```
//!
//! `begin` is the only way out of `pending` and is a conditional update, so
//! of two concurrent claims for the same row exactly one proceeds to the
//! transfer. A claim whose transfer may have moved funds is never released.

use serde::Serialize;
use tally_db::queries::{payouts as payout_store, profiles, referrals as referral_store};
use tally_db::rusqlite::{Connection, Transaction, TransactionBehavior};
use tally_types::{sol_to_lamports, ClaimKind, PayoutStatus, PeriodWindow, WalletAddress};

use crate::{Result, SettlementError, TransferClient, TransferError};

/// A user's request to settle a payout.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub user_id: String,
    pub window: PeriodWindow,
    pub kind: ClaimKind,
    /// One-time recipient; persisted to the profile on success of `begin`.
    pub wallet_override: Option<String>,
}

/// A claim holding its rows in `processing`.
#[derive(Debug, Clone)]
pub struct PreparedClaim {
    pub user_id: String,
    pub window: PeriodWindow,
    pub kind: ClaimKind,
    pub recipient: WalletAddress,
    pub amount_sol: f64,
    pub lamports: u64,
    /// Referred users whose referral rows this claim holds.
    pub referred: Vec<String>,
}

/// A settled claim.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    pub transaction_hash: String,
    pub amount: f64,
    pub lamports: u64,
    pub recipient: String,
    pub rows: usize,
}

/// Serialized access to the ledger connection.
///
/// Implementations lock for the duration of `f` only.
pub trait LedgerAccess {
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T>;
}

impl LedgerAccess for Connection {
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        f(self)
    }
}

impl LedgerAccess for std::sync::Mutex<Connection> {
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self
            .lock()
            .map_err(|_| SettlementError::Db(tally_db::DbError::Constraint("ledger lock poisoned".into())))?;
        f(&guard)
    }
}

fn resolve_recipient(
    conn: &Connection,
    request: &ClaimRequest,
    platform: &WalletAddress,
) -> Result<(WalletAddress, bool)> {
    let override_addr = request
        .wallet_override
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let (raw, from_override) = match override_addr {
        Some(addr) => (addr.to_string(), true),
        None => match profiles::payout_wallet(conn, &request.user_id) {
            Ok(Some(addr)) if !addr.trim().is_empty() => (addr, false),
            Ok(_) | Err(tally_db::DbError::NotFound(_)) => return Err(SettlementError::NoWalletAddress),
            Err(e) => return Err(e.into()),
        },
    };

    let recipient: WalletAddress = raw
        .parse()
        .map_err(|e: tally_types::TypeError| SettlementError::Validation(e.to_string()))?;
    if recipient.as_bytes() == platform.as_bytes() {
        return Err(SettlementError::Validation(
            "recipient cannot be the platform wallet".into(),
        ));
    }
    Ok((recipient, from_override))
}

/// Move the claimed rows to `processing` and resolve the recipient. Any
/// failure rolls the hold back.
pub fn begin_claim(
    conn: &Connection,
    request: &ClaimRequest,
    platform: &WalletAddress,
) -> Result<PreparedClaim> {
    if request.user_id.trim().is_empty() {
        return Err(SettlementError::Validation("userId is required".into()));
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let (amount_sol, referred) = match request.kind {
        ClaimKind::PayoutAvailable => (hold_payout(&tx, request)?, Vec::new()),
        ClaimKind::ReferralBonus => hold_referrals(&tx, request)?,
    };
    let (recipient, from_override) = resolve_recipient(&tx, request, platform)?;

    let lamports = sol_to_lamports(amount_sol);
    if lamports == 0 {
        // Dropping the transaction rolls the hold back
        return Err(SettlementError::Validation(format!(
            "payout amount must be > 0, got {amount_sol}"
        )));
    }

    if from_override {
        profiles::upsert(&tx, &request.user_id, None)?;
        profiles::set_payout_wallet(&tx, &request.user_id, Some(recipient.as_str()))?;
    }
    tx.commit()?;

    tracing::info!(
        user = %request.user_id,
        period = %request.window,
        kind = request.kind.as_str(),
        amount_sol,
        recipient = %recipient,
        "claim started"
    );

    Ok(PreparedClaim {
        user_id: request.user_id.clone(),
        window: request.window,
        kind: request.kind,
        recipient,
        amount_sol,
        lamports,
        referred,
    })
}

fn hold_payout(conn: &Connection, request: &ClaimRequest) -> Result<f64> {
    let payout = payout_store::get(conn, &request.user_id, &request.window)?;
    if payout.payout_status != PayoutStatus::Pending {
        return Err(conflict(payout.payout_status));
    }
    if payout.final_payout_sol <= 0.0 {
        return Err(SettlementError::Validation(format!(
            "payout amount must be > 0, got {}",
            payout.final_payout_sol
        )));
    }
    let held = payout_store::transition(
        conn,
        &request.user_id,
        &request.window,
        PayoutStatus::Pending,
        PayoutStatus::Processing,
        None,
    )?;
    if !held {
        return Err(conflict(PayoutStatus::Processing));
    }
    Ok(payout.final_payout_sol)
}

fn hold_referrals(conn: &Connection, request: &ClaimRequest) -> Result<(f64, Vec<String>)> {
    let held = referral_store::transition_for_referrer(
        conn,
        &request.user_id,
        &request.window,
        PayoutStatus::Pending,
        PayoutStatus::Processing,
        None,
    )?;
    if held.is_empty() {
        let existing = referral_store::list_for_referrer(conn, &request.user_id, &request.window)?;
        return Err(match existing.first() {
            None => SettlementError::NotFound(format!(
                "referral bonus for {} in {}",
                request.user_id, request.window
            )),
            Some(row) => conflict(row.payout_status),
        });
    }
    let amount = held.iter().map(|r| r.referral_bonus_sol).sum();
    Ok((amount, held.into_iter().map(|r| r.referred_user_id).collect()))
}

fn conflict(status: PayoutStatus) -> SettlementError {
    match status {
        PayoutStatus::Processing => SettlementError::Conflict("already processing".into()),
        other => SettlementError::Conflict(format!("payout already {}", other.as_str())),
    }
}

/// Record a confirmed transfer: `processing → claimed`.
pub fn finalize_claim(conn: &Connection, claim: &PreparedClaim, signature: &str) -> Result<ClaimReceipt> {
    let rows = move_held(conn, claim, PayoutStatus::Claimed, Some(signature))?;
    tracing::info!(
        user = %claim.user_id,
        period = %claim.window,
        signature,
        rows,
        "claim settled"
    );
    Ok(ClaimReceipt {
        transaction_hash: signature.to_string(),
        amount: claim.amount_sol,
        lamports: claim.lamports,
        recipient: claim.recipient.to_string(),
        rows,
    })
}

/// Return a claim whose transfer moved no funds to `pending`.
pub fn release_claim(conn: &Connection, claim: &PreparedClaim) -> Result<usize> {
    let rows = move_held(conn, claim, PayoutStatus::Pending, None)?;
    tracing::info!(user = %claim.user_id, period = %claim.window, rows, "claim released");
    Ok(rows)
}

/// Move exactly the rows held by `claim` out of `processing`, all or none.
fn move_held(conn: &Connection, claim: &PreparedClaim, to: PayoutStatus, tx_hash: Option<&str>) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let moved = match claim.kind {
        ClaimKind::PayoutAvailable => {
            let ok = payout_store::transition(
                &tx,
                &claim.user_id,
                &claim.window,
                PayoutStatus::Processing,
                to,
                tx_hash,
            )?;
            usize::from(ok)
        }
        ClaimKind::ReferralBonus => {
            let mut n = 0;
            for referred in &claim.referred {
                if referral_store::transition_payout(
                    &tx,
                    &claim.user_id,
                    referred,
                    &claim.window,
                    PayoutStatus::Processing,
                    to,
                    tx_hash,
                )? {
                    n += 1;
                }
            }
            n
        }
    };
    let expected = match claim.kind {
        ClaimKind::PayoutAvailable => 1,
        ClaimKind::ReferralBonus => claim.referred.len(),
    };
    if moved != expected {
        return Err(SettlementError::Conflict(format!(
            "expected {expected} processing row(s), moved {moved}"
        )));
    }
    tx.commit()?;
    Ok(moved)
}

/// Run a full claim: hold, transfer, record.
///
/// The ledger is locked only while holding and while recording, never
/// across the transfer.
pub fn execute_claim<L: LedgerAccess>(
    ledger: &L,
    transfer: &dyn TransferClient,
    request: &ClaimRequest,
) -> Result<ClaimReceipt> {
    let platform = transfer.platform_wallet();
    let claim = ledger.with_conn(|conn| begin_claim(conn, request, &platform))?;

    match transfer.transfer(&claim.recipient, claim.lamports) {
        Ok(signature) => ledger
            .with_conn(|conn| finalize_claim(conn, &claim, &signature))
            .map_err(|e| {
                tracing::error!(
                    user = %claim.user_id,
                    period = %claim.window,
                    kind = claim.kind.as_str(),
                    signature = %signature,
                    lamports = claim.lamports,
                    error = %e,
                    "CRITICAL: transfer confirmed but ledger update failed; claim left processing"
                );
                SettlementError::CriticalInconsistency {
                    signature: Some(signature.clone()),
                    reason: format!("transfer confirmed but ledger update failed: {e}"),
                }
            }),
        Err(err @ (TransferError::NotSubmitted(_) | TransferError::FailedOnChain { .. })) => {
            if let Err(e) = ledger.with_conn(|conn| release_claim(conn, &claim)) {
                tracing::error!(user = %claim.user_id, period = %claim.window, error = %e, "failed to release claim");
            }
            tracing::warn!(user = %claim.user_id, period = %claim.window, error = %err, "claim transfer failed");
            Err(SettlementError::TransferFailed(err.to_string()))
        }
        Err(TransferError::Unconfirmed { signature, reason }) => {
            tracing::error!(
                user = %claim.user_id,
                period = %claim.window,
                kind = claim.kind.as_str(),
                signature = %signature,
                lamports = claim.lamports,
                reason = %reason,
                "CRITICAL: transfer submitted but unconfirmed; claim left processing"
            );
            Err(SettlementError::CriticalInconsistency {
                signature: Some(signature),
                reason,
            })
        }
    }
}

/// Operator request closing a `processing` claim after manual review.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub user_id: String,
    pub window: PeriodWindow,
    pub kind: ClaimKind,
    pub transaction_hash: String,
}

/// Mark a stuck `processing` claim as `paid`. Returns the rows moved.
pub fn reconcile(conn: &Connection, request: &ReconcileRequest) -> Result<usize> {
    let hash = request.transaction_hash.trim();
    if hash.is_empty() {
        return Err(SettlementError::Validation("transactionHash is required".into()));
    }
    let decoded = bs58::decode(hash)
        .into_vec()
        .map_err(|_| SettlementError::Validation("transactionHash is not base58".into()))?;
    if decoded.len() != 64 {
        return Err(SettlementError::Validation("transactionHash must be a 64-byte signature".into()));
    }

    let moved = match request.kind {
        ClaimKind::PayoutAvailable => usize::from(payout_store::transition(
            conn,
            &request.user_id,
            &request.window,
            PayoutStatus::Processing,
            PayoutStatus::Paid,
            Some(hash),
        )?),
        ClaimKind::ReferralBonus => referral_store::transition_for_referrer(
            conn,
            &request.user_id,
            &request.window,
            PayoutStatus::Processing,
            PayoutStatus::Paid,
            Some(hash),
        )?
        .len(),
    };
    if moved == 0 {
        return Err(SettlementError::Conflict("no processing claim to reconcile".into()));
    }
    tracing::warn!(
        user = %request.user_id,
        period = %request.window,
        kind = request.kind.as_str(),
        signature = hash,
        rows = moved,
        "claim reconciled manually"
    );
    Ok(moved)
}
