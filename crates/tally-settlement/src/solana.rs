//! Solana system-program transfers.
//!
//! A transfer is a legacy transaction holding one system `Transfer`
//! instruction, paid for and signed by the custodial wallet.
//!
//! Submission is never retried: `sendTransaction` goes out with
//! `maxRetries = 0`, then the signature is polled with
//! `getSignatureStatuses` until the configured commitment is reached or the
//! confirmation timeout expires.

use std::path::Path;
use std::time::{Duration, Instant};

use solana_rpc_client::rpc_client::RpcClient;
use solana_rpc_client_api::client_error::{Error as ClientError, ErrorKind as ClientErrorKind};
use solana_rpc_client_api::config::RpcSendTransactionConfig;
use solana_rpc_client_api::request::RpcError;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_system_interface::instruction as system_instruction;
use tally_types::WalletAddress;

use crate::signer::CustodialSigner;
use crate::{Result, SettlementError, TransferClient, TransferError};

/// Build and sign a transfer of `lamports` from the custodial wallet to `to`.
pub fn build_transfer(
    signer: &CustodialSigner,
    to: &WalletAddress,
    lamports: u64,
    recent_blockhash: Hash,
) -> std::result::Result<Transaction, TransferError> {
    let from = Pubkey::new_from_array(*signer.pubkey().as_bytes());
    let to = Pubkey::new_from_array(*to.as_bytes());
    let instruction = system_instruction::transfer(&from, &to, lamports);
    let message = Message::new(&[instruction], Some(&from));

    let mut tx = Transaction::new_unsigned(message);
    tx.try_sign(&[signer.keypair()], recent_blockhash)
        .map_err(|e| TransferError::NotSubmitted(format!("signing failed: {e}")))?;
    Ok(tx)
}

/// Commitment level awaited before a claim is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(SettlementError::Validation(format!("unknown commitment '{other}'"))),
        }
    }

    fn config(&self) -> CommitmentConfig {
        match self {
            Commitment::Processed => CommitmentConfig::processed(),
            Commitment::Confirmed => CommitmentConfig::confirmed(),
            Commitment::Finalized => CommitmentConfig::finalized(),
        }
    }
}

/// Transfer client configuration.
#[derive(Debug, Clone)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub commitment: Commitment,
    pub request_timeout: Duration,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: Commitment::Confirmed,
            request_timeout: Duration::from_secs(15),
            confirm_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(1500),
        }
    }
}

/// Map a failed `sendTransaction` to a transfer outcome. Only an answer from
/// the node proves the transaction was not accepted; anything else may have
/// reached it.
fn send_failure(err: ClientError, signature: &Signature) -> TransferError {
    match err.kind() {
        ClientErrorKind::RpcError(RpcError::RpcResponseError { .. })
        | ClientErrorKind::TransactionError(_)
        | ClientErrorKind::SigningError(_) => TransferError::NotSubmitted(err.to_string()),
        _ => TransferError::Unconfirmed {
            signature: signature.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Sends transfers signed by the custodial wallet.
pub struct SolanaTransferClient {
    rpc: RpcClient,
    signer: CustodialSigner,
    config: SolanaConfig,
}

impl SolanaTransferClient {
    pub fn new(config: SolanaConfig, signer: CustodialSigner) -> Result<Self> {
        if config.confirm_timeout.is_zero() || config.poll_interval.is_zero() {
            return Err(SettlementError::Validation(
                "confirm timeout and poll interval must be > 0".into(),
            ));
        }
        let rpc = RpcClient::new_with_timeout_and_commitment(
            config.rpc_url.clone(),
            config.request_timeout,
            config.commitment.config(),
        );
        Ok(Self { rpc, signer, config })
    }

    /// Load the keypair file and build a client.
    pub fn from_keypair_file(config: SolanaConfig, keypair_path: &Path) -> Result<Self> {
        Self::new(config, CustodialSigner::load(keypair_path)?)
    }

    fn await_confirmation(&self, signature: &Signature) -> std::result::Result<(), TransferError> {
        let deadline = Instant::now() + self.config.confirm_timeout;
        let awaited = self.config.commitment.config();
        let mut last = String::from("not yet seen");
        loop {
            match self.rpc.get_signature_statuses(&[*signature]) {
                Ok(response) => {
                    if let Some(status) = response.value.into_iter().next().flatten() {
                        if let Some(err) = status.err.as_ref() {
                            return Err(TransferError::FailedOnChain {
                                signature: signature.to_string(),
                                reason: err.to_string(),
                            });
                        }
                        if status.satisfies_commitment(awaited) {
                            return Ok(());
                        }
                        last = format!("at {:?}", status.confirmation_status);
                    }
                }
                Err(e) => last = e.to_string(),
            }
            if Instant::now() >= deadline {
                return Err(TransferError::Unconfirmed {
                    signature: signature.to_string(),
                    reason: format!(
                        "not {} within {:?} ({last})",
                        self.config.commitment.as_str(),
                        self.config.confirm_timeout
                    ),
                });
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}

impl TransferClient for SolanaTransferClient {
    fn platform_wallet(&self) -> WalletAddress {
        self.signer.pubkey()
    }

    fn transfer(&self, to: &WalletAddress, lamports: u64) -> std::result::Result<String, TransferError> {
        if lamports == 0 {
            return Err(TransferError::NotSubmitted("zero lamports".into()));
        }
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .map_err(|e| TransferError::NotSubmitted(format!("getLatestBlockhash: {e}")))?;
        let tx = build_transfer(&self.signer, to, lamports, blockhash)?;
        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| TransferError::NotSubmitted("transaction has no signature".into()))?;

        let send_config = RpcSendTransactionConfig {
            preflight_commitment: Some(self.config.commitment.config().commitment),
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        self.rpc
            .send_transaction_with_config(&tx, send_config)
            .map_err(|e| send_failure(e, &signature))?;
        tracing::info!(signature = %signature, to = %to, lamports, "transfer submitted");

        self.await_confirmation(&signature)?;
        tracing::info!(signature = %signature, "transfer confirmed");
        Ok(signature.to_string())
    }
}
