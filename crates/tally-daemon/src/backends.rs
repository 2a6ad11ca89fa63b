//! External service clients.
//!
//! Both clients are blocking. They are built per request inside the
//! blocking worker that uses them and dropped there.

use std::path::PathBuf;

use tally_revenue::pumpfun::{CreatorFeeSource, PumpfunConfig, PumpfunFeeClient};
use tally_settlement::solana::{SolanaConfig, SolanaTransferClient};
use tally_settlement::{SettlementError, TransferClient};

/// Factory for the creator-fee API and the transfer client.
pub trait Backends: Send + Sync {
    fn fee_source(&self) -> tally_revenue::Result<Box<dyn CreatorFeeSource>>;
    fn transfer_client(&self) -> tally_settlement::Result<Box<dyn TransferClient>>;
}

/// Production clients.
pub struct LiveBackends {
    pub fees: PumpfunConfig,
    pub solana: SolanaConfig,
    /// Custodial keypair file. `None` disables claims.
    pub keypair_path: Option<PathBuf>,
}

impl Backends for LiveBackends {
    fn fee_source(&self) -> tally_revenue::Result<Box<dyn CreatorFeeSource>> {
        Ok(Box::new(PumpfunFeeClient::new(self.fees.clone())?))
    }

    fn transfer_client(&self) -> tally_settlement::Result<Box<dyn TransferClient>> {
        let path = self
            .keypair_path
            .as_deref()
            .ok_or_else(|| SettlementError::Signer("settlement keypair not configured".into()))?;
        Ok(Box::new(SolanaTransferClient::from_keypair_file(
            self.solana.clone(),
            path,
        )?))
    }
}
