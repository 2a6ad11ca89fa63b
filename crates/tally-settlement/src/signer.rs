//! Custodial platform keypair.
//!
//! The key file is the standard Solana CLI format: a JSON array of 64 bytes
//! (32-byte secret seed followed by the 32-byte public key).

use std::fmt;
use std::path::Path;

use solana_sdk::signature::{keypair_from_seed, read_keypair_file, Keypair, Signer};
use tally_types::WalletAddress;

use crate::{Result, SettlementError};

/// Holds the platform wallet's signing key.
pub struct CustodialSigner {
    keypair: Keypair,
}

impl fmt::Debug for CustodialSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustodialSigner")
            .field("pubkey", &self.pubkey().as_str())
            .finish_non_exhaustive()
    }
}

impl CustodialSigner {
    /// Load a keypair file. Rejects a public half that does not match the
    /// secret.
    pub fn load(path: &Path) -> Result<Self> {
        let keypair = read_keypair_file(path).map_err(|e| {
            SettlementError::Signer(format!("cannot load keypair {}: {e}", path.display()))
        })?;
        let derived = keypair_from_seed(&keypair.to_bytes()[..32])
            .map_err(|e| SettlementError::Signer(format!("invalid keypair: {e}")))?;
        if derived.pubkey() != keypair.pubkey() {
            return Err(SettlementError::Signer(
                "keypair public half does not match its secret".into(),
            ));
        }
        Ok(Self { keypair })
    }

    /// Build from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        let keypair = keypair_from_seed(seed)
            .map_err(|e| SettlementError::Signer(format!("invalid seed: {e}")))?;
        Ok(Self { keypair })
    }

    /// The platform wallet address.
    pub fn pubkey(&self) -> WalletAddress {
        WalletAddress::from_bytes(self.keypair.pubkey().to_bytes())
    }

    /// Signing key for transaction assembly.
    pub(crate) fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}
