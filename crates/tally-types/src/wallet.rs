//! Solana wallet addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TypeError;

/// A base58-encoded 32-byte Solana public key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress {
    encoded: String,
    bytes: [u8; 32],
}

impl WalletAddress {
    /// Wrap raw public key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            encoded: bs58::encode(bytes).into_string(),
            bytes,
        }
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Base58 form.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl FromStr for WalletAddress {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decoded = bs58::decode(trimmed)
            .into_vec()
            .map_err(|_| TypeError::InvalidWallet(trimmed.to_string()))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| TypeError::InvalidWallet(trimmed.to_string()))?;
        Ok(Self {
            encoded: trimmed.to_string(),
            bytes,
        })
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.encoded
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}
