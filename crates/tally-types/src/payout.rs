//! Payout records and referral links.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{PeriodWindow, TypeError, UserId};

/// Settlement state of a payout row.
///
/// ```text
/// pending ──claim──▶ processing ──confirmed──▶ claimed
///    ▲                   │
///    └──transfer failed──┘          processing ──reconcile──▶ paid
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Awaiting a claim.
    #[default]
    Pending,
    /// A claim holds the row while its transfer is in flight.
    Processing,
    /// Settled by a confirmed transfer.
    Claimed,
    /// Settled by an operator after manual reconciliation.
    Paid,
}

impl PayoutStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Claimed => "claimed",
            Self::Paid => "paid",
        }
    }

    /// Whether the row is final.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Claimed | Self::Paid)
    }
}

impl FromStr for PayoutStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "claimed" => Ok(Self::Claimed),
            "paid" => Ok(Self::Paid),
            other => Err(TypeError::UnknownVariant {
                kind: "payout status",
                value: other.to_string(),
            }),
        }
    }
}

/// Which payout a claim (and its notification) refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    /// The user's own share of the period pools.
    PayoutAvailable,
    /// The summed referral bonuses owed to a referrer.
    ReferralBonus,
}

impl ClaimKind {
    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PayoutAvailable => "payout_available",
            Self::ReferralBonus => "referral_bonus",
        }
    }
}

impl FromStr for ClaimKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payout_available" => Ok(Self::PayoutAvailable),
            "referral_bonus" => Ok(Self::ReferralBonus),
            other => Err(TypeError::UnknownVariant {
                kind: "notification type",
                value: other.to_string(),
            }),
        }
    }
}

/// A user's share of one period's pools.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserPayout {
    pub user_id: UserId,
    pub window: PeriodWindow,
    pub pumpfun_share_sol: f64,
    pub platform_share_sol: f64,
    /// `pumpfun_share_sol + platform_share_sol`.
    pub total_payout_sol: f64,
    /// Pro-rata share of the period's referral bonus pool.
    pub referral_bonus_sol: f64,
    /// `total_payout_sol + referral_bonus_sol`.
    pub final_payout_sol: f64,
    pub payout_status: PayoutStatus,
    pub payment_tx_hash: Option<String>,
}

/// A referrer's override on one referred user's payout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferralPayout {
    pub referrer_id: UserId,
    pub referred_user_id: UserId,
    pub window: PeriodWindow,
    pub referral_bonus_sol: f64,
    pub payout_status: PayoutStatus,
    pub payment_tx_hash: Option<String>,
}

/// Signup-time referral relation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralLink {
    pub referrer_id: UserId,
    pub referred_user_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payout_status_roundtrip() {
        for status in [
            PayoutStatus::Pending,
            PayoutStatus::Processing,
            PayoutStatus::Claimed,
            PayoutStatus::Paid,
        ] {
            assert_eq!(status.as_str().parse::<PayoutStatus>(), Ok(status));
        }
        assert!(PayoutStatus::Paid.is_settled());
        assert!(!PayoutStatus::Processing.is_settled());
    }

    #[test]
    fn test_claim_kind_wire_names() {
        let kind: ClaimKind = serde_json::from_str("\"referral_bonus\"").expect("parse");
        assert_eq!(kind, ClaimKind::ReferralBonus);
        assert_eq!("payout_available".parse::<ClaimKind>(), Ok(ClaimKind::PayoutAvailable));
        assert!("bonus".parse::<ClaimKind>().is_err());
    }
}
