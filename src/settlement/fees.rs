//! Platform fee schedule.

use crate::config::{SettlementConfig, ValidationError};
use crate::keys::Address;
use crate::settlement::types::{PrimaryLeg, SettlementIntent};

/// Transactions per settlement (fee + primary).
const TRANSACTIONS_PER_SETTLEMENT: u64 = 2;

/// Estimated network cost of both transactions at `fee_per_signature`.
pub(crate) fn network_cost(fee_per_signature: u64) -> u64 {
    fee_per_signature.saturating_mul(TRANSACTIONS_PER_SETTLEMENT)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    pub platform_fee_bps: u16,
    pub min_fee_lamports: u64,
    pub destination: Address,
    pub network_fee_per_signature: u64,
}

impl FeeSchedule {
    pub fn from_config(config: &SettlementConfig) -> Result<Self, ValidationError> {
        let destination = config
            .fee_destination
            .parse::<Address>()
            .map_err(|e| ValidationError::new("settlement.fee_destination", e.to_string()))?;
        Ok(Self {
            platform_fee_bps: config.platform_fee_bps,
            min_fee_lamports: config.min_fee_lamports,
            destination,
            network_fee_per_signature: config.network_fee_per_signature_lamports,
        })
    }

    /// Platform fee for `primary`: basis points of the native amount, never
    /// below the minimum. Legs with no native amount pay the minimum.
    pub fn fee_for(&self, primary: &PrimaryLeg) -> u64 {
        let proportional =
            u128::from(primary.native_amount()) * u128::from(self.platform_fee_bps) / 10_000;
        u64::try_from(proportional)
            .unwrap_or(u64::MAX)
            .max(self.min_fee_lamports)
    }

    /// Estimated network cost of both transactions.
    pub fn network_cost(&self) -> u64 {
        network_cost(self.network_fee_per_signature)
    }

    pub fn intent(&self, primary: PrimaryLeg) -> SettlementIntent {
        SettlementIntent {
            fee_amount: self.fee_for(&primary),
            fee_destination: self.destination,
            primary,
        }
    }
}
