//! Bridge configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::amount::SatoshiAmount;

/// Smallest amount the bridge will try to send, in satoshis.
pub const DEFAULT_MIN_SPEND_SATS: u64 = 100;
/// Fee rate in satoshis per 1024 bytes.
pub const DEFAULT_FEE_RATE_SATS_PER_KB: u64 = 10_000;
/// Change below this value is not worth an output of its own.
pub const DEFAULT_DUST_THRESHOLD_SATS: u64 = 546;

/// Settings shared by every bridge call. Immutable once the bridge is
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Where key-custody collaborators keep wallet key material.
    pub wallet_data_path: Option<PathBuf>,
    pub min_spend: SatoshiAmount,
    /// Satoshis per KB (1024 bytes) of estimated transaction size.
    pub fee_rate: SatoshiAmount,
    pub dust_threshold: SatoshiAmount,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            wallet_data_path: None,
            min_spend: SatoshiAmount::from_sat(DEFAULT_MIN_SPEND_SATS),
            fee_rate: SatoshiAmount::from_sat(DEFAULT_FEE_RATE_SATS_PER_KB),
            dust_threshold: SatoshiAmount::from_sat(DEFAULT_DUST_THRESHOLD_SATS),
        }
    }
}
