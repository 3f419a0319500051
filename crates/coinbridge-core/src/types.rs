//! Domain types shared by every provider handler.
//!
//! Providers normalize their responses into these structures; the bridge
//! compares, reduces and returns them unchanged in shape.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::amount::SatoshiAmount;

// ==============================================================================
// Provider Identity
// ==============================================================================

/// Stable name of a configured provider, e.g. `bitcoind-0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque per-provider metadata, e.g. a remote wallet identifier.
pub type ProviderData = serde_json::Map<String, serde_json::Value>;

// ==============================================================================
// Outputs and Transactions
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxCategory {
    Receive,
    Send,
}

impl std::fmt::Display for TxCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Receive => write!(f, "receive"),
            Self::Send => write!(f, "send"),
        }
    }
}

/// An output that can fund a new transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpendableOutput {
    pub address: String,
    pub tx_hash: String,
    pub output_index: u32,
    pub value: SatoshiAmount,
    pub confirmations: u32,
    pub spent: bool,
    pub category: TxCategory,
    /// Unix time of the confirming block; `None` while unconfirmed.
    pub confirmed_at: Option<u64>,
}

/// A transaction as seen from one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub address: String,
    pub category: TxCategory,
    /// Absolute value moved to or from `address`.
    pub amount: SatoshiAmount,
    pub fee: Option<SatoshiAmount>,
    pub confirmations: u32,
    pub time: Option<u64>,
}

/// An address with its balance and the hashes of transactions touching it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
    pub balance: SatoshiAmount,
    pub transactions: Vec<String>,
}

// ==============================================================================
// Wallets
// ==============================================================================

/// A named set of addresses tracked on every provider.
///
/// `addresses` is a `BTreeSet` so it is always sorted. `provider_data`
/// holds each provider's own identifiers for this wallet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub name: String,
    pub addresses: BTreeSet<String>,
    #[serde(default)]
    pub provider_data: BTreeMap<ProviderId, ProviderData>,
}

impl Wallet {
    pub fn new<I, S>(name: impl Into<String>, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            addresses: addresses.into_iter().map(Into::into).collect(),
            provider_data: BTreeMap::new(),
        }
    }

    pub fn address_list(&self) -> Vec<String> {
        self.addresses.iter().cloned().collect()
    }

    /// Attach (or extend) one provider's metadata.
    pub fn with_provider_data(mut self, provider: ProviderId, data: ProviderData) -> Self {
        self.provider_data.entry(provider).or_default().extend(data);
        self
    }
}

// ==============================================================================
// Partial Execution
// ==============================================================================

/// Which providers a sequential mutation reached before one failed.
///
/// Providers in `succeeded` have committed the change and were not rolled
/// back; the caller decides whether to compensate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialExecutionState {
    pub succeeded: Vec<ProviderId>,
    pub failed: ProviderId,
    pub unattempted: Vec<ProviderId>,
    /// Wallet reduced from the succeeded providers, when that was possible.
    pub merged: Option<Wallet>,
}
