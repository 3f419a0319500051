//! Provider abstraction layer.
//!
//! Defines the [`ProviderHandler`] trait every data provider implements,
//! the [`ProviderOutcome`] each call returns, a Bitcoin Core JSON-RPC
//! implementation ([`BitcoindHandler`]) and a test mock (`mock::MockProvider`).

mod bitcoind;
#[cfg(test)]
pub mod mock;

pub use bitcoind::{BitcoindHandler, RpcAuth};

use async_trait::async_trait;

use crate::amount::SatoshiAmount;
use crate::error::CoreError;
use crate::types::{Address, ProviderId, SpendableOutput, Transaction, Wallet};

// ==============================================================================
// Provider Outcome
// ==============================================================================

/// Result of one provider attempting one operation.
///
/// `Unsupported` is a normal answer, not a failure: the bridge drops it
/// from consensus and never reports it as an error.
#[derive(Debug)]
pub enum ProviderOutcome<T> {
    Value(T),
    Unsupported,
    Error(CoreError),
}

impl<T> ProviderOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProviderOutcome<U> {
        match self {
            Self::Value(v) => ProviderOutcome::Value(f(v)),
            Self::Unsupported => ProviderOutcome::Unsupported,
            Self::Error(e) => ProviderOutcome::Error(e),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }
}

impl<T> From<Result<T, CoreError>> for ProviderOutcome<T> {
    fn from(result: Result<T, CoreError>) -> Self {
        match result {
            Ok(v) => Self::Value(v),
            Err(e) => Self::Error(e),
        }
    }
}

// ==============================================================================
// Provider Handler
// ==============================================================================

/// The capability set a blockchain data provider can offer.
///
/// Every method defaults to [`ProviderOutcome::Unsupported`], so a handler
/// only implements what its backend can actually answer. Implementations
/// own their transport, authentication and per-call timeouts.
#[async_trait]
pub trait ProviderHandler: Send + Sync {
    /// Identifier used in errors, logs and wallet metadata.
    fn id(&self) -> &ProviderId;

    /// Transactions touching any of `addresses`.
    async fn list_transactions(&self, _addresses: &[String]) -> ProviderOutcome<Vec<Transaction>> {
        ProviderOutcome::Unsupported
    }

    /// Transactions by hash, in the order requested.
    async fn get_transactions(&self, _hashes: &[String]) -> ProviderOutcome<Vec<Transaction>> {
        ProviderOutcome::Unsupported
    }

    /// Confirmed balance across `addresses`.
    async fn get_balance(&self, _addresses: &[String]) -> ProviderOutcome<SatoshiAmount> {
        ProviderOutcome::Unsupported
    }

    /// Unconfirmed (mempool) balance across `addresses`.
    async fn get_unconfirmed_balance(
        &self,
        _addresses: &[String],
    ) -> ProviderOutcome<SatoshiAmount> {
        ProviderOutcome::Unsupported
    }

    async fn list_unspent(&self, _addresses: &[String]) -> ProviderOutcome<Vec<SpendableOutput>> {
        ProviderOutcome::Unsupported
    }

    /// Submit a signed transaction; returns its id.
    async fn broadcast_raw_transaction(&self, _raw_tx_hex: &str) -> ProviderOutcome<String> {
        ProviderOutcome::Unsupported
    }

    async fn create_wallet(&self, _name: &str, _addresses: &[String]) -> ProviderOutcome<Wallet> {
        ProviderOutcome::Unsupported
    }

    async fn add_addresses(&self, _wallet: &Wallet, _addresses: &[String]) -> ProviderOutcome<Wallet> {
        ProviderOutcome::Unsupported
    }

    async fn remove_addresses(
        &self,
        _wallet: &Wallet,
        _addresses: &[String],
    ) -> ProviderOutcome<Wallet> {
        ProviderOutcome::Unsupported
    }

    /// Delete `wallet`; returns the provider's last view of it.
    async fn delete_wallet(&self, _wallet: &Wallet) -> ProviderOutcome<Wallet> {
        ProviderOutcome::Unsupported
    }

    async fn get_addresses(&self, _addresses: &[String]) -> ProviderOutcome<Vec<Address>> {
        ProviderOutcome::Unsupported
    }

    async fn get_wallets(&self) -> ProviderOutcome<Vec<Wallet>> {
        ProviderOutcome::Unsupported
    }
}
