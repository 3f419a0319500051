use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::amount::SatoshiAmount;
use crate::error::{CoreError, RpcError};
use crate::types::{Address, ProviderData, ProviderId, SpendableOutput, Transaction, Wallet};

use super::{ProviderHandler, ProviderOutcome};

/// A mock provider for testing. Answers from canned data populated via the
/// builder pattern; anything not configured is `Unsupported`. Every call is
/// recorded so tests can assert which providers were reached.
pub struct MockProvider {
    id: ProviderId,
    balance: Option<SatoshiAmount>,
    unconfirmed_balance: Option<SatoshiAmount>,
    unspent: Option<Vec<SpendableOutput>>,
    transactions: Option<Vec<Transaction>>,
    addresses: Option<Vec<Address>>,
    wallets: Option<Vec<Wallet>>,
    broadcast_txid: Option<String>,
    manages_wallets: bool,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockProvider {
    pub fn builder(id: &str) -> MockProviderBuilder {
        MockProviderBuilder {
            id: ProviderId::from(id),
            balance: None,
            unconfirmed_balance: None,
            unspent: None,
            transactions: None,
            addresses: None,
            wallets: None,
            broadcast_txid: None,
            manages_wallets: false,
            failing: HashSet::new(),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn answer<T: Clone>(&self, operation: &'static str, value: &Option<T>) -> ProviderOutcome<T> {
        self.calls.lock().expect("calls lock").push(operation);
        if self.failing.contains(operation) {
            return ProviderOutcome::Error(CoreError::Rpc(RpcError::ServerError {
                code: -1,
                message: format!("{} refused {operation}", self.id),
            }));
        }
        match value {
            Some(v) => ProviderOutcome::Value(v.clone()),
            None => ProviderOutcome::Unsupported,
        }
    }

    fn wallet_answer(&self, operation: &'static str, wallet: Wallet) -> ProviderOutcome<Wallet> {
        let supported = self.manages_wallets.then(|| {
            let mut data = ProviderData::new();
            data.insert(
                "wallet_id".into(),
                serde_json::Value::String(format!("{}-{}", self.id, wallet.name)),
            );
            wallet.with_provider_data(self.id.clone(), data)
        });
        self.answer(operation, &supported)
    }
}

pub struct MockProviderBuilder {
    id: ProviderId,
    balance: Option<SatoshiAmount>,
    unconfirmed_balance: Option<SatoshiAmount>,
    unspent: Option<Vec<SpendableOutput>>,
    transactions: Option<Vec<Transaction>>,
    addresses: Option<Vec<Address>>,
    wallets: Option<Vec<Wallet>>,
    broadcast_txid: Option<String>,
    manages_wallets: bool,
    failing: HashSet<&'static str>,
}

impl MockProviderBuilder {
    pub fn with_balance(mut self, balance: SatoshiAmount) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn with_unconfirmed_balance(mut self, balance: SatoshiAmount) -> Self {
        self.unconfirmed_balance = Some(balance);
        self
    }

    pub fn with_unspent(mut self, unspent: Vec<SpendableOutput>) -> Self {
        self.unspent = Some(unspent);
        self
    }

    pub fn with_transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn with_addresses(mut self, addresses: Vec<Address>) -> Self {
        self.addresses = Some(addresses);
        self
    }

    pub fn with_wallets(mut self, wallets: Vec<Wallet>) -> Self {
        self.wallets = Some(wallets);
        self
    }

    pub fn with_broadcast_txid(mut self, txid: &str) -> Self {
        self.broadcast_txid = Some(txid.to_owned());
        self
    }

    /// Accept wallet mutations, echoing the wallet back with a
    /// provider-specific `wallet_id`.
    pub fn managing_wallets(mut self) -> Self {
        self.manages_wallets = true;
        self
    }

    /// Make `operation` (a trait method name) return an error.
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    pub fn build(self) -> MockProvider {
        MockProvider {
            id: self.id,
            balance: self.balance,
            unconfirmed_balance: self.unconfirmed_balance,
            unspent: self.unspent,
            transactions: self.transactions,
            addresses: self.addresses,
            wallets: self.wallets,
            broadcast_txid: self.broadcast_txid,
            manages_wallets: self.manages_wallets,
            failing: self.failing,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProviderHandler for MockProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn list_transactions(&self, _addresses: &[String]) -> ProviderOutcome<Vec<Transaction>> {
        self.answer("list_transactions", &self.transactions)
    }

    async fn get_transactions(&self, hashes: &[String]) -> ProviderOutcome<Vec<Transaction>> {
        let matching = self.transactions.as_ref().map(|txs| {
            hashes
                .iter()
                .filter_map(|h| txs.iter().find(|tx| &tx.hash == h).cloned())
                .collect::<Vec<_>>()
        });
        self.answer("get_transactions", &matching)
    }

    async fn get_balance(&self, _addresses: &[String]) -> ProviderOutcome<SatoshiAmount> {
        self.answer("get_balance", &self.balance)
    }

    async fn get_unconfirmed_balance(
        &self,
        _addresses: &[String],
    ) -> ProviderOutcome<SatoshiAmount> {
        self.answer("get_unconfirmed_balance", &self.unconfirmed_balance)
    }

    async fn list_unspent(&self, _addresses: &[String]) -> ProviderOutcome<Vec<SpendableOutput>> {
        self.answer("list_unspent", &self.unspent)
    }

    async fn broadcast_raw_transaction(&self, _raw_tx_hex: &str) -> ProviderOutcome<String> {
        self.answer("broadcast_raw_transaction", &self.broadcast_txid)
    }

    async fn create_wallet(&self, name: &str, addresses: &[String]) -> ProviderOutcome<Wallet> {
        self.wallet_answer("create_wallet", Wallet::new(name, addresses.iter().cloned()))
    }

    async fn add_addresses(&self, wallet: &Wallet, addresses: &[String]) -> ProviderOutcome<Wallet> {
        let mut updated = wallet.clone();
        updated.addresses.extend(addresses.iter().cloned());
        self.wallet_answer("add_addresses", updated)
    }

    async fn remove_addresses(
        &self,
        wallet: &Wallet,
        addresses: &[String],
    ) -> ProviderOutcome<Wallet> {
        let mut updated = wallet.clone();
        updated.addresses.retain(|a| !addresses.contains(a));
        self.wallet_answer("remove_addresses", updated)
    }

    async fn delete_wallet(&self, wallet: &Wallet) -> ProviderOutcome<Wallet> {
        self.wallet_answer("delete_wallet", wallet.clone())
    }

    async fn get_addresses(&self, _addresses: &[String]) -> ProviderOutcome<Vec<Address>> {
        self.answer("get_addresses", &self.addresses)
    }

    async fn get_wallets(&self) -> ProviderOutcome<Vec<Wallet>> {
        self.answer("get_wallets", &self.wallets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::sats;

    #[tokio::test]
    async fn unconfigured_capabilities_are_unsupported() {
        let provider = MockProvider::builder("p").build();
        assert!(provider.get_balance(&[]).await.is_unsupported());
        assert!(provider.create_wallet("w", &[]).await.is_unsupported());
        assert_eq!(provider.calls(), vec!["get_balance", "create_wallet"]);
    }

    #[tokio::test]
    async fn failing_operation_returns_error() {
        let provider = MockProvider::builder("p")
            .with_balance(sats(5))
            .failing("get_balance")
            .build();
        assert!(matches!(
            provider.get_balance(&[]).await,
            ProviderOutcome::Error(CoreError::Rpc(_))
        ));
    }

    #[tokio::test]
    async fn wallet_mutations_tag_provider_data() {
        let provider = MockProvider::builder("p").managing_wallets().build();
        let ProviderOutcome::Value(wallet) = provider.create_wallet("w", &["a".into()]).await else {
            panic!("expected a wallet");
        };
        assert_eq!(wallet.provider_data[&ProviderId::from("p")]["wallet_id"], "p-w");
    }
}
