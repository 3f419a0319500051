use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::amount::SatoshiAmount;
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::fee::{converge_fee, validate_payments, FeeParams, Payment};
use crate::provider::{ProviderHandler, ProviderOutcome};
use crate::reduce::{check_conflicts, reduce_results, Agreement, Reducible};
use crate::spend::{sign_plan, KeyCustody, PrivateKey, PublicKey, Signer, SpendOutcome, SpendPlan};
use crate::types::{
    Address, PartialExecutionState, ProviderId, SpendableOutput, Transaction, Wallet,
};

/// Longest accepted wallet name.
pub const MAX_WALLET_NAME_LEN: usize = 64;

// ==============================================================================
// Dispatch Policy
// ==============================================================================

/// The three ways the bridge drives its providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Ask everyone, require agreement.
    Read,
    /// Apply in order, stop at the first failure.
    Mutation,
    /// Try in order until one provider accepts.
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    HaltOnError,
    ContinueOnError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    AllProviders,
    FirstSuccess,
}

impl OperationKind {
    pub fn error_policy(self) -> ErrorPolicy {
        match self {
            Self::Read | Self::Mutation => ErrorPolicy::HaltOnError,
            Self::Broadcast => ErrorPolicy::ContinueOnError,
        }
    }

    pub fn completion(self) -> Completion {
        match self {
            Self::Read | Self::Mutation => Completion::AllProviders,
            Self::Broadcast => Completion::FirstSuccess,
        }
    }
}

/// What happened while walking the providers for one operation.
struct Run<T> {
    values: Vec<(ProviderId, T)>,
    /// Index and error of the provider that stopped a halting run.
    halted: Option<(usize, CoreError)>,
    attempted: usize,
    failures: usize,
}

// ==============================================================================
// Bridge
// ==============================================================================

/// One API over several blockchain data providers.
///
/// Providers are called one at a time in configuration order. Reads must
/// agree across every provider that answers; wallet mutations stop at the
/// first failing provider and report how far they got; broadcasts go
/// through the first provider that accepts them.
pub struct Bridge {
    providers: Vec<Arc<dyn ProviderHandler>>,
    config: BridgeConfig,
}

impl Bridge {
    /// Fails when `providers` is empty or two providers share an id.
    pub fn new(
        providers: Vec<Arc<dyn ProviderHandler>>,
        config: BridgeConfig,
    ) -> Result<Self, CoreError> {
        if providers.is_empty() {
            return Err(CoreError::Validation(
                "at least one provider must be configured".into(),
            ));
        }
        let mut seen = HashSet::new();
        for provider in &providers {
            if !seen.insert(provider.id().clone()) {
                return Err(CoreError::Validation(format!(
                    "duplicate provider id `{}`",
                    provider.id()
                )));
            }
        }
        Ok(Self { providers, config })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id().clone()).collect()
    }

    // -- reads ----------------------------------------------------------------

    pub async fn list_transactions(
        &self,
        addresses: &[String],
    ) -> Result<Vec<Transaction>, CoreError> {
        validate_addresses(addresses)?;
        self.read("list_transactions", |p| async move {
            p.list_transactions(addresses).await
        })
        .await
    }

    pub async fn get_transactions(&self, hashes: &[String]) -> Result<Vec<Transaction>, CoreError> {
        validate_non_blank("transaction hash", hashes)?;
        self.read("get_transactions", |p| async move {
            p.get_transactions(hashes).await
        })
        .await
    }

    pub async fn get_balance(&self, addresses: &[String]) -> Result<SatoshiAmount, CoreError> {
        validate_addresses(addresses)?;
        self.read("get_balance", |p| async move { p.get_balance(addresses).await })
            .await
    }

    pub async fn get_unconfirmed_balance(
        &self,
        addresses: &[String],
    ) -> Result<SatoshiAmount, CoreError> {
        validate_addresses(addresses)?;
        self.read("get_unconfirmed_balance", |p| async move {
            p.get_unconfirmed_balance(addresses).await
        })
        .await
    }

    pub async fn list_unspent(
        &self,
        addresses: &[String],
    ) -> Result<Vec<SpendableOutput>, CoreError> {
        validate_addresses(addresses)?;
        self.read("list_unspent", |p| async move { p.list_unspent(addresses).await })
            .await
    }

    pub async fn get_addresses(&self, addresses: &[String]) -> Result<Vec<Address>, CoreError> {
        validate_addresses(addresses)?;
        self.read("get_addresses", |p| async move { p.get_addresses(addresses).await })
            .await
    }

    pub async fn get_wallets(&self) -> Result<Vec<Wallet>, CoreError> {
        self.read("get_wallets", |p| async move { p.get_wallets().await })
            .await
    }

    /// Look up one wallet by name from the agreed wallet list.
    pub async fn get_wallet(&self, name: &str) -> Result<Wallet, CoreError> {
        validate_wallet_name(name)?;
        self.get_wallets()
            .await?
            .into_iter()
            .find(|w| w.name == name)
            .ok_or_else(|| CoreError::WalletNotFound(name.to_owned()))
    }

    pub async fn wallet_balance(&self, name: &str) -> Result<SatoshiAmount, CoreError> {
        let wallet = self.get_wallet(name).await?;
        if wallet.addresses.is_empty() {
            return Ok(SatoshiAmount::ZERO);
        }
        self.get_balance(&wallet.address_list()).await
    }

    pub async fn wallet_unspent(&self, name: &str) -> Result<Vec<SpendableOutput>, CoreError> {
        let wallet = self.get_wallet(name).await?;
        if wallet.addresses.is_empty() {
            return Ok(Vec::new());
        }
        self.list_unspent(&wallet.address_list()).await
    }

    // -- wallet mutations -----------------------------------------------------

    pub async fn create_wallet(&self, name: &str, addresses: &[String]) -> Result<Wallet, CoreError> {
        validate_wallet_name(name)?;
        validate_non_blank("address", addresses)?;
        let addresses = sorted_unique(addresses);
        let addresses = addresses.as_slice();
        self.mutate("create_wallet", |p| async move {
            p.create_wallet(name, addresses).await
        })
        .await
    }

    pub async fn add_addresses(
        &self,
        wallet: &Wallet,
        addresses: &[String],
    ) -> Result<Wallet, CoreError> {
        validate_wallet_name(&wallet.name)?;
        validate_addresses(addresses)?;
        let addresses = sorted_unique(addresses);
        let addresses = addresses.as_slice();
        self.mutate("add_addresses", |p| async move {
            p.add_addresses(wallet, addresses).await
        })
        .await
    }

    pub async fn remove_addresses(
        &self,
        wallet: &Wallet,
        addresses: &[String],
    ) -> Result<Wallet, CoreError> {
        validate_wallet_name(&wallet.name)?;
        validate_addresses(addresses)?;
        let addresses = sorted_unique(addresses);
        let addresses = addresses.as_slice();
        self.mutate("remove_addresses", |p| async move {
            p.remove_addresses(wallet, addresses).await
        })
        .await
    }

    pub async fn delete_wallet(&self, wallet: &Wallet) -> Result<Wallet, CoreError> {
        validate_wallet_name(&wallet.name)?;
        self.mutate("delete_wallet", |p| async move { p.delete_wallet(wallet).await })
            .await
    }

    // -- broadcast and spending -----------------------------------------------

    /// Submit a signed transaction through the first provider that accepts
    /// it. Provider errors are logged and the next provider is tried.
    pub async fn broadcast_raw_transaction(&self, raw_tx_hex: &str) -> Result<String, CoreError> {
        const OPERATION: &str = "broadcast_raw_transaction";
        if raw_tx_hex.trim().is_empty() {
            return Err(CoreError::Validation("raw transaction must not be empty".into()));
        }

        let run = self
            .run(OPERATION, OperationKind::Broadcast, |p| async move {
                p.broadcast_raw_transaction(raw_tx_hex).await
            })
            .await;

        match run.values.into_iter().next() {
            Some((provider, txid)) => {
                info!(%provider, %txid, "transaction broadcast");
                Ok(txid)
            }
            None if run.failures == 0 => Err(CoreError::NoProviderResult {
                operation: OPERATION,
            }),
            None => Err(CoreError::BroadcastFailed {
                attempted: run.attempted,
            }),
        }
    }

    /// Choose inputs and fee for paying `payments` out of `wallet_name`.
    ///
    /// `Ok(None)` means the wallet cannot cover the payments plus fee.
    /// Change goes to `change_address`, or to the wallet's first address.
    pub async fn plan_spend(
        &self,
        wallet_name: &str,
        payments: &[Payment],
        change_address: Option<&str>,
    ) -> Result<Option<SpendPlan>, CoreError> {
        validate_wallet_name(wallet_name)?;
        validate_payments(payments, self.config.min_spend)?;

        let wallet = self.get_wallet(wallet_name).await?;
        let Some(default_change) = wallet.addresses.first() else {
            return Ok(None);
        };
        let change_address = change_address.unwrap_or(default_change.as_str()).to_owned();

        let available: Vec<SpendableOutput> = self
            .list_unspent(&wallet.address_list())
            .await?
            .into_iter()
            .filter(|o| !o.spent)
            .collect();

        let plan = converge_fee(&available, payments, &FeeParams::from(&self.config))?;
        Ok(plan.map(|fee_plan| SpendPlan {
            wallet: wallet.name,
            change_address,
            fee_plan,
        }))
    }

    /// Plan, sign and broadcast a spend from `wallet_name`.
    pub async fn send(
        &self,
        wallet_name: &str,
        payments: &[Payment],
        change_address: Option<&str>,
        signer: &dyn Signer,
        keys: &dyn KeyCustody,
    ) -> Result<SpendOutcome, CoreError> {
        let Some(plan) = self
            .plan_spend(wallet_name, payments, change_address)
            .await?
        else {
            return Ok(SpendOutcome::InsufficientFunds);
        };

        let raw = sign_plan(&plan, signer, keys)?;
        let txid = self.broadcast_raw_transaction(&raw).await?;
        Ok(SpendOutcome::Broadcast { txid, plan })
    }

    /// Derive the address for `public_key`, keep `private_key` for it, and
    /// add the address to `wallet` on every provider.
    pub async fn import_key(
        &self,
        wallet: &Wallet,
        private_key: &PrivateKey,
        public_key: &PublicKey,
        signer: &dyn Signer,
        keys: &dyn KeyCustody,
    ) -> Result<Wallet, CoreError> {
        validate_wallet_name(&wallet.name)?;
        let address = signer.derive_address(public_key)?;
        keys.store_new_key(&wallet.name, private_key, &address)?;
        self.add_addresses(wallet, &[address]).await
    }

    // -- dispatch -------------------------------------------------------------

    async fn run<T, F, Fut>(&self, operation: &'static str, kind: OperationKind, call: F) -> Run<T>
    where
        F: Fn(Arc<dyn ProviderHandler>) -> Fut,
        Fut: Future<Output = ProviderOutcome<T>>,
    {
        let mut run = Run {
            values: Vec::new(),
            halted: None,
            attempted: 0,
            failures: 0,
        };

        for (index, provider) in self.providers.iter().enumerate() {
            let id = provider.id().clone();
            run.attempted += 1;
            debug!(provider = %id, operation, "dispatching to provider");

            match call(Arc::clone(provider)).await {
                ProviderOutcome::Value(value) => {
                    run.values.push((id, value));
                    if kind.completion() == Completion::FirstSuccess {
                        break;
                    }
                }
                ProviderOutcome::Unsupported => {
                    debug!(provider = %id, operation, "operation unsupported by provider");
                }
                ProviderOutcome::Error(error) => match kind.error_policy() {
                    ErrorPolicy::HaltOnError => {
                        run.halted = Some((index, error));
                        break;
                    }
                    ErrorPolicy::ContinueOnError => {
                        warn!(provider = %id, operation, %error, "provider failed; trying next");
                        run.failures += 1;
                    }
                },
            }
        }

        run
    }

    async fn read<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, CoreError>
    where
        T: Reducible + Agreement,
        F: Fn(Arc<dyn ProviderHandler>) -> Fut,
        Fut: Future<Output = ProviderOutcome<T>>,
    {
        let mut run = self.run(operation, OperationKind::Read, call).await;
        if let Some((index, error)) = run.halted {
            return Err(CoreError::Provider {
                provider: self.providers[index].id().clone(),
                source: Box::new(error),
            });
        }

        match run.values.len() {
            0 => Err(CoreError::NoProviderResult { operation }),
            1 => Ok(run.values.remove(0).1),
            _ => {
                check_conflicts(operation, &run.values)?;
                reduce_results(operation, run.values)
            }
        }
    }

    async fn mutate<F, Fut>(&self, operation: &'static str, call: F) -> Result<Wallet, CoreError>
    where
        F: Fn(Arc<dyn ProviderHandler>) -> Fut,
        Fut: Future<Output = ProviderOutcome<Wallet>>,
    {
        let run = self.run(operation, OperationKind::Mutation, call).await;

        if let Some((index, error)) = run.halted {
            let succeeded: Vec<ProviderId> = run.values.iter().map(|(id, _)| id.clone()).collect();
            let merged = if run.values.is_empty() {
                None
            } else {
                match reduce_results(operation, run.values) {
                    Ok(wallet) => Some(wallet),
                    Err(e) => {
                        debug!(operation, error = %e, "could not merge partial results");
                        None
                    }
                }
            };
            let partial = PartialExecutionState {
                succeeded,
                failed: self.providers[index].id().clone(),
                unattempted: self.providers[index + 1..]
                    .iter()
                    .map(|p| p.id().clone())
                    .collect(),
                merged,
            };
            warn!(
                operation,
                failed = %partial.failed,
                succeeded = partial.succeeded.len(),
                unattempted = partial.unattempted.len(),
                %error,
                "wallet mutation stopped part-way; completed providers were not rolled back"
            );
            return Err(CoreError::Handler {
                operation,
                source: Box::new(error),
                partial: Box::new(partial),
            });
        }

        if run.values.is_empty() {
            return Err(CoreError::NoProviderResult { operation });
        }
        reduce_results(operation, run.values)
    }
}

// ==============================================================================
// Input Validation
// ==============================================================================

/// Wallet names are 1-64 characters of `[A-Za-z0-9_-]`.
pub fn validate_wallet_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name.len() > MAX_WALLET_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "wallet name must be 1-{MAX_WALLET_NAME_LEN} characters, got {}",
            name.len()
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(CoreError::Validation(format!(
            "wallet name `{name}` contains invalid character `{bad}`"
        )));
    }
    Ok(())
}

fn validate_addresses(addresses: &[String]) -> Result<(), CoreError> {
    if addresses.is_empty() {
        return Err(CoreError::Validation("at least one address is required".into()));
    }
    validate_non_blank("address", addresses)
}

fn validate_non_blank(what: &str, values: &[String]) -> Result<(), CoreError> {
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(CoreError::Validation(format!("{what} must not be blank")));
    }
    Ok(())
}

fn sorted_unique(values: &[String]) -> Vec<String> {
    values
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
