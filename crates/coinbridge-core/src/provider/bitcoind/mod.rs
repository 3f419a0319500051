//! Bitcoin Core JSON-RPC provider over HTTP(S).
//!
//! Address reads come from `scantxoutset`, so they work against any node
//! without importing addresses first. Wallets are mapped onto blank,
//! watch-only descriptor wallets. Mempool balances, per-address history,
//! address removal and wallet deletion have no RPC equivalent and stay
//! `Unsupported`.

mod connection;
mod parsing;
mod protocol;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header;
use tracing::{debug, trace};

use crate::amount::SatoshiAmount;
use crate::error::{CoreError, RpcError};
use crate::types::{Address, ProviderData, ProviderId, SpendableOutput, Transaction, Wallet};

use self::connection::parse_endpoint;
use self::parsing::{
    check_import_results, parse_descriptor_addresses, parse_raw_transaction, parse_scan_result,
    scan_objects, script_index,
};
use self::protocol::{is_method_not_found, parse_jsonrpc_error, JsonRpcRequest, JsonRpcResponse};

use super::{ProviderHandler, ProviderOutcome};

pub use self::connection::RpcAuth;

pub struct BitcoindHandler {
    id: ProviderId,
    client: reqwest::Client,
    url: String,
    auth: RpcAuth,
    next_id: AtomicU64,
}

impl BitcoindHandler {
    /// Create a handler for an HTTP(S) URL.
    ///
    /// `user:pass@` in the URL takes precedence over `shared_auth`, so one
    /// node can use its own credentials while the rest share a cookie or
    /// an rpc user.
    pub fn new(
        id: impl Into<ProviderId>,
        connection: &str,
        shared_auth: RpcAuth,
    ) -> Result<Self, CoreError> {
        let endpoint = parse_endpoint(connection)?;
        let auth = endpoint.auth.unwrap_or(shared_auth);

        // scantxoutset walks the whole UTXO set; allow it time.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .tcp_nodelay(true)
            .build()
            .map_err(RpcError::Transport)?;

        Ok(Self {
            id: id.into(),
            client,
            url: endpoint.url,
            auth,
            next_id: AtomicU64::new(initial_request_id()),
        })
    }

    fn endpoint(&self, wallet: Option<&str>) -> String {
        match wallet {
            Some(name) => format!("{}/wallet/{name}", self.url),
            None => self.url.clone(),
        }
    }

    async fn rpc_call(
        &self,
        wallet: Option<&str>,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, CoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            provider = %self.id,
            rpc.id = id,
            rpc.method = method,
            rpc.wallet = wallet.unwrap_or(""),
            "rpc call"
        );
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let mut builder = self
            .client
            .post(self.endpoint(wallet))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&req);
        if let Some((user, pass)) = self.auth.basic_credentials()? {
            builder = builder.basic_auth(user, Some(pass));
        }

        let response = builder.send().await.map_err(RpcError::Transport)?;
        let status = response.status();

        let body = response.text().await.map_err(RpcError::Transport)?;
        debug!(rpc.id = id, rpc.method = method, %status, body_len = body.len(), "rpc response");
        trace!(rpc.id = id, rpc.method = method, body = %body, "rpc response body");

        // Auth and routing failures come back with an empty body.
        if body.trim().is_empty() && !status.is_success() {
            return Err(RpcError::InvalidResponse(format!("HTTP status {status}")).into());
        }

        let decoded: JsonRpcResponse = serde_json::from_str(&body).map_err(|e| {
            RpcError::InvalidResponse(format!("decode JSON-RPC response: {e}; body={body}"))
        })?;

        if let Some(err) = decoded.error {
            return Err(parse_jsonrpc_error(err));
        }

        Ok(decoded.result.unwrap_or(serde_json::Value::Null))
    }

    async fn scan_unspent(&self, addresses: &[String]) -> Result<Vec<SpendableOutput>, CoreError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let index = script_index(addresses)?;
        let raw = self
            .rpc_call(
                None,
                "scantxoutset",
                vec!["start".into(), scan_objects(addresses).into()],
            )
            .await?;
        parse_scan_result(raw, &index)
    }

    /// Node-side name of `wallet`, as recorded when this provider created it.
    fn rpc_wallet_name<'a>(&self, wallet: &'a Wallet) -> &'a str {
        wallet
            .provider_data
            .get(&self.id)
            .and_then(|data| data.get("rpc_wallet"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&wallet.name)
    }

    fn provider_data(&self, rpc_wallet: &str) -> ProviderData {
        let mut data = ProviderData::new();
        data.insert("rpc_wallet".into(), rpc_wallet.into());
        data.insert("endpoint".into(), self.url.clone().into());
        data
    }

    async fn import_addresses(&self, rpc_wallet: &str, addresses: &[String]) -> Result<(), CoreError> {
        if addresses.is_empty() {
            return Ok(());
        }
        let mut requests = Vec::with_capacity(addresses.len());
        for address in addresses {
            // importdescriptors insists on checksummed descriptors.
            let info = self
                .rpc_call(None, "getdescriptorinfo", vec![format!("addr({address})").into()])
                .await?;
            let descriptor = info
                .get("descriptor")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| {
                    CoreError::InvalidResponse("getdescriptorinfo result has no descriptor".into())
                })?;
            requests.push(serde_json::json!({
                "desc": descriptor,
                "timestamp": "now",
            }));
        }
        let raw = self
            .rpc_call(Some(rpc_wallet), "importdescriptors", vec![requests.into()])
            .await?;
        check_import_results(raw)
    }

    async fn create_watch_wallet(&self, name: &str, addresses: &[String]) -> Result<Wallet, CoreError> {
        // name, disable_private_keys, blank
        self.rpc_call(
            None,
            "createwallet",
            vec![name.into(), true.into(), true.into()],
        )
        .await?;
        self.import_addresses(name, addresses).await?;
        Ok(Wallet::new(name, addresses.iter().cloned())
            .with_provider_data(self.id.clone(), self.provider_data(name)))
    }

    async fn load_wallets(&self) -> Result<Vec<Wallet>, CoreError> {
        let names: Vec<String> = serde_json::from_value(
            self.rpc_call(None, "listwallets", Vec::new()).await?,
        )
        .map_err(|e| CoreError::InvalidResponse(format!("invalid listwallets result: {e}")))?;

        let mut wallets = Vec::with_capacity(names.len());
        for name in names {
            let raw = self.rpc_call(Some(&name), "listdescriptors", Vec::new()).await?;
            let addresses = parse_descriptor_addresses(raw)?;
            wallets.push(
                Wallet::new(name.as_str(), addresses)
                    .with_provider_data(self.id.clone(), self.provider_data(&name)),
            );
        }
        wallets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(wallets)
    }

    async fn lookup_transactions(&self, hashes: &[String]) -> Result<Vec<Transaction>, CoreError> {
        let mut transactions = Vec::new();
        for hash in hashes {
            let raw = self
                .rpc_call(None, "getrawtransaction", vec![hash.as_str().into(), true.into()])
                .await?;
            transactions.extend(parse_raw_transaction(raw)?);
        }
        Ok(transactions)
    }
}

/// Nodes built without wallet support answer "method not found".
fn wallet_outcome<T>(result: Result<T, CoreError>) -> ProviderOutcome<T> {
    match result {
        Err(err) if is_method_not_found(&err) => ProviderOutcome::Unsupported,
        other => other.into(),
    }
}

#[async_trait]
impl ProviderHandler for BitcoindHandler {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn get_transactions(&self, hashes: &[String]) -> ProviderOutcome<Vec<Transaction>> {
        self.lookup_transactions(hashes).await.into()
    }

    async fn get_balance(&self, addresses: &[String]) -> ProviderOutcome<SatoshiAmount> {
        ProviderOutcome::from(self.scan_unspent(addresses).await)
            .map(|outputs| outputs.iter().map(|o| o.value).sum())
    }

    async fn list_unspent(&self, addresses: &[String]) -> ProviderOutcome<Vec<SpendableOutput>> {
        self.scan_unspent(addresses).await.into()
    }

    async fn broadcast_raw_transaction(&self, raw_tx_hex: &str) -> ProviderOutcome<String> {
        let result = self
            .rpc_call(None, "sendrawtransaction", vec![raw_tx_hex.into()])
            .await
            .and_then(|raw| {
                raw.as_str().map(str::to_owned).ok_or_else(|| {
                    CoreError::InvalidResponse(format!("sendrawtransaction returned {raw}"))
                })
            });
        result.into()
    }

    async fn create_wallet(&self, name: &str, addresses: &[String]) -> ProviderOutcome<Wallet> {
        wallet_outcome(self.create_watch_wallet(name, addresses).await)
    }

    async fn add_addresses(&self, wallet: &Wallet, addresses: &[String]) -> ProviderOutcome<Wallet> {
        let rpc_wallet = self.rpc_wallet_name(wallet).to_owned();
        let result = self.import_addresses(&rpc_wallet, addresses).await.map(|()| {
            let mut updated = wallet.clone();
            updated.addresses.extend(addresses.iter().cloned());
            updated.with_provider_data(self.id.clone(), self.provider_data(&rpc_wallet))
        });
        wallet_outcome(result)
    }

    async fn get_addresses(&self, addresses: &[String]) -> ProviderOutcome<Vec<Address>> {
        ProviderOutcome::from(self.scan_unspent(addresses).await).map(|outputs| {
            let mut by_address: BTreeMap<&str, Address> = addresses
                .iter()
                .map(|a| {
                    (
                        a.as_str(),
                        Address {
                            address: a.clone(),
                            balance: SatoshiAmount::ZERO,
                            transactions: Vec::new(),
                        },
                    )
                })
                .collect();
            for output in &outputs {
                if let Some(entry) = by_address.get_mut(output.address.as_str()) {
                    entry.balance += output.value;
                    if !entry.transactions.contains(&output.tx_hash) {
                        entry.transactions.push(output.tx_hash.clone());
                    }
                }
            }
            by_address.into_values().collect()
        })
    }

    async fn get_wallets(&self) -> ProviderOutcome<Vec<Wallet>> {
        wallet_outcome(self.load_wallets().await)
    }
}

fn initial_request_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}
