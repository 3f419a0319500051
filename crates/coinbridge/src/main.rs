mod cli;
mod keys;

use std::sync::Arc;

use clap::Parser;
use eyre::WrapErr;
use serde_json::json;

use coinbridge_core::bridge::Bridge;
use coinbridge_core::spend::{FileKeyStore, PrivateKey};
use coinbridge_core::{
    BitcoindHandler, BridgeConfig, CoreError, ProviderHandler, RpcAuth, SatoshiAmount,
};

use cli::{Cli, Command};
use keys::P2wpkhKeys;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let bridge = build_bridge(&args)?;
    tracing::debug!(providers = ?bridge.provider_ids(), "bridge ready");

    match run(&bridge, args.command).await {
        Ok(output) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&output).wrap_err("render result")?
            );
            Ok(())
        }
        Err(err) => {
            if let Some(partial) = err.partial_execution() {
                eprintln!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "partial_execution": partial }))
                        .wrap_err("render partial execution state")?
                );
            }
            let message = match connection_hint(&err.to_string()) {
                Some(hint) => format!("{err}\nhint: {hint}"),
                None => err.to_string(),
            };
            Err(eyre::eyre!(message))
        }
    }
}

fn build_bridge(args: &Cli) -> eyre::Result<Bridge> {
    let shared_auth = RpcAuth::from_options(
        args.rpc_user.as_deref(),
        args.rpc_pass.as_deref(),
        args.rpc_cookie_file.as_deref(),
    )
    .wrap_err("resolve rpc credentials")?;

    let mut providers: Vec<Arc<dyn ProviderHandler>> = Vec::with_capacity(args.providers.len());
    for (index, endpoint) in args.providers.iter().enumerate() {
        let id = endpoint
            .name
            .clone()
            .unwrap_or_else(|| format!("bitcoind-{index}"));
        let handler = BitcoindHandler::new(id.clone(), &endpoint.url, shared_auth.clone())
            .wrap_err_with(|| format!("configure provider `{id}`"))?;
        providers.push(Arc::new(handler));
    }

    let config = BridgeConfig {
        wallet_data_path: args.wallet_data_path.clone(),
        min_spend: SatoshiAmount::from_sat(args.min_spend),
        fee_rate: SatoshiAmount::from_sat(args.fee_rate),
        dust_threshold: SatoshiAmount::from_sat(args.dust_threshold),
    };
    Bridge::new(providers, config).wrap_err("configure bridge")
}

async fn run(bridge: &Bridge, command: Command) -> Result<serde_json::Value, CoreError> {
    let output = match command {
        Command::Balance { addresses } => amount_json(bridge.get_balance(&addresses).await?),
        Command::UnconfirmedBalance { addresses } => {
            amount_json(bridge.get_unconfirmed_balance(&addresses).await?)
        }
        Command::Unspent { addresses } => to_json(&bridge.list_unspent(&addresses).await?)?,
        Command::Transactions { addresses } => {
            to_json(&bridge.list_transactions(&addresses).await?)?
        }
        Command::Tx { hashes } => to_json(&bridge.get_transactions(&hashes).await?)?,
        Command::Addresses { addresses } => to_json(&bridge.get_addresses(&addresses).await?)?,
        Command::Wallets => to_json(&bridge.get_wallets().await?)?,
        Command::CreateWallet { name, addresses } => {
            to_json(&bridge.create_wallet(&name, &addresses).await?)?
        }
        Command::AddAddresses { name, addresses } => {
            let wallet = bridge.get_wallet(&name).await?;
            to_json(&bridge.add_addresses(&wallet, &addresses).await?)?
        }
        Command::RemoveAddresses { name, addresses } => {
            let wallet = bridge.get_wallet(&name).await?;
            to_json(&bridge.remove_addresses(&wallet, &addresses).await?)?
        }
        Command::DeleteWallet { name } => {
            let wallet = bridge.get_wallet(&name).await?;
            to_json(&bridge.delete_wallet(&wallet).await?)?
        }
        Command::Broadcast { raw_tx_hex } => {
            json!({ "txid": bridge.broadcast_raw_transaction(&raw_tx_hex).await? })
        }
        Command::Plan {
            wallet,
            payments,
            change_address,
        } => match bridge
            .plan_spend(&wallet, &payments, change_address.as_deref())
            .await?
        {
            Some(plan) => to_json(&plan)?,
            None => json!({ "status": "insufficient_funds" }),
        },
        Command::ImportKey {
            wallet,
            wif,
            network,
        } => {
            let store = FileKeyStore::from_config(bridge.config()).ok_or_else(|| {
                CoreError::Validation("import-key needs --wallet-data-path".into())
            })?;
            let keys = P2wpkhKeys::new(network);
            let private_key = PrivateKey::new(wif);
            let public_key = keys.public_key_for(&private_key)?;
            let wallet = bridge.get_wallet(&wallet).await?;
            to_json(
                &bridge
                    .import_key(&wallet, &private_key, &public_key, &keys, &store)
                    .await?,
            )?
        }
    };
    Ok(output)
}

fn amount_json(amount: SatoshiAmount) -> serde_json::Value {
    json!({ "satoshis": amount.to_sat(), "btc": amount.to_btc_string() })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::InvalidResponse(format!("render: {e}")))
}

/// Actionable hint for common transport failures.
fn connection_hint(message: &str) -> Option<&'static str> {
    if message.contains("Could not resolve host") || message.contains("dns error") {
        Some("hostname resolution failed; verify the endpoint hostname and your DNS/network")
    } else if message.contains("tls")
        || message.contains("certificate")
        || message.contains("SSL")
    {
        Some("TLS handshake failed; verify certificate trust and that the endpoint uses HTTPS")
    } else if message.contains("401") || message.contains("403") {
        Some("authentication failed; verify --rpc-user/--rpc-pass, --rpc-cookie-file or the provider URL credentials")
    } else if message.contains("error sending request for url") {
        Some("request could not be sent; verify the URL and that the node is reachable")
    } else {
        None
    }
}
