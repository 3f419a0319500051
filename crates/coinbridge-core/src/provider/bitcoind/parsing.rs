use std::collections::HashMap;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Denomination, ScriptBuf, SignedAmount};

use crate::amount::SatoshiAmount;
use crate::error::CoreError;
use crate::types::{SpendableOutput, Transaction, TxCategory};

/// Parse a BTC amount from a JSON value.
///
/// Wallet RPCs report sends as negative amounts, so the magnitude is kept.
/// Numbers go through `from_float_in` to accept scientific notation.
pub(super) fn parse_btc_amount(value: &serde_json::Value) -> Result<SatoshiAmount, CoreError> {
    let signed = match value {
        serde_json::Value::Number(n) => {
            let parsed = n
                .as_f64()
                .ok_or_else(|| CoreError::InvalidResponse(format!("invalid BTC amount `{value}`")))?;
            SignedAmount::from_float_in(parsed, Denomination::Bitcoin).map_err(|e| {
                CoreError::InvalidResponse(format!("invalid BTC amount `{value}`: {e}"))
            })?
        }
        serde_json::Value::String(s) => SignedAmount::from_str_in(s, Denomination::Bitcoin)
            .map_err(|e| CoreError::InvalidResponse(format!("invalid BTC amount `{s}`: {e}")))?,
        _ => {
            return Err(CoreError::InvalidResponse(format!(
                "expected numeric BTC amount, got: {value}"
            )))
        }
    };
    Ok(SatoshiAmount::from(signed.unsigned_abs()))
}

// ==============================================================================
// UTXO Set Scans
// ==============================================================================

/// Maps each watched scriptPubKey back to the address string the caller
/// used, so results carry the caller's spelling.
pub(super) type ScriptIndex = HashMap<ScriptBuf, String>;

pub(super) fn script_index(addresses: &[String]) -> Result<ScriptIndex, CoreError> {
    addresses
        .iter()
        .map(|address| {
            let parsed: bitcoin::Address<NetworkUnchecked> = address
                .parse()
                .map_err(|e| CoreError::Validation(format!("invalid address `{address}`: {e}")))?;
            Ok((parsed.assume_checked().script_pubkey(), address.clone()))
        })
        .collect()
}

/// `scantxoutset` descriptors for `addresses`.
pub(super) fn scan_objects(addresses: &[String]) -> Vec<serde_json::Value> {
    addresses
        .iter()
        .map(|address| serde_json::Value::String(format!("addr({address})")))
        .collect()
}

#[derive(serde::Deserialize)]
struct ScanResult {
    success: bool,
    /// Chain tip the scan ran against.
    height: u64,
    unspents: Vec<ScanUnspent>,
}

#[derive(serde::Deserialize)]
struct ScanUnspent {
    txid: String,
    vout: u32,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: String,
    amount: serde_json::Value,
    height: u64,
}

pub(super) fn parse_scan_result(
    raw: serde_json::Value,
    index: &ScriptIndex,
) -> Result<Vec<SpendableOutput>, CoreError> {
    let result: ScanResult = serde_json::from_value(raw)
        .map_err(|e| CoreError::InvalidResponse(format!("invalid scantxoutset result: {e}")))?;
    if !result.success {
        return Err(CoreError::InvalidResponse("scantxoutset was aborted".into()));
    }

    let mut outputs = result
        .unspents
        .into_iter()
        .map(|unspent| {
            let script = ScriptBuf::from_hex(&unspent.script_pubkey).map_err(|e| {
                CoreError::InvalidResponse(format!("invalid scriptPubKey hex: {e}"))
            })?;
            let address = index.get(&script).cloned().ok_or_else(|| {
                CoreError::InvalidResponse(format!(
                    "scan returned output {}:{} for an address that was not requested",
                    unspent.txid, unspent.vout
                ))
            })?;
            let depth = result.height.saturating_sub(unspent.height) + 1;
            Ok(SpendableOutput {
                address,
                tx_hash: unspent.txid,
                output_index: unspent.vout,
                value: parse_btc_amount(&unspent.amount)?,
                confirmations: u32::try_from(depth).unwrap_or(u32::MAX),
                spent: false,
                category: TxCategory::Receive,
                confirmed_at: None,
            })
        })
        .collect::<Result<Vec<_>, CoreError>>()?;

    // Node order is unspecified; other providers are compared element-wise.
    outputs.sort_by(|a, b| {
        (&a.tx_hash, a.output_index).cmp(&(&b.tx_hash, b.output_index))
    });
    Ok(outputs)
}

// ==============================================================================
// Raw Transactions
// ==============================================================================

#[derive(serde::Deserialize)]
struct RawTransaction {
    txid: String,
    vout: Vec<RawOutput>,
    #[serde(default)]
    confirmations: u32,
    blocktime: Option<u64>,
}

#[derive(serde::Deserialize)]
struct RawOutput {
    value: serde_json::Value,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: RawScriptPubKey,
}

#[derive(serde::Deserialize)]
struct RawScriptPubKey {
    address: Option<String>,
}

/// One receive entry per addressed output of a verbose
/// `getrawtransaction` result. Outputs without an address are skipped.
pub(super) fn parse_raw_transaction(raw: serde_json::Value) -> Result<Vec<Transaction>, CoreError> {
    let tx: RawTransaction = serde_json::from_value(raw)
        .map_err(|e| CoreError::InvalidResponse(format!("invalid getrawtransaction result: {e}")))?;

    tx.vout
        .into_iter()
        .filter_map(|output| {
            let address = output.script_pubkey.address?;
            Some(parse_btc_amount(&output.value).map(|amount| Transaction {
                hash: tx.txid.clone(),
                address,
                category: TxCategory::Receive,
                amount,
                fee: None,
                confirmations: tx.confirmations,
                time: tx.blocktime,
            }))
        })
        .collect()
}

// ==============================================================================
// Wallet Descriptors
// ==============================================================================

#[derive(serde::Deserialize)]
struct DescriptorList {
    descriptors: Vec<DescriptorEntry>,
}

#[derive(serde::Deserialize)]
struct DescriptorEntry {
    desc: String,
}

/// Address inside an `addr(...)` descriptor, checksum ignored.
pub(super) fn address_from_descriptor(desc: &str) -> Option<&str> {
    let body = desc.split_once('#').map_or(desc, |(body, _checksum)| body);
    body.strip_prefix("addr(")?.strip_suffix(')')
}

/// Watched addresses of a descriptor wallet. Non-`addr` descriptors (HD
/// keychains) are not address sets and are skipped.
pub(super) fn parse_descriptor_addresses(raw: serde_json::Value) -> Result<Vec<String>, CoreError> {
    let list: DescriptorList = serde_json::from_value(raw)
        .map_err(|e| CoreError::InvalidResponse(format!("invalid listdescriptors result: {e}")))?;
    Ok(list
        .descriptors
        .iter()
        .filter_map(|entry| address_from_descriptor(&entry.desc))
        .map(str::to_owned)
        .collect())
}

#[derive(serde::Deserialize)]
struct ImportResult {
    success: bool,
    error: Option<serde_json::Value>,
}

pub(super) fn check_import_results(raw: serde_json::Value) -> Result<(), CoreError> {
    let results: Vec<ImportResult> = serde_json::from_value(raw)
        .map_err(|e| CoreError::InvalidResponse(format!("invalid importdescriptors result: {e}")))?;
    match results.into_iter().find(|r| !r.success) {
        None => Ok(()),
        Some(failed) => Err(CoreError::InvalidResponse(format!(
            "importdescriptors rejected a descriptor: {}",
            failed.error.unwrap_or(serde_json::Value::Null)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const BECH32: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const BECH32_SPK: &str = "0014751e76e8199196d454941c45d1b3a323f1433bd6";

    #[test]
    fn parse_btc_amount_fractional() {
        let amount = parse_btc_amount(&json!(0.00001)).expect("should parse fractional");
        assert_eq!(amount.to_sat(), 1000);
    }

    #[test]
    fn parse_btc_amount_string() {
        let amount = parse_btc_amount(&json!("0.5")).expect("should parse string");
        assert_eq!(amount.to_sat(), 50_000_000);
    }

    #[test]
    fn parse_btc_amount_keeps_magnitude_of_sends() {
        let amount = parse_btc_amount(&json!(-0.0001)).expect("should parse negative");
        assert_eq!(amount.to_sat(), 10_000);
    }

    #[test]
    fn parse_btc_amount_scientific_number() {
        let amount = parse_btc_amount(&json!(6.6e-6)).expect("should parse scientific notation");
        assert_eq!(amount.to_sat(), 660);
    }

    #[test]
    fn parse_btc_amount_invalid() {
        assert!(parse_btc_amount(&json!(true)).is_err());
        assert!(parse_btc_amount(&json!("1e-8")).is_err());
    }

    #[test]
    fn script_index_rejects_garbage() {
        let err = script_index(&["not-an-address".to_owned()]).expect_err("must reject");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn scan_result_maps_scripts_to_requested_addresses() {
        let index = script_index(&[BECH32.to_owned()]).expect("valid address");
        let raw = json!({
            "success": true,
            "txouts": 100,
            "height": 110,
            "bestblock": "00",
            "unspents": [
                {"txid": "bb", "vout": 1, "scriptPubKey": BECH32_SPK, "desc": "addr()", "amount": 0.0002, "coinbase": false, "height": 101},
                {"txid": "aa", "vout": 0, "scriptPubKey": BECH32_SPK, "desc": "addr()", "amount": 0.0001, "coinbase": false, "height": 110}
            ],
            "total_amount": 0.0003
        });

        let outputs = parse_scan_result(raw, &index).expect("should parse");
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].tx_hash, "aa");
        assert_eq!(outputs[0].confirmations, 1);
        assert_eq!(outputs[0].value.to_sat(), 10_000);
        assert_eq!(outputs[1].confirmations, 10);
        assert!(outputs.iter().all(|o| o.address == BECH32 && !o.spent));
    }

    #[test]
    fn scan_result_rejects_unrequested_script() {
        let raw = json!({
            "success": true,
            "height": 1,
            "unspents": [
                {"txid": "aa", "vout": 0, "scriptPubKey": BECH32_SPK, "amount": 1, "height": 1}
            ]
        });
        assert!(parse_scan_result(raw, &ScriptIndex::new()).is_err());
    }

    #[test]
    fn raw_transaction_yields_one_entry_per_addressed_output() {
        let raw = json!({
            "txid": "cc",
            "confirmations": 3,
            "blocktime": 1_700_000_000u64,
            "vout": [
                {"value": 0.001, "n": 0, "scriptPubKey": {"address": BECH32}},
                {"value": 0, "n": 1, "scriptPubKey": {"type": "nulldata"}}
            ]
        });
        let txs = parse_raw_transaction(raw).expect("should parse");
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount.to_sat(), 100_000);
        assert_eq!(txs[0].time, Some(1_700_000_000));
    }

    #[test]
    fn descriptor_addresses_skip_hd_keychains() {
        assert_eq!(address_from_descriptor("addr(abc)#xyz"), Some("abc"));
        assert_eq!(address_from_descriptor("wpkh([d34db33f/84h]xpub/0/*)#q"), None);

        let raw = json!({
            "wallet_name": "w",
            "descriptors": [
                {"desc": format!("addr({BECH32})#8d4ztd0f"), "timestamp": 0, "active": false},
                {"desc": "wpkh(xpub/0/*)#abcd", "timestamp": 0, "active": true}
            ]
        });
        assert_eq!(parse_descriptor_addresses(raw).expect("should parse"), vec![BECH32]);
    }

    #[test]
    fn failed_import_is_reported() {
        assert!(check_import_results(json!([{"success": true}])).is_ok());
        let err = check_import_results(json!([
            {"success": true},
            {"success": false, "error": {"code": -5, "message": "bad"}}
        ]))
        .expect_err("must fail");
        assert!(err.to_string().contains("rejected"));
    }
}
