//! Shared test helpers for `coinbridge-core` unit tests.
//!
//! Builders for amounts, spendable outputs and wallet metadata, plus a
//! [`RecordingSigner`] standing in for the cryptographic collaborator.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::amount::SatoshiAmount;
use crate::error::CoreError;
use crate::spend::{InputSignature, PrivateKey, PublicKey, SpendPlan, Signer};
use crate::types::{ProviderData, SpendableOutput, TxCategory};

// ==============================================================================
// Amount and Output Builders
// ==============================================================================

pub fn sats(n: u64) -> SatoshiAmount {
    SatoshiAmount::from_sat(n)
}

/// A confirmed, unspent receive output. `tx_byte` keeps hashes unique.
pub fn make_utxo(address: &str, tx_byte: u8, value: u64) -> SpendableOutput {
    SpendableOutput {
        address: address.to_owned(),
        tx_hash: format!("{tx_byte:02x}").repeat(32),
        output_index: 0,
        value: sats(value),
        confirmations: 6,
        spent: false,
        category: TxCategory::Receive,
        confirmed_at: Some(1_700_000_000),
    }
}

pub fn utxo_at(address: &str, value: u64) -> SpendableOutput {
    make_utxo(address, 0xaa, value)
}

/// One output per value, each in its own transaction.
pub fn utxos(values: &[u64]) -> Vec<SpendableOutput> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| make_utxo("addr", i as u8, *value))
        .collect()
}

pub fn provider_data(key: &str, value: &str) -> ProviderData {
    let mut data = ProviderData::new();
    data.insert(key.to_owned(), serde_json::Value::String(value.to_owned()));
    data
}

// ==============================================================================
// Signer Stand-in
// ==============================================================================

/// Signs with the key text itself and records `(input_index, key)` pairs.
#[derive(Default)]
pub struct RecordingSigner {
    signed: Mutex<Vec<(usize, String)>>,
}

impl RecordingSigner {
    pub fn signed(&self) -> Vec<(usize, String)> {
        self.signed.lock().expect("signer lock").clone()
    }
}

impl Signer for RecordingSigner {
    fn derive_address(&self, public_key: &PublicKey) -> Result<String, CoreError> {
        Ok(format!("addr-of-{}", public_key.0))
    }

    fn sign(
        &self,
        input_index: usize,
        private_key: &PrivateKey,
        _previous_output: &SpendableOutput,
    ) -> Result<Vec<u8>, CoreError> {
        self.signed
            .lock()
            .expect("signer lock")
            .push((input_index, private_key.expose().to_owned()));
        Ok(private_key.expose().as_bytes().to_vec())
    }

    fn finalize(
        &self,
        _plan: &SpendPlan,
        signatures: &[InputSignature],
    ) -> Result<String, CoreError> {
        Ok(format!("raw:{}", signatures.len()))
    }
}

// ==============================================================================
// Filesystem
// ==============================================================================

/// A not-yet-created path under the system temp dir, unique per call.
pub fn temp_path(tag: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time must be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("coinbridge-{tag}-{}-{unique}", std::process::id()))
}
