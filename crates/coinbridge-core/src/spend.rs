//! Spend assembly collaborators.
//!
//! Signing, address derivation and transaction serialization are not done
//! here; they are reached through [`Signer`]. Private keys are looked up
//! through [`KeyCustody`]. This module turns a [`FeePlan`] into signed raw
//! transaction hex by driving those two traits.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use serde::Serialize;

use crate::amount::SatoshiAmount;
use crate::bridge::validate_wallet_name;
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::fee::FeePlan;
use crate::types::SpendableOutput;

// ==============================================================================
// Keys and Signatures
// ==============================================================================

/// A private key in whatever encoding the signer understands (usually WIF).
/// `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSignature {
    pub input_index: usize,
    pub signature: Vec<u8>,
}

// ==============================================================================
// Collaborator Traits
// ==============================================================================

/// Cryptographic operations the bridge relies on but does not implement.
pub trait Signer: Send + Sync {
    fn derive_address(&self, public_key: &PublicKey) -> Result<String, CoreError>;

    /// Sign input `input_index`, which spends `previous_output`.
    fn sign(
        &self,
        input_index: usize,
        private_key: &PrivateKey,
        previous_output: &SpendableOutput,
    ) -> Result<Vec<u8>, CoreError>;

    /// Serialize the signed transaction described by `plan` to raw hex.
    fn finalize(&self, plan: &SpendPlan, signatures: &[InputSignature])
        -> Result<String, CoreError>;
}

/// Storage of wallet private keys. The persisted format belongs to the
/// implementation.
pub trait KeyCustody: Send + Sync {
    fn lookup_private_key(
        &self,
        wallet_name: &str,
        address: &str,
    ) -> Result<Option<PrivateKey>, CoreError>;

    fn store_new_key(
        &self,
        wallet_name: &str,
        key: &PrivateKey,
        address: &str,
    ) -> Result<(), CoreError>;
}

/// Process-local key store keyed by `(wallet, address)`.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<(String, String), PrivateKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyCustody for MemoryKeyStore {
    fn lookup_private_key(
        &self,
        wallet_name: &str,
        address: &str,
    ) -> Result<Option<PrivateKey>, CoreError> {
        let keys = self
            .keys
            .read()
            .map_err(|_| CoreError::KeyCustody("key store lock poisoned".into()))?;
        Ok(keys
            .get(&(wallet_name.to_owned(), address.to_owned()))
            .cloned())
    }

    fn store_new_key(
        &self,
        wallet_name: &str,
        key: &PrivateKey,
        address: &str,
    ) -> Result<(), CoreError> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| CoreError::KeyCustody("key store lock poisoned".into()))?;
        keys.insert((wallet_name.to_owned(), address.to_owned()), key.clone());
        Ok(())
    }
}

/// Keys persisted under a data directory, one `<wallet>.keys.json` file
/// (address to key) per wallet. Every store rewrites the wallet's file.
pub struct FileKeyStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `None` when no wallet data path is configured.
    pub fn from_config(config: &BridgeConfig) -> Option<Self> {
        config.wallet_data_path.as_ref().map(|dir| Self::new(dir.clone()))
    }

    fn wallet_file(&self, wallet_name: &str) -> Result<PathBuf, CoreError> {
        validate_wallet_name(wallet_name)?;
        Ok(self.dir.join(format!("{wallet_name}.keys.json")))
    }

    fn load(&self, wallet_name: &str) -> Result<BTreeMap<String, String>, CoreError> {
        let path = self.wallet_file(wallet_name)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                CoreError::KeyCustody(format!("corrupt key file {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(CoreError::Io(e)),
        }
    }
}

impl KeyCustody for FileKeyStore {
    fn lookup_private_key(
        &self,
        wallet_name: &str,
        address: &str,
    ) -> Result<Option<PrivateKey>, CoreError> {
        Ok(self.load(wallet_name)?.remove(address).map(PrivateKey))
    }

    fn store_new_key(
        &self,
        wallet_name: &str,
        key: &PrivateKey,
        address: &str,
    ) -> Result<(), CoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| CoreError::KeyCustody("key store lock poisoned".into()))?;
        let mut keys = self.load(wallet_name)?;
        keys.insert(address.to_owned(), key.expose().to_owned());

        let path = self.wallet_file(wallet_name)?;
        let content = serde_json::to_string_pretty(&keys)
            .map_err(|e| CoreError::KeyCustody(format!("serialize keys: {e}")))?;
        std::fs::create_dir_all(&self.dir)?;
        // Write then rename so a crash never leaves a truncated key file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

// ==============================================================================
// Spend Plan
// ==============================================================================

/// A funded spend from one wallet, ready to be signed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendPlan {
    pub wallet: String,
    pub change_address: String,
    #[serde(flatten)]
    pub fee_plan: FeePlan,
}

impl SpendPlan {
    /// Outputs in transaction order: payments, then change if any.
    pub fn outputs(&self) -> Vec<(String, SatoshiAmount)> {
        let mut outputs: Vec<(String, SatoshiAmount)> = self
            .fee_plan
            .payments
            .iter()
            .map(|p| (p.address.clone(), p.amount))
            .collect();
        if self.fee_plan.has_change() {
            outputs.push((self.change_address.clone(), self.fee_plan.change));
        }
        outputs
    }
}

/// What a send produced. Running out of funds is an answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SpendOutcome {
    Broadcast { txid: String, plan: SpendPlan },
    InsufficientFunds,
}

/// Sign every input of `plan` and serialize the result.
pub fn sign_plan(
    plan: &SpendPlan,
    signer: &dyn Signer,
    keys: &dyn KeyCustody,
) -> Result<String, CoreError> {
    let mut signatures = Vec::with_capacity(plan.fee_plan.inputs.len());
    for (input_index, input) in plan.fee_plan.inputs.iter().enumerate() {
        let key = keys
            .lookup_private_key(&plan.wallet, &input.address)?
            .ok_or_else(|| {
                CoreError::KeyCustody(format!(
                    "no private key for address {} in wallet `{}`",
                    input.address, plan.wallet
                ))
            })?;
        let signature = signer.sign(input_index, &key, input)?;
        signatures.push(InputSignature {
            input_index,
            signature,
        });
    }
    signer.finalize(plan, &signatures)
}
