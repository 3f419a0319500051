//! Key import from the command line.
//!
//! Imported keys are watched as P2WPKH addresses. Spending from them needs
//! an external signer; this binary only plans.

use std::str::FromStr;

use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, CompressedPublicKey, Network, NetworkKind};
use coinbridge_core::spend::{InputSignature, PrivateKey, PublicKey, Signer, SpendPlan};
use coinbridge_core::types::SpendableOutput;
use coinbridge_core::CoreError;

pub struct P2wpkhKeys {
    network: Network,
}

impl P2wpkhKeys {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    /// Public key of a WIF private key, which must be for this network.
    pub fn public_key_for(&self, wif: &PrivateKey) -> Result<PublicKey, CoreError> {
        let key = bitcoin::PrivateKey::from_wif(wif.expose())
            .map_err(|e| CoreError::Validation(format!("invalid WIF private key: {e}")))?;
        if key.network != NetworkKind::from(self.network) {
            return Err(CoreError::Validation(format!(
                "private key is not a {} key",
                self.network
            )));
        }
        Ok(PublicKey(key.public_key(&Secp256k1::signing_only()).to_string()))
    }
}

impl Signer for P2wpkhKeys {
    fn derive_address(&self, public_key: &PublicKey) -> Result<String, CoreError> {
        let key = bitcoin::PublicKey::from_str(&public_key.0)
            .map_err(|e| CoreError::Validation(format!("invalid public key: {e}")))?;
        let compressed = CompressedPublicKey::try_from(key).map_err(|_| {
            CoreError::Validation("P2WPKH addresses need a compressed public key".into())
        })?;
        Ok(Address::p2wpkh(&compressed, self.network).to_string())
    }

    fn sign(
        &self,
        _input_index: usize,
        _private_key: &PrivateKey,
        _previous_output: &SpendableOutput,
    ) -> Result<Vec<u8>, CoreError> {
        Err(CoreError::Signing(
            "coinbridge does not sign; use `plan` and an external signer".into(),
        ))
    }

    fn finalize(
        &self,
        _plan: &SpendPlan,
        _signatures: &[InputSignature],
    ) -> Result<String, CoreError> {
        Err(CoreError::Signing(
            "coinbridge does not sign; use `plan` and an external signer".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Private key 1, compressed, mainnet.
    const WIF_ONE: &str = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn";
    const PUBKEY_ONE: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn wif_derives_its_p2wpkh_address() {
        let keys = P2wpkhKeys::new(Network::Bitcoin);
        let public_key = keys
            .public_key_for(&PrivateKey::new(WIF_ONE))
            .expect("valid key");
        assert_eq!(public_key.0, PUBKEY_ONE);
        assert_eq!(
            keys.derive_address(&public_key).expect("compressed key"),
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        );
    }

    #[test]
    fn key_for_another_network_is_rejected() {
        let keys = P2wpkhKeys::new(Network::Regtest);
        let err = keys
            .public_key_for(&PrivateKey::new(WIF_ONE))
            .expect_err("mainnet key");
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("regtest")));
        assert!(keys.public_key_for(&PrivateKey::new("not-a-wif")).is_err());
    }
}
