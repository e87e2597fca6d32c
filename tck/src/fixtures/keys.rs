//! Key material for fixture accounts.
//!
//! Keys travel as DER-encoded hex strings, the form the control protocol
//! expects in `key` fields and signer lists.

use std::fmt;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::error::{Result, TckError};
use crate::orchestrator::TestRng;
use crate::rpc::request::{GenerateKeyParams, KeyType};
use crate::rpc::{OperationRequest, ProtocolClient};

/// PKCS#8 prefix of an Ed25519 private key.
pub const ED25519_PRIVATE_DER_PREFIX: &str = "302e020100300506032b657004220420";
/// SPKI prefix of an Ed25519 public key.
pub const ED25519_PUBLIC_DER_PREFIX: &str = "302a300506032b6570032100";
/// PKCS#8 prefix of a secp256k1 private key.
pub const SECP256K1_PRIVATE_DER_PREFIX: &str = "3030020100300706052b8104000a04220420";
/// SPKI prefix of a compressed secp256k1 public key.
pub const SECP256K1_PUBLIC_DER_PREFIX: &str = "302d300706052b8104000a032200";

/// Signature scheme of a key pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// Ed25519
    #[default]
    Ed25519,
    /// ECDSA over secp256k1
    EcdsaSecp256k1,
}

impl KeyScheme {
    /// `generateKey` type producing a private key of this scheme.
    pub fn private_key_type(self) -> KeyType {
        match self {
            Self::Ed25519 => KeyType::Ed25519Private,
            Self::EcdsaSecp256k1 => KeyType::EcdsaSecp256k1Private,
        }
    }
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519 => write!(f, "ed25519"),
            Self::EcdsaSecp256k1 => write!(f, "ecdsa_secp256k1"),
        }
    }
}

/// Key parsing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Not hex
    #[error("key is not valid hex: {0}")]
    Hex(String),
    /// DER prefix matches neither scheme
    #[error("unrecognized private key encoding")]
    UnknownEncoding,
    /// Right prefix, unusable key bytes
    #[error("invalid {scheme} key bytes")]
    InvalidKey {
        /// Scheme the prefix announced
        scheme: KeyScheme,
    },
}

/// An immutable key pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    /// Signature scheme
    pub scheme: KeyScheme,
    /// DER-hex private key
    pub private_der: String,
    /// DER-hex public key
    pub public_der: String,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("scheme", &self.scheme)
            .field("public_der", &self.public_der)
            .finish_non_exhaustive()
    }
}

fn secp256k1_secret(bytes: &[u8]) -> std::result::Result<k256::SecretKey, KeyError> {
    k256::SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidKey {
        scheme: KeyScheme::EcdsaSecp256k1,
    })
}

impl KeyMaterial {
    /// Key pair from raw 32-byte secret material.
    pub fn from_secret_bytes(
        scheme: KeyScheme,
        secret: &[u8; 32],
    ) -> std::result::Result<Self, KeyError> {
        let public_der = match scheme {
            KeyScheme::Ed25519 => {
                let signing = ed25519_dalek::SigningKey::from_bytes(secret);
                format!(
                    "{}{}",
                    ED25519_PUBLIC_DER_PREFIX,
                    hex::encode(signing.verifying_key().to_bytes())
                )
            }
            KeyScheme::EcdsaSecp256k1 => {
                let public = secp256k1_secret(secret)?.public_key();
                format!(
                    "{}{}",
                    SECP256K1_PUBLIC_DER_PREFIX,
                    hex::encode(public.to_encoded_point(true).as_bytes())
                )
            }
        };

        let private_prefix = match scheme {
            KeyScheme::Ed25519 => ED25519_PRIVATE_DER_PREFIX,
            KeyScheme::EcdsaSecp256k1 => SECP256K1_PRIVATE_DER_PREFIX,
        };

        Ok(Self {
            scheme,
            private_der: format!("{}{}", private_prefix, hex::encode(secret)),
            public_der,
        })
    }

    /// Fresh key pair drawn from `rng`.
    pub fn generate(scheme: KeyScheme, rng: &TestRng) -> Self {
        loop {
            // Rejects only the zero scalar or values >= n for secp256k1.
            if let Ok(key) = Self::from_secret_bytes(scheme, &rng.secret_bytes()) {
                return key;
            }
        }
    }

    /// Parse a DER-hex private key.
    pub fn from_private_der(der_hex: &str) -> std::result::Result<Self, KeyError> {
        let normalized = der_hex.trim().trim_start_matches("0x").to_ascii_lowercase();
        let (scheme, secret_hex) =
            if let Some(rest) = normalized.strip_prefix(ED25519_PRIVATE_DER_PREFIX) {
                (KeyScheme::Ed25519, rest)
            } else if let Some(rest) = normalized.strip_prefix(SECP256K1_PRIVATE_DER_PREFIX) {
                (KeyScheme::EcdsaSecp256k1, rest)
            } else {
                return Err(KeyError::UnknownEncoding);
            };

        let bytes = hex::decode(secret_hex).map_err(|e| KeyError::Hex(e.to_string()))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidKey { scheme })?;
        Self::from_secret_bytes(scheme, &secret)
    }

    /// EVM address derived from a secp256k1 public key, as `0x`-less hex.
    ///
    /// Ed25519 keys have no EVM address.
    pub fn evm_address(&self) -> Option<String> {
        if self.scheme != KeyScheme::EcdsaSecp256k1 {
            return None;
        }
        let secret_hex = self.private_der.strip_prefix(SECP256K1_PRIVATE_DER_PREFIX)?;
        let secret = hex::decode(secret_hex).ok()?;
        let public = secp256k1_secret(&secret).ok()?.public_key();
        let uncompressed = public.to_encoded_point(false);
        let digest = Keccak256::digest(&uncompressed.as_bytes()[1..]);
        Some(hex::encode(&digest[12..]))
    }
}

/// Ask the SUT to generate a private key and parse it locally.
pub async fn generate_remote(client: &ProtocolClient, scheme: KeyScheme) -> Result<KeyMaterial> {
    let request = OperationRequest::GenerateKey(GenerateKeyParams {
        key_type: scheme.private_key_type(),
    });
    let result = client
        .submit(&request)
        .await
        .into_result()
        .map_err(|failure| TckError::fixture("generateKey", failure))?;

    let der = result
        .key()
        .ok_or_else(|| TckError::Other(anyhow::anyhow!("generateKey returned no key")))?;
    let key = KeyMaterial::from_private_der(der)
        .map_err(|e| TckError::Other(anyhow::anyhow!("generateKey returned unusable key: {}", e)))?;

    if key.scheme != scheme {
        return Err(TckError::Other(anyhow::anyhow!(
            "generateKey returned a {} key, asked for {}",
            key.scheme,
            scheme
        )));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scheme_is_ed25519() {
        assert_eq!(KeyScheme::default(), KeyScheme::Ed25519);
        let spec = crate::conformance::AccountSpec::default();
        assert_eq!(spec.key, KeyScheme::Ed25519);
        assert_eq!(spec.balance, 0);
    }

    #[test]
    fn test_ed25519_der_roundtrip() {
        let rng = TestRng::with_seed(1);
        let key = KeyMaterial::generate(KeyScheme::Ed25519, &rng);
        assert!(key.private_der.starts_with(ED25519_PRIVATE_DER_PREFIX));
        assert_eq!(key.private_der.len(), ED25519_PRIVATE_DER_PREFIX.len() + 64);
        assert_eq!(key.public_der.len(), ED25519_PUBLIC_DER_PREFIX.len() + 64);

        let parsed = KeyMaterial::from_private_der(&key.private_der).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(key.evm_address(), None);
    }

    #[test]
    fn test_secp256k1_public_key_compressed() {
        let rng = TestRng::with_seed(2);
        let key = KeyMaterial::generate(KeyScheme::EcdsaSecp256k1, &rng);
        let point = key.public_der.strip_prefix(SECP256K1_PUBLIC_DER_PREFIX).unwrap();
        assert_eq!(point.len(), 66);
        assert!(point.starts_with("02") || point.starts_with("03"));
    }

    #[test]
    fn test_known_evm_address() {
        // Private key 1 maps to the well-known generator address.
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = KeyMaterial::from_secret_bytes(KeyScheme::EcdsaSecp256k1, &secret).unwrap();
        assert_eq!(
            key.evm_address().as_deref(),
            Some("7e5f4552091a69125d5dfcb7b8c2659029395bdf")
        );
    }

    #[test]
    fn test_invalid_encodings() {
        assert_eq!(
            KeyMaterial::from_private_der("deadbeef"),
            Err(KeyError::UnknownEncoding)
        );
        let short = format!("{}00", ED25519_PRIVATE_DER_PREFIX);
        assert_eq!(
            KeyMaterial::from_private_der(&short),
            Err(KeyError::InvalidKey {
                scheme: KeyScheme::Ed25519
            })
        );
        let zero = format!("{}{}", SECP256K1_PRIVATE_DER_PREFIX, "00".repeat(32));
        assert!(KeyMaterial::from_private_der(&zero).is_err());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let key = KeyMaterial::generate(KeyScheme::Ed25519, &TestRng::with_seed(3));
        assert!(!format!("{:?}", key).contains(&key.private_der));
    }
}
