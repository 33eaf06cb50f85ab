//! ACME account key
//!
//! The account key is a P-256 private key. Identity files carry it either as
//! SEC1 `EC PRIVATE KEY` DER or as PKCS#8 DER; both decode to the same
//! [`AccountKey`], which keeps both encodings at hand.

use std::fmt;
use std::sync::Arc;

use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use p256::SecretKey;
use rcgen::{KeyPair, PKCS_ECDSA_P256_SHA256};

use super::error::StorageError;

/// P-256 account key
#[derive(Clone, PartialEq, Eq)]
pub struct AccountKey {
    pkcs8: Arc<[u8]>,
    sec1: Arc<[u8]>,
}

impl AccountKey {
    /// Generate a fresh key
    pub fn generate() -> Result<Self, StorageError> {
        let key_pair =
            KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(|_| StorageError::KeyGeneration)?;
        Self::from_der(&key_pair.serialize_der())
    }

    /// Decode a PKCS#8 or SEC1 DER key, PKCS#8 first
    pub fn from_der(der: &[u8]) -> Result<Self, StorageError> {
        let secret = SecretKey::from_pkcs8_der(der)
            .or_else(|_| SecretKey::from_sec1_der(der))
            .map_err(|e| {
                StorageError::InvalidKey(format!("not a PKCS#8 or SEC1 P-256 key: {e}"))
            })?;

        let pkcs8 = secret
            .to_pkcs8_der()
            .map_err(|e| StorageError::InvalidKey(format!("PKCS#8 encoding failed: {e}")))?;
        let sec1 = secret
            .to_sec1_der()
            .map_err(|e| StorageError::InvalidKey(format!("SEC1 encoding failed: {e}")))?;

        Ok(Self {
            pkcs8: pkcs8.as_bytes().into(),
            sec1: sec1.as_slice().into(),
        })
    }

    /// PKCS#8 DER encoding
    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }

    /// SEC1 `EC PRIVATE KEY` DER encoding
    pub fn sec1_der(&self) -> &[u8] {
        &self.sec1
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey").finish_non_exhaustive()
    }
}
