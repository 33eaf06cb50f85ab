//! ACME account identity persistence
//!
//! The identity is the long-lived account key plus the registration handle
//! returned by the CA. It is stored as a small JSON document:
//!
//! ```json
//! {
//!   "email": "admin@example.com",
//!   "registration": { "body": { "status": "valid" }, "uri": "https://ca/acct/1" },
//!   "key": "<base64 SEC1 DER of the P-256 account key>"
//! }
//! ```
//!
//! The key is written as SEC1 `EC PRIVATE KEY` DER; PKCS#8 DER is accepted
//! on load as well. It is never regenerated while a registration exists
//! for it. Registering adopts the key the account was created with.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::error::StorageError;
use super::key::AccountKey;
use super::storage::write_private;

/// Opaque registration handle issued by the CA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationHandle {
    /// Account object returned by the server
    #[serde(default)]
    pub body: serde_json::Value,
    /// Account URL, used as the JWS key id
    pub uri: String,
}

/// A completed registration and the key the account is bound to
#[derive(Debug, Clone)]
pub struct Registration {
    pub handle: RegistrationHandle,
    pub key: AccountKey,
}

/// ACME account identity
#[derive(Debug, Clone, Default)]
pub struct Identity {
    /// Contact address registered with the CA
    pub email: String,
    /// Present once the account has been registered
    pub registration: Option<RegistrationHandle>,
    key: Option<AccountKey>,
}

impl Identity {
    /// The live account key, if one has been generated
    pub fn key(&self) -> Option<&AccountKey> {
        self.key.as_ref()
    }

    /// Whether the CA has issued a registration for this identity
    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }
}

/// On-disk layout of [`Identity`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct IdentityRecord {
    #[serde(default)]
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    registration: Option<RegistrationHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

/// Loads and persists the account identity
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Create a store backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the identity file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored identity
    ///
    /// A missing or empty file yields an empty identity. Malformed JSON or an
    /// undecodable key is an error.
    pub fn load(&self) -> Result<Identity, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %self.path.display(), "No stored ACME identity found");
                return Ok(Identity::default());
            }
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            trace!(path = %self.path.display(), "Stored ACME identity is empty");
            return Ok(Identity::default());
        }

        let record: IdentityRecord =
            serde_json::from_str(&content).map_err(|source| StorageError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        let key = match record.key {
            Some(encoded) => {
                let der = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| StorageError::InvalidKey(format!("invalid base64: {e}")))?;
                Some(AccountKey::from_der(&der)?)
            }
            None => None,
        };

        debug!(
            email = %record.email,
            registered = record.registration.is_some(),
            has_key = key.is_some(),
            "Loaded ACME identity"
        );

        Ok(Identity {
            email: record.email,
            registration: record.registration,
            key,
        })
    }

    /// Persist the identity with owner-only permissions
    pub fn save(&self, identity: &Identity) -> Result<(), StorageError> {
        let record = IdentityRecord {
            email: identity.email.clone(),
            registration: identity.registration.clone(),
            key: identity.key.as_ref().map(|k| STANDARD.encode(k.sec1_der())),
        };
        let content = serde_json::to_vec_pretty(&record)?;
        write_private(&self.path, &content)?;

        debug!(path = %self.path.display(), "Saved ACME identity");
        Ok(())
    }

    /// Generate and persist an account key if the identity has none
    ///
    /// Returns `true` when a key was generated. An identity that already has
    /// a key is left untouched.
    pub fn ensure_key(&self, identity: &mut Identity, email: &str) -> Result<bool, StorageError> {
        if identity.key.is_some() {
            if identity.email != email {
                warn!(
                    stored = %identity.email,
                    configured = %email,
                    "Configured e-mail differs from the registered account, keeping stored value"
                );
            }
            return Ok(false);
        }

        let key = AccountKey::generate()?;

        if identity.registration.is_some() {
            warn!("Discarding registration stored without its account key");
        }

        *identity = Identity {
            email: email.to_string(),
            registration: None,
            key: Some(key),
        };
        self.save(identity)?;

        info!(email = %email, "Generated new ACME account key");
        Ok(true)
    }

    /// Store a registration if none is recorded yet
    ///
    /// The identity takes over the registration's key together with its
    /// handle. Returns `true` when the registration was stored.
    pub fn record_registration(
        &self,
        identity: &mut Identity,
        registration: Registration,
    ) -> Result<bool, StorageError> {
        if identity.registration.is_some() {
            return Ok(false);
        }

        if identity.key.as_ref() != Some(&registration.key) {
            debug!(account = %registration.handle.uri, "Adopting key of the new registration");
        }
        info!(account = %registration.handle.uri, "Recorded ACME registration");
        identity.registration = Some(registration.handle);
        identity.key = Some(registration.key);
        self.save(identity)?;
        Ok(true)
    }
}
