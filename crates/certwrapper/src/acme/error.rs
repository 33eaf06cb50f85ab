//! ACME error types

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::dns::DnsError;

/// Persistence failures for the identity file and certificate artifacts
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed identity file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize identity: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid account key: {0}")]
    InvalidKey(String),

    #[error("failed to generate account key")]
    KeyGeneration,

    #[error("invalid certificate data: {0}")]
    InvalidCertificate(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures talking to the ACME server
#[derive(Debug, Error)]
pub enum AcmeError {
    #[error("ACME request failed: {0}")]
    Protocol(#[from] instant_acme::Error),

    #[error("invalid account credentials: {0}")]
    Credentials(#[source] serde_json::Error),

    #[error("no {wanted} challenge offered for {domain}")]
    NoChallenge { domain: String, wanted: &'static str },

    #[error("{what} became invalid: {detail}")]
    Invalid { what: String, detail: String },

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("certificate request failed: {0}")]
    Csr(#[from] rcgen::Error),

    #[error("account is not registered")]
    NotRegistered,

    #[error("no DNS provider attached")]
    NoDnsProvider,

    #[error("DNS provider failed: {0}")]
    Dns(#[from] DnsError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors surfaced by the certificate lifecycle manager
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("identity error: {0}")]
    Identity(#[source] StorageError),

    #[error("failed to construct ACME client: {0}")]
    ClientConstruction(#[source] AcmeError),

    #[error("DNS provider error: {0}")]
    Provider(#[source] DnsError),

    #[error("registration failed: {0}")]
    Registration(#[source] AcmeError),

    #[error("issuance failed: {0}")]
    Issuance(#[source] AcmeError),
}
