//! DNS-01 challenge providers
//!
//! A provider publishes and removes the `_acme-challenge` TXT records that
//! prove control of a domain. Providers are selected by name from a
//! [`ProviderRegistry`] and configured only from [`DnsSettings`].
//!
//! # Providers
//!
//! - [`HttpReqProvider`] (`httpreq`) - POSTs records to an HTTP endpoint
//! - [`ExecProvider`] (`exec`) - Runs an external program

mod exec;
mod httpreq;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::DnsSettings;

pub use exec::ExecProvider;
pub use httpreq::HttpReqProvider;

/// Errors from DNS providers and provider selection
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("unknown DNS provider '{name}' (available: {available})")]
    UnknownProvider { name: String, available: String },

    #[error("DNS provider {provider} requires {setting}")]
    Misconfigured {
        provider: &'static str,
        setting: &'static str,
    },

    #[error("invalid {setting} for DNS provider {provider}: {reason}")]
    InvalidSetting {
        provider: &'static str,
        setting: &'static str,
        reason: String,
    },

    #[error("{provider} request failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} endpoint returned {status}: {body}")]
    Rejected {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to run {}: {source}", program.display())]
    Exec {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} exited with {status}: {stderr}", program.display())]
    ExecFailed {
        program: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
}

/// One TXT record proving control of a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    /// Identifier being validated
    pub domain: String,
    /// Fully qualified record name, with trailing dot
    pub fqdn: String,
    /// TXT record content
    pub value: String,
    /// Challenge token issued by the CA
    pub token: String,
    /// `token.thumbprint`
    pub key_authorization: String,
}

impl ChallengeRecord {
    /// Record for a challenge token, its key authorization and the digest
    /// of the key authorization published as TXT content
    pub fn new(
        domain: &str,
        token: &str,
        key_authorization: &str,
        value: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            fqdn: dns_record_name(domain),
            value: value.into(),
            token: token.to_string(),
            key_authorization: key_authorization.to_string(),
        }
    }
}

/// Fully qualified TXT record name validating `domain`
///
/// Wildcard identifiers are validated on their base domain.
pub fn dns_record_name(domain: &str) -> String {
    let base = domain.trim_start_matches("*.").trim_end_matches('.');
    format!("_acme-challenge.{base}.")
}

/// Backend able to publish DNS-01 records
#[async_trait]
pub trait DnsProvider: Send + Sync + fmt::Debug {
    /// Registry name of the provider
    fn name(&self) -> &'static str;

    /// Publish the TXT record
    async fn present(&self, record: &ChallengeRecord) -> Result<(), DnsError>;

    /// Remove the TXT record
    async fn cleanup(&self, record: &ChallengeRecord) -> Result<(), DnsError>;
}

/// Constructor for a named provider
pub type ProviderFactory = fn(&DnsSettings) -> Result<Arc<dyn DnsProvider>, DnsError>;

/// Maps provider names to constructors
///
/// Lookups are case-insensitive.
#[derive(Clone)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in providers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("httpreq", |settings| {
            Ok(Arc::new(HttpReqProvider::from_settings(settings)?))
        });
        registry.register("exec", |settings| {
            Ok(Arc::new(ExecProvider::from_settings(settings)?))
        });
        registry
    }

    /// Add or replace a provider
    pub fn register(&mut self, name: &str, factory: ProviderFactory) {
        self.factories.insert(name.to_ascii_lowercase(), factory);
    }

    /// Registered provider names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct the provider registered under `name`
    pub fn resolve(
        &self,
        name: &str,
        settings: &DnsSettings,
    ) -> Result<Arc<dyn DnsProvider>, DnsError> {
        let key = name.trim().to_ascii_lowercase();
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| DnsError::UnknownProvider {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })?;

        let provider = factory(settings)?;
        debug!(provider = provider.name(), "Resolved DNS provider");
        Ok(provider)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
