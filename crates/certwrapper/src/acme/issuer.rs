//! Issuance capability consumed by the certificate manager

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use pem::{EncodeConfig, LineEnding};

use super::client::{AcmeClient, PollSettings};
use super::error::{AcmeError, StorageError};
use super::identity::{Identity, Registration};
use crate::config::WrapperConfig;
use crate::dns::DnsProvider;

/// Certificate material returned by an issuer
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// Leaf followed by intermediates, PEM
    pub certificate: String,
    /// Private key of the leaf, PEM
    pub private_key: String,
    /// Issuer certificate(s) without the leaf, PEM
    pub issuer_certificate: String,
}

impl CertificateBundle {
    /// Split a downloaded chain into leaf chain and issuer part
    pub fn from_chain(chain: &str, private_key: String) -> Result<Self, StorageError> {
        let blocks = pem::parse_many(chain)
            .map_err(|e| StorageError::InvalidCertificate(format!("failed to parse chain: {e}")))?;

        if blocks.len() < 2 {
            return Err(StorageError::InvalidCertificate(format!(
                "expected leaf and issuer certificates, chain has {} block(s)",
                blocks.len()
            )));
        }

        let config = EncodeConfig::new().set_line_ending(LineEnding::LF);
        Ok(Self {
            certificate: chain.to_string(),
            private_key,
            issuer_certificate: pem::encode_many_config(&blocks[1..], config),
        })
    }

    /// Check that every part is present and PEM encoded
    pub fn validate(&self) -> Result<(), StorageError> {
        for (part, content) in [
            ("certificate", &self.certificate),
            ("private key", &self.private_key),
            ("issuer certificate", &self.issuer_certificate),
        ] {
            if content.trim().is_empty() {
                return Err(StorageError::InvalidCertificate(format!("{part} is empty")));
            }
            pem::parse(content.as_bytes()).map_err(|e| {
                StorageError::InvalidCertificate(format!("{part} is not valid PEM: {e}"))
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("certificate_len", &self.certificate.len())
            .field("issuer_certificate_len", &self.issuer_certificate.len())
            .finish_non_exhaustive()
    }
}

/// Client of an issuance service, bound to one account identity
#[async_trait]
pub trait Issuer: Send + Sync {
    /// Attach the provider used for DNS-01 validation
    fn set_dns_provider(&mut self, provider: Arc<dyn DnsProvider>);

    /// Register the account
    ///
    /// Returns the server handle and the key the account is bound to.
    async fn register(&mut self, email: &str) -> Result<Registration, AcmeError>;

    /// Obtain one bundled certificate covering `domains`
    async fn obtain(&self, domains: &[String]) -> Result<CertificateBundle, AcmeError>;
}

/// Constructs an [`Issuer`] for an identity
#[async_trait]
pub trait IssuerBuilder: Send + Sync {
    async fn build(
        &self,
        identity: &Identity,
        config: &WrapperConfig,
    ) -> Result<Box<dyn Issuer>, AcmeError>;
}

/// Builds [`AcmeClient`] issuers
#[derive(Debug, Clone, Default)]
pub struct AcmeIssuerBuilder {
    poll: PollSettings,
}

impl AcmeIssuerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override validation polling
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }
}

#[async_trait]
impl IssuerBuilder for AcmeIssuerBuilder {
    async fn build(
        &self,
        identity: &Identity,
        config: &WrapperConfig,
    ) -> Result<Box<dyn Issuer>, AcmeError> {
        let mut client = AcmeClient::new(&config.acme_endpoint, config.key_type)
            .with_poll_settings(self.poll)
            .with_propagation_delay(config.dns.propagation_delay);

        if let Some(registration) = &identity.registration {
            let key = identity.key().ok_or_else(|| {
                StorageError::InvalidKey("identity has no account key".to_string())
            })?;
            client = client.restore(key, &registration.uri).await?;
        }

        Ok(Box::new(client))
    }
}
