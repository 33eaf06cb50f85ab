//! Certificate lifecycle manager
//!
//! Owns the identity, the issuer and the artifact paths for one set of
//! domains. Construction walks the identity through
//! `empty -> keyed -> registered`; afterwards the manager only answers
//! whether a certificate is needed and obtains one on request.

use std::time::Duration;

use tracing::{debug, info};

use super::error::{AcmeError, LifecycleError};
use super::identity::{Identity, IdentityStore};
use super::issuer::{AcmeIssuerBuilder, Issuer, IssuerBuilder};
use super::storage::CertificateStorage;
use crate::config::WrapperConfig;
use crate::dns::ProviderRegistry;

/// Keeps one certificate fresh
pub struct CertificateManager {
    identity: Identity,
    issuer: Box<dyn Issuer>,
    storage: CertificateStorage,
    domains: Vec<String>,
    renewal_window: Duration,
}

impl CertificateManager {
    /// Build a manager using the ACME issuer and built-in DNS providers
    pub async fn initialize(config: &WrapperConfig) -> Result<Self, LifecycleError> {
        Self::initialize_with(
            config,
            &AcmeIssuerBuilder::new(),
            &ProviderRegistry::with_defaults(),
        )
        .await
    }

    /// Build a manager with an alternate issuer and provider registry
    ///
    /// Steps, each aborting construction on failure:
    /// 1. Load the identity
    /// 2. Generate an account key if there is none
    /// 3. Resolve the DNS provider
    /// 4. Construct the issuer and attach the provider
    /// 5. Register the account unless a registration is already stored
    pub async fn initialize_with(
        config: &WrapperConfig,
        builder: &dyn IssuerBuilder,
        registry: &ProviderRegistry,
    ) -> Result<Self, LifecycleError> {
        let store = IdentityStore::new(&config.identity_path);
        let mut identity = store.load().map_err(LifecycleError::Identity)?;
        store
            .ensure_key(&mut identity, &config.email)
            .map_err(LifecycleError::Identity)?;

        let provider = registry
            .resolve(&config.dns_provider, &config.dns)
            .map_err(LifecycleError::Provider)?;

        let mut issuer = builder
            .build(&identity, config)
            .await
            .map_err(LifecycleError::ClientConstruction)?;
        issuer.set_dns_provider(provider);

        if identity.is_registered() {
            debug!(email = %identity.email, "Using existing ACME registration");
        } else {
            let registration = issuer
                .register(&identity.email)
                .await
                .map_err(LifecycleError::Registration)?;
            store
                .record_registration(&mut identity, registration)
                .map_err(LifecycleError::Identity)?;
        }

        info!(
            email = %identity.email,
            domains = ?config.domains,
            endpoint = %config.acme_endpoint,
            "Certificate manager ready"
        );

        Ok(Self {
            identity,
            issuer,
            storage: CertificateStorage::new(
                &config.certificate_path,
                &config.private_key_path,
                &config.issuer_path,
            ),
            domains: config.domains.clone(),
            renewal_window: config.renewal_window,
        })
    }

    /// Whether the certificate on disk is missing, unreadable or expiring
    pub fn needs_certificate(&self) -> bool {
        self.storage.needs_renewal(self.renewal_window)
    }

    /// Obtain a certificate and replace the files on disk
    ///
    /// Not retried; the caller decides what a failure means.
    pub async fn obtain_certificate(&self) -> Result<(), LifecycleError> {
        let bundle = self
            .issuer
            .obtain(&self.domains)
            .await
            .map_err(LifecycleError::Issuance)?;

        self.storage
            .save_bundle(&bundle)
            .map_err(|e| LifecycleError::Issuance(AcmeError::Storage(e)))?;

        info!(domains = ?self.domains, "Certificate updated");
        Ok(())
    }

    /// The registered identity
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Artifact storage
    pub fn storage(&self) -> &CertificateStorage {
        &self.storage
    }
}

impl std::fmt::Debug for CertificateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateManager")
            .field("identity", &self.identity)
            .field("storage", &self.storage)
            .field("domains", &self.domains)
            .finish_non_exhaustive()
    }
}
