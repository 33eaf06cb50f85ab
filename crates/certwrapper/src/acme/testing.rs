//! Test fixtures: certificates with chosen validity and an in-memory issuer

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rcgen::{CertificateParams, KeyPair};
use serde_json::json;
use tempfile::TempDir;
use time::OffsetDateTime;

use super::error::{AcmeError, StorageError};
use super::identity::{Identity, Registration, RegistrationHandle};
use super::key::AccountKey;
use super::issuer::{CertificateBundle, Issuer, IssuerBuilder};
use crate::config::{DnsSettings, WrapperConfig};
use crate::dns::DnsProvider;

/// Configuration writing under `dir/cert`, using the `exec` provider with `true`
pub(crate) fn test_config(dir: &TempDir) -> WrapperConfig {
    let path = |name: &str| dir.path().join("cert").join(name);
    WrapperConfig {
        dns_provider: "exec".to_string(),
        dns: DnsSettings {
            exec_path: Some("true".into()),
            ..Default::default()
        },
        identity_path: path("user.json"),
        private_key_path: path("privatekey.pem"),
        certificate_path: path("certificate.pem"),
        issuer_path: path("issuer.pem"),
        email: "admin@example.com".to_string(),
        domains: vec!["example.com".to_string()],
        command: vec!["true".to_string()],
        ..Default::default()
    }
}

fn self_signed(days: i64) -> (String, KeyPair) {
    let key_pair = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec!["example.com".to_string()]).unwrap();
    params.not_after = OffsetDateTime::now_utc() + time::Duration::days(days);
    params.not_before = params.not_after - time::Duration::days(90);
    let cert = params.self_signed(&key_pair).unwrap();
    (cert.pem(), key_pair)
}

/// PEM certificate whose `notAfter` is `days` from now
pub(crate) fn self_signed_pem(days: i64) -> String {
    self_signed(days).0
}

/// A complete bundle whose leaf expires `days` from now
pub(crate) fn bundle_expiring_in(days: i64) -> CertificateBundle {
    let (leaf, key_pair) = self_signed(days);
    let issuer = self_signed_pem(3650);
    CertificateBundle {
        certificate: format!("{leaf}{issuer}"),
        private_key: key_pair.serialize_pem(),
        issuer_certificate: issuer,
    }
}

/// In-memory issuer counting calls
///
/// Doubles as its own [`IssuerBuilder`]; every built issuer shares the
/// counters of the issuer it was built from.
#[derive(Debug, Clone)]
pub(crate) struct RecordingIssuer {
    pub registrations: Arc<AtomicUsize>,
    pub issuances: Arc<AtomicUsize>,
    pub provider: Arc<Mutex<Option<&'static str>>>,
    pub built_registered: Arc<Mutex<Option<bool>>>,
    pub registered_key: Arc<Mutex<Option<AccountKey>>>,
    pub validity_days: i64,
    pub fail_build: bool,
    pub fail_registration: bool,
    pub fail_issuance: bool,
}

impl Default for RecordingIssuer {
    fn default() -> Self {
        Self {
            registrations: Arc::default(),
            issuances: Arc::default(),
            provider: Arc::default(),
            built_registered: Arc::default(),
            registered_key: Arc::default(),
            validity_days: 90,
            fail_build: false,
            fail_registration: false,
            fail_issuance: false,
        }
    }
}

impl RecordingIssuer {
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn issuances(&self) -> usize {
        self.issuances.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Issuer for RecordingIssuer {
    fn set_dns_provider(&mut self, provider: Arc<dyn DnsProvider>) {
        *self.provider.lock().unwrap() = Some(provider.name());
    }

    async fn register(&mut self, email: &str) -> Result<Registration, AcmeError> {
        if self.fail_registration {
            return Err(AcmeError::Invalid {
                what: "account".to_string(),
                detail: "urn:ietf:params:acme:error:invalidContact".to_string(),
            });
        }
        let n = self.registrations.fetch_add(1, Ordering::SeqCst) + 1;
        let key = AccountKey::generate()?;
        *self.registered_key.lock().unwrap() = Some(key.clone());
        Ok(Registration {
            handle: RegistrationHandle {
                body: json!({"status": "valid", "contact": [format!("mailto:{email}")]}),
                uri: format!("https://ca.test/acct/{n}"),
            },
            key,
        })
    }

    async fn obtain(&self, _domains: &[String]) -> Result<CertificateBundle, AcmeError> {
        if self.fail_issuance {
            return Err(AcmeError::Timeout(
                std::time::Duration::from_secs(120),
                "authorization".to_string(),
            ));
        }
        self.issuances.fetch_add(1, Ordering::SeqCst);
        Ok(bundle_expiring_in(self.validity_days))
    }
}

#[async_trait]
impl IssuerBuilder for RecordingIssuer {
    async fn build(
        &self,
        identity: &Identity,
        _config: &WrapperConfig,
    ) -> Result<Box<dyn Issuer>, AcmeError> {
        if self.fail_build {
            return Err(AcmeError::Storage(StorageError::InvalidKey(
                "identity has no account key".to_string(),
            )));
        }
        *self.built_registered.lock().unwrap() = Some(identity.is_registered());
        Ok(Box::new(self.clone()))
    }
}
