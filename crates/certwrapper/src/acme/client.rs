//! ACME issuer backed by `instant-acme`
//!
//! `instant-acme` speaks the protocol; this module binds it to the stored
//! identity, publishes DNS-01 records through the attached
//! [`DnsProvider`] and builds the certificate key and CSR.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus,
};
use rcgen::CertificateParams;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::error::{AcmeError, StorageError};
use super::identity::{Registration, RegistrationHandle};
use super::issuer::{CertificateBundle, Issuer};
use super::key::AccountKey;
use crate::config::KeyType;
use crate::dns::{ChallengeRecord, DnsProvider};

const DNS_01: &str = "dns-01";

/// Polling behaviour while waiting on the CA
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Delay between status requests
    pub interval: Duration,
    /// Give up after waiting this long for one state change
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
        }
    }
}

/// ACME client for one directory
///
/// Holds an account once one is restored or registered.
pub struct AcmeClient {
    directory_url: String,
    account: Option<Account>,
    key_type: KeyType,
    dns: Option<Arc<dyn DnsProvider>>,
    poll: PollSettings,
    propagation_delay: Duration,
}

impl AcmeClient {
    /// Client for the directory at `directory_url`, without an account
    pub fn new(directory_url: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            directory_url: directory_url.into(),
            account: None,
            key_type,
            dns: None,
            poll: PollSettings::default(),
            propagation_delay: Duration::ZERO,
        }
    }

    /// Restore the registered account `account_url` owned by `key`
    pub async fn restore(mut self, key: &AccountKey, account_url: &str) -> Result<Self, AcmeError> {
        let credentials = account_credentials(&self.directory_url, key, account_url)?;
        let account = Account::from_credentials(credentials).await?;

        debug!(account = %account.id(), directory = %self.directory_url, "Restored ACME account");
        self.account = Some(account);
        Ok(self)
    }

    /// Override polling behaviour
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Wait this long after presenting records before answering challenges
    pub fn with_propagation_delay(mut self, delay: Duration) -> Self {
        self.propagation_delay = delay;
        self
    }

    /// Account URL once restored or registered
    pub fn account_url(&self) -> Option<&str> {
        self.account.as_ref().map(Account::id)
    }

    /// Present records and answer every pending authorization of `order`
    ///
    /// Presented records are appended to `presented` even on failure so the
    /// caller can clean them up.
    async fn authorize(
        &self,
        order: &mut Order,
        provider: &dyn DnsProvider,
        presented: &mut Vec<ChallengeRecord>,
    ) -> Result<(), AcmeError> {
        let authorizations = order.authorizations().await?;
        let mut pending = Vec::new();

        for authorization in &authorizations {
            let domain = identifier_name(&authorization.identifier);

            match authorization.status {
                AuthorizationStatus::Valid => {
                    debug!(domain = %domain, "Authorization already valid");
                    continue;
                }
                AuthorizationStatus::Pending => {}
                ref other => {
                    return Err(AcmeError::Invalid {
                        what: format!("authorization for {domain}"),
                        detail: format!("status {other:?}"),
                    })
                }
            }

            let challenge = authorization
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Dns01)
                .ok_or_else(|| AcmeError::NoChallenge {
                    domain: domain.clone(),
                    wanted: DNS_01,
                })?;

            let key_authorization = order.key_authorization(challenge);
            let record = ChallengeRecord::new(
                &domain,
                &challenge.token,
                key_authorization.as_str(),
                key_authorization.dns_value(),
            );
            provider.present(&record).await?;
            presented.push(record);

            pending.push((challenge.url.clone(), domain));
        }

        if pending.is_empty() {
            return Ok(());
        }

        if !self.propagation_delay.is_zero() {
            debug!(
                delay_secs = self.propagation_delay.as_secs(),
                "Waiting for DNS propagation"
            );
            sleep(self.propagation_delay).await;
        }

        for (challenge_url, domain) in &pending {
            order.set_challenge_ready(challenge_url).await?;
            debug!(domain = %domain, "Answered DNS-01 challenge");
        }

        self.wait_ready(order).await?;
        for (_, domain) in &pending {
            info!(domain = %domain, "Domain validated");
        }
        Ok(())
    }

    /// Poll until the CA has validated every authorization of `order`
    async fn wait_ready(&self, order: &mut Order) -> Result<(), AcmeError> {
        let deadline = Instant::now() + self.poll.timeout;
        loop {
            let state = order.refresh().await?;
            match state.status {
                OrderStatus::Ready | OrderStatus::Valid => return Ok(()),
                OrderStatus::Invalid => {
                    let detail = state
                        .error
                        .as_ref()
                        .map(|problem| format!("{problem:?}"))
                        .unwrap_or_else(|| "status Invalid".to_string());
                    return Err(AcmeError::Invalid {
                        what: "order".to_string(),
                        detail,
                    });
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(AcmeError::Timeout(
                    self.poll.timeout,
                    "domain validation".to_string(),
                ));
            }
            sleep(self.poll.interval).await;
        }
    }

    /// Poll until the finalized order offers its certificate chain
    async fn wait_certificate(&self, order: &mut Order) -> Result<String, AcmeError> {
        let deadline = Instant::now() + self.poll.timeout;
        loop {
            if let Some(chain) = order.certificate().await? {
                return Ok(chain);
            }

            if Instant::now() >= deadline {
                return Err(AcmeError::Timeout(
                    self.poll.timeout,
                    "certificate issuance".to_string(),
                ));
            }
            sleep(self.poll.interval).await;
        }
    }
}

impl fmt::Debug for AcmeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcmeClient")
            .field("directory_url", &self.directory_url)
            .field("account", &self.account_url())
            .field("key_type", &self.key_type)
            .field("dns", &self.dns)
            .field("poll", &self.poll)
            .field("propagation_delay", &self.propagation_delay)
            .finish()
    }
}

#[async_trait]
impl Issuer for AcmeClient {
    fn set_dns_provider(&mut self, provider: Arc<dyn DnsProvider>) {
        self.dns = Some(provider);
    }

    async fn register(&mut self, email: &str) -> Result<Registration, AcmeError> {
        let contact = format!("mailto:{email}");
        let contacts = [contact.as_str()];
        let new_account = NewAccount {
            contact: &contacts,
            terms_of_service_agreed: true,
            only_return_existing: false,
        };

        let (account, credentials) =
            Account::create(&new_account, &self.directory_url, None).await?;
        let key = credentials_key(&credentials)?;
        let handle = RegistrationHandle {
            body: json!({
                "status": "valid",
                "contact": [contact],
                "termsOfServiceAgreed": true,
            }),
            uri: account.id().to_string(),
        };

        info!(account = %handle.uri, email = %email, "Registered ACME account");
        self.account = Some(account);

        Ok(Registration { handle, key })
    }

    async fn obtain(&self, domains: &[String]) -> Result<CertificateBundle, AcmeError> {
        let account = self.account.as_ref().ok_or(AcmeError::NotRegistered)?;
        let provider = self.dns.as_ref().ok_or(AcmeError::NoDnsProvider)?;

        info!(domains = ?domains, "Requesting certificate");

        let identifiers: Vec<Identifier> = domains.iter().cloned().map(Identifier::Dns).collect();
        let mut order = account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await?;

        debug!(status = ?order.state().status, "Created ACME order");

        let mut presented = Vec::new();
        let validation = self
            .authorize(&mut order, provider.as_ref(), &mut presented)
            .await;

        for record in &presented {
            if let Err(e) = provider.cleanup(record).await {
                warn!(fqdn = %record.fqdn, error = %e, "Failed to clean up DNS-01 record");
            }
        }
        validation?;

        let key_pair = self.key_type.generate_key()?;
        let csr = CertificateParams::new(domains.to_vec())?.serialize_request(&key_pair)?;

        if order.state().status != OrderStatus::Valid {
            order.finalize(csr.der()).await?;
            debug!(key_type = %self.key_type, "Finalized order");
        }

        let chain = self.wait_certificate(&mut order).await?;
        let bundle = CertificateBundle::from_chain(&chain, key_pair.serialize_pem())?;

        info!(domains = ?domains, "Certificate issued");
        Ok(bundle)
    }
}

/// `instant-acme` credentials for a stored account
pub(crate) fn account_credentials(
    directory_url: &str,
    key: &AccountKey,
    account_url: &str,
) -> Result<AccountCredentials, AcmeError> {
    serde_json::from_value(json!({
        "id": account_url,
        "key_pkcs8": URL_SAFE_NO_PAD.encode(key.pkcs8_der()),
        "directory": directory_url,
    }))
    .map_err(AcmeError::Credentials)
}

/// Account key carried by `instant-acme` credentials
pub(crate) fn credentials_key(credentials: &AccountCredentials) -> Result<AccountKey, AcmeError> {
    let value = serde_json::to_value(credentials).map_err(AcmeError::Credentials)?;
    let encoded = value
        .get("key_pkcs8")
        .and_then(Value::as_str)
        .ok_or_else(|| StorageError::InvalidKey("credentials carry no key".to_string()))?;

    let der = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(encoded))
        .map_err(|e| StorageError::InvalidKey(format!("invalid base64: {e}")))?;
    Ok(AccountKey::from_der(&der)?)
}

#[allow(unreachable_patterns)]
fn identifier_name(identifier: &Identifier) -> String {
    match identifier {
        Identifier::Dns(name) => name.clone(),
        other => format!("{other:?}"),
    }
}
