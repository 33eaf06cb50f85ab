//! `httpreq` provider
//!
//! Delegates record management to an HTTP endpoint:
//!
//! ```text
//! POST <endpoint>/present   {"fqdn": "_acme-challenge.example.com.", "value": "..."}
//! POST <endpoint>/cleanup   {"fqdn": "_acme-challenge.example.com.", "value": "..."}
//! ```
//!
//! In `RAW` mode the body is `{"domain", "token", "keyAuth"}` and the
//! endpoint derives the record itself.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::{ChallengeRecord, DnsError, DnsProvider};
use crate::config::{DnsSettings, HttpReqMode};

const PROVIDER: &str = "httpreq";

/// Request timeout for the endpoint
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// DNS provider backed by an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpReqProvider {
    client: reqwest::Client,
    endpoint: String,
    mode: HttpReqMode,
    credentials: Option<(String, Option<String>)>,
}

impl HttpReqProvider {
    /// Build the provider from its settings
    pub fn from_settings(settings: &DnsSettings) -> Result<Self, DnsError> {
        let endpoint = settings
            .httpreq_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(DnsError::Misconfigured {
                provider: PROVIDER,
                setting: "an endpoint",
            })?;

        url::Url::parse(endpoint).map_err(|e| DnsError::InvalidSetting {
            provider: PROVIDER,
            setting: "endpoint",
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| DnsError::Request {
                provider: PROVIDER,
                source,
            })?;

        let credentials = settings
            .httpreq_username
            .clone()
            .filter(|u| !u.is_empty())
            .map(|user| (user, settings.httpreq_password.clone()));

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            mode: settings.httpreq_mode,
            credentials,
        })
    }

    fn body(&self, record: &ChallengeRecord) -> serde_json::Value {
        match self.mode {
            HttpReqMode::Default => json!({
                "fqdn": record.fqdn,
                "value": record.value,
            }),
            HttpReqMode::Raw => json!({
                "domain": record.domain,
                "token": record.token,
                "keyAuth": record.key_authorization,
            }),
        }
    }

    async fn send(&self, action: &str, record: &ChallengeRecord) -> Result<(), DnsError> {
        let url = format!("{}/{}", self.endpoint, action);
        debug!(url = %url, fqdn = %record.fqdn, "Sending httpreq request");

        let mut request = self.client.post(&url).json(&self.body(record));
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_deref());
        }

        let response = request.send().await.map_err(|source| DnsError::Request {
            provider: PROVIDER,
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DnsError::Rejected {
                provider: PROVIDER,
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl DnsProvider for HttpReqProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn present(&self, record: &ChallengeRecord) -> Result<(), DnsError> {
        self.send("present", record).await?;
        info!(fqdn = %record.fqdn, "Presented DNS-01 record");
        Ok(())
    }

    async fn cleanup(&self, record: &ChallengeRecord) -> Result<(), DnsError> {
        self.send("cleanup", record).await?;
        debug!(fqdn = %record.fqdn, "Cleaned up DNS-01 record");
        Ok(())
    }
}
