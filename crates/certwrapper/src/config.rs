//! Immutable runtime configuration.
//!
//! Built once in `main` from command-line flags and passed by reference to
//! every component. Nothing below `main` reads the environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rcgen::{KeyPair, RsaKeySize};

use crate::errors::ConfigError;

/// Let's Encrypt production directory
pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory (for testing)
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Default renewal check interval (24 hours)
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Renew when the certificate expires within this window (30 days)
pub const DEFAULT_RENEWAL_WINDOW: Duration = Duration::from_secs(30 * 86400);

/// Default wait between presenting DNS records and answering challenges
pub const DEFAULT_PROPAGATION_DELAY: Duration = Duration::from_secs(10);

/// Key type used for the certificate's own private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    /// ECDSA on NIST P-256
    P256,
    /// ECDSA on NIST P-384
    #[default]
    P384,
    /// RSA, 2048 bit modulus
    Rsa2048,
    /// RSA, 3072 bit modulus
    Rsa3072,
    /// RSA, 4096 bit modulus
    Rsa4096,
}

impl KeyType {
    /// rcgen signature algorithm generating keys of this type
    pub fn signature_algorithm(self) -> &'static rcgen::SignatureAlgorithm {
        match self {
            KeyType::P256 => &rcgen::PKCS_ECDSA_P256_SHA256,
            KeyType::P384 => &rcgen::PKCS_ECDSA_P384_SHA384,
            KeyType::Rsa2048 | KeyType::Rsa3072 | KeyType::Rsa4096 => &rcgen::PKCS_RSA_SHA256,
        }
    }

    /// Generate a fresh certificate key of this type
    pub fn generate_key(self) -> Result<KeyPair, rcgen::Error> {
        let rsa_size = match self {
            KeyType::P256 | KeyType::P384 => {
                return KeyPair::generate_for(self.signature_algorithm())
            }
            KeyType::Rsa2048 => RsaKeySize::_2048,
            KeyType::Rsa3072 => RsaKeySize::_3072,
            KeyType::Rsa4096 => RsaKeySize::_4096,
        };
        KeyPair::generate_rsa_for(self.signature_algorithm(), rsa_size)
    }
}

impl FromStr for KeyType {
    type Err = ConfigError;

    /// Accepts the names used by lego: `P256`, `P384`, `2048`, `3072`, `4096`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P256" | "EC256" => Ok(KeyType::P256),
            "P384" | "EC384" => Ok(KeyType::P384),
            "RSA2048" | "2048" => Ok(KeyType::Rsa2048),
            "RSA3072" | "3072" => Ok(KeyType::Rsa3072),
            "RSA4096" | "4096" => Ok(KeyType::Rsa4096),
            other => Err(ConfigError::UnsupportedKeyType(other.to_string())),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::P256 => "P256",
            KeyType::P384 => "P384",
            KeyType::Rsa2048 => "RSA2048",
            KeyType::Rsa3072 => "RSA3072",
            KeyType::Rsa4096 => "RSA4096",
        };
        f.write_str(name)
    }
}

/// Request body layout used by the `httpreq` provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpReqMode {
    /// `{"fqdn": ..., "value": ...}`
    #[default]
    Default,
    /// `{"domain": ..., "token": ..., "keyAuth": ...}`
    Raw,
}

impl FromStr for HttpReqMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "DEFAULT" => Ok(HttpReqMode::Default),
            "RAW" => Ok(HttpReqMode::Raw),
            other => Err(ConfigError::Invalid {
                setting: "httpreq-mode",
                reason: format!("unknown mode '{other}'"),
            }),
        }
    }
}

/// Settings consumed by the built-in DNS providers.
#[derive(Debug, Clone, Default)]
pub struct DnsSettings {
    /// Base URL of the `httpreq` endpoint
    pub httpreq_endpoint: Option<String>,
    /// Body layout for `httpreq`
    pub httpreq_mode: HttpReqMode,
    /// Basic auth user for `httpreq`
    pub httpreq_username: Option<String>,
    /// Basic auth password for `httpreq`
    pub httpreq_password: Option<String>,
    /// Program run by the `exec` provider
    pub exec_path: Option<PathBuf>,
    /// Wait between presenting records and asking the CA to validate
    pub propagation_delay: Duration,
}

/// Complete configuration of one supervisor run.
#[derive(Debug, Clone)]
pub struct WrapperConfig {
    /// Key type for the issued certificate
    pub key_type: KeyType,
    /// ACME directory URL
    pub acme_endpoint: String,
    /// Name of the DNS-01 provider
    pub dns_provider: String,
    /// Provider settings
    pub dns: DnsSettings,
    /// Persisted account identity
    pub identity_path: PathBuf,
    /// Certificate private key output
    pub private_key_path: PathBuf,
    /// Certificate chain output
    pub certificate_path: PathBuf,
    /// Issuer certificate output
    pub issuer_path: PathBuf,
    /// Contact address registered with the CA
    pub email: String,
    /// Domains requested on the certificate
    pub domains: Vec<String>,
    /// Interval between renewal checks
    pub check_interval: Duration,
    /// Renew when expiring within this window
    pub renewal_window: Duration,
    /// Wrapped command and its arguments
    pub command: Vec<String>,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            key_type: KeyType::default(),
            acme_endpoint: LETS_ENCRYPT_PRODUCTION.to_string(),
            dns_provider: String::new(),
            dns: DnsSettings {
                propagation_delay: DEFAULT_PROPAGATION_DELAY,
                ..Default::default()
            },
            identity_path: PathBuf::from("cert/user.json"),
            private_key_path: PathBuf::from("cert/privatekey.pem"),
            certificate_path: PathBuf::from("cert/certificate.pem"),
            issuer_path: PathBuf::from("cert/issuer.pem"),
            email: String::new(),
            domains: Vec::new(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            renewal_window: DEFAULT_RENEWAL_WINDOW,
            command: Vec::new(),
        }
    }
}

impl WrapperConfig {
    /// Check that every required setting is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dns_provider.trim().is_empty() {
            return Err(ConfigError::Missing("DNS provider"));
        }
        if self.domains.is_empty() {
            return Err(ConfigError::Missing("domains"));
        }
        if self.email.trim().is_empty() {
            return Err(ConfigError::Missing("ACME e-mail address"));
        }
        if self.command.is_empty() {
            return Err(ConfigError::Missing("command to run"));
        }
        if self.check_interval.is_zero() {
            return Err(ConfigError::Invalid {
                setting: "check-interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        url::Url::parse(&self.acme_endpoint).map_err(|e| ConfigError::Invalid {
            setting: "acme-endpoint",
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// The four files this run writes to.
    pub fn output_paths(&self) -> [&PathBuf; 4] {
        [
            &self.identity_path,
            &self.private_key_path,
            &self.certificate_path,
            &self.issuer_path,
        ]
    }
}

/// Split a comma-separated domain list, dropping blanks.
pub fn parse_domains(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> WrapperConfig {
        WrapperConfig {
            dns_provider: "httpreq".to_string(),
            email: "a@example.com".to_string(),
            domains: vec!["example.com".to_string()],
            command: vec!["true".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_key_type_parsing() {
        assert_eq!("P256".parse::<KeyType>().unwrap(), KeyType::P256);
        assert_eq!("ec384".parse::<KeyType>().unwrap(), KeyType::P384);
        assert!(matches!(
            "ED25519".parse::<KeyType>(),
            Err(ConfigError::UnsupportedKeyType(_))
        ));
    }

    #[test]
    fn test_rsa_key_type_parsing() {
        for (raw, expected) in [
            ("RSA2048", KeyType::Rsa2048),
            ("2048", KeyType::Rsa2048),
            ("rsa3072", KeyType::Rsa3072),
            ("3072", KeyType::Rsa3072),
            ("RSA4096", KeyType::Rsa4096),
            ("4096", KeyType::Rsa4096),
        ] {
            let parsed = raw.parse::<KeyType>().unwrap();
            assert_eq!(parsed, expected, "{raw}");
            assert_eq!(parsed.to_string().parse::<KeyType>().unwrap(), expected);
            assert_eq!(parsed.signature_algorithm(), &rcgen::PKCS_RSA_SHA256);
        }

        let err = "RSA8192".parse::<KeyType>().unwrap_err();
        assert!(err.to_string().contains("RSA4096"));
    }

    #[test]
    fn test_generated_keys_match_key_type() {
        for key_type in [KeyType::P256, KeyType::Rsa2048] {
            let key_pair = key_type.generate_key().unwrap();
            assert!(key_pair.is_compatible(key_type.signature_algorithm()));

            let csr = rcgen::CertificateParams::new(vec!["example.com".to_string()])
                .unwrap()
                .serialize_request(&key_pair);
            assert!(csr.is_ok(), "{key_type}");
        }
    }

    #[test]
    fn test_default_key_type_is_p384() {
        assert_eq!(KeyType::default(), KeyType::P384);
        assert_eq!(KeyType::default().to_string(), "P384");
    }

    #[test]
    fn test_httpreq_mode_parsing() {
        assert_eq!("".parse::<HttpReqMode>().unwrap(), HttpReqMode::Default);
        assert_eq!("raw".parse::<HttpReqMode>().unwrap(), HttpReqMode::Raw);
        assert!("json".parse::<HttpReqMode>().is_err());
    }

    #[test]
    fn test_parse_domains() {
        assert_eq!(
            parse_domains("example.com, www.example.com,,"),
            vec!["example.com".to_string(), "www.example.com".to_string()]
        );
        assert!(parse_domains("").is_empty());
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_settings() {
        let mut config = valid_config();
        config.dns_provider.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("DNS provider"))));

        let mut config = valid_config();
        config.domains.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("domains"))));

        let mut config = valid_config();
        config.email = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.command.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_check_interval() {
        let mut config = valid_config();
        config.check_interval = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { setting: "check-interval", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut config = valid_config();
        config.acme_endpoint = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { setting: "acme-endpoint", .. })
        ));
    }
}
