//! certwrapper - Main entry point
//!
//! Obtains a certificate, runs the wrapped command and keeps the certificate
//! fresh until the command exits.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use certwrapper::config::{parse_domains, DEFAULT_PROPAGATION_DELAY};
use certwrapper::errors::ConfigError;
use certwrapper::{preflight, CertificateManager, DnsSettings, Fatal, Supervisor, WrapperConfig};

/// certwrapper - run a command with an automatically renewed certificate
#[derive(Parser, Debug)]
#[command(name = "certwrapper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Type of private key to use when generating a certificate (P256, P384, RSA2048, RSA3072, RSA4096)
    #[arg(long, env = "CERTWRAPPER_KEY_TYPE", default_value = "P384")]
    key_type: String,

    /// ACME directory to request certificates from
    #[arg(
        long,
        env = "CERTWRAPPER_ACME_ENDPOINT",
        default_value = certwrapper::config::LETS_ENCRYPT_PRODUCTION
    )]
    acme_endpoint: String,

    /// DNS provider answering the DNS-01 challenge (httpreq, exec)
    #[arg(long, env = "CERTWRAPPER_DNS_PROVIDER", default_value = "")]
    dns_provider: String,

    /// Path to save user registration data
    #[arg(long, env = "CERTWRAPPER_USER_PATH", default_value = "cert/user.json")]
    user_path: PathBuf,

    /// Path to save the private key
    #[arg(long, env = "CERTWRAPPER_PRIVATE_KEY_PATH", default_value = "cert/privatekey.pem")]
    private_key_path: PathBuf,

    /// Path to save the certificate
    #[arg(long, env = "CERTWRAPPER_CERTIFICATE_PATH", default_value = "cert/certificate.pem")]
    certificate_path: PathBuf,

    /// Path to save the issuer's certificate
    #[arg(long, env = "CERTWRAPPER_ISSUER_PATH", default_value = "cert/issuer.pem")]
    issuer_path: PathBuf,

    /// E-mail address to supply to the ACME server
    #[arg(long, env = "CERTWRAPPER_ACME_EMAIL", default_value = "")]
    acme_email: String,

    /// Comma-separated list of domains to request on the certificate
    #[arg(long, env = "CERTWRAPPER_DOMAINS", default_value = "")]
    domains: String,

    /// Wait after publishing challenge records (e.g. 30s, 2m)
    #[arg(long, env = "CERTWRAPPER_DNS_PROPAGATION_DELAY", value_parser = parse_duration)]
    dns_propagation_delay: Option<Duration>,

    /// Base URL of the httpreq endpoint
    #[arg(long, env = "CERTWRAPPER_HTTPREQ_ENDPOINT")]
    httpreq_endpoint: Option<String>,

    /// Body layout sent to the httpreq endpoint (DEFAULT, RAW)
    #[arg(long, env = "CERTWRAPPER_HTTPREQ_MODE", default_value = "")]
    httpreq_mode: String,

    /// Basic auth user for the httpreq endpoint
    #[arg(long, env = "CERTWRAPPER_HTTPREQ_USERNAME")]
    httpreq_username: Option<String>,

    /// Basic auth password for the httpreq endpoint
    #[arg(long, env = "CERTWRAPPER_HTTPREQ_PASSWORD", hide_env_values = true)]
    httpreq_password: Option<String>,

    /// Program run by the exec provider
    #[arg(long, env = "CERTWRAPPER_EXEC_PATH")]
    exec_path: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long, env = "CERTWRAPPER_VERBOSE")]
    verbose: bool,

    /// Log output format
    #[arg(long, env = "CERTWRAPPER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Command to run, followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn into_config(self) -> Result<WrapperConfig, ConfigError> {
        let defaults = WrapperConfig::default();
        Ok(WrapperConfig {
            key_type: self.key_type.parse()?,
            acme_endpoint: self.acme_endpoint,
            dns_provider: self.dns_provider.trim().to_string(),
            dns: DnsSettings {
                httpreq_endpoint: self.httpreq_endpoint,
                httpreq_mode: self.httpreq_mode.parse()?,
                httpreq_username: self.httpreq_username,
                httpreq_password: self.httpreq_password,
                exec_path: self.exec_path,
                propagation_delay: self
                    .dns_propagation_delay
                    .unwrap_or(DEFAULT_PROPAGATION_DELAY),
            },
            identity_path: self.user_path,
            private_key_path: self.private_key_path,
            certificate_path: self.certificate_path,
            issuer_path: self.issuer_path,
            email: self.acme_email.trim().to_string(),
            domains: parse_domains(&self.domains),
            command: self.command,
            ..defaults
        })
    }
}

/// Parse `90`, `90s`, `5m`, `2h` or `1d`
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{raw}'"))?;
    let multiplier = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        other => return Err(format!("unknown duration unit '{other}'")),
    };
    Ok(Duration::from_secs(value.saturating_mul(multiplier)))
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: WrapperConfig) -> Result<(), Fatal> {
    config.validate()?;
    preflight::check_writable(config.output_paths())?;

    info!(
        domains = ?config.domains,
        provider = %config.dns_provider,
        key_type = %config.key_type,
        "Starting certwrapper"
    );

    let manager = CertificateManager::initialize(&config)
        .await
        .map_err(Fatal::Construction)?;

    Supervisor::new(&config, manager).run().await
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    init_logging(cli.verbose, cli.log_format);

    let outcome = match cli.into_config() {
        Ok(config) => run(config).await,
        Err(e) => Err(Fatal::Config(e)),
    };

    if let Err(fatal) = outcome {
        error!(exit_code = fatal.exit_code(), "{fatal}");
        process::exit(fatal.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwrapper::KeyType;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("certwrapper").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--dns-provider", "exec", "--", "nginx"])
            .into_config()
            .unwrap();

        assert_eq!(config.key_type, KeyType::P384);
        assert_eq!(config.identity_path, PathBuf::from("cert/user.json"));
        assert_eq!(config.issuer_path, PathBuf::from("cert/issuer.pem"));
        assert_eq!(config.dns.propagation_delay, DEFAULT_PROPAGATION_DELAY);
        assert_eq!(config.command, vec!["nginx".to_string()]);
    }

    #[test]
    fn test_trailing_command_keeps_its_flags() {
        let cli = parse(&[
            "--domains",
            "example.com, www.example.com",
            "--acme-email",
            "admin@example.com",
            "nginx",
            "-g",
            "daemon off;",
        ]);
        let config = cli.into_config().unwrap();

        assert_eq!(config.domains, vec!["example.com", "www.example.com"]);
        assert_eq!(config.command, vec!["nginx", "-g", "daemon off;"]);
    }

    #[test]
    fn test_invalid_key_type_is_config_error() {
        let err = parse(&["--key-type", "RSA8192", "true"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedKeyType(_)));
        assert_eq!(Fatal::Config(err).exit_code(), 1);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert!(parse_duration("10 parsecs").is_err());
        assert!(parse_duration("s").is_err());
    }
}
