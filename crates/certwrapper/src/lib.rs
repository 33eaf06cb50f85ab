//! certwrapper library
//!
//! Supervises a single child process while keeping a TLS certificate for it
//! fresh through an ACME issuance service.
//!
//! The library provides:
//!
//! - **Identity**: the persisted ACME account key and registration handle
//! - **Certificate lifecycle**: expiry-driven renewal decisions and issuance
//! - **DNS-01 providers**: pluggable backends selected by name
//! - **Supervision**: child start, signal relay, exit propagation and the
//!   periodic renewal monitor
//!
//! # Example
//!
//! ```ignore
//! use certwrapper::{CertificateManager, Supervisor, WrapperConfig};
//!
//! let config = WrapperConfig::default();
//! let manager = CertificateManager::initialize(&config).await?;
//! Supervisor::new(&config, manager).run().await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod config;
pub mod dns;
pub mod errors;
pub mod preflight;
pub mod supervisor;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Certificate lifecycle
pub use acme::{
    AcmeClient, CertificateBundle, CertificateManager, CertificateStorage, Identity,
    IdentityStore, Issuer, IssuerBuilder, Registration, RegistrationHandle,
};

// Configuration
pub use config::{DnsSettings, KeyType, WrapperConfig};

// DNS-01 providers
pub use dns::{DnsProvider, ProviderRegistry};

// Errors and exit codes
pub use errors::Fatal;

// Supervision
pub use supervisor::{ChildHandle, Supervisor};
