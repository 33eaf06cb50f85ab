//! ACME certificate lifecycle
//!
//! Keeps one certificate for a fixed set of domains fresh via DNS-01
//! validation against Let's Encrypt or a compatible CA.
//!
//! # Architecture
//!
//! - [`IdentityStore`] - Persists the account key and registration handle
//! - [`CertificateStorage`] - Expiry inspection and all-or-nothing bundle writes
//! - [`Issuer`] - Capability used to register and obtain certificates
//! - [`AcmeClient`] - [`Issuer`] over an `instant-acme` account
//! - [`CertificateManager`] - Ties the above together and decides when to issue
//!
//! # Issuance Flow
//!
//! 1. [`CertificateManager::initialize`] loads the identity, generates a key on
//!    first run and registers the account once
//! 2. [`CertificateManager::needs_certificate`] compares the on-disk `notAfter`
//!    against the renewal window
//! 3. [`CertificateManager::obtain_certificate`] asks the issuer for a bundle
//! 4. The issuer publishes `_acme-challenge` TXT records through the
//!    configured [`DnsProvider`](crate::dns::DnsProvider), answers the
//!    challenges and finalizes the order with a fresh certificate key
//! 5. [`CertificateStorage`] replaces the three PEM files

mod client;
mod error;
mod identity;
mod issuer;
mod key;
mod manager;
mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{AcmeClient, PollSettings};
pub use error::{AcmeError, LifecycleError, StorageError};
pub use identity::{Identity, IdentityStore, Registration, RegistrationHandle};
pub use issuer::{AcmeIssuerBuilder, CertificateBundle, Issuer, IssuerBuilder};
pub use key::AccountKey;
pub use manager::CertificateManager;
pub use storage::{certificate_expiry, expires_within, CertificateStorage};
