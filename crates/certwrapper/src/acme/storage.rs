//! Certificate artifact storage
//!
//! Owns the three PEM files handed to the wrapped application and answers
//! the renewal question from whatever is on disk.
//!
//! # Files
//!
//! ```text
//! cert/
//! ├── certificate.pem   # Certificate chain (leaf + intermediates)
//! ├── privatekey.pem    # Certificate private key
//! └── issuer.pem        # Issuer certificate(s) without the leaf
//! ```
//!
//! All files are written with 0600 permissions. A bundle is staged to
//! temporary files next to its destinations and only renamed into place once
//! all three are staged. If one of the renames fails, the files already
//! replaced get their previous content back, so a failed write never leaves
//! a mixed bundle.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use super::error::StorageError;
use super::issuer::CertificateBundle;

/// Certificate storage manager
#[derive(Debug, Clone)]
pub struct CertificateStorage {
    certificate_path: PathBuf,
    private_key_path: PathBuf,
    issuer_path: PathBuf,
}

impl CertificateStorage {
    /// Create storage for the given artifact paths
    pub fn new(
        certificate_path: impl Into<PathBuf>,
        private_key_path: impl Into<PathBuf>,
        issuer_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            certificate_path: certificate_path.into(),
            private_key_path: private_key_path.into(),
            issuer_path: issuer_path.into(),
        }
    }

    /// Path of the certificate chain
    pub fn certificate_path(&self) -> &Path {
        &self.certificate_path
    }

    /// Path of the certificate private key
    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    /// Path of the issuer certificate
    pub fn issuer_path(&self) -> &Path {
        &self.issuer_path
    }

    /// Read the `notAfter` of the leaf certificate on disk
    pub fn load_expiry(&self) -> Result<DateTime<Utc>, StorageError> {
        let content = fs::read(&self.certificate_path)
            .map_err(|e| StorageError::io(&self.certificate_path, e))?;
        certificate_expiry(&content)
    }

    /// Check if the certificate needs renewal
    ///
    /// Returns `true` if:
    /// - The certificate file is missing, unreadable or not a valid certificate
    /// - The certificate expires before `now + window`
    pub fn needs_renewal(&self, window: Duration) -> bool {
        let expires = match self.load_expiry() {
            Ok(expires) => expires,
            Err(e) => {
                debug!(
                    path = %self.certificate_path.display(),
                    error = %e,
                    "No usable certificate on disk, needs issuance"
                );
                return true;
            }
        };

        let now = Utc::now();
        let needs_renewal = expires_within(expires, now, window);

        if needs_renewal {
            info!(
                expires = %expires,
                window_days = window.as_secs() / 86400,
                "Certificate needs renewal"
            );
        } else {
            trace!(expires = %expires, "Certificate is still valid");
        }

        needs_renewal
    }

    /// Write a freshly issued bundle
    ///
    /// Every part is staged before any destination is replaced. A failed
    /// rename restores the destinations replaced before it.
    pub fn save_bundle(&self, bundle: &CertificateBundle) -> Result<(), StorageError> {
        bundle.validate()?;
        let expires = certificate_expiry(bundle.certificate.as_bytes())?;

        let targets = [&self.certificate_path, &self.private_key_path, &self.issuer_path];
        let previous = targets.map(|path| snapshot(path));

        let staged = [
            stage(&self.certificate_path, bundle.certificate.as_bytes())?,
            stage(&self.private_key_path, bundle.private_key.as_bytes())?,
            stage(&self.issuer_path, bundle.issuer_certificate.as_bytes())?,
        ];

        for (index, file) in staged.into_iter().enumerate() {
            if let Err(e) = commit(file, targets[index]) {
                for (path, content) in targets.iter().zip(&previous).take(index) {
                    restore(path, content.as_deref());
                }
                return Err(e);
            }
        }

        info!(
            certificate = %self.certificate_path.display(),
            expires = %expires,
            "Saved certificate bundle"
        );

        Ok(())
    }
}

/// Whether `not_after` falls before `now + window`
///
/// The threshold itself is exclusive: a certificate expiring exactly at
/// `now + window` does not need renewal yet.
pub fn expires_within(not_after: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    let Ok(window) = chrono::Duration::from_std(window) else {
        return true;
    };
    match now.checked_add_signed(window) {
        Some(threshold) => not_after < threshold,
        None => true,
    }
}

/// Parse the first PEM certificate in `pem_data` and return its `notAfter`
pub fn certificate_expiry(pem_data: &[u8]) -> Result<DateTime<Utc>, StorageError> {
    let block = pem::parse(pem_data)
        .map_err(|e| StorageError::InvalidCertificate(format!("failed to parse PEM: {e}")))?;

    if block.tag() != "CERTIFICATE" {
        return Err(StorageError::InvalidCertificate(format!(
            "expected CERTIFICATE block, found {}",
            block.tag()
        )));
    }

    let (_, cert) = x509_parser::parse_x509_certificate(block.contents())
        .map_err(|e| StorageError::InvalidCertificate(format!("invalid X509 certificate: {e}")))?;

    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| StorageError::InvalidCertificate(format!("notAfter out of range: {timestamp}")))
}

/// Atomically replace `path` with `contents`, owner read/write only
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let staged = stage(path, contents)?;
    commit(staged, path)
}

fn stage(path: &Path, contents: &[u8]) -> Result<NamedTempFile, StorageError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

    // NamedTempFile is created with 0600 on Unix
    let mut file = tempfile::Builder::new()
        .prefix(".certwrapper")
        .tempfile_in(&dir)
        .map_err(|e| StorageError::io(&dir, e))?;

    file.write_all(contents)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| StorageError::io(file.path(), e))?;

    trace!(path = %path.display(), bytes = contents.len(), "Staged file");
    Ok(file)
}

/// Current content of `path` if it is a readable regular file
fn snapshot(path: &Path) -> Option<Vec<u8>> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => fs::read(path).ok(),
        _ => None,
    }
}

/// Put back the content `path` had before a failed bundle write
fn restore(path: &Path, previous: Option<&[u8]>) {
    let restored = match previous {
        Some(content) => write_private(path, content),
        None => fs::remove_file(path).map_err(|e| StorageError::io(path, e)),
    };

    match restored {
        Ok(()) => debug!(path = %path.display(), "Rolled back partial bundle write"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to roll back bundle file"),
    }
}

fn commit(file: NamedTempFile, path: &Path) -> Result<(), StorageError> {
    file.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| StorageError::io(path, e))?;
    }

    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn not_needed_beyond_window(extra_secs in 1i64..(365 * 86400)) {
            let now = Utc::now();
            let not_after = now + chrono::Duration::days(30) + chrono::Duration::seconds(extra_secs);
            prop_assert!(!expires_within(not_after, now, Duration::from_secs(30 * 86400)));
        }

        #[test]
        fn needed_at_or_before_window(early_secs in 1i64..(365 * 86400)) {
            let now = Utc::now();
            let not_after = now + chrono::Duration::days(30) - chrono::Duration::seconds(early_secs);
            prop_assert!(expires_within(not_after, now, Duration::from_secs(30 * 86400)));
        }
    }
}
