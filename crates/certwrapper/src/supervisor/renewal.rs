//! Periodic certificate renewal monitor
//!
//! Checks the certificate on a fixed interval and, when it needs renewal,
//! obtains a new one and sends SIGHUP to the child.

use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::SignalTarget;
use crate::acme::CertificateManager;
use crate::errors::{ConfigError, Fatal};

/// Background renewal monitor
///
/// Owns the certificate manager for the lifetime of the child. Ticks are
/// handled one at a time, so checks never overlap.
pub struct RenewalMonitor {
    /// Manager deciding on and performing renewal
    manager: CertificateManager,
    /// Check interval
    check_interval: Duration,
}

impl RenewalMonitor {
    /// Create a monitor checking every `check_interval`
    pub fn new(manager: CertificateManager, check_interval: Duration) -> Self {
        Self {
            manager,
            check_interval,
        }
    }

    /// Run until a renewal or the reload signal fails
    ///
    /// The first check happens one full interval after start. A zero
    /// interval is rejected as a configuration error.
    pub async fn run(self, target: &dyn SignalTarget) -> Fatal {
        if self.check_interval.is_zero() {
            return Fatal::Config(ConfigError::Invalid {
                setting: "check-interval",
                reason: "must be greater than zero".to_string(),
            });
        }

        info!(
            check_interval_secs = self.check_interval.as_secs(),
            "Starting certificate renewal monitor"
        );

        let mut ticker = interval_at(Instant::now() + self.check_interval, self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            debug!("Running scheduled certificate check");

            if let Err(fatal) = self.check(target).await {
                return fatal;
            }
        }
    }

    /// One renewal check
    ///
    /// Returns `true` when a certificate was obtained and the child signalled.
    pub async fn check(&self, target: &dyn SignalTarget) -> Result<bool, Fatal> {
        if !self.manager.needs_certificate() {
            debug!("Certificate is still valid");
            return Ok(false);
        }

        info!("Certificate needs renewal");
        self.manager
            .obtain_certificate()
            .await
            .map_err(Fatal::Renewal)?;

        target.signal(Signal::SIGHUP).map_err(Fatal::Signal)?;
        info!("Sent SIGHUP to child after certificate renewal");

        Ok(true)
    }
}
