//! Process supervision
//!
//! Runs the wrapped command while keeping its certificate fresh:
//!
//! 1. Obtain a certificate if the one on disk is missing or expiring
//! 2. Start the child with inherited stdio
//! 3. Race three activities until the first one finishes:
//!    - the child exiting
//!    - the [`RenewalMonitor`] failing to renew or to send SIGHUP
//!    - the [`SignalRelay`] failing to forward a signal
//!
//! The outcome is returned to the caller, which maps it to an exit code.

pub mod renewal;
pub mod signals;

#[cfg(test)]
pub(crate) mod testing;

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::acme::CertificateManager;
use crate::config::WrapperConfig;
use crate::errors::{Fatal, ProcessError};

pub use renewal::RenewalMonitor;
pub use signals::{SignalRelay, RELAYED_SIGNALS};

/// Something signals can be delivered to
pub trait SignalTarget: Send + Sync {
    fn signal(&self, signal: Signal) -> Result<(), ProcessError>;
}

/// Pid of the running child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildHandle {
    pid: Pid,
}

impl ChildHandle {
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    /// Handle for a spawned child that has not been reaped
    pub fn from_child(child: &Child) -> Result<Self, ProcessError> {
        child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(|id| Self::new(Pid::from_raw(id)))
            .ok_or(ProcessError::NoPid)
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }
}

impl SignalTarget for ChildHandle {
    fn signal(&self, signal: Signal) -> Result<(), ProcessError> {
        kill(self.pid, signal).map_err(|source| ProcessError::Signal { signal, source })
    }
}

/// Supervisor for one child process lifetime
pub struct Supervisor {
    manager: CertificateManager,
    command: Vec<String>,
    check_interval: Duration,
}

impl Supervisor {
    pub fn new(config: &WrapperConfig, manager: CertificateManager) -> Self {
        Self {
            manager,
            command: config.command.clone(),
            check_interval: config.check_interval,
        }
    }

    /// Override the renewal check interval
    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Run until the child exits or a fatal condition occurs
    ///
    /// Returns `Ok(())` only when the child exits successfully.
    pub async fn run(self) -> Result<(), Fatal> {
        if self.manager.needs_certificate() {
            info!("Obtaining initial certificate");
            self.manager
                .obtain_certificate()
                .await
                .map_err(Fatal::InitialIssuance)?;
        } else {
            info!("Existing certificate is valid");
        }

        let relay = SignalRelay::install().map_err(Fatal::Signal)?;
        let mut child = spawn(&self.command).map_err(Fatal::ChildStart)?;
        let handle = ChildHandle::from_child(&child).map_err(Fatal::ChildStart)?;

        info!(pid = %handle.pid(), command = ?self.command, "Started child process");

        let monitor = RenewalMonitor::new(self.manager, self.check_interval);

        tokio::select! {
            status = child.wait() => exit_outcome(status),
            fatal = monitor.run(&handle) => Err(fatal),
            fatal = relay.run(&handle) => Err(fatal),
        }
    }
}

fn spawn(command: &[String]) -> Result<Child, ProcessError> {
    let (program, args) = command.split_first().ok_or(ProcessError::EmptyCommand)?;

    Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })
}

fn exit_outcome(status: io::Result<ExitStatus>) -> Result<(), Fatal> {
    match status {
        Ok(status) if status.success() => {
            info!("Child process exited successfully");
            Ok(())
        }
        Ok(status) => {
            warn!(status = %status, "Child process exited abnormally");
            Err(Fatal::ChildExited(status))
        }
        Err(e) => Err(Fatal::ChildWait(ProcessError::Wait(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::testing::{bundle_expiring_in, test_config, RecordingIssuer};
    use crate::dns::ProviderRegistry;
    use tempfile::TempDir;

    async fn supervisor(
        dir: &TempDir,
        issuer: &RecordingIssuer,
        command: &[&str],
    ) -> Supervisor {
        let mut config = test_config(dir);
        config.command = command.iter().map(|s| s.to_string()).collect();
        let manager =
            CertificateManager::initialize_with(&config, issuer, &ProviderRegistry::with_defaults())
                .await
                .unwrap();
        Supervisor::new(&config, manager)
    }

    #[tokio::test]
    async fn test_clean_exit_obtains_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let issuer = RecordingIssuer::default();

        supervisor(&dir, &issuer, &["true"]).await.run().await.unwrap();

        assert_eq!(issuer.issuances(), 1);
    }

    #[tokio::test]
    async fn test_valid_certificate_skips_issuance() {
        let dir = TempDir::new().unwrap();
        let issuer = RecordingIssuer::default();
        let supervisor = supervisor(&dir, &issuer, &["true"]).await;
        supervisor
            .manager
            .storage()
            .save_bundle(&bundle_expiring_in(60))
            .unwrap();

        supervisor.run().await.unwrap();

        assert_eq!(issuer.issuances(), 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_fatal() {
        let dir = TempDir::new().unwrap();
        let issuer = RecordingIssuer::default();

        let fatal = supervisor(&dir, &issuer, &["sh", "-c", "exit 3"])
            .await
            .run()
            .await
            .unwrap_err();

        match fatal {
            Fatal::ChildExited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected outcome: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_death_is_fatal() {
        use std::os::unix::process::ExitStatusExt;

        let dir = TempDir::new().unwrap();
        let issuer = RecordingIssuer::default();

        let fatal = supervisor(&dir, &issuer, &["sh", "-c", "kill -9 $$"])
            .await
            .run()
            .await
            .unwrap_err();

        assert_eq!(fatal.exit_code(), 5);
        match fatal {
            Fatal::ChildExited(status) => assert_eq!(status.signal(), Some(9)),
            other => panic!("unexpected outcome: {other}"),
        }
    }

    #[tokio::test]
    async fn test_initial_issuance_failure_never_starts_child() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("started");
        let issuer = RecordingIssuer {
            fail_issuance: true,
            ..Default::default()
        };
        let script = format!("touch {}", marker.display());

        let fatal = supervisor(&dir, &issuer, &["sh", "-c", &script])
            .await
            .run()
            .await
            .unwrap_err();

        assert!(matches!(fatal, Fatal::InitialIssuance(_)));
        assert_eq!(fatal.exit_code(), 3);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_start() {
        let dir = TempDir::new().unwrap();
        let issuer = RecordingIssuer::default();

        let fatal = supervisor(&dir, &issuer, &["/nonexistent/certwrapper-child"])
            .await
            .run()
            .await
            .unwrap_err();

        assert!(matches!(fatal, Fatal::ChildStart(ProcessError::Spawn { .. })));
        assert_eq!(fatal.exit_code(), 4);
    }

    #[test]
    fn test_spawn_rejects_empty_command() {
        assert!(matches!(spawn(&[]), Err(ProcessError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_child_handle_signals_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let handle = ChildHandle::from_child(&child).unwrap();

        handle.signal(Signal::SIGTERM).unwrap();
        let status = child.wait().await.unwrap();

        assert!(!status.success());
    }
}
