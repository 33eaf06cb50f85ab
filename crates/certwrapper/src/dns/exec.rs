//! `exec` provider
//!
//! Runs `<program> present <fqdn> <value>` and `<program> cleanup <fqdn> <value>`.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ChallengeRecord, DnsError, DnsProvider};
use crate::config::DnsSettings;

/// DNS provider backed by an external program
#[derive(Debug, Clone)]
pub struct ExecProvider {
    program: PathBuf,
}

impl ExecProvider {
    /// Build the provider from its settings
    pub fn from_settings(settings: &DnsSettings) -> Result<Self, DnsError> {
        let program = settings
            .exec_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(DnsError::Misconfigured {
                provider: "exec",
                setting: "a program path",
            })?;
        Ok(Self { program })
    }

    fn command(&self, action: &str, record: &ChallengeRecord) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(action)
            .arg(&record.fqdn)
            .arg(&record.value)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    async fn run(&self, action: &str, record: &ChallengeRecord) -> Result<(), DnsError> {
        debug!(program = %self.program.display(), action, fqdn = %record.fqdn, "Running DNS hook");

        let output = self
            .command(action, record)
            .output()
            .await
            .map_err(|source| DnsError::Exec {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DnsError::ExecFailed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl DnsProvider for ExecProvider {
    fn name(&self) -> &'static str {
        "exec"
    }

    async fn present(&self, record: &ChallengeRecord) -> Result<(), DnsError> {
        self.run("present", record).await?;
        info!(fqdn = %record.fqdn, "Presented DNS-01 record");
        Ok(())
    }

    async fn cleanup(&self, record: &ChallengeRecord) -> Result<(), DnsError> {
        self.run("cleanup", record).await?;
        debug!(fqdn = %record.fqdn, "Cleaned up DNS-01 record");
        Ok(())
    }
}
