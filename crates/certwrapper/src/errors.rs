//! Error types shared across the supervisor.
//!
//! Module-specific errors live next to their modules (`acme::error`,
//! `dns::DnsError`). This module holds configuration and process errors and
//! the [`Fatal`] classification that maps every terminal condition to its own
//! process exit code.

use std::path::PathBuf;
use std::process::ExitStatus;

use nix::sys::signal::Signal;
use thiserror::Error;

use crate::acme::LifecycleError;

/// Invalid or incomplete configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),

    #[error("invalid {setting}: {reason}")]
    Invalid { setting: &'static str, reason: String },

    #[error("unsupported key type '{0}' (supported: P256, P384, RSA2048, RSA3072, RSA4096)")]
    UnsupportedKeyType(String),
}

/// Failures interacting with the wrapped child process
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no command to run")]
    EmptyCommand,

    #[error("child process has no pid")]
    NoPid,

    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed to send {signal} to child process: {source}")]
    Signal {
        signal: Signal,
        #[source]
        source: nix::Error,
    },

    #[error("failed to install handler for {signal}: {source}")]
    SignalHandler {
        signal: Signal,
        #[source]
        source: std::io::Error,
    },

    #[error("signal stream for {0} closed")]
    SignalStreamClosed(Signal),
}

/// A condition that ends the supervisor.
///
/// Each variant is a distinct failure class with its own exit code so an
/// operator or orchestrator can tell them apart.
#[derive(Debug, Error)]
pub enum Fatal {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create certificate manager: {0}")]
    Construction(#[source] LifecycleError),

    #[error("failed to obtain certificate: {0}")]
    InitialIssuance(#[source] LifecycleError),

    #[error("failed to run application: {0}")]
    ChildStart(#[source] ProcessError),

    #[error("application failed: {0}")]
    ChildExited(ExitStatus),

    #[error("application failed: {0}")]
    ChildWait(#[source] ProcessError),

    #[error("failed to renew certificate: {0}")]
    Renewal(#[source] LifecycleError),

    #[error("failed to signal child process: {0}")]
    Signal(#[source] ProcessError),

    #[error("insufficient permissions to write to path: {}", .0.display())]
    Permissions(PathBuf),
}

impl Fatal {
    /// Process exit code for this failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            Fatal::Config(_) => 1,
            Fatal::Construction(_) => 2,
            Fatal::InitialIssuance(_) => 3,
            Fatal::ChildStart(_) => 4,
            Fatal::ChildExited(_) | Fatal::ChildWait(_) => 5,
            Fatal::Renewal(_) => 6,
            Fatal::Signal(_) => 7,
            Fatal::Permissions(_) => 8,
        }
    }
}
