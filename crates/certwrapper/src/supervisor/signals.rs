//! Signal relay to the wrapped process.
//!
//! Bridges OS signals received by the supervisor with the child: every
//! relayed signal is forwarded verbatim, so the child sees SIGTERM/SIGINT for
//! shutdown and SIGHUP/SIGUSR1/SIGUSR2 for whatever it uses them for.

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, Signal as SignalStream, SignalKind};
use tracing::{debug, trace};

use super::SignalTarget;
use crate::errors::{Fatal, ProcessError};

/// Signals forwarded to the child
pub const RELAYED_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
];

/// Listener for the relayed signals
///
/// Handlers are installed on construction. Signals received before
/// [`SignalRelay::run`] is polled are queued, not lost.
pub struct SignalRelay {
    interrupt: SignalStream,
    terminate: SignalStream,
    hangup: SignalStream,
    user1: SignalStream,
    user2: SignalStream,
}

impl SignalRelay {
    /// Install handlers for every relayed signal
    pub fn install() -> Result<Self, ProcessError> {
        debug!("Installing signal relay");
        Ok(Self {
            interrupt: listen(Signal::SIGINT, SignalKind::interrupt())?,
            terminate: listen(Signal::SIGTERM, SignalKind::terminate())?,
            hangup: listen(Signal::SIGHUP, SignalKind::hangup())?,
            user1: listen(Signal::SIGUSR1, SignalKind::user_defined1())?,
            user2: listen(Signal::SIGUSR2, SignalKind::user_defined2())?,
        })
    }

    /// Wait for the next signal
    ///
    /// `None` in the second position means the stream for that signal closed.
    async fn next(&mut self) -> (Signal, Option<()>) {
        tokio::select! {
            received = self.interrupt.recv() => (Signal::SIGINT, received),
            received = self.terminate.recv() => (Signal::SIGTERM, received),
            received = self.hangup.recv() => (Signal::SIGHUP, received),
            received = self.user1.recv() => (Signal::SIGUSR1, received),
            received = self.user2.recv() => (Signal::SIGUSR2, received),
        }
    }

    /// Forward signals to `target` until forwarding fails
    pub async fn run(mut self, target: &dyn SignalTarget) -> Fatal {
        loop {
            let (signal, received) = self.next().await;
            if received.is_none() {
                return Fatal::Signal(ProcessError::SignalStreamClosed(signal));
            }

            debug!(signal = %signal, "Relaying signal to child");
            if let Err(e) = target.signal(signal) {
                return Fatal::Signal(e);
            }
            trace!(signal = %signal, "Signal relayed");
        }
    }
}

fn listen(signal_id: Signal, kind: SignalKind) -> Result<SignalStream, ProcessError> {
    signal(kind).map_err(|source| ProcessError::SignalHandler {
        signal: signal_id,
        source,
    })
}
