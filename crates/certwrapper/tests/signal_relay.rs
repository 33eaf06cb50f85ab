//! Signal relay against real process signals
//!
//! Runs in its own test binary so the signals raised here never reach the
//! unit tests.

use std::sync::Mutex;
use std::time::Duration;

use certwrapper::errors::{Fatal, ProcessError};
use certwrapper::supervisor::{SignalRelay, SignalTarget};
use nix::errno::Errno;
use nix::sys::signal::{raise, Signal};

/// Records the first delivery, then refuses so the relay stops
#[derive(Default)]
struct StopAfterFirst {
    received: Mutex<Vec<Signal>>,
}

impl SignalTarget for StopAfterFirst {
    fn signal(&self, signal: Signal) -> Result<(), ProcessError> {
        let mut received = self.received.lock().unwrap();
        received.push(signal);
        if received.len() == 1 {
            return Err(ProcessError::Signal {
                signal,
                source: Errno::ESRCH,
            });
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_relay_forwards_received_signal() {
    let relay = SignalRelay::install().unwrap();
    let target = StopAfterFirst::default();

    raise(Signal::SIGUSR2).unwrap();

    let fatal = tokio::time::timeout(Duration::from_secs(5), relay.run(&target))
        .await
        .expect("relay did not observe SIGUSR2");

    assert_eq!(*target.received.lock().unwrap(), vec![Signal::SIGUSR2]);
    assert!(matches!(
        fatal,
        Fatal::Signal(ProcessError::Signal {
            signal: Signal::SIGUSR2,
            ..
        })
    ));
    assert_eq!(fatal.exit_code(), 7);
}
