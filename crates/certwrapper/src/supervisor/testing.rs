//! Signal target recording deliveries

use std::sync::Mutex;

use nix::errno::Errno;
use nix::sys::signal::Signal;

use super::SignalTarget;
use crate::errors::ProcessError;

#[derive(Debug, Default)]
pub(crate) struct RecordingTarget {
    received: Mutex<Vec<Signal>>,
    fail: bool,
}

impl RecordingTarget {
    /// Target whose deliveries fail as if the process were gone
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn received(&self) -> Vec<Signal> {
        self.received.lock().unwrap().clone()
    }
}

impl SignalTarget for RecordingTarget {
    fn signal(&self, signal: Signal) -> Result<(), ProcessError> {
        if self.fail {
            return Err(ProcessError::Signal {
                signal,
                source: Errno::ESRCH,
            });
        }
        self.received.lock().unwrap().push(signal);
        Ok(())
    }
}
