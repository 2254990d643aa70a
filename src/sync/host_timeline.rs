use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::Result;

use crate::core::error::Error;
use crate::sync::timeline::{Epoch, GpuTimeline, WaitStatus};

#[derive(Debug)]
struct HostTimelineState {
    submitted: Epoch,
    completed: Epoch,
}

#[derive(Debug)]
struct HostTimelineInner {
    state: Mutex<HostTimelineState>,
    signaled: Condvar,
    auto_signal: bool,
}

/// Timeline whose epochs are signalled from the host instead of a GPU queue.
///
/// Used for headless contexts and tests. In manual mode, submitted epochs stay pending until
/// [`HostTimeline::signal`] is called, possibly from another thread, which makes it possible to
/// simulate a GPU that lags several frames behind. In immediate mode every epoch completes as soon
/// as it is submitted.
///
/// Internal state is wrapped in an `Arc`, so this is safe to clone and hand to a thread
/// playing the role of the device.
#[derive(Debug, Clone)]
pub struct HostTimeline {
    inner: Arc<HostTimelineInner>,
}

impl HostTimeline {
    fn create(auto_signal: bool) -> Self {
        Self {
            inner: Arc::new(HostTimelineInner {
                state: Mutex::new(HostTimelineState {
                    submitted: Epoch::ZERO,
                    completed: Epoch::ZERO,
                }),
                signaled: Condvar::new(),
                auto_signal,
            }),
        }
    }

    /// Create a timeline that only advances when [`HostTimeline::signal`] is called.
    pub fn new() -> Self {
        Self::create(false)
    }

    /// Create a timeline that completes every epoch on submission.
    pub fn immediate() -> Self {
        Self::create(true)
    }

    /// Mark every epoch up to and including `epoch` as complete, and wake up waiters.
    /// Signalling an epoch that was not submitted yet, or one that already completed, has no effect.
    pub fn signal(&self, epoch: Epoch) -> Result<()> {
        let mut state = self.inner.state.lock().map_err(|_| Error::PoisonError)?;
        let target = epoch.min(state.submitted);
        if target > state.completed {
            state.completed = target;
            self.inner.signaled.notify_all();
        }
        Ok(())
    }

    /// Complete everything submitted so far.
    pub fn signal_all(&self) -> Result<()> {
        let submitted = self.submitted()?;
        self.signal(submitted)
    }

    /// Latest epoch submitted to this timeline.
    pub fn submitted(&self) -> Result<Epoch> {
        Ok(self.inner.state.lock().map_err(|_| Error::PoisonError)?.submitted)
    }
}

impl Default for HostTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuTimeline for HostTimeline {
    type Submission = ();

    fn submit(&self, _: (), signal: Epoch) -> Result<()> {
        let mut state = self.inner.state.lock().map_err(|_| Error::PoisonError)?;
        if signal <= state.submitted {
            return Err(Error::Uncategorized("timeline epochs must be submitted in increasing order").into());
        }
        state.submitted = signal;
        if self.inner.auto_signal {
            state.completed = signal;
            self.inner.signaled.notify_all();
        }
        Ok(())
    }

    fn completed(&self) -> Result<Epoch> {
        Ok(self.inner.state.lock().map_err(|_| Error::PoisonError)?.completed)
    }

    fn wait(&self, epoch: Epoch, timeout: Duration) -> Result<WaitStatus> {
        let state = self.inner.state.lock().map_err(|_| Error::PoisonError)?;
        let (state, _) = self
            .inner
            .signaled
            .wait_timeout_while(state, timeout, |state| state.completed < epoch)
            .map_err(|_| Error::PoisonError)?;
        if state.completed >= epoch {
            Ok(WaitStatus::Signaled)
        } else {
            Ok(WaitStatus::TimedOut)
        }
    }
}
