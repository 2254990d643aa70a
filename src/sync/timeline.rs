//! Epochs and the GPU timeline they are signalled on.
//!
//! Every submitted frame gets the next [`Epoch`]. The timeline is a monotonically increasing
//! counter that the GPU advances to an epoch once all work submitted with it has finished. Waiting
//! for an epoch is therefore enough to know that nothing submitted at or before it is still running.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use anyhow::Result;

/// Value of the frame submission counter.
///
/// [`Epoch::ZERO`] is never submitted and is always complete, so a slot that has not been used yet
/// never waits.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Epoch(u64);

impl Epoch {
    /// The epoch before any submission.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw counter value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value, as written to a timeline semaphore.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The epoch following this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Epoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of a bounded wait on a [`GpuTimeline`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaitStatus {
    /// The epoch completed within the timeout.
    Signaled,
    /// The timeout expired first.
    TimedOut,
}

/// A GPU-signalable completion counter. Implemented by [`VulkanTimeline`](crate::VulkanTimeline)
/// on top of a timeline semaphore, and by [`HostTimeline`](crate::HostTimeline) for headless use.
pub trait GpuTimeline {
    /// Recorded work for one frame, handed over in
    /// [`FrameEpochCoordinator::end_frame`](crate::FrameEpochCoordinator::end_frame).
    type Submission;

    /// Submit `submission` and arrange for the timeline to reach `signal` once it has finished executing.
    /// Epochs passed to this are strictly increasing.
    fn submit(&self, submission: Self::Submission, signal: Epoch) -> Result<()>;

    /// The latest epoch the GPU has finished.
    fn completed(&self) -> Result<Epoch>;

    /// Block until the timeline reaches `epoch`, or `timeout` elapses.
    fn wait(&self, epoch: Epoch, timeout: Duration) -> Result<WaitStatus>;
}
