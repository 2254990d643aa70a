//! Frame slot rotation and epoch-gated reclamation.
//!
//! The [`FrameEpochCoordinator`] cycles through `F` frame slots. Every frame must be bracketed by
//! [`FrameEpochCoordinator::begin_frame`] and [`FrameEpochCoordinator::end_frame`]:
//!
//! - `begin_frame` picks the next slot. If the GPU has not yet finished the epoch that slot submitted
//!   last time around, it blocks until it has. The slot's reclamation queue is then drained, which makes
//!   every index released during that earlier frame available for allocation again.
//! - `end_frame` submits the frame's work on the [`GpuTimeline`] with a fresh epoch, and records that
//!   epoch on the slot.
//!
//! An index released while slot `S` is current is therefore only reused after `F` further calls to
//! `begin_frame`, and only once the GPU has signalled every frame up to and including the one that
//! was recording at the time of release.
//!
//! # Example
//! ```
//! # use bindle::*;
//! let timeline = HostTimeline::immediate();
//! let table = DescriptorTable::new("buffers", 16).unwrap();
//! let mut frames = FrameEpochCoordinator::new(timeline, &ContextSettings::default()).unwrap();
//!
//! let slot = frames.begin_frame();
//! let index = table.allocate();
//! frames.retirer().release_index(&table, index);
//! frames.end_frame(slot, ());
//! frames.wait_for_all();
//! assert_eq!(table.live_count(), 0);
//! ```

use std::time::Duration;

use anyhow::Result;

use crate::core::error::{fatal, Error};
use crate::core::settings::ContextSettings;
use crate::sync::reclaim::{DrainReport, ReclamationQueue, Retired, Retirer};
use crate::sync::timeline::{Epoch, GpuTimeline, WaitStatus};

/// The number of frames in flight used when nothing else is configured. A frame in flight is a frame
/// that is rendering on the GPU or scheduled to do so. With three frames, the CPU can record one frame
/// while up to two earlier frames are still executing.
pub const FRAMES_IN_FLIGHT: usize = 3;

/// Index of a frame slot, in `[0, frames_in_flight)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameSlotIndex(usize);

impl FrameSlotIndex {
    /// Raw slot number. Useful for indexing per-frame resources owned by the caller.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Lifecycle of a frame slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SlotState {
    /// Not in use. Either never used, or fully drained.
    Idle,
    /// Between `begin_frame` and `end_frame`.
    Recording,
    /// Work submitted, epoch possibly still executing.
    Submitted,
}

/// Information stored for each in-flight frame.
#[derive(Debug)]
struct FrameSlot {
    state: SlotState,
    /// Epoch submitted the last time this slot was recording.
    last_epoch: Epoch,
}

/// Drives the frame loop and reclaims released indices once the GPU is done with them.
///
/// Frame operations take `&mut self`, so the coordinator can only be driven from one thread at a time.
/// Releases from other threads go through the [`Retirer`] obtained from
/// [`FrameEpochCoordinator::retirer`].
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct FrameEpochCoordinator<T: GpuTimeline> {
    #[derivative(Debug = "ignore")]
    timeline: T,
    slots: Vec<FrameSlot>,
    next_slot: usize,
    recording: Option<usize>,
    epoch: Epoch,
    frame_count: u64,
    wait_timeout: Duration,
    retirer: Retirer,
}

impl<T: GpuTimeline> FrameEpochCoordinator<T> {
    /// Initialize the coordinator with `settings.frames_in_flight` idle slots.
    pub fn new(timeline: T, settings: &ContextSettings) -> Result<Self> {
        settings.validate()?;
        info!(
            "Creating frame coordinator with {} frames in flight, wait timeout {:?}",
            settings.frames_in_flight, settings.wait_timeout
        );
        Ok(Self {
            timeline,
            slots: (0..settings.frames_in_flight)
                .map(|_| FrameSlot {
                    state: SlotState::Idle,
                    last_epoch: Epoch::ZERO,
                })
                .collect(),
            next_slot: 0,
            recording: None,
            epoch: Epoch::ZERO,
            frame_count: 0,
            wait_timeout: settings.wait_timeout,
            retirer: Retirer::new(settings.frames_in_flight),
        })
    }

    /// Block until the timeline reaches `epoch`. Timeouts and device errors are fatal.
    fn wait_epoch(&self, epoch: Epoch) {
        let completed = match self.timeline.completed() {
            Ok(completed) => completed,
            Err(e) => {
                error!("Querying the GPU timeline failed: {:?}", e);
                fatal(Error::Uncategorized("GPU timeline query failed"))
            }
        };
        if completed >= epoch {
            return;
        }

        debug!("Waiting for epoch {} (completed {})", epoch, completed);
        match self.timeline.wait(epoch, self.wait_timeout) {
            Ok(WaitStatus::Signaled) => {}
            Ok(WaitStatus::TimedOut) => fatal(Error::DeviceWaitTimeout {
                epoch,
                timeout: self.wait_timeout,
            }),
            Err(e) => {
                error!("Waiting for epoch {} failed: {:?}", epoch, e);
                fatal(Error::Uncategorized("GPU timeline wait failed"))
            }
        }
    }

    /// Start a new frame and get the slot it records into.
    ///
    /// Blocks if the slot's previous epoch has not completed yet. This is the only operation in the crate
    /// that waits on the GPU during normal operation.
    ///
    /// # Panics
    /// Panics if the previous frame was not ended, or if the wait times out.
    pub fn begin_frame(&mut self) -> FrameSlotIndex {
        if let Some(slot) = self.recording {
            fatal(Error::FrameOutOfOrder(format!("begin_frame called while slot {slot} is still recording")));
        }

        let slot = self.next_slot;
        self.next_slot = (slot + 1) % self.slots.len();
        self.wait_epoch(self.slots[slot].last_epoch);

        let mut pending = self.retirer.rotate_to(slot);
        // SAFETY: We just observed completion of the last epoch submitted from this slot, and every
        // release in this queue happened while this slot was current, before the next frame could record.
        let report = unsafe { pending.drain() };
        if report != DrainReport::default() {
            debug!(
                "Slot {} reclaimed {} indices and {} handles",
                slot, report.indices, report.handles
            );
        }

        self.slots[slot].state = SlotState::Recording;
        self.recording = Some(slot);
        self.frame_count += 1;
        FrameSlotIndex(slot)
    }

    /// Submit the frame's work, tagged with the next epoch.
    ///
    /// # Panics
    /// Panics if `slot` is not the slot returned by the matching [`FrameEpochCoordinator::begin_frame`],
    /// or if submission fails.
    pub fn end_frame(&mut self, slot: FrameSlotIndex, submission: T::Submission) {
        if self.recording != Some(slot.0) {
            fatal(Error::FrameOutOfOrder(format!(
                "end_frame called for slot {} while recording {:?}",
                slot.0, self.recording
            )));
        }

        let epoch = self.epoch.next();
        if let Err(e) = self.timeline.submit(submission, epoch) {
            error!("Submitting epoch {} failed: {:?}", epoch, e);
            fatal(Error::Uncategorized("frame submission failed"));
        }
        self.epoch = epoch;

        let frame = &mut self.slots[slot.0];
        frame.last_epoch = epoch;
        frame.state = SlotState::Submitted;
        self.recording = None;
    }

    /// Release a resource through the frame system.
    ///
    /// With `deferred` set, this pushes `item` onto the current slot's queue. Without it, the item is
    /// released right away, but only between frames and once the GPU has completed every submitted epoch.
    /// Otherwise the immediate request is not safe, so it is logged and deferred instead.
    pub fn release_resource(&self, item: impl Into<Retired>, deferred: bool) {
        let item = item.into();
        if !deferred {
            if self.is_idle() {
                let mut queue = ReclamationQueue::new();
                queue.push(item);
                // SAFETY: No frame is recording and every epoch ever submitted has completed, so nothing
                // on the GPU can reference the item.
                unsafe { queue.drain() };
                return;
            }
            warn!(
                "Immediate release requested while the GPU is busy (recording {:?}, latest epoch {}). Deferring instead.",
                self.recording, self.epoch
            );
        }
        self.retirer.retire(item);
    }

    /// Whether no frame is recording and the GPU has finished every epoch submitted so far.
    ///
    /// A recording frame may already reference any live index, so it counts as busy even before it is
    /// submitted.
    pub fn is_idle(&self) -> bool {
        self.recording.is_none() && self.timeline_drained()
    }

    fn timeline_drained(&self) -> bool {
        match self.timeline.completed() {
            Ok(completed) => completed >= self.epoch,
            Err(_) => false,
        }
    }

    /// Wait for every submitted epoch, then drain every slot's queue.
    ///
    /// Must be called before the descriptor tables are destroyed. Also legal between frames, for example
    /// before a swapchain rebuild, but never while a frame is recording.
    ///
    /// # Panics
    /// Panics if a frame is recording, or if the wait times out.
    pub fn wait_for_all(&mut self) -> DrainReport {
        if let Some(slot) = self.recording {
            fatal(Error::FrameOutOfOrder(format!("wait_for_all called while slot {slot} is recording")));
        }

        self.wait_epoch(self.epoch);
        let mut report = DrainReport::default();
        for mut queue in self.retirer.take_all() {
            // SAFETY: Every epoch ever submitted has completed.
            report += unsafe { queue.drain() };
        }
        self.slots.iter_mut().for_each(|slot| slot.state = SlotState::Idle);
        info!(
            "Drained all frame slots at epoch {}: {} indices, {} handles",
            self.epoch, report.indices, report.handles
        );
        report
    }

    /// Get a handle that releases into the current slot. Safe to send to other threads.
    pub fn retirer(&self) -> &Retirer {
        &self.retirer
    }

    /// Number of frame slots.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// State of one slot.
    pub fn slot_state(&self, slot: FrameSlotIndex) -> SlotState {
        self.slots[slot.0].state
    }

    /// Epoch recorded on one slot the last time it was submitted.
    pub fn last_epoch(&self, slot: FrameSlotIndex) -> Epoch {
        self.slots[slot.0].last_epoch
    }

    /// The slot currently recording, if any.
    pub fn current_slot(&self) -> Option<FrameSlotIndex> {
        self.recording.map(FrameSlotIndex)
    }

    /// Latest epoch handed to the timeline.
    pub fn latest_epoch(&self) -> Epoch {
        self.epoch
    }

    /// Number of frames begun so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Units waiting for release in one slot.
    pub fn pending_count(&self, slot: FrameSlotIndex) -> usize {
        self.retirer.pending_count(slot.0)
    }

    /// The timeline frames are submitted to.
    pub fn timeline(&self) -> &T {
        &self.timeline
    }
}

impl<T: GpuTimeline> Drop for FrameEpochCoordinator<T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        if self.recording.is_some() || self.retirer.total_pending() != 0 || !self.is_idle() {
            warn!("Frame coordinator dropped without wait_for_all(). Draining now.");
            self.recording = None;
            self.wait_for_all();
        }
    }
}
