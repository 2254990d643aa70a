//! Exposes the bindle error type, and the fatal path used for programmer errors.
//!
//! Two kinds of failure exist in this crate. Construction and configuration problems are returned
//! as [`anyhow::Result`] like everywhere else in the API. Violations of the allocator's invariants
//! (exhaustion, double frees, device loss during a frame wait) are defects in the calling code and
//! are never returned. They are logged and then raised through [`fatal`].

use std::sync::PoisonError;
use std::time::Duration;

use ash;
use thiserror::Error;

use crate::sync::timeline::Epoch;

/// Error type that bindle can return or raise.
#[derive(Error, Debug)]
pub enum Error {
    /// Allocation from a table or category with no free indices left.
    #[error("Descriptor table `{table}` exhausted (capacity {capacity}).")]
    Exhausted {
        /// Debug name of the table.
        table: String,
        /// Fixed capacity of the table.
        capacity: u32,
    },
    /// An index was released while it was already free.
    #[error("Double free of descriptor index {index} in table `{table}`.")]
    DoubleFree {
        /// Debug name of the table.
        table: String,
        /// The offending index.
        index: u32,
    },
    /// An index was passed to a table other than the one that allocated it.
    #[error("Descriptor index {index} belongs to another table than `{table}`.")]
    ForeignIndex {
        /// Debug name of the table the index was passed to.
        table: String,
        /// The offending index.
        index: u32,
    },
    /// An index outside of `[0, capacity)` was passed to a table.
    #[error("Descriptor index {index} out of range for table `{table}` (capacity {capacity}).")]
    IndexOutOfRange {
        /// Debug name of the table.
        table: String,
        /// The offending index.
        index: u32,
        /// Fixed capacity of the table.
        capacity: u32,
    },
    /// Waiting for a GPU epoch took longer than the configured timeout. Treated as device loss.
    #[error("Timed out after {timeout:?} waiting for epoch {epoch}. Device lost.")]
    DeviceWaitTimeout {
        /// Epoch that was being waited on.
        epoch: Epoch,
        /// Timeout that expired.
        timeout: Duration,
    },
    /// Frame calls arrived out of order, for example two `begin_frame` calls without an `end_frame`.
    #[error("Frame out of order: {0}")]
    FrameOutOfOrder(String),
    /// Settings passed at startup are unusable.
    #[error("Invalid settings: {0}")]
    InvalidSettings(&'static str),
    /// A table handle that was not created by this context.
    #[error("Unknown table handle `{0}`.")]
    UnknownTable(usize),
    /// Generic Vulkan error type.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}

/// Log an invariant violation and abort the current thread by panicking.
///
/// Used for every condition the allocator cannot recover from. The panic message is the
/// error's display text, so tests can match on it with `#[should_panic(expected = ...)]`.
#[cold]
#[track_caller]
pub fn fatal(err: Error) -> ! {
    error!("{err}");
    panic!("{err}")
}
