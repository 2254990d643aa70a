//! Exposes the settings a [`BindlessContext`](crate::BindlessContext) is created with.
//!
//! Everything here is fixed for the lifetime of the context. Shader-visible table sizes and the number
//! of frames in flight are baked into pipeline layouts and per-frame resources, so none of it can change
//! at runtime.

use std::time::Duration;

use anyhow::Result;

use crate::core::error::Error;
use crate::descriptor::address::DescriptorHeapLayout;
use crate::frame::FRAMES_IN_FLIGHT;

/// Startup settings for the frame coordinator and descriptor tables.
#[derive(Debug, Clone)]
pub struct ContextSettings {
    /// Context name. Used as a prefix for table names in log output.
    pub name: String,
    /// Number of frame slots. A released index is reused at the earliest `frames_in_flight` frames later.
    pub frames_in_flight: usize,
    /// Upper bound on a single wait for a GPU epoch. Exceeding it is treated as device loss.
    pub wait_timeout: Duration,
    /// Placement of the descriptor heap. Tables created by the context are laid out in it back to back.
    pub heap: DescriptorHeapLayout,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            name: String::from("bindle"),
            frames_in_flight: FRAMES_IN_FLIGHT,
            wait_timeout: Duration::from_secs(5),
            heap: DescriptorHeapLayout::default(),
        }
    }
}

impl ContextSettings {
    /// Check that the settings describe a usable context.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(Error::InvalidSettings("at least one frame in flight is required").into());
        }
        self.heap.validate(0)
    }
}

/// The context builder is a convenience struct to easily create [`ContextSettings`].
///
/// For information about each of the fields, see [`ContextSettings`].
/// # Example
/// ```
/// # use bindle::*;
/// # use std::time::Duration;
/// let settings = ContextBuilder::new()
///     .name("renderer")
///     .frames_in_flight(2)
///     .wait_timeout(Duration::from_secs(1))
///     .build();
/// assert_eq!(settings.frames_in_flight, 2);
/// ```
#[derive(Debug, Default)]
pub struct ContextBuilder {
    inner: ContextSettings,
}

impl ContextBuilder {
    /// Create a new context builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the context name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Sets the number of frames in flight.
    pub fn frames_in_flight(mut self, count: usize) -> Self {
        self.inner.frames_in_flight = count;
        self
    }

    /// Sets the GPU wait timeout.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.inner.wait_timeout = timeout;
        self
    }

    /// Sets the descriptor heap layout.
    pub fn heap(mut self, heap: DescriptorHeapLayout) -> Self {
        self.inner.heap = heap;
        self
    }

    /// Build the resulting settings. Validation happens when the context is created.
    pub fn build(self) -> ContextSettings {
        self.inner
    }
}
