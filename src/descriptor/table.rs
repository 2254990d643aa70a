//! Fixed-capacity descriptor index allocator.
//!
//! A [`DescriptorTable`] hands out indices into a shader-visible descriptor array of a fixed size.
//! The shader side of a bindless layout is sized once at pipeline layout creation, so the table never
//! grows: running out of indices is a configuration error and aborts.
//!
//! # Example
//! ```
//! # use bindle::*;
//! let table = DescriptorTable::new("textures", 4).unwrap();
//! let index = table.allocate();
//! assert_eq!(table.live_count(), 1);
//! // SAFETY: nothing was submitted that could reference this index.
//! unsafe { table.release_immediate(index) };
//! assert_eq!(table.live_count(), 0);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

use crate::core::error::{fatal, Error};
use crate::descriptor::address::{DescriptorAddress, DescriptorHeapLayout};
use crate::descriptor::index::DescriptorIndex;
use crate::sync::reclaim::{OwnedIndex, ReclamationQueue};

/// Lifecycle of a single index.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum IndexState {
    Free,
    Allocated,
    /// Released, waiting on a reclamation queue for its frame to complete.
    Pending,
}

#[derive(Debug)]
struct FreeList {
    free: Vec<u32>,
    states: Vec<IndexState>,
    live: u32,
}

#[derive(Debug)]
struct DescriptorTableInner {
    name: String,
    capacity: u32,
    layout: DescriptorHeapLayout,
    heap_offset: u64,
    state: Mutex<FreeList>,
}

/// Thread-safe free-list allocator of [`DescriptorIndex`] values in `[0, capacity)`.
///
/// Internal state is wrapped in an `Arc`, so this is cheap to clone. All clones refer to the same table.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    inner: Arc<DescriptorTableInner>,
}

impl DescriptorTable {
    /// Create a new table with `capacity` indices, addressed with the default heap layout.
    pub fn new(name: impl Into<String>, capacity: u32) -> Result<Self> {
        Self::with_layout(name, capacity, DescriptorHeapLayout::default())
    }

    /// Create a new table with `capacity` indices placed at the start of the heap described by `layout`.
    pub fn with_layout(name: impl Into<String>, capacity: u32, layout: DescriptorHeapLayout) -> Result<Self> {
        Self::create(name.into(), capacity, layout, 0)
    }

    pub(crate) fn create(name: String, capacity: u32, layout: DescriptorHeapLayout, heap_offset: u64) -> Result<Self> {
        if capacity == u32::MAX {
            return Err(Error::InvalidSettings("table capacity collides with the invalid index sentinel").into());
        }
        layout.validate(heap_offset + capacity as u64)?;
        // Reverse order so that indices are handed out starting at zero.
        let free = (0..capacity).rev().collect::<Vec<_>>();
        debug!("Created descriptor table `{}` with capacity {}", name, capacity);
        Ok(Self {
            inner: Arc::new(DescriptorTableInner {
                name,
                capacity,
                layout,
                heap_offset,
                state: Mutex::new(FreeList {
                    free,
                    states: vec![IndexState::Free; capacity as usize],
                    live: 0,
                }),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FreeList> {
        self.inner.state.lock().unwrap_or_else(|e| fatal(e.into()))
    }

    fn check_range(&self, index: DescriptorIndex) {
        if index.raw() >= self.inner.capacity {
            fatal(Error::IndexOutOfRange {
                table: self.inner.name.clone(),
                index: index.raw(),
                capacity: self.inner.capacity,
            });
        }
    }

    /// Allocate a single index.
    ///
    /// # Panics
    /// Panics if every index of the table is in use. Capacities are fixed at startup and shaders
    /// are compiled against them, so there is nothing to retry.
    pub fn allocate(&self) -> DescriptorIndex {
        let mut state = self.lock();
        let Some(index) = state.free.pop() else {
            drop(state);
            fatal(Error::Exhausted {
                table: self.inner.name.clone(),
                capacity: self.inner.capacity,
            });
        };
        state.states[index as usize] = IndexState::Allocated;
        state.live += 1;
        debug_assert!(state.live <= self.inner.capacity);
        #[cfg(feature = "log-objects")]
        trace!("Allocated descriptor {} from table `{}`", index, self.inner.name);
        DescriptorIndex::new(index)
    }

    fn double_free(&self, index: DescriptorIndex) -> ! {
        fatal(Error::DoubleFree {
            table: self.inner.name.clone(),
            index: index.raw(),
        })
    }

    /// Return an index to the free-list right away. Accepts indices that are allocated, or pending on
    /// a reclamation queue.
    ///
    /// # Safety
    /// * No GPU submission that may still be executing can reference `index`. Outside of a full
    ///   device drain, use [`DescriptorTable::release_deferred`] instead.
    /// * `index` must have been allocated from this table. Indices do not remember their table.
    ///
    /// # Panics
    /// Panics if `index` is out of range or already free.
    pub unsafe fn release_immediate(&self, index: DescriptorIndex) {
        self.check_range(index);
        let mut state = self.lock();
        if state.states[index.raw() as usize] == IndexState::Free {
            drop(state);
            self.double_free(index);
        }
        state.states[index.raw() as usize] = IndexState::Free;
        state.live -= 1;
        state.free.push(index.raw());
        #[cfg(feature = "log-objects")]
        trace!("Released descriptor {} to table `{}`", index, self.inner.name);
    }

    /// Queue `index` for release on a frame slot's reclamation queue. The index stays allocated until
    /// that queue is drained by the [`FrameEpochCoordinator`](crate::FrameEpochCoordinator).
    ///
    /// `index` must have been allocated from this table.
    ///
    /// # Panics
    /// Panics if `index` is out of range, free, or already queued for release.
    pub fn release_deferred(&self, index: DescriptorIndex, queue: &mut ReclamationQueue) {
        queue.push_index(OwnedIndex::Table {
            table: self.clone(),
            index,
        });
    }

    /// Move an allocated index to the pending state. Every deferred release goes through here, so the
    /// same index can never sit on two queues at once.
    pub(crate) fn mark_pending(&self, index: DescriptorIndex) {
        self.check_range(index);
        let mut state = self.lock();
        if state.states[index.raw() as usize] != IndexState::Allocated {
            drop(state);
            self.double_free(index);
        }
        state.states[index.raw() as usize] = IndexState::Pending;
    }

    /// Host and device address of the descriptor for `index`.
    pub fn address(&self, index: DescriptorIndex) -> DescriptorAddress {
        self.check_range(index);
        self.inner.layout.address(self.inner.heap_offset + index.raw() as u64)
    }

    /// Whether `index` is currently handed out. Indices waiting on a reclamation queue still count.
    pub fn is_allocated(&self, index: DescriptorIndex) -> bool {
        index.raw() < self.inner.capacity && self.lock().states[index.raw() as usize] != IndexState::Free
    }

    /// Whether `index` has been released and is waiting for its frame to complete.
    pub fn is_pending(&self, index: DescriptorIndex) -> bool {
        index.raw() < self.inner.capacity && self.lock().states[index.raw() as usize] == IndexState::Pending
    }

    /// Number of indices currently handed out.
    pub fn live_count(&self) -> u32 {
        self.lock().live
    }

    /// Number of indices available for allocation.
    pub fn free_count(&self) -> u32 {
        self.lock().free.len() as u32
    }

    /// Fixed capacity of this table.
    pub fn capacity(&self) -> u32 {
        self.inner.capacity
    }

    /// Debug name of this table.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Offset of index zero inside the descriptor heap, in descriptors.
    pub fn heap_offset(&self) -> u64 {
        self.inner.heap_offset
    }

    /// Whether both handles refer to the same table.
    pub fn same_table(&self, other: &DescriptorTable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Drop for DescriptorTableInner {
    fn drop(&mut self) {
        let live = match self.state.get_mut() {
            Ok(state) => state.live,
            Err(_) => return,
        };
        if live != 0 {
            warn!("Descriptor table `{}` destroyed with {} live indices", self.name, live);
        }
    }
}
