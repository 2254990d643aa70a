//! Deferred reclamation of descriptor indices and the native handles they describe.
//!
//! Each frame slot owns a [`ReclamationQueue`]. Anything released while a slot is current is pushed
//! onto that slot's queue, and stays there until the [`FrameEpochCoordinator`](crate::FrameEpochCoordinator)
//! comes back to the slot and has seen the GPU finish the slot's previous epoch. At that point the
//! queue is drained: native handles are dropped and indices go back to their tables' free-lists.
//!
//! Threads other than the one driving frames release through a [`Retirer`], a cheap cloneable handle
//! that always targets the current slot.

use std::any::Any;
use std::ops::AddAssign;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::error::fatal;
use crate::descriptor::address::DescriptorAddress;
use crate::descriptor::category::DescriptorCategory;
use crate::descriptor::index::DescriptorIndex;
use crate::descriptor::segregated::{CategoryIndex, SegregatedDescriptorTable};
use crate::descriptor::table::DescriptorTable;

/// A descriptor index together with the table that allocated it.
#[derive(Debug)]
pub enum OwnedIndex {
    /// Index from a plain [`DescriptorTable`].
    Table {
        /// Owning table.
        table: DescriptorTable,
        /// Index to release.
        index: DescriptorIndex,
    },
    /// Index from one category of a [`SegregatedDescriptorTable`].
    Category {
        /// Owning table.
        table: SegregatedDescriptorTable,
        /// Index to release, carrying its category.
        index: CategoryIndex,
    },
}

impl OwnedIndex {
    /// The index, as seen by shaders.
    pub fn index(&self) -> DescriptorIndex {
        match self {
            OwnedIndex::Table { index, .. } => *index,
            OwnedIndex::Category { index, .. } => index.index(),
        }
    }

    /// The category of the index, if it comes from a segregated table.
    pub fn category(&self) -> Option<DescriptorCategory> {
        match self {
            OwnedIndex::Table { .. } => None,
            OwnedIndex::Category { index, .. } => Some(index.category()),
        }
    }

    /// Host and device address of the descriptor.
    pub fn address(&self) -> DescriptorAddress {
        match self {
            OwnedIndex::Table { table, index } => table.address(*index),
            OwnedIndex::Category { table, index } => table.address(*index),
        }
    }

    fn mark_pending(&self) {
        match self {
            OwnedIndex::Table { table, index } => table.mark_pending(*index),
            OwnedIndex::Category { table, index } => table.mark_pending(*index),
        }
    }

    /// # Safety
    /// The GPU must have finished every submission that could reference the index.
    unsafe fn release(self) {
        match self {
            OwnedIndex::Table { table, index } => table.release_immediate(index),
            OwnedIndex::Category { table, index } => table.release_immediate(index),
        }
    }
}

/// One unit of deferred release: an optional native handle, and every descriptor index that aliases it.
/// When reclaimed, the handle is dropped first and the indices are released afterwards, all at once.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct Retired {
    indices: Vec<OwnedIndex>,
    #[derivative(Debug = "ignore")]
    handle: Option<Box<dyn Any + Send>>,
}

impl Retired {
    /// Retire a native handle. It is dropped when its slot is drained, so `H` should release the
    /// underlying object in its `Drop` implementation.
    pub fn handle<H: Send + 'static>(handle: H) -> Self {
        Self {
            indices: vec![],
            handle: Some(Box::new(handle)),
        }
    }

    /// Add an index to release together with this unit.
    pub fn with_index(mut self, index: OwnedIndex) -> Self {
        self.indices.push(index);
        self
    }

    /// Add several indices to release together with this unit.
    pub fn with_indices(mut self, indices: impl IntoIterator<Item = OwnedIndex>) -> Self {
        self.indices.extend(indices);
        self
    }

    /// Number of descriptor indices held by this unit.
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Mark every index of this unit as pending in its table.
    ///
    /// # Panics
    /// Panics if an index is free or already pending, before the unit reaches any queue.
    fn mark_pending(&self) {
        self.indices.iter().for_each(OwnedIndex::mark_pending);
    }

    /// # Safety
    /// The GPU must have finished every submission that could reference this unit.
    unsafe fn reclaim(self, report: &mut DrainReport) {
        let Retired { indices, handle } = self;
        if let Some(handle) = handle {
            drop(handle);
            report.handles += 1;
        }
        report.indices += indices.len();
        for index in indices {
            index.release();
        }
    }
}

impl From<OwnedIndex> for Retired {
    fn from(value: OwnedIndex) -> Self {
        Retired::default().with_index(value)
    }
}

/// What a drain returned to the tables.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Descriptor indices returned to their free-lists.
    pub indices: usize,
    /// Native handles dropped.
    pub handles: usize,
}

impl AddAssign for DrainReport {
    fn add_assign(&mut self, rhs: Self) {
        self.indices += rhs.indices;
        self.handles += rhs.handles;
    }
}

/// Pending releases of one frame slot.
#[derive(Debug, Default)]
pub struct ReclamationQueue {
    entries: Vec<Retired>,
}

impl ReclamationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a unit onto the queue.
    ///
    /// # Panics
    /// Panics if any index of the unit is free or already queued for release.
    pub fn push(&mut self, item: Retired) {
        item.mark_pending();
        self.entries.push(item);
    }

    /// Push a unit whose indices are already marked pending.
    fn push_marked(&mut self, item: Retired) {
        self.entries.push(item);
    }

    /// Push a single index onto the queue.
    pub fn push_index(&mut self, index: OwnedIndex) {
        self.push(index.into());
    }

    /// Number of queued units.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of queued descriptor indices, over all units.
    pub fn index_count(&self) -> usize {
        self.entries.iter().map(Retired::index_count).sum()
    }

    /// Release everything in the queue.
    ///
    /// # Safety
    /// The GPU must have finished every submission that was recorded while this queue was current.
    pub unsafe fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        for item in self.entries.drain(..) {
            item.reclaim(&mut report);
        }
        report
    }
}

impl Drop for ReclamationQueue {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            warn!(
                "Reclamation queue dropped with {} pending units ({} indices). These indices are leaked.",
                self.entries.len(),
                self.index_count()
            );
        }
    }
}

#[derive(Debug)]
struct RetireState {
    current: usize,
    queues: Vec<ReclamationQueue>,
}

/// Cloneable handle that pushes releases onto the current frame slot's queue.
///
/// The current slot and every slot's queue sit behind one lock. Switching slots in
/// [`FrameEpochCoordinator::begin_frame`](crate::FrameEpochCoordinator::begin_frame) takes the same
/// lock, so a release always lands in a slot whose next drain is gated on an epoch covering every frame
/// that could have seen the released index.
#[derive(Debug, Clone)]
pub struct Retirer {
    inner: Arc<Mutex<RetireState>>,
}

impl Retirer {
    pub(crate) fn new(slot_count: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RetireState {
                current: 0,
                queues: (0..slot_count).map(|_| ReclamationQueue::new()).collect(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RetireState> {
        self.inner.lock().unwrap_or_else(|e| fatal(e.into()))
    }

    /// Run `f` on the current slot's queue.
    pub fn with_current<F: FnOnce(&mut ReclamationQueue) -> R, R>(&self, f: F) -> R {
        let mut state = self.lock();
        let current = state.current;
        f(&mut state.queues[current])
    }

    /// Defer release of a unit until the current slot is drained.
    ///
    /// # Panics
    /// Panics if any index of the unit is free or already queued for release.
    pub fn retire(&self, item: impl Into<Retired>) {
        let item = item.into();
        // Outside the lock, so a double free does not poison it.
        item.mark_pending();
        self.with_current(|queue| queue.push_marked(item));
    }

    /// Defer release of an index from a plain table.
    pub fn release_index(&self, table: &DescriptorTable, index: DescriptorIndex) {
        self.retire(OwnedIndex::Table {
            table: table.clone(),
            index,
        });
    }

    /// Defer release of an index from a segregated table.
    pub fn release_category_index(&self, table: &SegregatedDescriptorTable, index: CategoryIndex) {
        self.retire(OwnedIndex::Category {
            table: table.clone(),
            index,
        });
    }

    /// Slot new releases currently land in.
    pub fn current_slot(&self) -> usize {
        self.lock().current
    }

    /// Units pending in one slot.
    pub fn pending_count(&self, slot: usize) -> usize {
        self.lock().queues[slot].len()
    }

    /// Units pending over all slots.
    pub fn total_pending(&self) -> usize {
        self.lock().queues.iter().map(ReclamationQueue::len).sum()
    }

    /// Make `slot` current and hand back everything that was queued on it.
    pub(crate) fn rotate_to(&self, slot: usize) -> ReclamationQueue {
        let mut state = self.lock();
        state.current = slot;
        std::mem::take(&mut state.queues[slot])
    }

    /// Take the queues of every slot, leaving them empty.
    pub(crate) fn take_all(&self) -> Vec<ReclamationQueue> {
        self.lock().queues.iter_mut().map(std::mem::take).collect()
    }
}
