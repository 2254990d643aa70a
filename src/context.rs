//! An explicit owner for descriptor tables and the frame loop.
//!
//! The [`BindlessContext`] bundles a [`FrameEpochCoordinator`] with the tables it reclaims into, and lays
//! those tables out back to back in a single descriptor heap. There is no global instance: create one
//! context per device and pass it (or its [`Retirer`]) to whoever needs it.
//!
//! # Example
//! ```
//! # use bindle::*;
//! let mut ctx = BindlessContext::new(ContextSettings::default(), HostTimeline::immediate()).unwrap();
//! let buffers = ctx.create_table(64).unwrap();
//!
//! let slot = ctx.begin_frame();
//! let index = ctx.allocate(buffers);
//! ctx.release(buffers, index, true);
//! ctx.end_frame(slot, ());
//!
//! ctx.wait_for_all();
//! assert_eq!(ctx.table(buffers).live_count(), 0);
//! ```

use anyhow::Result;

use crate::core::error::{fatal, Error};
use crate::core::settings::ContextSettings;
use crate::descriptor::address::DescriptorAddress;
use crate::descriptor::category::DescriptorCategory;
use crate::descriptor::index::DescriptorIndex;
use crate::descriptor::segregated::{CategoryIndex, CategorySizes, SegregatedDescriptorTable};
use crate::descriptor::table::DescriptorTable;
use crate::frame::{FrameEpochCoordinator, FrameSlotIndex};
use crate::resource::BindlessResource;
use crate::sync::reclaim::{DrainReport, OwnedIndex, Retirer};
use crate::sync::timeline::GpuTimeline;

/// Refers to a plain table created by a [`BindlessContext`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TableHandle(usize);

/// Refers to a segregated table created by a [`BindlessContext`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SegregatedTableHandle(usize);

/// Owns the frame coordinator and every descriptor table created through it.
///
/// Call [`BindlessContext::wait_for_all`] before dropping it. Dropping it with frames in flight still
/// waits for them, but logs a warning.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct BindlessContext<T: GpuTimeline> {
    // Must stay first: pending releases drain before the tables drop.
    frames: FrameEpochCoordinator<T>,
    settings: ContextSettings,
    tables: Vec<DescriptorTable>,
    segregated: Vec<SegregatedDescriptorTable>,
    /// First heap slot not yet claimed by a table.
    heap_cursor: u64,
}

impl<T: GpuTimeline> BindlessContext<T> {
    /// Create a context that submits frames to `timeline`.
    pub fn new(settings: ContextSettings, timeline: T) -> Result<Self> {
        let frames = FrameEpochCoordinator::new(timeline, &settings)?;
        info!("Created bindless context `{}`", settings.name);
        Ok(Self {
            frames,
            settings,
            tables: vec![],
            segregated: vec![],
            heap_cursor: 0,
        })
    }

    /// Offset of the next table of `count` descriptors. Only committed once the table exists.
    fn next_heap_offset(&self, count: u64) -> Result<u64> {
        if self.heap_cursor + count > u32::MAX as u64 {
            return Err(Error::InvalidSettings("descriptor heap exceeds the addressable descriptor range").into());
        }
        Ok(self.heap_cursor)
    }

    /// Create a plain table of `capacity` indices, placed after every table created so far.
    pub fn create_table(&mut self, capacity: u32) -> Result<TableHandle> {
        let offset = self.next_heap_offset(capacity as u64)?;
        let name = format!("{}/table{}", self.settings.name, self.tables.len());
        let table = DescriptorTable::create(name, capacity, self.settings.heap, offset)?;
        self.heap_cursor = offset + capacity as u64;
        self.tables.push(table);
        Ok(TableHandle(self.tables.len() - 1))
    }

    /// Create a segregated table with the given category sizes, placed after every table created so far.
    pub fn create_segregated_table(&mut self, sizes: &CategorySizes) -> Result<SegregatedTableHandle> {
        let offset = self.next_heap_offset(sizes.total())?;
        let name = format!("{}/segregated{}", self.settings.name, self.segregated.len());
        let table = SegregatedDescriptorTable::new(name, sizes, self.settings.heap.offset_by(offset)?)?;
        self.heap_cursor = offset + sizes.total();
        self.segregated.push(table);
        Ok(SegregatedTableHandle(self.segregated.len() - 1))
    }

    /// Look up a plain table.
    ///
    /// # Panics
    /// Panics if `handle` was not created by this context.
    pub fn table(&self, handle: TableHandle) -> &DescriptorTable {
        self.tables
            .get(handle.0)
            .unwrap_or_else(|| fatal(Error::UnknownTable(handle.0)))
    }

    /// Look up a segregated table.
    ///
    /// # Panics
    /// Panics if `handle` was not created by this context.
    pub fn segregated(&self, handle: SegregatedTableHandle) -> &SegregatedDescriptorTable {
        self.segregated
            .get(handle.0)
            .unwrap_or_else(|| fatal(Error::UnknownTable(handle.0)))
    }

    /// Allocate an index from a plain table.
    pub fn allocate(&self, table: TableHandle) -> DescriptorIndex {
        self.table(table).allocate()
    }

    /// Allocate an index from one category of a segregated table.
    pub fn allocate_in(&self, table: SegregatedTableHandle, category: DescriptorCategory) -> CategoryIndex {
        self.segregated(table).allocate(category)
    }

    /// Release an index of a plain table. See [`FrameEpochCoordinator::release_resource`] for the
    /// meaning of `deferred`.
    ///
    /// `index` must come from `table`: plain indices are raw shader values and do not remember their
    /// table. Releasing an index that is not live in `table` is fatal.
    pub fn release(&self, table: TableHandle, index: DescriptorIndex, deferred: bool) {
        let owned = OwnedIndex::Table {
            table: self.table(table).clone(),
            index,
        };
        self.frames.release_resource(owned, deferred);
    }

    /// Release an index of a segregated table. Indices from another table are fatal.
    pub fn release_in(&self, table: SegregatedTableHandle, index: CategoryIndex, deferred: bool) {
        let owned = OwnedIndex::Category {
            table: self.segregated(table).clone(),
            index,
        };
        self.frames.release_resource(owned, deferred);
    }

    /// Heap address of an index of a plain table.
    pub fn address(&self, table: TableHandle, index: DescriptorIndex) -> DescriptorAddress {
        self.table(table).address(index)
    }

    /// Heap address of an index of a segregated table.
    pub fn address_in(&self, table: SegregatedTableHandle, index: CategoryIndex) -> DescriptorAddress {
        self.segregated(table).address(index)
    }

    /// Wrap a native handle so that it is retired through this context's frame loop.
    pub fn create_resource<H: Send + 'static>(&self, handle: H) -> BindlessResource<H> {
        BindlessResource::new(handle, self.frames.retirer())
    }

    /// See [`FrameEpochCoordinator::begin_frame`].
    pub fn begin_frame(&mut self) -> FrameSlotIndex {
        self.frames.begin_frame()
    }

    /// See [`FrameEpochCoordinator::end_frame`].
    pub fn end_frame(&mut self, slot: FrameSlotIndex, submission: T::Submission) {
        self.frames.end_frame(slot, submission)
    }

    /// See [`FrameEpochCoordinator::wait_for_all`].
    pub fn wait_for_all(&mut self) -> DrainReport {
        self.frames.wait_for_all()
    }

    /// Release handle for other threads.
    pub fn retirer(&self) -> &Retirer {
        self.frames.retirer()
    }

    /// The frame coordinator.
    pub fn coordinator(&self) -> &FrameEpochCoordinator<T> {
        &self.frames
    }

    /// Settings this context was created with.
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Number of heap slots claimed by tables so far.
    pub fn heap_size(&self) -> u64 {
        self.heap_cursor
    }

    /// Live indices over every table of this context.
    pub fn live_count(&self) -> u64 {
        let plain = self.tables.iter().map(|table| table.live_count() as u64).sum::<u64>();
        let segregated = self
            .segregated
            .iter()
            .map(|table| table.total_live_count() as u64)
            .sum::<u64>();
        plain + segregated
    }
}
