//! A descriptor table partitioned into one contiguous sub-range per [`DescriptorCategory`].
//!
//! Each category is backed by its own [`DescriptorTable`] with its own lock, so allocations in
//! different categories never contend. All sub-ranges share one descriptor heap: category `C` starts
//! at the sum of the sizes of the categories before it in [`DescriptorCategory::ALL`].
//!
//! # Example
//! ```
//! # use bindle::*;
//! let sizes = CategorySizes::new()
//!     .with(DescriptorCategory::Texture2D, 4096)
//!     .with(DescriptorCategory::Buffer, 1024);
//! let table = SegregatedDescriptorTable::new("bindless", &sizes, DescriptorHeapLayout::default()).unwrap();
//! let texture = table.allocate(DescriptorCategory::Texture2D);
//! let buffer = table.allocate(DescriptorCategory::Buffer);
//! // Indices are local to their category, the heap address is not.
//! assert_eq!(texture.index(), buffer.index());
//! assert_ne!(table.address(texture), table.address(buffer));
//! ```

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::core::error::{fatal, Error};
use crate::descriptor::address::{DescriptorAddress, DescriptorHeapLayout};
use crate::descriptor::category::DescriptorCategory;
use crate::descriptor::index::DescriptorIndex;
use crate::descriptor::table::DescriptorTable;
use crate::sync::reclaim::{OwnedIndex, ReclamationQueue};

/// Number of descriptors reserved for each category. Categories that are never given a size have
/// an empty sub-range, and allocating from them is fatal.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CategorySizes {
    sizes: [u32; DescriptorCategory::COUNT],
}

impl CategorySizes {
    /// All categories empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size of one category.
    pub fn with(mut self, category: DescriptorCategory, size: u32) -> Self {
        self.sizes[category.slot()] = size;
        self
    }

    /// Size reserved for `category`.
    pub fn get(&self, category: DescriptorCategory) -> u32 {
        self.sizes[category.slot()]
    }

    /// Sum of all category sizes.
    pub fn total(&self) -> u64 {
        self.sizes.iter().map(|size| *size as u64).sum()
    }
}

impl FromIterator<(DescriptorCategory, u32)> for CategorySizes {
    fn from_iter<I: IntoIterator<Item = (DescriptorCategory, u32)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |sizes, (category, size)| sizes.with(category, size))
    }
}

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(0);

/// An index allocated from one category of a [`SegregatedDescriptorTable`].
///
/// The category and the owning table travel with the index, so it can only ever be released back
/// into the category it came from. Passing it to any other table is fatal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CategoryIndex {
    table: u64,
    category: DescriptorCategory,
    index: DescriptorIndex,
}

impl CategoryIndex {
    /// Category this index was allocated from.
    pub fn category(&self) -> DescriptorCategory {
        self.category
    }

    /// Index inside the category's descriptor array. This is the value shaders use.
    pub fn index(&self) -> DescriptorIndex {
        self.index
    }
}

#[derive(Debug)]
struct SegregatedTableInner {
    id: u64,
    name: String,
    layout: DescriptorHeapLayout,
    offsets: [u64; DescriptorCategory::COUNT],
    tables: Vec<DescriptorTable>,
}

/// Descriptor table split into disjoint per-category sub-ranges of one heap.
///
/// Internal state is wrapped in an `Arc`, so this is cheap to clone.
#[derive(Debug, Clone)]
pub struct SegregatedDescriptorTable {
    inner: Arc<SegregatedTableInner>,
}

impl SegregatedDescriptorTable {
    /// Create a new segregated table. Sub-ranges are laid out in [`DescriptorCategory::ALL`] order,
    /// regardless of how `sizes` was built.
    pub fn new(name: impl Into<String>, sizes: &CategorySizes, layout: DescriptorHeapLayout) -> Result<Self> {
        let name = name.into();
        if sizes.total() > u32::MAX as u64 {
            return Err(Error::InvalidSettings("segregated table exceeds the addressable descriptor range").into());
        }
        layout.validate(sizes.total())?;
        let mut offsets = [0u64; DescriptorCategory::COUNT];
        let mut offset = 0u64;
        let tables = DescriptorCategory::ALL
            .iter()
            .map(|category| {
                offsets[category.slot()] = offset;
                let table = DescriptorTable::create(format!("{name}/{category}"), sizes.get(*category), layout, offset)?;
                offset += sizes.get(*category) as u64;
                Ok(table)
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Created segregated descriptor table `{}` with {} descriptors", name, offset);
        Ok(Self {
            inner: Arc::new(SegregatedTableInner {
                id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
                name,
                layout,
                offsets,
                tables,
            }),
        })
    }

    /// Allocate an index from `category`.
    ///
    /// # Panics
    /// Panics if the category is exhausted, even if other categories still have room.
    pub fn allocate(&self, category: DescriptorCategory) -> CategoryIndex {
        CategoryIndex {
            table: self.inner.id,
            category,
            index: self.table(category).allocate(),
        }
    }

    /// Table backing the category of `index`, after checking that `index` came from this table.
    fn owning_table(&self, index: CategoryIndex) -> &DescriptorTable {
        if index.table != self.inner.id {
            fatal(Error::ForeignIndex {
                table: self.inner.name.clone(),
                index: index.index.raw(),
            });
        }
        self.table(index.category)
    }

    /// Return an index to its category's free-list right away.
    ///
    /// # Safety
    /// * No GPU submission that may still be executing can reference `index`.
    ///
    /// # Panics
    /// Panics if `index` was allocated from another table, or is already free.
    pub unsafe fn release_immediate(&self, index: CategoryIndex) {
        self.owning_table(index).release_immediate(index.index);
    }

    pub(crate) fn mark_pending(&self, index: CategoryIndex) {
        self.owning_table(index).mark_pending(index.index);
    }

    /// Queue `index` for release on a frame slot's reclamation queue.
    ///
    /// # Panics
    /// Panics if `index` was allocated from another table, is free, or is already queued for release.
    pub fn release_deferred(&self, index: CategoryIndex, queue: &mut ReclamationQueue) {
        queue.push_index(OwnedIndex::Category {
            table: self.clone(),
            index,
        });
    }

    /// Host and device address of the descriptor for `index`:
    /// `base + (offset[category] + index) * stride`.
    pub fn address(&self, index: CategoryIndex) -> DescriptorAddress {
        self.owning_table(index).address(index.index)
    }

    /// The table backing one category.
    pub fn table(&self, category: DescriptorCategory) -> &DescriptorTable {
        &self.inner.tables[category.slot()]
    }

    /// Range of heap slots reserved for `category`.
    pub fn heap_range(&self, category: DescriptorCategory) -> Range<u64> {
        let start = self.inner.offsets[category.slot()];
        start..start + self.table(category).capacity() as u64
    }

    /// Category owning the absolute heap slot `slot`, if any.
    pub fn category_of(&self, slot: u64) -> Option<DescriptorCategory> {
        DescriptorCategory::ALL
            .into_iter()
            .find(|category| self.heap_range(*category).contains(&slot))
    }

    /// Whether `index` is currently handed out by its category.
    pub fn is_allocated(&self, index: CategoryIndex) -> bool {
        index.table == self.inner.id && self.table(index.category).is_allocated(index.index)
    }

    /// Capacity of one category.
    pub fn capacity(&self, category: DescriptorCategory) -> u32 {
        self.table(category).capacity()
    }

    /// Live indices in one category.
    pub fn live_count(&self, category: DescriptorCategory) -> u32 {
        self.table(category).live_count()
    }

    /// Live indices over all categories.
    pub fn total_live_count(&self) -> u32 {
        self.inner.tables.iter().map(|table| table.live_count()).sum()
    }

    /// Number of descriptors in the whole heap.
    pub fn total_capacity(&self) -> u64 {
        self.inner.tables.iter().map(|table| table.capacity() as u64).sum()
    }

    /// Heap layout shared by all categories.
    pub fn layout(&self) -> &DescriptorHeapLayout {
        &self.inner.layout
    }

    /// Debug name of this table.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Layout bindings for every non-empty category, paired with the set they belong to.
    /// Suitable for building the bindless descriptor set layouts.
    pub fn layout_bindings(&self) -> Vec<(u32, vk::DescriptorSetLayoutBinding)> {
        DescriptorCategory::ALL
            .iter()
            .filter(|category| self.capacity(**category) != 0)
            .map(|category| (category.binding_space().set, category.layout_binding(self.capacity(*category))))
            .collect()
    }
}
