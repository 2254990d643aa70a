//! Native resources with bindless views.
//!
//! A single native object often shows up in more than one descriptor array, for example a storage image
//! that is also sampled. A [`BindlessResource`] owns the native handle and every descriptor index that
//! aliases it. Dropping it retires all of them as one unit on the current frame slot, so the handle is
//! destroyed and the indices are freed together once the GPU is done with that frame.
//!
//! # Example
//! ```
//! # use bindle::*;
//! let mut frames = FrameEpochCoordinator::new(HostTimeline::immediate(), &ContextSettings::default()).unwrap();
//! let sizes = CategorySizes::new()
//!     .with(DescriptorCategory::Texture2D, 8)
//!     .with(DescriptorCategory::RwTexture2D, 8);
//! let table = SegregatedDescriptorTable::new("bindless", &sizes, DescriptorHeapLayout::default()).unwrap();
//!
//! let mut image = BindlessResource::new("my image", frames.retirer());
//! let sampled = image.add_category_view(&table, DescriptorCategory::Texture2D);
//! let storage = image.add_category_view(&table, DescriptorCategory::RwTexture2D);
//! assert_eq!(image.view(DescriptorCategory::Texture2D), Some(sampled));
//! assert_eq!(image.view(DescriptorCategory::RwTexture2D), Some(storage));
//!
//! drop(image);
//! // Still allocated until the frame it was dropped in has completed.
//! assert_eq!(table.total_live_count(), 2);
//! frames.wait_for_all();
//! assert_eq!(table.total_live_count(), 0);
//! ```

use crate::core::error::{fatal, Error};
use crate::descriptor::category::DescriptorCategory;
use crate::descriptor::index::DescriptorIndex;
use crate::descriptor::segregated::{CategoryIndex, SegregatedDescriptorTable};
use crate::descriptor::table::DescriptorTable;
use crate::sync::reclaim::{OwnedIndex, Retired, Retirer};

/// Owns a native handle `H` together with the descriptor indices that refer to it.
///
/// `H` is dropped on the frame thread once the frame it was retired in has completed, so it should
/// destroy the underlying object in its `Drop` implementation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BindlessResource<H: Send + 'static> {
    #[derivative(Debug = "ignore")]
    handle: Option<H>,
    views: Vec<OwnedIndex>,
    #[derivative(Debug = "ignore")]
    retirer: Retirer,
}

impl<H: Send + 'static> BindlessResource<H> {
    /// Wrap a native handle. The resource starts out without any views.
    pub fn new(handle: H, retirer: &Retirer) -> Self {
        Self {
            handle: Some(handle),
            views: vec![],
            retirer: retirer.clone(),
        }
    }

    fn owned_handle(&self) -> &H {
        match &self.handle {
            Some(handle) => handle,
            None => fatal(Error::Uncategorized("bindless resource used after retirement")),
        }
    }

    /// Allocate an index from `table` and attach it to this resource.
    pub fn add_view(&mut self, table: &DescriptorTable) -> DescriptorIndex {
        let index = table.allocate();
        self.views.push(OwnedIndex::Table {
            table: table.clone(),
            index,
        });
        index
    }

    /// Allocate an index from one category of `table` and attach it to this resource.
    pub fn add_category_view(&mut self, table: &SegregatedDescriptorTable, category: DescriptorCategory) -> CategoryIndex {
        let index = table.allocate(category);
        self.views.push(OwnedIndex::Category {
            table: table.clone(),
            index,
        });
        index
    }

    /// First view allocated in `category`, if any.
    pub fn view(&self, category: DescriptorCategory) -> Option<CategoryIndex> {
        self.views.iter().find_map(|view| match view {
            OwnedIndex::Category { index, .. } if index.category() == category => Some(*index),
            _ => None,
        })
    }

    /// Every index attached to this resource, in the order they were added.
    pub fn views(&self) -> &[OwnedIndex] {
        &self.views
    }

    /// The native handle.
    pub fn handle(&self) -> &H {
        self.owned_handle()
    }

    /// Retire the handle and every view right away, on the current frame slot.
    pub fn retire(mut self) {
        self.retire_inner();
    }

    fn retire_inner(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        #[cfg(feature = "log-objects")]
        trace!("Retiring bindless resource with {} views", self.views.len());
        let views = std::mem::take(&mut self.views);
        self.retirer.retire(Retired::handle(handle).with_indices(views));
    }
}

impl<H: Send + 'static> Drop for BindlessResource<H> {
    fn drop(&mut self) {
        self.retire_inner();
    }
}
