//! Bindless descriptor index allocation with GPU-safe deferred reclamation.
//!
//! Bindle hands out stable indices into large shader-visible descriptor arrays, and makes sure an index
//! is never reused while a frame that may still be executing on the GPU can reference it. It does not
//! write descriptors or record commands. It only decides which slot a resource lives in, and when that
//! slot may be given to someone else.
//!
//! To get started, the easiest way is to simply
//! ```
//! // Import types under a namespace.
//! use bindle::prelude as bd;
//!
//! // Or, if you dont care about using the types under a namespace
//! use bindle::prelude::*;
//! ```
//!
//! # Example
//!
//! First, define the [`ContextSettings`](crate::ContextSettings) the frame loop runs with.
//! ```
//! use bindle::prelude::*;
//! use std::time::Duration;
//!
//! let settings = ContextBuilder::new()
//!     .name("renderer")
//!     .frames_in_flight(3)
//!     .wait_timeout(Duration::from_secs(2))
//!     .build();
//! ```
//! Next, create a [`BindlessContext`](crate::BindlessContext) on a timeline. On a real device this is a
//! [`VulkanTimeline`](crate::VulkanTimeline). Here we use a host timeline that completes every epoch on submit.
//! ```
//! # use bindle::prelude::*;
//! # let settings = ContextSettings::default();
//! let mut ctx = BindlessContext::new(settings, HostTimeline::immediate()).unwrap();
//! let textures = ctx
//!     .create_segregated_table(&CategorySizes::new()
//!         .with(DescriptorCategory::Texture2D, 1024)
//!         .with(DescriptorCategory::RwTexture2D, 256))
//!     .unwrap();
//! ```
//! Every frame is bracketed by `begin_frame` and `end_frame`. Indices released during a frame come back
//! once the GPU has finished it.
//! ```
//! # use bindle::prelude::*;
//! # let mut ctx = BindlessContext::new(ContextSettings::default(), HostTimeline::immediate()).unwrap();
//! # let textures = ctx.create_segregated_table(&CategorySizes::new().with(DescriptorCategory::Texture2D, 4)).unwrap();
//! let slot = ctx.begin_frame();
//! let albedo = ctx.allocate_in(textures, DescriptorCategory::Texture2D);
//! // ... write the descriptor at ctx.address_in(textures, albedo) and record work using it ...
//! ctx.release_in(textures, albedo, true);
//! ctx.end_frame(slot, ());
//!
//! // Before shutting down, wait for the GPU and drain everything.
//! ctx.wait_for_all();
//! ```
//! For further details, check out the following modules
//! - [`descriptor`] for the index tables and heap addressing.
//! - [`sync`] for GPU timelines and reclamation queues.
//! - [`frame`] for the frame loop.
//! - [`resource`] for native handles with several bindless views.
//! - [`context`] for owning all of the above together.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod context;
pub mod core;
pub mod descriptor;
pub mod frame;
pub mod resource;
pub mod sync;

static_assertions::assert_impl_all!(DescriptorTable: Send, Sync, Clone);
static_assertions::assert_impl_all!(SegregatedDescriptorTable: Send, Sync, Clone);
static_assertions::assert_impl_all!(Retirer: Send, Sync, Clone);
static_assertions::assert_impl_all!(HostTimeline: Send, Sync, Clone);
static_assertions::assert_impl_all!(Retired: Send);
