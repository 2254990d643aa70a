//! The sync module provides the GPU timeline abstraction and the deferred reclamation built on it.
//!
//! - The [`timeline`] module defines [`Epoch`](crate::Epoch) and the [`GpuTimeline`](crate::GpuTimeline) trait.
//! - [`vulkan_timeline`] implements it on a `VkSemaphore` of type `VK_SEMAPHORE_TYPE_TIMELINE`.
//! - [`host_timeline`] implements it on the CPU, for tests and headless tools.
//! - [`reclaim`] holds the per-slot reclamation queues and the [`Retirer`](crate::Retirer) used to fill them.

pub mod host_timeline;
pub mod reclaim;
pub mod timeline;
pub mod vulkan_timeline;
