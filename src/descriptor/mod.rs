//! This module handles allocation of bindless descriptor indices.
//!
//! - [`table`] exposes [`DescriptorTable`](crate::DescriptorTable), a fixed-capacity free-list of indices.
//! - [`segregated`] exposes [`SegregatedDescriptorTable`](crate::SegregatedDescriptorTable), one table
//! per [`DescriptorCategory`](crate::DescriptorCategory) sharing a single heap.
//! - [`category`] holds the categories and their fixed binding spaces.
//! - [`address`] turns indices into host and device addresses inside a descriptor heap.
//!
//! None of the tables here write descriptors. They only decide which slot a resource lives in.

pub mod address;
pub mod category;
pub mod index;
pub mod segregated;
pub mod table;
