//! The closed set of resource categories a [`SegregatedDescriptorTable`](crate::SegregatedDescriptorTable)
//! is partitioned into, and their fixed mapping onto shader binding spaces.
//!
//! Shaders declare one unbounded descriptor array per category. Because the mapping below is a pure
//! function of the category, and not of allocation or registration order, the same layout can be
//! bound once for the whole frame and never changes.

use std::fmt::{Display, Formatter};

use ash::vk;

/// Mutually exclusive class of GPU-visible resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DescriptorCategory {
    /// Read-only 2D texture (sampled image).
    Texture2D,
    /// Read-write 2D texture (storage image).
    RwTexture2D,
    /// Read-only cube texture.
    TextureCube,
    /// Read-write cube texture.
    RwTextureCube,
    /// Read-only structured buffer.
    Buffer,
    /// Read-write structured buffer.
    RwBuffer,
    /// Top-level acceleration structure.
    AccelerationStructure,
}

/// Location of a category's descriptor array in the bindless pipeline layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BindingSpace {
    /// Descriptor set index.
    pub set: u32,
    /// Binding inside the set.
    pub binding: u32,
}

impl DescriptorCategory {
    /// Number of categories.
    pub const COUNT: usize = 7;

    /// Every category, in the order their sub-ranges are laid out in a segregated table.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Texture2D,
        Self::RwTexture2D,
        Self::TextureCube,
        Self::RwTextureCube,
        Self::Buffer,
        Self::RwBuffer,
        Self::AccelerationStructure,
    ];

    /// Dense position of this category, usable to index per-category arrays.
    pub const fn slot(&self) -> usize {
        match self {
            Self::Texture2D => 0,
            Self::RwTexture2D => 1,
            Self::TextureCube => 2,
            Self::RwTextureCube => 3,
            Self::Buffer => 4,
            Self::RwBuffer => 5,
            Self::AccelerationStructure => 6,
        }
    }

    /// The binding space shaders use to reach this category's table.
    ///
    /// Read-only and read-write views live in separate sets so that the read-only sets can be
    /// shared between graphics and compute layouts.
    pub const fn binding_space(&self) -> BindingSpace {
        match self {
            Self::Texture2D => BindingSpace { set: 0, binding: 0 },
            Self::TextureCube => BindingSpace { set: 0, binding: 1 },
            Self::Buffer => BindingSpace { set: 0, binding: 2 },
            Self::RwTexture2D => BindingSpace { set: 1, binding: 0 },
            Self::RwTextureCube => BindingSpace { set: 1, binding: 1 },
            Self::RwBuffer => BindingSpace { set: 1, binding: 2 },
            Self::AccelerationStructure => BindingSpace { set: 2, binding: 0 },
        }
    }

    /// Get the [`vk::DescriptorType`] of descriptors in this category.
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::Texture2D | Self::TextureCube => vk::DescriptorType::SAMPLED_IMAGE,
            Self::RwTexture2D | Self::RwTextureCube => vk::DescriptorType::STORAGE_IMAGE,
            Self::Buffer | Self::RwBuffer => vk::DescriptorType::STORAGE_BUFFER,
            Self::AccelerationStructure => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        }
    }

    /// Whether shaders may write through descriptors of this category.
    pub const fn is_writable(&self) -> bool {
        matches!(self, Self::RwTexture2D | Self::RwTextureCube | Self::RwBuffer)
    }

    /// Get the [`vk::DescriptorSetLayoutBinding`] for a descriptor array of `count` entries of this category.
    pub fn layout_binding(&self, count: u32) -> vk::DescriptorSetLayoutBinding {
        vk::DescriptorSetLayoutBinding {
            binding: self.binding_space().binding,
            descriptor_type: self.descriptor_type(),
            descriptor_count: count,
            stage_flags: vk::ShaderStageFlags::ALL,
            p_immutable_samplers: std::ptr::null(),
        }
    }
}

impl Display for DescriptorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
