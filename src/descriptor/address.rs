//! Descriptor address arithmetic. Nothing here touches the device, it only turns indices into
//! offsets inside a descriptor heap (for example a buffer created for `VK_EXT_descriptor_buffer`,
//! which is host-mapped and has a device address).

use anyhow::Result;
use ash::vk;

use crate::core::error::{fatal, Error};

/// Placement of a descriptor heap in host and device memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DescriptorHeapLayout {
    /// Host address of descriptor 0.
    pub cpu_base: usize,
    /// Device address of descriptor 0.
    pub gpu_base: vk::DeviceAddress,
    /// Size of one descriptor in bytes. Must be non-zero.
    pub stride: u64,
}

impl Default for DescriptorHeapLayout {
    /// A layout with zero bases and a stride of one, so addresses equal indices.
    fn default() -> Self {
        Self {
            cpu_base: 0,
            gpu_base: 0,
            stride: 1,
        }
    }
}

/// Host and device address of a single descriptor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorAddress {
    /// Host address, for writing the descriptor.
    pub cpu: usize,
    /// Device address, for shader access.
    pub gpu: vk::DeviceAddress,
}

impl DescriptorHeapLayout {
    /// Create a layout from host base, device base and descriptor size.
    pub fn new(cpu_base: usize, gpu_base: vk::DeviceAddress, stride: u64) -> Self {
        Self {
            cpu_base,
            gpu_base,
            stride,
        }
    }

    /// Address of the descriptor at absolute heap slot `slot`, or `None` if it does not fit in the
    /// address space.
    pub fn checked_address(&self, slot: u64) -> Option<DescriptorAddress> {
        let offset = self.size_of(slot)?;
        Some(DescriptorAddress {
            cpu: self.cpu_base.checked_add(usize::try_from(offset).ok()?)?,
            gpu: self.gpu_base.checked_add(offset)?,
        })
    }

    /// Address of the descriptor at absolute heap slot `slot`.
    ///
    /// # Panics
    /// Panics if the address overflows. Tables validate their whole range on creation, so this never
    /// happens for an index they handed out.
    pub fn address(&self, slot: u64) -> DescriptorAddress {
        self.checked_address(slot)
            .unwrap_or_else(|| fatal(Error::InvalidSettings("descriptor address overflows the heap layout")))
    }

    /// Check that `slots` descriptors fit in this layout: the stride is non-zero and the end of the
    /// last descriptor is addressable on both host and device.
    pub fn validate(&self, slots: u64) -> Result<()> {
        if self.stride == 0 {
            return Err(Error::InvalidSettings("descriptor stride must be non-zero").into());
        }
        match self.checked_address(slots) {
            Some(_) => Ok(()),
            None => Err(Error::InvalidSettings("descriptor heap does not fit in the address space").into()),
        }
    }

    /// The same heap, with slot 0 moved `slots` descriptors forward.
    pub fn offset_by(&self, slots: u64) -> Result<Self> {
        self.validate(slots)?;
        let base = self.address(slots);
        Ok(Self {
            cpu_base: base.cpu,
            gpu_base: base.gpu,
            stride: self.stride,
        })
    }

    /// Size in bytes of a heap holding `count` descriptors, or `None` on overflow.
    pub fn size_of(&self, count: u64) -> Option<u64> {
        count.checked_mul(self.stride)
    }
}
