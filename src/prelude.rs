pub use ash::vk;

pub use crate::core::error::Error;
pub use crate::core::settings::*;

pub use crate::descriptor::address::*;
pub use crate::descriptor::category::*;
pub use crate::descriptor::index::DescriptorIndex;
pub use crate::descriptor::segregated::*;
pub use crate::descriptor::table::DescriptorTable;

pub use crate::sync::host_timeline::HostTimeline;
pub use crate::sync::reclaim::*;
pub use crate::sync::timeline::*;
pub use crate::sync::vulkan_timeline::*;

pub use crate::frame::*;
pub use crate::resource::BindlessResource;
pub use crate::context::*;
