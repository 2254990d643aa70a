use std::fmt::{Display, Formatter};

/// Opaque index into a descriptor table. This is the value shaders use to reach a resource in
/// a bindless table, so it stays stable for as long as the resource is alive.
///
/// Valid indices lie in `[0, capacity)` of the table they were allocated from.
/// [`DescriptorIndex::INVALID`] marks an unbound slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DescriptorIndex(u32);

impl DescriptorIndex {
    /// Sentinel for "no descriptor bound".
    pub const INVALID: Self = Self(u32::MAX);

    /// Wrap a raw index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw index, for example to write it into a push constant.
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Whether this is the [`DescriptorIndex::INVALID`] sentinel.
    pub const fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }
}

impl Default for DescriptorIndex {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<DescriptorIndex> for u32 {
    fn from(value: DescriptorIndex) -> Self {
        value.0
    }
}

impl Display for DescriptorIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "<invalid>")
        }
    }
}
