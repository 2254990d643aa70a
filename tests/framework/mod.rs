#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;

use bindle::{
    BindlessContext, CategorySizes, ContextBuilder, ContextSettings, DescriptorCategory, DescriptorHeapLayout,
    FrameEpochCoordinator, HostTimeline,
};

/// Timeout used by test contexts. Short, so tests that expect a timeout finish quickly.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(250);

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

pub fn test_settings(frames_in_flight: usize) -> ContextSettings {
    ContextBuilder::new()
        .name("bindle test framework")
        .frames_in_flight(frames_in_flight)
        .wait_timeout(TEST_TIMEOUT)
        .heap(DescriptorHeapLayout::new(0x1000, 0x10_0000, 16))
        .build()
}

/// Creates a coordinator on a host timeline that only advances when signalled manually,
/// together with a handle to that timeline.
pub fn make_coordinator(frames_in_flight: usize) -> Result<(FrameEpochCoordinator<HostTimeline>, HostTimeline)> {
    init_logging();
    let timeline = HostTimeline::new();
    let frames = FrameEpochCoordinator::new(timeline.clone(), &test_settings(frames_in_flight))?;
    Ok((frames, timeline))
}

/// Creates a context on a host timeline that completes every epoch on submission.
pub fn make_context() -> Result<BindlessContext<HostTimeline>> {
    make_context_with_timeline(HostTimeline::immediate())
}

/// Creates a context on the given timeline.
pub fn make_context_with_timeline(timeline: HostTimeline) -> Result<BindlessContext<HostTimeline>> {
    init_logging();
    BindlessContext::new(test_settings(3), timeline)
}

pub fn small_sizes() -> CategorySizes {
    CategorySizes::new()
        .with(DescriptorCategory::Texture2D, 8)
        .with(DescriptorCategory::RwTexture2D, 4)
        .with(DescriptorCategory::Buffer, 16)
}
