use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use ash::vk;

use crate::core::error::Error;
use crate::sync::timeline::{Epoch, GpuTimeline, WaitStatus};

/// Work recorded for one frame, submitted to the queue in a single batch together with the
/// timeline signal.
#[derive(Debug, Default, Clone)]
pub struct VulkanSubmission {
    /// Command buffers to execute, in order.
    pub command_buffers: Vec<vk::CommandBuffer>,
    /// Binary semaphores to wait on before executing, with the stage that waits on them.
    /// Typically the swapchain image-ready semaphore.
    pub wait_semaphores: Vec<(vk::Semaphore, vk::PipelineStageFlags)>,
    /// Binary semaphores to signal when the batch finishes. Typically the present semaphore.
    pub signal_semaphores: Vec<vk::Semaphore>,
}

/// [`GpuTimeline`] backed by a `VK_KHR_timeline_semaphore` semaphore, which is core since Vulkan 1.2.
///
/// Each frame is submitted as one batch that signals the timeline semaphore to the frame's epoch,
/// so the counter value read back from the device is exactly the last completed epoch.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanTimeline {
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    queue: Mutex<vk::Queue>,
    semaphore: vk::Semaphore,
}

impl VulkanTimeline {
    /// Create a timeline semaphore with initial value zero, and submit frames to `queue`.
    /// The `timelineSemaphore` device feature must be enabled.
    pub fn new(device: ash::Device, queue: vk::Queue) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(Epoch::ZERO.value());
        let info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info);
        let semaphore = unsafe { device.create_semaphore(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created timeline semaphore {:?}", semaphore);
        Ok(Self {
            device,
            queue: Mutex::new(queue),
            semaphore,
        })
    }

    /// Get unsafe access to the underlying `VkSemaphore` handle, for example to make another queue
    /// wait on a frame's epoch.
    /// # Safety
    /// Any vulkan calls that mutate the semaphore may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl GpuTimeline for VulkanTimeline {
    type Submission = VulkanSubmission;

    fn submit(&self, submission: VulkanSubmission, signal: Epoch) -> Result<()> {
        let (wait_semaphores, wait_stages): (Vec<_>, Vec<_>) = submission.wait_semaphores.into_iter().unzip();
        // Binary semaphores ignore their value, but the value arrays must match the semaphore arrays.
        let wait_values = vec![0u64; wait_semaphores.len()];
        let mut signal_semaphores = submission.signal_semaphores;
        let mut signal_values = vec![0u64; signal_semaphores.len()];
        signal_semaphores.push(self.semaphore);
        signal_values.push(signal.value());

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::builder()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);
        let info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&submission.command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info)
            .build();

        let queue = self.queue.lock().map_err(|_| Error::PoisonError)?;
        unsafe { self.device.queue_submit(*queue, std::slice::from_ref(&info), vk::Fence::null())? };
        Ok(())
    }

    fn completed(&self) -> Result<Epoch> {
        let value = unsafe { self.device.get_semaphore_counter_value(self.semaphore)? };
        Ok(Epoch::new(value))
    }

    fn wait(&self, epoch: Epoch, timeout: Duration) -> Result<WaitStatus> {
        let semaphores = [self.semaphore];
        let values = [epoch.value()];
        let info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);
        let timeout = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        match unsafe { self.device.wait_semaphores(&info, timeout) } {
            Ok(()) => Ok(WaitStatus::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(WaitStatus::TimedOut),
            Err(err) => Err(Error::from(err).into()),
        }
    }
}

impl Drop for VulkanTimeline {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying timeline semaphore {:?}", self.semaphore);
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
