//! Device operations the frame scheduler drives

use std::fmt::Debug;

use crate::render::vulkan::VulkanResult;

/// Result of a successful image acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Swapchain image index
    pub index: u32,
    /// The swapchain still works but no longer matches the surface exactly
    pub suboptimal: bool,
}

/// Result of a successful presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// Presented and the swapchain matches the surface
    Optimal,
    /// Presented but the swapchain should be recreated
    Suboptimal,
}

/// The GPU side of the frame protocol
///
/// Errors whose kind is `SurfaceInvalidated` are handled by the scheduler;
/// everything else is propagated to the caller of `draw_frame`.
pub trait FrameBackend {
    /// Completion marker handle
    type Fence: Copy + Eq + Debug;
    /// GPU-GPU ordering handle
    type Semaphore: Copy + Debug;

    /// Block until `fence` is signaled, failing after `timeout_ns`
    fn wait_for_fence(&mut self, fence: Self::Fence, timeout_ns: u64) -> VulkanResult<()>;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&mut self, fence: Self::Fence) -> VulkanResult<()>;

    /// Acquire the next presentable image, signalling `signal` when it is ready
    fn acquire_next_image(&mut self, signal: Self::Semaphore, timeout_ns: u64) -> VulkanResult<AcquiredImage>;

    /// Make the command buffer for `image_index` ready for submission
    fn prepare_commands(&mut self, image_index: u32) -> VulkanResult<()>;

    /// Submit the image's commands
    fn submit(
        &mut self,
        image_index: u32,
        wait: Self::Semaphore,
        signal: Self::Semaphore,
        fence: Self::Fence,
    ) -> VulkanResult<()>;

    /// Queue the image for presentation after `wait` is signaled
    fn present(&mut self, image_index: u32, wait: Self::Semaphore) -> VulkanResult<PresentStatus>;

    /// Drain the device and rebuild the swapchain and everything derived from it
    ///
    /// Returns the new image count, or `None` when the surface cannot be
    /// rebuilt right now (for example the window closed while minimized).
    fn recreate_swapchain(&mut self) -> VulkanResult<Option<usize>>;

    /// Block until the device has finished all submitted work
    fn wait_idle(&mut self) -> VulkanResult<()>;
}
