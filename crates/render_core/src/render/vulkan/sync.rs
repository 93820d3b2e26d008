//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for the two kinds of synchronization objects used by the
//! frame loop.
//!
//! ## GPU-GPU ordering (semaphores)
//!
//! ```text
//! acquire:  signal image_available
//! submit:   wait image_available at COLOR_ATTACHMENT_OUTPUT, signal render_finished
//! present:  wait render_finished
//! ```
//!
//! ## CPU-GPU completion (fences)
//!
//! ```text
//! CPU: reset fence, submit with fence
//! GPU: [executing]                 -> fence signaled
//! CPU: wait on fence before reusing the slot's semaphores or command buffer
//! ```
//!
//! Fences are created signaled so the first wait on a fresh frame slot returns
//! immediately.

use ash::{vk, Device};

use super::error::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic resource management
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe { device.create_semaphore(&create_info, None) }
            .map_err(VulkanError::creating("semaphore"))?;

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe { device.create_fence(&create_info, None) }.map_err(VulkanError::creating("fence"))?;

        Ok(Self { device, fence })
    }

    /// Non-blocking status query
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        unsafe { self.device.get_fence_status(self.fence) }.map_err(VulkanError::from_api)
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Wait on a raw fence handle owned elsewhere
pub fn wait_for_fence(device: &Device, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<()> {
    unsafe { device.wait_for_fences(&[fence], true, timeout_ns) }
        .map_err(|result| VulkanError::from_wait(result, timeout_ns))
}

/// Synchronization objects for one frame slot
pub struct FrameSync {
    /// Signaled when the acquired image may be rendered to
    pub image_available: Semaphore,
    /// Signaled when rendering finished; presentation waits on it
    pub render_finished: Semaphore,
    /// Signaled when the slot's submission completed on the GPU
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device.clone(), true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// One set of objects per frame slot
    pub fn create_ring(device: &Device, frames_in_flight: usize) -> VulkanResult<Vec<Self>> {
        (0..frames_in_flight).map(|_| Self::new(device)).collect()
    }
}
