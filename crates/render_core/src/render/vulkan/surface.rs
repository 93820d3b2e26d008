//! Vulkan surface management
//!
//! The platform window is abstracted behind [`SurfaceProvider`]; this module
//! only owns the resulting `VkSurfaceKHR` and queries what it supports.

use ash::extensions::khr;
use ash::{vk, Entry, Instance};

use super::error::{VulkanError, VulkanResult};

/// Window events relevant to presentation since the last poll
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceEvents {
    /// The framebuffer size changed
    pub resized: bool,
    /// The user asked to close the window
    pub close_requested: bool,
}

/// Platform window able to back a Vulkan surface
pub trait SurfaceProvider {
    /// Instance extensions the platform needs to create surfaces
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create a surface for this window on `instance`
    fn create_surface(&mut self, entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Current framebuffer size in pixels
    fn framebuffer_extent(&self) -> vk::Extent2D;

    /// Whether the window has been asked to close
    fn should_close(&self) -> bool;

    /// Pump pending events without blocking
    fn poll_events(&mut self) -> SurfaceEvents;

    /// Block until at least one event arrives
    fn wait_events(&mut self) -> SurfaceEvents;
}

/// What a physical device supports for a surface
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Image count, extent and transform limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format and color space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan surface wrapper for presentation
pub struct Surface {
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Create a new surface from a window
    pub fn new(entry: &Entry, instance: &Instance, provider: &mut dyn SurfaceProvider) -> VulkanResult<Self> {
        let surface_loader = khr::Surface::new(entry, instance);
        let surface = provider.create_surface(entry, instance)?;
        log::debug!("Window surface created");

        Ok(Self {
            surface_loader,
            surface,
        })
    }

    /// Get the underlying surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub fn loader(&self) -> &khr::Surface {
        &self.surface_loader
    }

    /// Whether queue family `family` of `physical_device` can present here
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> VulkanResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, family, self.surface)
                .map_err(VulkanError::from_api)
        }
    }

    /// Query the capability report for a physical device
    pub fn support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(VulkanError::from_api)?;
            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(VulkanError::from_api)?;
            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .map_err(VulkanError::from_api)?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_adequacy() {
        let mut support = SurfaceSupport::default();
        assert!(!support.is_adequate());

        support.formats.push(vk::SurfaceFormatKHR::default());
        assert!(!support.is_adequate());

        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_adequate());
    }
}
