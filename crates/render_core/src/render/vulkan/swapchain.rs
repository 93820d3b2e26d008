//! Vulkan swapchain management
//!
//! The policy functions are pure so they can be checked without a device.
//! [`Swapchain`] owns the chain and one view per image; recreation builds a
//! fresh value after the previous one has been dropped.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use super::device::LogicalDevice;
use super::error::{VulkanError, VulkanResult};
use super::surface::{Surface, SurfaceSupport};

/// Preferred format: 8-bit BGRA in sRGB with nonlinear encoding
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX when available, otherwise FIFO which every implementation supports
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's extent, or the window hint clamped when the surface leaves it open
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, hint: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: hint.width.max(min.width).min(max.width),
        height: hint.height.max(min.height).min(max.height),
    }
}

/// One image above the minimum, limited by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// How swapchain images are shared between queue families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingPolicy {
    /// Single family owns the images
    Exclusive,
    /// Graphics and present families both access the images
    Concurrent([u32; 2]),
}

impl SharingPolicy {
    /// Vulkan sharing mode
    pub fn mode(&self) -> vk::SharingMode {
        match self {
            Self::Exclusive => vk::SharingMode::EXCLUSIVE,
            Self::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    /// Families listed in the create info
    pub fn families(&self) -> &[u32] {
        match self {
            Self::Exclusive => &[],
            Self::Concurrent(families) => families,
        }
    }
}

/// Concurrent sharing when graphics and present families differ
pub fn choose_sharing(graphics_family: u32, present_family: u32) -> SharingPolicy {
    if graphics_family == present_family {
        SharingPolicy::Exclusive
    } else {
        SharingPolicy::Concurrent([graphics_family, present_family])
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for `surface` from a fresh capability report
    pub fn create(
        device: &LogicalDevice,
        surface: &Surface,
        support: &SurfaceSupport,
        window_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let format = choose_surface_format(&support.formats).ok_or(VulkanError::ResourceCreation {
            resource: "swapchain (no surface formats)",
            result: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
        })?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, window_extent);
        let image_count = choose_image_count(&support.capabilities);
        let sharing = choose_sharing(device.graphics_family(), device.present_family());

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing.mode())
            .queue_family_indices(sharing.families())
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain_loader = device.swapchain_loader().clone();
        let swapchain = unsafe { swapchain_loader.create_swapchain(&swapchain_create_info, None) }
            .map_err(VulkanError::creating("swapchain"))?;

        // From here on partial failures are released by Drop
        let mut chain = Self {
            device: device.device().clone(),
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            present_mode,
            extent,
        };

        chain.images = unsafe { chain.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(VulkanError::from_api)?;

        for &image in &chain.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { chain.device.create_image_view(&create_info, None) }
                .map_err(VulkanError::creating("swapchain image view"))?;
            chain.image_views.push(view);
        }

        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            chain.images.len(),
            format.format,
            present_mode
        );

        Ok(chain)
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get present mode
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Get swapchain images
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get image count
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get swapchain loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        log::debug!("Swapchain destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_preferred_format_found_anywhere() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[2]));
    }

    #[test]
    fn test_format_falls_back_to_first() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_present_mode_policy() {
        use vk::PresentModeKHR as Mode;
        assert_eq!(choose_present_mode(&[Mode::FIFO, Mode::MAILBOX]), Mode::MAILBOX);
        assert_eq!(choose_present_mode(&[Mode::IMMEDIATE, Mode::FIFO_RELAXED]), Mode::FIFO);
        assert_eq!(choose_present_mode(&[]), Mode::FIFO);
    }

    #[test]
    fn test_current_extent_wins() {
        let caps = capabilities((1280, 720), (1, 1), (4096, 4096));
        let hint = vk::Extent2D { width: 800, height: 600 };
        assert_eq!(choose_extent(&caps, hint), vk::Extent2D { width: 1280, height: 720 });
    }

    #[test]
    fn test_sentinel_extent_clamps_hint() {
        let caps = capabilities((u32::MAX, u32::MAX), (1, 1), (400, 1200));
        let hint = vk::Extent2D { width: 800, height: 600 };
        assert_eq!(choose_extent(&caps, hint), vk::Extent2D { width: 400, height: 600 });

        let caps = capabilities((u32::MAX, u32::MAX), (100, 100), (400, 1200));
        let hint = vk::Extent2D { width: 0, height: 0 };
        assert_eq!(choose_extent(&caps, hint), vk::Extent2D { width: 100, height: 100 });
    }

    #[test]
    fn test_image_count_bounds() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn test_sharing_policy() {
        let shared = choose_sharing(0, 0);
        assert_eq!(shared, SharingPolicy::Exclusive);
        assert_eq!(shared.mode(), vk::SharingMode::EXCLUSIVE);
        assert!(shared.families().is_empty());

        let split = choose_sharing(0, 2);
        assert_eq!(split.mode(), vk::SharingMode::CONCURRENT);
        assert_eq!(split.families(), &[0, 2]);
    }
}
