//! Logical device and queues

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};
use std::ffi::CString;
use std::os::raw::c_char;

use super::device_selector::PhysicalDeviceInfo;
use super::error::{VulkanError, VulkanResult};

/// Distinct queue family indices, sorted
pub fn unique_queue_families(graphics_family: u32, present_family: u32) -> Vec<u32> {
    let mut families = vec![graphics_family, present_family];
    families.sort_unstable();
    families.dedup();
    families
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    graphics_family: u32,
    present_family: u32,
    swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Open the device with one queue per distinct family
    pub fn open(
        instance: &Instance,
        physical_device: &PhysicalDeviceInfo,
        required_extensions: &[&str],
        layers: &[String],
    ) -> VulkanResult<Self> {
        let families = unique_queue_families(physical_device.graphics_family, physical_device.present_family);
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_names = to_cstrings(required_extensions.iter().copied())?;
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();
        // Ignored by current loaders; older implementations still read device layers
        let layer_names = to_cstrings(layers.iter().map(String::as_str))?;
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&device_features);

        let device = unsafe { instance.create_device(physical_device.device, &create_info, None) }
            .map_err(VulkanError::creating("logical device"))?;

        let graphics_queue = unsafe { device.get_device_queue(physical_device.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        log::debug!("Logical device created with {} queue famil(ies)", families.len());

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            graphics_family: physical_device.graphics_family,
            present_family: physical_device.present_family,
            swapchain_loader,
        })
    }

    /// Device function table
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Queue used for submission
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Queue used for presentation
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Index of the graphics queue family
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// Index of the presentation queue family
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Block until all queues are idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(VulkanError::from_api)
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            // Ensure device is idle before destruction
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
        log::debug!("Logical device destroyed");
    }
}

fn to_cstrings<'a>(names: impl Iterator<Item = &'a str>) -> VulkanResult<Vec<CString>> {
    names
        .map(|name| {
            CString::new(name).map_err(|_| VulkanError::Loading(format!("Name contains a NUL byte: {name}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_family_requested_once() {
        assert_eq!(unique_queue_families(0, 0), vec![0]);
    }

    #[test]
    fn test_distinct_families_sorted() {
        assert_eq!(unique_queue_families(2, 1), vec![1, 2]);
        assert_eq!(unique_queue_families(0, 3), vec![0, 3]);
    }
}
