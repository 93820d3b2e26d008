//! Physical device selection
//!
//! Every enumerated device is queried into a [`DeviceCapability`]; the first one
//! that can draw, present to the surface and create a swapchain wins.
//! Enumeration order is the only preference, so selection is deterministic
//! for a given driver setup.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Instance};
use std::ffi::CStr;

use super::error::{VulkanError, VulkanResult};
use super::surface::{Surface, SurfaceSupport};

/// Queue families able to draw and to present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family supporting graphics
    pub graphics: Option<u32>,
    /// First family able to present to the surface
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both families found
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Graphics and present indices once complete
    pub fn resolved(&self) -> Option<(u32, u32)> {
        Some((self.graphics?, self.present?))
    }
}

/// Minimal description of one queue family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyReport {
    /// Number of queues in the family
    pub queue_count: u32,
    /// Supports graphics operations
    pub graphics: bool,
    /// Can present to the surface
    pub present: bool,
}

/// Scan families in order, stopping once both roles are filled
///
/// Families with no queues are never chosen.
pub fn find_queue_families(families: &[QueueFamilyReport]) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in (0u32..).zip(families) {
        if family.queue_count == 0 {
            continue;
        }
        if family.graphics && indices.graphics.is_none() {
            indices.graphics = Some(index);
        }
        if family.present && indices.present.is_none() {
            indices.present = Some(index);
        }
        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Everything selection needs to know about one device
#[derive(Debug, Clone, Default)]
pub struct DeviceCapability {
    /// Device name as reported by the driver
    pub name: String,
    /// Why the device could not be queried, if it could not
    pub query_failure: Option<String>,
    /// Graphics and present families
    pub queue_families: QueueFamilyIndices,
    /// Names of supported device extensions
    pub extensions: Vec<String>,
    /// Surface report; absent when required extensions are missing
    pub surface: Option<SurfaceSupport>,
}

/// Why a candidate was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsuitability {
    /// Querying the device failed
    QueryFailed(String),
    /// No graphics family, or no family able to present
    IncompleteQueueFamilies,
    /// Required device extensions not supported
    MissingExtensions(Vec<String>),
    /// No surface formats or no present modes
    InadequateSurface,
}

impl DeviceCapability {
    /// Capability of a device whose queries failed; never suitable
    pub fn query_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query_failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Check the three suitability conditions in order
    pub fn evaluate(&self, required_extensions: &[&str]) -> Result<(), Unsuitability> {
        if let Some(reason) = &self.query_failure {
            return Err(Unsuitability::QueryFailed(reason.clone()));
        }
        if !self.queue_families.is_complete() {
            return Err(Unsuitability::IncompleteQueueFamilies);
        }

        let missing: Vec<String> = required_extensions
            .iter()
            .filter(|required| !self.extensions.iter().any(|available| available == *required))
            .map(|required| (*required).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Unsuitability::MissingExtensions(missing));
        }

        match &self.surface {
            Some(support) if support.is_adequate() => Ok(()),
            _ => Err(Unsuitability::InadequateSurface),
        }
    }
}

/// Index of the first suitable candidate
pub fn select_candidate(candidates: &[DeviceCapability], required_extensions: &[&str]) -> VulkanResult<usize> {
    if candidates.is_empty() {
        return Err(VulkanError::NoDevicesFound);
    }

    for (index, candidate) in candidates.iter().enumerate() {
        match candidate.evaluate(required_extensions) {
            Ok(()) => return Ok(index),
            Err(reason) => log::debug!("Rejected device {} ({}): {:?}", index, candidate.name, reason),
        }
    }

    Err(VulkanError::NoSuitableDevice)
}

/// Device extensions every presenter needs
pub fn required_device_extensions() -> Vec<&'static str> {
    // The loader name is a static ASCII literal
    vec![SwapchainLoader::name().to_str().unwrap_or("VK_KHR_swapchain")]
}

/// Physical device selection and capabilities
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Query results for this device
    pub capability: DeviceCapability,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first device able to present to `surface`
    pub fn select(instance: &Instance, surface: &Surface) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::from_api)?;
        let required = required_device_extensions();

        // A device that fails to answer is rejected, not fatal
        let candidates: Vec<DeviceCapability> = devices
            .iter()
            .map(|&device| {
                let name = device_name(instance, device);
                log::debug!("Found GPU: {}", name);
                query_device(instance, device, surface, &required, name.clone())
                    .unwrap_or_else(|e| DeviceCapability::query_failed(name, e.to_string()))
            })
            .collect();

        let index = select_candidate(&candidates, &required)?;
        let device = devices[index];
        let capability = candidates[index].clone();
        let (graphics_family, present_family) = capability
            .queue_families
            .resolved()
            .ok_or(VulkanError::NoSuitableDevice)?;

        let properties = unsafe { instance.get_physical_device_properties(device) };
        log::info!("Selected GPU: {} ({:?})", capability.name, properties.device_type);
        log::debug!("Graphics queue family {}, present queue family {}", graphics_family, present_family);

        Ok(Self {
            device,
            properties,
            capability,
            graphics_family,
            present_family,
        })
    }

    /// Queue family indices as found during selection
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.capability.queue_families
    }
}

fn device_name(instance: &Instance, device: vk::PhysicalDevice) -> String {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn query_device(
    instance: &Instance,
    device: vk::PhysicalDevice,
    surface: &Surface,
    required_extensions: &[&str],
    name: String,
) -> VulkanResult<DeviceCapability> {
    let properties = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let families = (0u32..)
        .zip(&properties)
        .map(|(index, family)| {
            Ok(QueueFamilyReport {
                queue_count: family.queue_count,
                graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present: surface.supports_present(device, index)?,
            })
        })
        .collect::<VulkanResult<Vec<_>>>()?;

    let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
        .map_err(VulkanError::from_api)?
        .iter()
        .map(|property| {
            unsafe { CStr::from_ptr(property.extension_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect::<Vec<_>>();

    let has_extensions = required_extensions
        .iter()
        .all(|required| extensions.iter().any(|available| available == required));
    let surface = if has_extensions { Some(surface.support(device)?) } else { None };

    Ok(DeviceCapability {
        name,
        query_failure: None,
        queue_families: find_queue_families(&families),
        extensions,
        surface,
    })
}
