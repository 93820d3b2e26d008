//! Vulkan error types
//!
//! Every fallible operation in the presentation core returns [`VulkanResult`].
//! Callers that only need to decide what to do next should match on
//! [`VulkanError::kind`] rather than on individual variants.

use ash::vk;
use thiserror::Error;

use crate::render::shader_source::ShaderSourceError;

/// Coarse classification of a [`VulkanError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Requested layers or extensions are missing, or the loader is absent
    Configuration,
    /// No physical device satisfies the presentation requirements
    DeviceNotFound,
    /// The surface no longer matches the swapchain; recreate and retry
    SurfaceInvalidated,
    /// A fence or acquire did not complete within the configured bound
    SynchronizationTimeout,
    /// Creating a GPU object or submitting work failed
    ResourceCreation,
}

impl ErrorKind {
    /// Whether the frame loop can continue after rebuilding the swapchain
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::SurfaceInvalidated)
    }
}

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The Vulkan loader could not be found or initialised
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// Requested instance layers are not installed
    #[error("Validation layers requested, but not available: {}", missing.join(", "))]
    LayersUnavailable {
        /// Names of the layers that were not enumerated
        missing: Vec<String>,
    },

    /// The driver rejected instance creation because of a missing extension
    #[error("Required instance extension not present")]
    ExtensionUnavailable,

    /// The instance reports no physical devices at all
    #[error("Failed to find GPUs with Vulkan support")]
    NoDevicesFound,

    /// Devices exist but none can present to the surface
    #[error("Failed to find a suitable GPU")]
    NoSuitableDevice,

    /// The swapchain is out of date or the surface was lost
    #[error("Surface invalidated; swapchain must be recreated")]
    SurfaceInvalidated,

    /// A bounded wait expired
    #[error("Timed out after {timeout_ns} ns waiting for the GPU")]
    SynchronizationTimeout {
        /// The bound that expired, in nanoseconds
        timeout_ns: u64,
    },

    /// Creating a named GPU object failed
    #[error("Failed to create {resource}: {result:?}")]
    ResourceCreation {
        /// Human-readable name of the object being created
        resource: &'static str,
        /// Result reported by the driver
        result: vk::Result,
    },

    /// Shader bytecode could not be loaded
    #[error("Shader error: {0}")]
    Shader(#[from] ShaderSourceError),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

impl VulkanError {
    /// Classify a raw API result
    ///
    /// Surface staleness and timeouts get their own variants so the frame loop
    /// can react to them; everything else is wrapped as [`VulkanError::Api`].
    pub fn from_api(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::ERROR_SURFACE_LOST_KHR => {
                Self::SurfaceInvalidated
            }
            vk::Result::TIMEOUT | vk::Result::NOT_READY => Self::SynchronizationTimeout { timeout_ns: 0 },
            vk::Result::ERROR_LAYER_NOT_PRESENT => Self::LayersUnavailable { missing: Vec::new() },
            vk::Result::ERROR_EXTENSION_NOT_PRESENT => Self::ExtensionUnavailable,
            other => Self::Api(other),
        }
    }

    /// Classify a raw result from a wait bounded by `timeout_ns`
    pub fn from_wait(result: vk::Result, timeout_ns: u64) -> Self {
        match Self::from_api(result) {
            Self::SynchronizationTimeout { .. } => Self::SynchronizationTimeout { timeout_ns },
            other => other,
        }
    }

    /// Returns a closure that tags a creation failure with the resource name
    pub fn creating(resource: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::ResourceCreation { resource, result }
    }

    /// Coarse classification used by callers to decide on recovery
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::LayersUnavailable { .. } | Self::ExtensionUnavailable | Self::Loading(_) => {
                ErrorKind::Configuration
            }
            Self::NoDevicesFound | Self::NoSuitableDevice => ErrorKind::DeviceNotFound,
            Self::SurfaceInvalidated => ErrorKind::SurfaceInvalidated,
            Self::SynchronizationTimeout { .. } => ErrorKind::SynchronizationTimeout,
            Self::ResourceCreation { .. } | Self::Api(_) | Self::Shader(_) => ErrorKind::ResourceCreation,
        }
    }
}
