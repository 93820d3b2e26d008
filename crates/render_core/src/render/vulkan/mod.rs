//! Vulkan backend
//!
//! RAII wrappers for every object the presenter creates, the selection and
//! swapchain policies, and the [`Presenter`] tying them together.

pub mod commands;
pub mod device;
pub mod device_selector;
pub mod diagnostics;
pub mod error;
pub mod framebuffer;
pub mod instance;
pub mod pipeline;
pub mod presenter;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod window;

pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder, DrawParameters, RecordingSession};
pub use device::LogicalDevice;
pub use device_selector::{DeviceCapability, PhysicalDeviceInfo, QueueFamilyIndices, Unsuitability};
pub use diagnostics::{CapturingSink, DiagnosticsSink, LogSink, MessageCategory, Severity};
pub use error::{ErrorKind, VulkanError, VulkanResult};
pub use framebuffer::Framebuffer;
pub use instance::{InstanceConfig, InstanceContext};
pub use pipeline::{GraphicsPipeline, PipelineDescriptor, ShaderModule};
pub use presenter::Presenter;
pub use render_pass::RenderPass;
pub use surface::{Surface, SurfaceEvents, SurfaceProvider, SurfaceSupport};
pub use swapchain::{SharingPolicy, Swapchain};
pub use sync::{Fence, FrameSync, Semaphore};
pub use window::{Window, WindowError, WindowResult};
