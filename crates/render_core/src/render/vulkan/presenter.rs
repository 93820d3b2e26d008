//! Presentation root
//!
//! [`Presenter`] creates every Vulkan object in dependency order and owns it
//! until teardown. Field declaration order is the release order: sync
//! objects, command pool, framebuffers, pipeline, render pass, swapchain,
//! device, surface, diagnostics messenger, instance.

use ash::vk;

use super::commands::{CommandRecorder, DrawParameters};
use super::device::LogicalDevice;
use super::device_selector::{required_device_extensions, PhysicalDeviceInfo};
use super::diagnostics::DiagnosticsSink;
use super::error::{ErrorKind, VulkanError, VulkanResult};
use super::framebuffer::Framebuffer;
use super::instance::{InstanceConfig, InstanceContext};
use super::pipeline::{GraphicsPipeline, PipelineDescriptor};
use super::render_pass::RenderPass;
use super::surface::{Surface, SurfaceProvider};
use super::swapchain::Swapchain;
use super::sync::{self, FrameSync};
use crate::config::PresenterConfig;
use crate::render::frame::{AcquiredImage, FrameBackend, FrameScheduler, FrameSlot, FrameStatus, PresentStatus};
use crate::render::shader_source::{ShaderCache, ShaderSource};

/// Surface format the swapchain switched to, if it differs from `current`
fn changed_format(current: vk::Format, swapchain: vk::Format) -> Option<vk::Format> {
    (current != swapchain).then_some(swapchain)
}

/// Block on window events until the framebuffer has a nonzero size
///
/// Returns `None` if the window is closed first.
fn wait_for_usable_extent(provider: &mut dyn SurfaceProvider) -> Option<vk::Extent2D> {
    loop {
        let extent = provider.framebuffer_extent();
        if extent.width > 0 && extent.height > 0 {
            return Some(extent);
        }
        if provider.should_close() {
            return None;
        }
        log::trace!("Framebuffer is zero-sized; waiting for events");
        if provider.wait_events().close_requested {
            return None;
        }
    }
}

/// Owns the device, swapchain and frame loop for one window
pub struct Presenter {
    scheduler: FrameScheduler<vk::Fence, vk::Semaphore>,
    frame_syncs: Vec<FrameSync>,
    commands: CommandRecorder,
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    swapchain: Option<Swapchain>,
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    surface: Surface,
    instance: InstanceContext,
    descriptor: PipelineDescriptor,
    shaders: ShaderCache,
    color_format: vk::Format,
    clear_color: [f32; 4],
}

impl Presenter {
    /// Create everything needed to present to `provider`'s window
    ///
    /// Objects created before a failure are released in reverse order.
    pub fn new(
        provider: &mut dyn SurfaceProvider,
        config: &PresenterConfig,
        descriptor: &PipelineDescriptor,
        shaders: &dyn ShaderSource,
        sink: Box<dyn DiagnosticsSink>,
    ) -> VulkanResult<Self> {
        log::debug!("Creating presenter...");

        // Kept in memory so the pipeline can be rebuilt for a new surface format
        let shaders = ShaderCache::preload(
            shaders,
            &[descriptor.vertex_shader.as_str(), descriptor.fragment_shader.as_str()],
        )?;

        let extensions = provider.required_instance_extensions()?;
        let instance = InstanceContext::create(&extensions, &InstanceConfig::from_presenter_config(config), sink)?;
        let surface = Surface::new(instance.entry(), instance.instance(), provider)?;
        let physical_device = PhysicalDeviceInfo::select(instance.instance(), &surface)?;
        let device = LogicalDevice::open(
            instance.instance(),
            &physical_device,
            &required_device_extensions(),
            instance.layers(),
        )?;

        let extent = wait_for_usable_extent(provider).ok_or(VulkanError::SurfaceInvalidated)?;
        let support = surface.support(physical_device.device)?;
        let swapchain = Swapchain::create(&device, &surface, &support, extent)?;
        let color_format = swapchain.format().format;

        let render_pass = RenderPass::new_present_pass(device.device().clone(), color_format)?;
        let pipeline = GraphicsPipeline::new(device.device(), render_pass.handle(), descriptor, &shaders)?;
        let framebuffers =
            Framebuffer::for_views(device.device(), render_pass.handle(), swapchain.image_views(), swapchain.extent())?;

        let mut commands = CommandRecorder::new(device.device(), device.graphics_family())?;
        let params = DrawParameters {
            render_pass: render_pass.handle(),
            pipeline: pipeline.handle(),
            extent: swapchain.extent(),
            clear_color: config.clear_color,
            vertex_count: pipeline.vertex_count(),
        };
        commands.record(&framebuffer_handles(&framebuffers), &params)?;

        let frame_syncs = FrameSync::create_ring(device.device(), config.effective_frames_in_flight())?;
        let slots = frame_syncs
            .iter()
            .map(|sync| {
                FrameSlot::new(
                    sync.image_available.handle(),
                    sync.render_finished.handle(),
                    sync.in_flight.handle(),
                )
            })
            .collect();
        let scheduler = FrameScheduler::new(slots, swapchain.image_count(), config.fence_timeout_ns());

        log::info!(
            "Presenter ready: {} frames in flight, {} swapchain images",
            frame_syncs.len(),
            swapchain.image_count()
        );

        Ok(Self {
            scheduler,
            frame_syncs,
            commands,
            framebuffers,
            pipeline,
            render_pass,
            swapchain: Some(swapchain),
            device,
            physical_device,
            surface,
            instance,
            descriptor: descriptor.clone(),
            shaders,
            color_format,
            clear_color: config.clear_color,
        })
    }

    /// Render and present one frame
    pub fn draw_frame(&mut self, provider: &mut dyn SurfaceProvider) -> VulkanResult<FrameStatus> {
        let Self {
            scheduler,
            commands,
            framebuffers,
            pipeline,
            render_pass,
            swapchain,
            device,
            physical_device,
            surface,
            descriptor,
            shaders,
            color_format,
            clear_color,
            ..
        } = self;

        let mut backend = DeviceFrameBackend {
            device,
            physical_device,
            surface,
            render_pass,
            pipeline,
            swapchain,
            framebuffers,
            commands,
            provider,
            descriptor,
            shaders,
            color_format,
            clear_color: *clear_color,
        };
        scheduler.draw_frame(&mut backend)
    }

    /// Rebuild the swapchain after the next presented frame
    pub fn notify_resized(&mut self) {
        self.scheduler.request_recreate();
    }

    /// Drain the GPU so the presenter can be dropped
    pub fn shutdown(&mut self, provider: &mut dyn SurfaceProvider) -> VulkanResult<()> {
        let Self {
            scheduler,
            commands,
            framebuffers,
            pipeline,
            render_pass,
            swapchain,
            device,
            physical_device,
            surface,
            descriptor,
            shaders,
            color_format,
            clear_color,
            ..
        } = self;

        let mut backend = DeviceFrameBackend {
            device,
            physical_device,
            surface,
            render_pass,
            pipeline,
            swapchain,
            framebuffers,
            commands,
            provider,
            descriptor,
            shaders,
            color_format,
            clear_color: *clear_color,
        };
        scheduler.shutdown(&mut backend)
    }

    /// Frame scheduler, for its counters
    pub fn scheduler(&self) -> &FrameScheduler<vk::Fence, vk::Semaphore> {
        &self.scheduler
    }

    /// Selected physical device
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Current swapchain, absent only while a rebuild is pending
    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    /// Whether validation output is being forwarded
    pub fn has_diagnostics(&self) -> bool {
        self.instance.has_diagnostics()
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to drain device before teardown: {}", e);
        }
        if cfg!(debug_assertions) {
            // A fence reset before a failed submit can never signal
            let pending = self
                .frame_syncs
                .iter()
                .filter(|sync| !sync.in_flight.is_signaled().unwrap_or(true))
                .count();
            if pending > 0 {
                log::error!("{} frame fence(s) still unsignaled at teardown", pending);
            }
        }
        log::info!(
            "Presenter released after {} frames and {} swapchain rebuilds",
            self.scheduler.frames_presented(),
            self.scheduler.recreations()
        );
    }
}

fn framebuffer_handles(framebuffers: &[Framebuffer]) -> Vec<vk::Framebuffer> {
    framebuffers.iter().map(Framebuffer::handle).collect()
}

/// The presenter's objects, borrowed for one scheduler call
struct DeviceFrameBackend<'a> {
    device: &'a LogicalDevice,
    physical_device: &'a PhysicalDeviceInfo,
    surface: &'a Surface,
    render_pass: &'a mut RenderPass,
    pipeline: &'a mut GraphicsPipeline,
    swapchain: &'a mut Option<Swapchain>,
    framebuffers: &'a mut Vec<Framebuffer>,
    commands: &'a mut CommandRecorder,
    provider: &'a mut dyn SurfaceProvider,
    descriptor: &'a PipelineDescriptor,
    shaders: &'a ShaderCache,
    color_format: &'a mut vk::Format,
    clear_color: [f32; 4],
}

impl DeviceFrameBackend<'_> {
    fn rebuild(&mut self, extent: vk::Extent2D) -> VulkanResult<usize> {
        self.device.wait_idle()?;

        self.commands.free();
        self.framebuffers.clear();
        *self.swapchain = None;

        let support = self.surface.support(self.physical_device.device)?;
        let swapchain = Swapchain::create(self.device, self.surface, &support, extent)?;
        if let Some(format) = changed_format(*self.color_format, swapchain.format().format) {
            log::info!("Surface format changed to {:?}; rebuilding render pass and pipeline", format);
            let render_pass = RenderPass::new_present_pass(self.device.device().clone(), format)?;
            let pipeline =
                GraphicsPipeline::new(self.device.device(), render_pass.handle(), self.descriptor, self.shaders)?;
            *self.pipeline = pipeline;
            *self.render_pass = render_pass;
            *self.color_format = format;
        }

        *self.framebuffers = Framebuffer::for_views(
            self.device.device(),
            self.render_pass.handle(),
            swapchain.image_views(),
            swapchain.extent(),
        )?;
        let params = DrawParameters {
            render_pass: self.render_pass.handle(),
            pipeline: self.pipeline.handle(),
            extent: swapchain.extent(),
            clear_color: self.clear_color,
            vertex_count: self.pipeline.vertex_count(),
        };
        self.commands.record(&framebuffer_handles(self.framebuffers.as_slice()), &params)?;

        let image_count = swapchain.image_count();
        *self.swapchain = Some(swapchain);
        Ok(image_count)
    }
}

impl FrameBackend for DeviceFrameBackend<'_> {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;

    fn wait_for_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<()> {
        sync::wait_for_fence(self.device.device(), fence, timeout_ns)
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.device.device().reset_fences(&[fence]) }.map_err(VulkanError::from_api)
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore, timeout_ns: u64) -> VulkanResult<AcquiredImage> {
        // A missing swapchain is rebuilt through the same path as a stale one
        let swapchain = self.swapchain.as_ref().ok_or(VulkanError::SurfaceInvalidated)?;
        let (index, suboptimal) = unsafe {
            swapchain
                .loader()
                .acquire_next_image(swapchain.handle(), timeout_ns, signal, vk::Fence::null())
        }
        .map_err(|result| VulkanError::from_wait(result, timeout_ns))?;

        Ok(AcquiredImage { index, suboptimal })
    }

    fn prepare_commands(&mut self, image_index: u32) -> VulkanResult<()> {
        // Recorded up front; nothing to do unless the recording is missing
        match self.commands.command_buffer(image_index as usize) {
            Some(_) => Ok(()),
            None => Err(VulkanError::ResourceCreation {
                resource: "command buffer for acquired image",
                result: vk::Result::ERROR_UNKNOWN,
            }),
        }
    }

    fn submit(
        &mut self,
        image_index: u32,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VulkanResult<()> {
        let command_buffer = self
            .commands
            .command_buffer(image_index as usize)
            .ok_or(VulkanError::ResourceCreation {
                resource: "command buffer for acquired image",
                result: vk::Result::ERROR_UNKNOWN,
            })?;

        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [signal];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device()
                .queue_submit(self.device.graphics_queue(), &[submit_info.build()], fence)
        }
        .map_err(VulkanError::from_api)
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VulkanResult<PresentStatus> {
        let swapchain = self.swapchain.as_ref().ok_or(VulkanError::SurfaceInvalidated)?;

        let wait_semaphores = [wait];
        let swapchains = [swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe { swapchain.loader().queue_present(self.device.present_queue(), &present_info) }
            .map_err(VulkanError::from_api)?;

        Ok(if suboptimal {
            PresentStatus::Suboptimal
        } else {
            PresentStatus::Optimal
        })
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<Option<usize>> {
        let Some(extent) = wait_for_usable_extent(self.provider) else {
            log::debug!("Window closed while minimized; swapchain not rebuilt");
            return Ok(None);
        };

        match self.rebuild(extent) {
            Ok(image_count) => Ok(Some(image_count)),
            // Surface went stale again mid-rebuild; try on the next frame
            Err(e) if e.kind() == ErrorKind::SurfaceInvalidated => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn wait_idle(&mut self) -> VulkanResult<()> {
        self.device.wait_idle()
    }
}
