//! Command pool and per-image command buffers
//!
//! The draw sequence is fixed, so every swapchain image gets one primary
//! command buffer recorded up front and reused each frame. The buffers are
//! re-recorded whenever the swapchain (and with it the framebuffers) changes.

use ash::{vk, Device};

use super::error::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe { device.create_command_pool(&pool_create_info, None) }
            .map_err(VulkanError::creating("command pool"))?;

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(VulkanError::creating("command buffers"))
    }

    /// Return buffers to the pool; they must not be pending execution
    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe {
            self.device.free_command_buffers(self.command_pool, command_buffers);
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// A command buffer between `vkBeginCommandBuffer` and `vkEndCommandBuffer`
pub struct RecordingSession<'a> {
    device: &'a Device,
    command_buffer: vk::CommandBuffer,
}

impl<'a> RecordingSession<'a> {
    /// Begin recording a buffer that may be submitted many times
    pub fn begin(device: &'a Device, command_buffer: vk::CommandBuffer) -> VulkanResult<Self> {
        let begin_info = vk::CommandBufferBeginInfo::builder();

        unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(VulkanError::creating("command buffer recording"))?;

        Ok(Self { device, command_buffer })
    }

    /// Begin a render pass; it ends when the returned guard is dropped
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> ActiveRenderPass<'_, 'a> {
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        ActiveRenderPass { session: self }
    }

    /// Finish recording
    pub fn end(self) -> VulkanResult<vk::CommandBuffer> {
        unsafe { self.device.end_command_buffer(self.command_buffer) }
            .map_err(VulkanError::creating("command buffer recording"))?;
        Ok(self.command_buffer)
    }
}

/// Render pass scope inside a [`RecordingSession`]
pub struct ActiveRenderPass<'s, 'a> {
    session: &'s mut RecordingSession<'a>,
}

impl ActiveRenderPass<'_, '_> {
    /// Set dynamic viewport 0
    pub fn set_viewport(&mut self, viewport: &vk::Viewport) {
        unsafe {
            self.session
                .device
                .cmd_set_viewport(self.session.command_buffer, 0, &[*viewport]);
        }
    }

    /// Set dynamic scissor 0
    pub fn set_scissor(&mut self, scissor: &vk::Rect2D) {
        unsafe {
            self.session
                .device
                .cmd_set_scissor(self.session.command_buffer, 0, &[*scissor]);
        }
    }

    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.session.device.cmd_bind_pipeline(
                self.session.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Non-indexed draw
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.session.device.cmd_draw(
                self.session.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }
}

impl Drop for ActiveRenderPass<'_, '_> {
    fn drop(&mut self) {
        unsafe {
            self.session.device.cmd_end_render_pass(self.session.command_buffer);
        }
    }
}

/// What every per-image command buffer draws
#[derive(Debug, Clone, Copy)]
pub struct DrawParameters {
    /// Render pass the framebuffers were created for
    pub render_pass: vk::RenderPass,
    /// Pipeline with dynamic viewport and scissor
    pub pipeline: vk::Pipeline,
    /// Swapchain extent
    pub extent: vk::Extent2D,
    /// Color the attachment is cleared to
    pub clear_color: [f32; 4],
    /// Vertices drawn from the pipeline's built-in geometry
    pub vertex_count: u32,
}

/// Full-extent viewport with depth range 0..1
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Full-extent rectangle at the origin
pub fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Pool plus one recorded command buffer per swapchain image
pub struct CommandRecorder {
    command_buffers: Vec<vk::CommandBuffer>,
    pool: CommandPool,
    device: Device,
}

impl CommandRecorder {
    /// Create the pool on the graphics family
    pub fn new(device: &Device, graphics_family: u32) -> VulkanResult<Self> {
        Ok(Self {
            command_buffers: Vec::new(),
            pool: CommandPool::new(device.clone(), graphics_family)?,
            device: device.clone(),
        })
    }

    /// Record one command buffer per framebuffer, replacing earlier recordings
    ///
    /// Previous buffers must no longer be pending execution.
    pub fn record(&mut self, framebuffers: &[vk::Framebuffer], params: &DrawParameters) -> VulkanResult<()> {
        self.free();

        let count = u32::try_from(framebuffers.len())
            .map_err(|_| VulkanError::creating("command buffers")(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;
        self.command_buffers = self.pool.allocate_command_buffers(count)?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: params.clear_color,
            },
        }];
        let area = full_rect(params.extent);
        let viewport = full_viewport(params.extent);

        for (&command_buffer, &framebuffer) in self.command_buffers.iter().zip(framebuffers) {
            let mut session = RecordingSession::begin(&self.device, command_buffer)?;
            {
                let mut pass = session.begin_render_pass(params.render_pass, framebuffer, area, &clear_values);
                pass.bind_pipeline(params.pipeline);
                pass.set_viewport(&viewport);
                pass.set_scissor(&area);
                pass.draw(params.vertex_count, 1, 0, 0);
            }
            session.end()?;
        }

        log::debug!("Recorded {} command buffers", self.command_buffers.len());
        Ok(())
    }

    /// Command buffer for a swapchain image
    pub fn command_buffer(&self, image_index: usize) -> Option<vk::CommandBuffer> {
        self.command_buffers.get(image_index).copied()
    }

    /// Number of recorded buffers
    pub fn len(&self) -> usize {
        self.command_buffers.len()
    }

    /// No buffers recorded
    pub fn is_empty(&self) -> bool {
        self.command_buffers.is_empty()
    }

    /// Release recorded buffers back to the pool
    pub fn free(&mut self) {
        self.pool.free_command_buffers(&self.command_buffers);
        self.command_buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_viewport_covers_extent() {
        let viewport = full_viewport(vk::Extent2D { width: 800, height: 600 });
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_full_rect_at_origin() {
        let rect = full_rect(vk::Extent2D { width: 3, height: 4 });
        assert_eq!(rect.offset.x, 0);
        assert_eq!(rect.offset.y, 0);
        assert_eq!(rect.extent, vk::Extent2D { width: 3, height: 4 });
    }
}
