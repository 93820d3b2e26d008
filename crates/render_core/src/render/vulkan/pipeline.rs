//! Fixed graphics pipeline
//!
//! The pipeline draws geometry generated in the vertex shader, so there is no
//! vertex input and the layout is empty. Viewport and scissor are dynamic so
//! the pipeline survives swapchain recreation.

use ash::{vk, Device};
use std::ffi::CString;
use std::io::Cursor;

use super::error::{VulkanError, VulkanResult};
use crate::config::ShaderConfig;
use crate::render::shader_source::{ShaderSource, ShaderSourceError};

/// Externally supplied description of the fixed pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDescriptor {
    /// Logical name of the vertex shader
    pub vertex_shader: String,
    /// Logical name of the fragment shader
    pub fragment_shader: String,
    /// Entry point in both shaders
    pub entry_point: String,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Faces to cull
    pub cull_mode: vk::CullModeFlags,
    /// Winding of front faces
    pub front_face: vk::FrontFace,
    /// Vertices per draw
    pub vertex_count: u32,
}

impl PipelineDescriptor {
    /// Triangle defaults with the configured shader names
    pub fn from_shader_config(shaders: &ShaderConfig) -> Self {
        Self {
            vertex_shader: shaders.vertex.clone(),
            fragment_shader: shaders.fragment.clone(),
            ..Self::default()
        }
    }
}

impl Default for PipelineDescriptor {
    fn default() -> Self {
        let shaders = ShaderConfig::default();
        Self {
            vertex_shader: shaders.vertex,
            fragment_shader: shaders.fragment,
            entry_point: "main".to_string(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            vertex_count: 3,
        }
    }
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a module from SPIR-V bytes
    pub fn from_bytes(device: Device, name: &str, bytes: &[u8]) -> VulkanResult<Self> {
        // Copies into u32 words so unaligned buffers are fine
        let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| ShaderSourceError::InvalidSpirv {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let module = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(VulkanError::creating("shader module"))?;

        Ok(Self { device, module })
    }

    /// Load `name` from a shader source and create the module
    pub fn load(device: Device, source: &dyn ShaderSource, name: &str) -> VulkanResult<Self> {
        let bytes = source.load(name)?;
        Self::from_bytes(device, name, &bytes)
    }

    /// Get the module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    vertex_count: u32,
}

impl GraphicsPipeline {
    /// Build the pipeline for `render_pass`
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        descriptor: &PipelineDescriptor,
        shaders: &dyn ShaderSource,
    ) -> VulkanResult<Self> {
        // Modules only need to live until the pipeline is created
        let vertex_shader = ShaderModule::load(device.clone(), shaders, &descriptor.vertex_shader)?;
        let fragment_shader = ShaderModule::load(device.clone(), shaders, &descriptor.fragment_shader)?;

        let entry_point = CString::new(descriptor.entry_point.as_str()).map_err(|_| ShaderSourceError::InvalidSpirv {
            name: descriptor.vertex_shader.clone(),
            reason: "entry point contains a NUL byte".to_string(),
        })?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader.handle())
                .name(&entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader.handle())
                .name(&entry_point)
                .build(),
        ];

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(descriptor.topology)
            .primitive_restart_enable(false);

        // Counts only; the values are set while recording
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(descriptor.cull_mode)
            .front_face(descriptor.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(VulkanError::creating("pipeline layout"))?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match created {
            Ok(pipelines) => pipelines[0],
            Err((_, result)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::creating("graphics pipeline")(result));
            }
        };

        log::debug!(
            "Graphics pipeline created from '{}' and '{}'",
            descriptor.vertex_shader,
            descriptor.fragment_shader
        );

        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
            vertex_count: descriptor.vertex_count,
        })
    }

    /// Get the pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Vertices drawn per frame
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults_match_triangle() {
        let descriptor = PipelineDescriptor::default();
        assert_eq!(descriptor.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(descriptor.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(descriptor.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(descriptor.vertex_count, 3);
        assert_eq!(descriptor.entry_point, "main");
    }

    #[test]
    fn test_descriptor_uses_configured_shaders() {
        let descriptor = PipelineDescriptor::from_shader_config(&ShaderConfig::new("quad.vert", "quad.frag"));
        assert_eq!(descriptor.vertex_shader, "quad.vert");
        assert_eq!(descriptor.fragment_shader, "quad.frag");
        assert_eq!(descriptor.vertex_count, 3);
    }
}
