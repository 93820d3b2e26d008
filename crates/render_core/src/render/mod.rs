//! Rendering: the Vulkan presentation core and the frame scheduler

pub mod frame;
pub mod shader_source;
pub mod vulkan;
