//! # Render Core
//!
//! Vulkan device lifecycle and frame pacing for presenting to a window surface.
//!
//! ## Features
//!
//! - **Instance setup**: validation layer checks and an injectable diagnostics sink
//! - **Device selection**: deterministic first-suitable physical device policy
//! - **Swapchain management**: format/present-mode/extent negotiation and recreation
//! - **Frame scheduling**: frames-in-flight ring with per-image fence tracking
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_core::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     render_core::foundation::logging::init();
//!
//!     let config = PresenterConfig::default();
//!     let mut window = Window::new(&config.window)?;
//!     let shaders = DirectoryShaderSource::from_config(&config.shaders);
//!     let mut presenter = Presenter::new(
//!         &mut window,
//!         &config,
//!         &PipelineDescriptor::from_shader_config(&config.shaders),
//!         &shaders,
//!         Box::new(LogSink),
//!     )?;
//!
//!     while !window.should_close() {
//!         let events = window.poll_events();
//!         if events.resized {
//!             presenter.notify_resized();
//!         }
//!         presenter.draw_frame(&mut window)?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for users of the crate
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, PresenterConfig, ShaderConfig, WindowConfig},
        render::{
            frame::{FrameBackend, FrameScheduler, FrameStatus},
            shader_source::{DirectoryShaderSource, ShaderSource},
            vulkan::{
                CapturingSink, DiagnosticsSink, ErrorKind, LogSink, PipelineDescriptor,
                Presenter, SurfaceProvider, VulkanError, VulkanResult, Window, WindowError,
            },
        },
    };
}
