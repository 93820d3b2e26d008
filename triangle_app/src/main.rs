//! Triangle demo application
//!
//! Opens a window, brings up the presentation core and draws a hard-coded
//! triangle until the window is closed. Settings come from `triangle.toml`
//! in the working directory when it exists, defaults otherwise.

use std::path::Path;

use render_core::prelude::*;
use thiserror::Error;

const CONFIG_PATH: &str = "triangle.toml";

#[derive(Error, Debug)]
enum AppError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),
}

fn load_config(path: &str) -> Result<PresenterConfig, AppError> {
    if Path::new(path).exists() {
        Ok(PresenterConfig::load_from_file(path)?)
    } else {
        log::debug!("{} not found; using default settings", path);
        Ok(PresenterConfig::default())
    }
}

fn run() -> Result<(), AppError> {
    let config = load_config(CONFIG_PATH)?;
    log::info!(
        "Starting '{}' with {} frames in flight",
        config.application_name,
        config.effective_frames_in_flight()
    );

    let mut window = Window::new(&config.window)?;
    let shaders = DirectoryShaderSource::from_config(&config.shaders);
    let descriptor = PipelineDescriptor::from_shader_config(&config.shaders);
    let mut presenter = Presenter::new(&mut window, &config, &descriptor, &shaders, Box::new(LogSink))?;

    while !window.should_close() {
        let events = window.poll_events();
        if events.resized {
            presenter.notify_resized();
        }
        if events.close_requested {
            break;
        }

        match presenter.draw_frame(&mut window)? {
            FrameStatus::Presented => {}
            FrameStatus::PresentedAndRecreated => log::debug!("Swapchain rebuilt"),
            FrameStatus::Skipped => log::debug!("Frame skipped"),
        }
    }

    presenter.shutdown(&mut window)?;
    log::info!("Presented {} frames", presenter.scheduler().frames_presented());
    Ok(())
}

fn main() {
    render_core::foundation::logging::init();

    if let Err(e) = run() {
        log::error!("{}", e);
        if let AppError::Vulkan(err) = &e {
            match err.kind() {
                ErrorKind::Configuration => {
                    log::error!("hint: install the Vulkan SDK for validation layers, or set enable_validation = false");
                }
                ErrorKind::DeviceNotFound => log::error!("hint: no GPU here can present to this window"),
                _ => {}
            }
        }
        std::process::exit(1);
    }
}
