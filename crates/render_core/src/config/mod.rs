//! Configuration system
//!
//! Everything the presentation core needs from the outside world that is not a
//! handle: window size hint, frames in flight, validation toggle, timeouts and
//! the shader names for the fixed pipeline.

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Upper bound on the frame slot ring
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

/// Window creation parameters, also used as the swapchain extent hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Shader names for the fixed triangle pipeline
///
/// Names are resolved by a [`ShaderSource`](crate::render::shader_source::ShaderSource);
/// the directory source appends `.spv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Logical name of the vertex shader
    pub vertex: String,
    /// Logical name of the fragment shader
    pub fragment: String,
    /// Directory holding compiled SPIR-V; searched in common locations when unset
    pub directory: Option<String>,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
            directory: None,
        }
    }

    /// Set the directory shaders are loaded from
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::new("triangle.vert", "triangle.frag")
    }
}

/// Configuration for the presentation core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenterConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Window parameters and swapchain extent hint
    pub window: WindowConfig,
    /// Size of the frame slot ring
    pub frames_in_flight: usize,
    /// Whether to enable validation layers; `None` enables them in debug builds
    pub enable_validation: Option<bool>,
    /// Also forward informational validation messages to the sink
    pub verbose_diagnostics: bool,
    /// Upper bound for every fence wait and image acquisition, in milliseconds
    pub fence_timeout_ms: u64,
    /// Background clear color [R, G, B, A] (0.0-1.0 range)
    pub clear_color: [f32; 4],
    /// Shaders for the fixed pipeline
    pub shaders: ShaderConfig,
}

impl PresenterConfig {
    /// Create a new configuration with defaults for everything but the name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Set window parameters
    #[must_use]
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Set maximum frames in flight
    #[must_use]
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Force validation layers on or off
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the fence wait bound
    #[must_use]
    pub const fn with_fence_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.fence_timeout_ms = timeout_ms;
        self
    }

    /// Set background clear color
    #[must_use]
    pub const fn with_clear_color(mut self, r: f32, g: f32, b: f32, a: f32) -> Self {
        self.clear_color = [r, g, b, a];
        self
    }

    /// Set shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Frames in flight clamped into `1..=MAX_FRAMES_IN_FLIGHT_LIMIT`
    pub fn effective_frames_in_flight(&self) -> usize {
        self.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT_LIMIT)
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Fence timeout in nanoseconds, as the Vulkan API expects it
    pub const fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms.saturating_mul(1_000_000)
    }
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            application_name: "Drawing Triangle".to_string(),
            window: WindowConfig::default(),
            frames_in_flight: 2,
            enable_validation: None,
            verbose_diagnostics: false,
            fence_timeout_ms: 1_000,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: ShaderConfig::default(),
        }
    }
}

impl Config for PresenterConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn temp_file(suffix: &str) -> NamedTempFile {
        Builder::new().prefix("presenter").suffix(suffix).tempfile().unwrap()
    }

    fn path_of(file: &NamedTempFile) -> String {
        file.path().to_string_lossy().into_owned()
    }

    #[test]
    fn test_frames_in_flight_clamped() {
        assert_eq!(PresenterConfig::default().effective_frames_in_flight(), 2);
        assert_eq!(PresenterConfig::default().with_frames_in_flight(0).effective_frames_in_flight(), 1);
        assert_eq!(PresenterConfig::default().with_frames_in_flight(64).effective_frames_in_flight(), 8);
    }

    #[test]
    fn test_fence_timeout_conversion() {
        let config = PresenterConfig::default().with_fence_timeout_ms(250);
        assert_eq!(config.fence_timeout_ns(), 250_000_000);

        let config = PresenterConfig::default().with_fence_timeout_ms(u64::MAX);
        assert_eq!(config.fence_timeout_ns(), u64::MAX);
    }

    #[test]
    fn test_validation_override() {
        assert!(PresenterConfig::default().with_validation(true).validation_enabled());
        assert!(!PresenterConfig::default().with_validation(false).validation_enabled());
        assert_eq!(PresenterConfig::default().validation_enabled(), cfg!(debug_assertions));
    }

    #[test]
    fn test_toml_round_trip() {
        let file = temp_file(".toml");
        let path = path_of(&file);
        let config = PresenterConfig::new("Round Trip")
            .with_frames_in_flight(3)
            .with_clear_color(0.1, 0.2, 0.3, 1.0)
            .with_shaders(ShaderConfig::new("a.vert", "a.frag").with_directory("shaders"));

        config.save_to_file(&path).unwrap();
        let loaded = PresenterConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let mut file = temp_file(".toml");
        write!(file, "frames_in_flight = 3\n[window]\nwidth = 1024\n").unwrap();
        file.flush().unwrap();
        let path = path_of(&file);

        let loaded = PresenterConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.frames_in_flight, 3);
        assert_eq!(loaded.window.width, 1024);
        assert_eq!(loaded.window.height, 600);
        assert_eq!(loaded.shaders, ShaderConfig::default());
    }

    #[test]
    fn test_ron_round_trip() {
        let file = temp_file(".ron");
        let path = path_of(&file);
        let config = PresenterConfig::new("Ron").with_validation(false);

        config.save_to_file(&path).unwrap();
        let loaded = PresenterConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_scratch_files_removed_on_drop() {
        let file = temp_file(".toml");
        let path = file.path().to_path_buf();
        PresenterConfig::default().save_to_file(&path_of(&file)).unwrap();
        assert!(path.exists());

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_unsupported_extension() {
        let result = PresenterConfig::default().save_to_file("presenter.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
