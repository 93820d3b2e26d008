//! Shader bytecode loading
//!
//! Pipelines ask a [`ShaderSource`] for SPIR-V by logical name. The bytes are
//! opaque here; word alignment and endianness are handled at module creation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ShaderConfig;

/// Directories searched when no shader directory is configured
pub const DEFAULT_SEARCH_DIRS: [&str; 5] = ["target/shaders/", "shaders/", "resources/shaders/", "../shaders/", "./"];

/// Shader loading errors
#[derive(Error, Debug)]
pub enum ShaderSourceError {
    /// No candidate file exists
    #[error("Shader '{name}' not found (searched {searched:?})")]
    NotFound {
        /// Logical shader name
        name: String,
        /// Paths that were tried
        searched: Vec<PathBuf>,
    },

    /// The file exists but could not be read
    #[error("Failed to read shader file {path:?}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a usable SPIR-V module
    #[error("Invalid SPIR-V in '{name}': {reason}")]
    InvalidSpirv {
        /// Logical shader name
        name: String,
        /// What was wrong
        reason: String,
    },
}

/// Supplier of SPIR-V bytecode by logical name
pub trait ShaderSource {
    /// Load the bytecode for `name`
    fn load(&self, name: &str) -> Result<Vec<u8>, ShaderSourceError>;
}

/// Loads `<name>.spv` from the first directory that has it
#[derive(Debug, Clone)]
pub struct DirectoryShaderSource {
    directories: Vec<PathBuf>,
}

impl DirectoryShaderSource {
    /// Search exactly one directory
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directories: vec![directory.into()],
        }
    }

    /// Search the usual locations relative to the working directory
    pub fn with_default_search() -> Self {
        Self {
            directories: DEFAULT_SEARCH_DIRS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Configured directory if set, default search otherwise
    pub fn from_config(config: &ShaderConfig) -> Self {
        match &config.directory {
            Some(directory) => Self::new(directory),
            None => Self::with_default_search(),
        }
    }

    /// Directories in search order
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// First existing candidate path for `name`
    pub fn resolve(&self, name: &str) -> Result<PathBuf, ShaderSourceError> {
        let file_name = format!("{name}.spv");
        let candidates: Vec<PathBuf> = self.directories.iter().map(|dir| dir.join(&file_name)).collect();

        candidates
            .iter()
            .find(|path| Path::new(path).is_file())
            .cloned()
            .ok_or_else(|| ShaderSourceError::NotFound {
                name: name.to_string(),
                searched: candidates,
            })
    }
}

impl ShaderSource for DirectoryShaderSource {
    fn load(&self, name: &str) -> Result<Vec<u8>, ShaderSourceError> {
        let path = self.resolve(name)?;
        log::debug!("Loading shader '{}' from {:?}", name, path);
        std::fs::read(&path).map_err(|source| ShaderSourceError::Io { path, source })
    }
}

/// Bytecode loaded once and kept in memory
///
/// Lets the pipeline be rebuilt later, for example after the surface format
/// changes, without going back to the original source.
#[derive(Debug, Clone, Default)]
pub struct ShaderCache {
    modules: HashMap<String, Vec<u8>>,
}

impl ShaderCache {
    /// Load every name in `names` from `source`
    pub fn preload(source: &dyn ShaderSource, names: &[&str]) -> Result<Self, ShaderSourceError> {
        let modules = names
            .iter()
            .map(|&name| Ok((name.to_string(), source.load(name)?)))
            .collect::<Result<HashMap<_, _>, ShaderSourceError>>()?;
        Ok(Self { modules })
    }

    /// Number of cached modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Nothing cached
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ShaderSource for ShaderCache {
    fn load(&self, name: &str) -> Result<Vec<u8>, ShaderSourceError> {
        self.modules.get(name).cloned().ok_or_else(|| ShaderSourceError::NotFound {
            name: name.to_string(),
            searched: Vec::new(),
        })
    }
}
