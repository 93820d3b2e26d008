//! Vulkan instance creation
//!
//! Loads the API entry, checks requested layers and extensions against what the
//! loader reports, and installs the validation messenger. The messenger
//! create-info is chained into instance creation as well so that messages
//! emitted by `vkCreateInstance` and `vkDestroyInstance` reach the sink.

use ash::extensions::ext::DebugUtils;
use ash::vk;
use ash::{Entry, Instance};
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use super::diagnostics::{self, DiagnosticsSink, SinkHandle};
use super::error::{VulkanError, VulkanResult};
use crate::config::PresenterConfig;

/// Standard Khronos validation layer
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

const ENGINE_NAME: &str = "render_core";

/// Parameters for instance creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    /// Reported to drivers and tools
    pub application_name: String,
    /// Request the validation layer and debug messenger
    pub enable_validation: bool,
    /// Include informational messages in the messenger mask
    pub verbose_diagnostics: bool,
}

impl InstanceConfig {
    /// Derive instance parameters from the presenter configuration
    pub fn from_presenter_config(config: &PresenterConfig) -> Self {
        Self {
            application_name: config.application_name.clone(),
            enable_validation: config.validation_enabled(),
            verbose_diagnostics: config.verbose_diagnostics,
        }
    }

    /// Layers to enable on the instance
    pub fn layers(&self) -> Vec<&'static str> {
        if self.enable_validation {
            vec![VALIDATION_LAYER]
        } else {
            Vec::new()
        }
    }
}

/// Names in `requested` that do not appear in `available`, in request order
pub fn missing_names(requested: &[String], available: &HashSet<String>) -> Vec<String> {
    requested
        .iter()
        .filter(|name| !available.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Requested extensions for the instance: provider list plus debug utils
pub fn instance_extensions(provider_extensions: &[String], enable_validation: bool) -> Vec<String> {
    let mut extensions = provider_extensions.to_vec();
    if enable_validation {
        let debug_utils = DebugUtils::name().to_string_lossy().into_owned();
        if !extensions.contains(&debug_utils) {
            extensions.push(debug_utils);
        }
    }
    extensions
}

fn to_cstrings(names: &[String]) -> VulkanResult<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str())
                .map_err(|_| VulkanError::Loading(format!("Name contains a NUL byte: {name}")))
        })
        .collect()
}

fn property_names<T>(properties: &[T], name: impl Fn(&T) -> &[c_char]) -> HashSet<String> {
    properties
        .iter()
        .map(|property| {
            // Names reported by the loader are NUL-terminated fixed arrays
            unsafe { CStr::from_ptr(name(property).as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Owns the API entry, the instance and the optional validation messenger
pub struct InstanceContext {
    debug: Option<DebugMessenger>,
    instance: Instance,
    entry: Entry,
    layers: Vec<String>,
    // Referenced by the driver through user data, including during
    // vkDestroyInstance, so it is dropped after the instance
    _sink: Option<SinkHandle>,
}

impl InstanceContext {
    /// Create the instance
    ///
    /// Missing layers fail before anything is created. Missing extensions are
    /// logged and left to the driver to reject.
    pub fn create(
        provider_extensions: &[String],
        config: &InstanceConfig,
        sink: Box<dyn DiagnosticsSink>,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| VulkanError::Loading(e.to_string()))?;

        let layers: Vec<String> = config.layers().into_iter().map(str::to_owned).collect();
        let available_layers = unsafe { entry.enumerate_instance_layer_properties() }
            .map_err(VulkanError::Api)?;
        let missing = missing_names(&layers, &property_names(&available_layers, |l| &l.layer_name[..]));
        if !missing.is_empty() {
            return Err(VulkanError::LayersUnavailable { missing });
        }

        let extensions = instance_extensions(provider_extensions, config.enable_validation);
        let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(VulkanError::Api)?;
        let available_extensions = property_names(&available_extensions, |e| &e.extension_name[..]);
        for name in missing_names(&extensions, &available_extensions) {
            log::warn!("Instance extension {} is not reported by the loader", name);
        }

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|_| VulkanError::Loading("Application name contains a NUL byte".to_string()))?;
        let engine_name = CString::new(ENGINE_NAME)
            .map_err(|_| VulkanError::Loading("Engine name contains a NUL byte".to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let layer_names = to_cstrings(&layers)?;
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();
        let extension_names = to_cstrings(&extensions)?;
        let extension_ptrs: Vec<*const c_char> =
            extension_names.iter().map(|name| name.as_ptr()).collect();

        let sink: SinkHandle = Box::new(sink);
        let user_data = &*sink as *const Box<dyn DiagnosticsSink> as *mut std::ffi::c_void;
        let mut messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(diagnostics::severity_flags(config.verbose_diagnostics))
            .message_type(diagnostics::type_flags())
            .pfn_user_callback(Some(diagnostics::debug_callback))
            .user_data(user_data);

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);
        if config.enable_validation {
            create_info = create_info.push_next(&mut messenger_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|result| {
            match VulkanError::from_api(result) {
                VulkanError::LayersUnavailable { .. } => VulkanError::LayersUnavailable { missing: layers.clone() },
                other => other,
            }
        })?;

        let mut context = Self {
            debug: None,
            instance,
            entry,
            layers,
            _sink: config.enable_validation.then_some(sink),
        };

        if config.enable_validation {
            let loader = DebugUtils::new(&context.entry, &context.instance);
            // On failure the instance is released by `context`'s Drop
            let messenger = unsafe { loader.create_debug_utils_messenger(&messenger_info, None) }
                .map_err(VulkanError::creating("debug messenger"))?;
            context.debug = Some(DebugMessenger { loader, messenger });
            log::debug!("Validation messenger installed");
        }

        log::info!(
            "Vulkan instance created for '{}' (validation {})",
            config.application_name,
            if config.enable_validation { "on" } else { "off" }
        );

        Ok(context)
    }

    /// Vulkan entry point
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Layers enabled on the instance, also passed to device creation
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Whether the validation messenger is active
    pub fn has_diagnostics(&self) -> bool {
        self.debug.is_some()
    }

    /// Tear down the validation messenger ahead of the instance
    pub fn release_diagnostics(&mut self) {
        if let Some(debug) = self.debug.take() {
            unsafe {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }
        }
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        self.release_diagnostics();
        unsafe {
            self.instance.destroy_instance(None);
        }
        log::debug!("Vulkan instance destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn test_all_layers_present() {
        let requested = vec![VALIDATION_LAYER.to_string()];
        let available = set(&[VALIDATION_LAYER, "VK_LAYER_MESA_device_select"]);
        assert!(missing_names(&requested, &available).is_empty());
    }

    #[test]
    fn test_missing_layer_reported() {
        let requested = vec![VALIDATION_LAYER.to_string()];
        let available = set(&["VK_LAYER_MESA_device_select"]);
        assert_eq!(missing_names(&requested, &available), vec![VALIDATION_LAYER.to_string()]);
    }

    #[test]
    fn test_layers_follow_validation_toggle() {
        let mut config = InstanceConfig {
            application_name: "test".to_string(),
            enable_validation: true,
            verbose_diagnostics: false,
        };
        assert_eq!(config.layers(), vec![VALIDATION_LAYER]);

        config.enable_validation = false;
        assert!(config.layers().is_empty());
    }

    #[test]
    fn test_debug_utils_appended_once() {
        let provider = vec!["VK_KHR_surface".to_string(), "VK_KHR_xcb_surface".to_string()];

        let extensions = instance_extensions(&provider, true);
        assert_eq!(extensions.len(), 3);
        assert_eq!(extensions[2], "VK_EXT_debug_utils");

        let again = instance_extensions(&extensions, true);
        assert_eq!(again, extensions);

        assert_eq!(instance_extensions(&provider, false), provider);
    }

    #[test]
    fn test_config_derived_from_presenter_config() {
        let presenter = PresenterConfig::new("Sample").with_validation(false);
        let config = InstanceConfig::from_presenter_config(&presenter);
        assert_eq!(config.application_name, "Sample");
        assert!(!config.enable_validation);
    }
}
