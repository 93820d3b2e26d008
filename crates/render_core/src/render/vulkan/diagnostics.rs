//! Validation diagnostics
//!
//! The debug-utils messenger hands every validation message to a
//! [`DiagnosticsSink`] supplied by the embedder. The driver may call back from
//! any thread, so sinks must be `Send + Sync`.

use ash::vk;
use std::ffi::CStr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

/// Message severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Loader and layer chatter
    Verbose,
    /// Informational messages such as resource details
    Info,
    /// Likely misuse of the API
    Warning,
    /// Invalid API usage
    Error,
}

impl Severity {
    /// Warnings and errors indicate the application broke an API contract
    pub fn is_contract_violation(self) -> bool {
        self >= Self::Warning
    }

    /// Map the most severe bit of the raw flags
    pub fn from_flags(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            Self::Error
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            Self::Warning
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            Self::Info
        } else {
            Self::Verbose
        }
    }
}

/// What kind of event produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    /// Unrelated to API usage rules or performance
    General,
    /// Violation of Vulkan valid-usage rules
    Validation,
    /// Potentially non-optimal use of the API
    Performance,
}

impl MessageCategory {
    /// Map the raw message type flags
    pub fn from_flags(flags: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
            Self::Validation
        } else if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
            Self::Performance
        } else {
            Self::General
        }
    }
}

/// Receiver for validation layer output
pub trait DiagnosticsSink: Send + Sync {
    /// Handle one message
    fn message(&self, severity: Severity, category: MessageCategory, text: &str);
}

/// Forwards diagnostics to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn message(&self, severity: Severity, category: MessageCategory, text: &str) {
        match severity {
            Severity::Error => log::error!("[Vulkan] {:?} - {}", category, text),
            Severity::Warning => log::warn!("[Vulkan] {:?} - {}", category, text),
            Severity::Info => log::info!("[Vulkan] {:?} - {}", category, text),
            Severity::Verbose => log::trace!("[Vulkan] {:?} - {}", category, text),
        }
    }
}

/// Records diagnostics in memory
#[derive(Debug, Default)]
pub struct CapturingSink {
    messages: Mutex<Vec<(Severity, MessageCategory, String)>>,
}

impl CapturingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far
    pub fn messages(&self) -> Vec<(Severity, MessageCategory, String)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Number of warnings and errors received
    pub fn contract_violations(&self) -> usize {
        self.messages()
            .iter()
            .filter(|(severity, _, _)| severity.is_contract_violation())
            .count()
    }
}

impl DiagnosticsSink for CapturingSink {
    fn message(&self, severity: Severity, category: MessageCategory, text: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((severity, category, text.to_owned()));
        }
    }
}

impl<T: DiagnosticsSink + ?Sized> DiagnosticsSink for std::sync::Arc<T> {
    fn message(&self, severity: Severity, category: MessageCategory, text: &str) {
        (**self).message(severity, category, text);
    }
}

/// Severity mask for the messenger
pub fn severity_flags(verbose: bool) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    let mut flags = vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    if verbose {
        flags |= vk::DebugUtilsMessageSeverityFlagsEXT::INFO;
    }
    flags
}

/// Message type mask for the messenger
pub fn type_flags() -> vk::DebugUtilsMessageTypeFlagsEXT {
    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
}

/// Boxed sink whose address is handed to the driver as user data
pub(crate) type SinkHandle = Box<Box<dyn DiagnosticsSink>>;

/// Debug callback for validation layers
///
/// `user_data` must point at the `Box<dyn DiagnosticsSink>` inside a
/// [`SinkHandle`] that outlives the messenger.
pub(crate) unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = *callback_data;
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };
    let sink = &*(user_data as *const Box<dyn DiagnosticsSink>);

    let severity = Severity::from_flags(message_severity);
    let category = MessageCategory::from_flags(message_type);

    // Unwinding across the FFI boundary is undefined behaviour
    let delivered = catch_unwind(AssertUnwindSafe(|| sink.message(severity, category, &message)));
    if delivered.is_err() {
        log::error!("Diagnostics sink panicked while handling: {}", message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::sync::Arc;

    fn invoke(sink: &SinkHandle, severity: vk::DebugUtilsMessageSeverityFlagsEXT, text: &str) -> vk::Bool32 {
        let text = CString::new(text).unwrap();
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: text.as_ptr(),
            ..Default::default()
        };
        let user_data = &**sink as *const Box<dyn DiagnosticsSink> as *mut std::ffi::c_void;
        unsafe {
            debug_callback(
                severity,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                user_data,
            )
        }
    }

    #[test]
    fn test_severity_mapping() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Flags;
        assert_eq!(Severity::from_flags(Flags::ERROR), Severity::Error);
        assert_eq!(Severity::from_flags(Flags::WARNING), Severity::Warning);
        assert_eq!(Severity::from_flags(Flags::INFO), Severity::Info);
        assert_eq!(Severity::from_flags(Flags::VERBOSE), Severity::Verbose);
        assert_eq!(Severity::from_flags(Flags::WARNING | Flags::ERROR), Severity::Error);
    }

    #[test]
    fn test_contract_violations() {
        assert!(Severity::Error.is_contract_violation());
        assert!(Severity::Warning.is_contract_violation());
        assert!(!Severity::Info.is_contract_violation());
        assert!(!Severity::Verbose.is_contract_violation());
    }

    #[test]
    fn test_category_mapping() {
        use vk::DebugUtilsMessageTypeFlagsEXT as Flags;
        assert_eq!(MessageCategory::from_flags(Flags::GENERAL), MessageCategory::General);
        assert_eq!(MessageCategory::from_flags(Flags::VALIDATION), MessageCategory::Validation);
        assert_eq!(MessageCategory::from_flags(Flags::PERFORMANCE), MessageCategory::Performance);
    }

    #[test]
    fn test_info_only_when_verbose() {
        assert!(!severity_flags(false).contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
        assert!(severity_flags(true).contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
        assert!(severity_flags(false).contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
    }

    #[test]
    fn test_callback_forwards_to_sink() {
        let capture = Arc::new(CapturingSink::new());
        let handle: SinkHandle = Box::new(Box::new(Arc::clone(&capture)));

        let result = invoke(&handle, vk::DebugUtilsMessageSeverityFlagsEXT::WARNING, "bad barrier");
        assert_eq!(result, vk::FALSE);

        let messages = capture.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, Severity::Warning);
        assert_eq!(messages[0].1, MessageCategory::Validation);
        assert_eq!(messages[0].2, "bad barrier");
        assert_eq!(capture.contract_violations(), 1);
    }

    struct PanickingSink;

    impl DiagnosticsSink for PanickingSink {
        fn message(&self, _: Severity, _: MessageCategory, _: &str) {
            panic!("sink failure");
        }
    }

    #[test]
    fn test_callback_contains_sink_panic() {
        let handle: SinkHandle = Box::new(Box::new(PanickingSink));
        let result = invoke(&handle, vk::DebugUtilsMessageSeverityFlagsEXT::ERROR, "boom");
        assert_eq!(result, vk::FALSE);
    }
}
