//! Vulkan instance with optional validation

use crate::foundation::fail::{FailureKind, OrFail};
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use std::ffi::{CStr, CString};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

struct DebugMessenger {
    loader: DebugUtils,
    handle: vk::DebugUtilsMessengerEXT,
}

/// Loaded Vulkan entry points plus the instance created from them
pub struct VulkanInstance {
    debug: Option<DebugMessenger>,
    instance: Instance,
    entry: Entry,
}

impl VulkanInstance {
    /// Create the instance with the extensions the windowing layer requires
    ///
    /// Debug builds additionally request the Khronos validation layer and route
    /// its messages into the log. If the layer is not installed the instance is
    /// created without it and a warning is logged.
    pub fn new(application_name: &str, engine_name: &str, platform_extensions: &[String]) -> Self {
        let entry = unsafe { Entry::load() }.or_fail(FailureKind::Gpu, "failed to load the Vulkan loader");

        let application_name = CString::new(application_name).or_fail(FailureKind::Config, "application name");
        let engine_name = CString::new(engine_name).or_fail(FailureKind::Config, "engine name");
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&application_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let validation = cfg!(debug_assertions) && Self::validation_layer_available(&entry);
        if cfg!(debug_assertions) && !validation {
            log::warn!("Validation layer {:?} is not available; continuing without it", VALIDATION_LAYER);
        }

        let extension_names: Vec<CString> = platform_extensions
            .iter()
            .map(|name| CString::new(name.as_str()).or_fail(FailureKind::Platform, "instance extension name"))
            .collect();
        let mut extensions: Vec<*const std::ffi::c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();
        let mut layers: Vec<*const std::ffi::c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .or_fail(FailureKind::Gpu, "vkCreateInstance");

        let debug = validation.then(|| Self::create_debug_messenger(&entry, &instance));

        log::info!(
            "Created Vulkan instance ({} extensions, validation {})",
            extensions.len(),
            if validation { "on" } else { "off" }
        );

        Self { debug, instance, entry }
    }

    fn validation_layer_available(entry: &Entry) -> bool {
        let layers = match entry.enumerate_instance_layer_properties() {
            Ok(layers) => layers,
            Err(error) => {
                log::warn!("Could not enumerate instance layers: {:?}", error);
                return false;
            }
        };

        layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER)
    }

    fn create_debug_messenger(entry: &Entry, instance: &Instance) -> DebugMessenger {
        let loader = DebugUtils::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let handle = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .or_fail(FailureKind::Gpu, "vkCreateDebugUtilsMessengerEXT");

        DebugMessenger { loader, handle }
    }

    /// Loaded entry points
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance-level function table
    pub const fn raw(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug.loader.destroy_debug_utils_messenger(debug.handle, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Forwards validation messages into the log at the matching severity
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        log::info!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}
