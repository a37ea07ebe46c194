use std::borrow::Cow;
use std::ffi::{c_void, CStr, CString};

use anyhow::{bail, Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use super::config::ContextConfig;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance-level Vulkan objects: loader, instance, debug messenger and surface.
///
/// Destroyed in reverse creation order on drop. Everything created from the
/// logical device must be gone before this is dropped.
pub(crate) struct InstanceContext {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

/// The GPU picked for rendering and its graphics + present queue family.
#[derive(Debug, Clone)]
pub(crate) struct PhysicalDeviceChoice {
    pub physical_device: vk::PhysicalDevice,
    pub queue_family: u32,
    pub name: String,
}

impl InstanceContext {
    pub fn new<W>(config: &ContextConfig, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .context("window has no display handle")?
            .as_raw();
        let window_raw = window
            .window_handle()
            .context("window has no window handle")?
            .as_raw();

        let entry = unsafe { ash::Entry::load() }.context("failed to load the Vulkan loader")?;

        let validation = config.validation && validation_layer_available(&entry);
        if config.validation && !validation {
            log::warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
        }

        let app_name = CString::new(config.app_name.as_str()).unwrap_or_else(|_| c"azu".to_owned());
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"azu-engine")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .context("failed to query surface instance extensions")?
            .to_vec();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("failed to create Vulkan instance")?;

        // From here on, a failure must destroy what was already created.
        let debug = if validation {
            match create_debug_messenger(&entry, &instance) {
                Ok(pair) => Some(pair),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = match unsafe { ash_window::create_surface(&entry, &instance, display, window_raw, None) } {
            Ok(surface) => surface,
            Err(err) => {
                unsafe {
                    if let Some((loader, messenger)) = &debug {
                        loader.destroy_debug_utils_messenger(*messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(anyhow::Error::new(err).context("failed to create window surface"));
            }
        };

        log::debug!("Vulkan instance created (validation: {validation})");

        Ok(Self {
            entry,
            instance,
            debug,
            surface_loader,
            surface,
        })
    }

    /// Picks a GPU with Vulkan 1.2 descriptor indexing and a queue family that can
    /// both draw and present to the surface. Discrete GPUs win ties.
    pub fn select_physical_device(&self) -> Result<PhysicalDeviceChoice> {
        let devices = unsafe { self.instance.enumerate_physical_devices() }
            .context("failed to enumerate physical devices")?;

        let mut best: Option<(u32, PhysicalDeviceChoice)> = None;
        let mut rejections = Vec::new();

        for pd in devices {
            let props = unsafe { self.instance.get_physical_device_properties(pd) };
            let name = props
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "<unnamed>".to_owned());

            if props.api_version < vk::API_VERSION_1_2 {
                rejections.push(format!("{name}: Vulkan 1.2 not supported"));
                continue;
            }

            let missing = missing_descriptor_indexing_features(&self.instance, pd);
            if !missing.is_empty() {
                rejections.push(format!("{name}: missing {}", missing.join(", ")));
                continue;
            }

            let Some(queue_family) = self.find_queue_family(pd)? else {
                rejections.push(format!("{name}: no queue family supports graphics and present"));
                continue;
            };

            let score = match props.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 3,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
                _ => 0,
            };
            if best.as_ref().is_none_or(|(s, _)| score > *s) {
                best = Some((
                    score,
                    PhysicalDeviceChoice {
                        physical_device: pd,
                        queue_family,
                        name,
                    },
                ));
            }
        }

        match best {
            Some((_, choice)) => Ok(choice),
            None if rejections.is_empty() => bail!("no Vulkan physical devices found"),
            None => bail!("no suitable GPU: {}", rejections.join("; ")),
        }
    }

    fn find_queue_family(&self, pd: vk::PhysicalDevice) -> Result<Option<u32>> {
        let families = unsafe { self.instance.get_physical_device_queue_family_properties(pd) };
        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                continue;
            }
            let present = unsafe {
                self.surface_loader
                    .get_physical_device_surface_support(pd, index, self.surface)
            }
            .context("failed to query surface support")?;
            if present {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Names of the descriptor indexing features `pd` lacks.
pub(crate) fn missing_descriptor_indexing_features(
    instance: &ash::Instance,
    pd: vk::PhysicalDevice,
) -> Vec<&'static str> {
    let mut v12 = vk::PhysicalDeviceVulkan12Features::default();
    let dynamic_indexing = {
        let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut v12);
        unsafe { instance.get_physical_device_features2(pd, &mut features) };
        features.features.shader_sampled_image_array_dynamic_indexing
    };

    let mut missing = Vec::new();
    if dynamic_indexing == vk::FALSE {
        missing.push("shaderSampledImageArrayDynamicIndexing");
    }
    if v12.runtime_descriptor_array == vk::FALSE {
        missing.push("runtimeDescriptorArray");
    }
    if v12.descriptor_binding_partially_bound == vk::FALSE {
        missing.push("descriptorBindingPartiallyBound");
    }
    if v12.shader_sampled_image_array_non_uniform_indexing == vk::FALSE {
        missing.push("shaderSampledImageArrayNonUniformIndexing");
    }
    missing
}

fn validation_layer_available(entry: &ash::Entry) -> bool {
    let Ok(layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };
    layers
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER))
}

fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = ash::ext::debug_utils::Instance::new(entry, instance);
    let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));

    let messenger = unsafe { loader.create_debug_utils_messenger(&info, None) }
        .context("failed to create debug messenger")?;
    Ok((loader, messenger))
}

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if data.is_null() || unsafe { (*data).p_message }.is_null() {
        Cow::Borrowed("<no message>")
    } else {
        unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy()
    };

    let level = if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Debug
    } else {
        log::Level::Trace
    };

    log::log!(target: "azu_engine::vulkan", level, "[{kind:?}] {message}");
    vk::FALSE
}
