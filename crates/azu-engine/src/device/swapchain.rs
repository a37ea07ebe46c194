use anyhow::{Context, Result};
use ash::vk;

/// Swapchain handle plus its per-image views and framebuffers.
///
/// Handles are replaced in place on rebuild; teardown reads whatever is current.
pub(crate) struct SwapchainState {
    pub loader: ash::khr::swapchain::Device,
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// Surface parameters chosen once at device creation.
#[derive(Debug, Copy, Clone)]
pub(crate) struct SurfaceChoice {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
}

/// Surface capabilities and the extent the next swapchain will use.
#[derive(Debug, Copy, Clone)]
pub(crate) struct SurfaceTarget {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub extent: vk::Extent2D,
}

/// Queries the surface for a swapchain sized for `window_extent`.
///
/// Returns `None` while the surface has no area, e.g. when the window is minimized.
pub(crate) fn query_surface_target(
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    window_extent: (u32, u32),
) -> Result<Option<SurfaceTarget>> {
    let caps = unsafe { surface_loader.get_physical_device_surface_capabilities(physical_device, surface) }
        .context("failed to query surface capabilities")?;

    let extent = choose_extent(&caps, window_extent);
    if extent.width == 0 || extent.height == 0 {
        return Ok(None);
    }
    Ok(Some(SurfaceTarget { caps, extent }))
}

impl SwapchainState {
    pub fn empty(loader: ash::khr::swapchain::Device) -> Self {
        Self {
            loader,
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
        }
    }

    /// Creates a swapchain for `target`, retiring the current one.
    ///
    /// Views and framebuffers of the old swapchain must already be destroyed.
    pub fn recreate(
        &mut self,
        device: &ash::Device,
        surface: vk::SurfaceKHR,
        choice: SurfaceChoice,
        target: &SurfaceTarget,
    ) -> Result<()> {
        let caps = &target.caps;
        let extent = target.extent;

        let mut image_count = caps.min_image_count + 1;
        if caps.max_image_count > 0 {
            image_count = image_count.min(caps.max_image_count);
        }

        let old = self.handle;
        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(choice.format.format)
            .image_color_space(choice.format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(choose_composite_alpha(caps.supported_composite_alpha))
            .present_mode(choice.present_mode)
            .clipped(true)
            .old_swapchain(old);

        let handle = unsafe { self.loader.create_swapchain(&info, None) }
            .context("failed to create swapchain")?;
        if old != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old, None) };
        }
        self.handle = handle;
        self.format = choice.format.format;
        self.extent = extent;

        self.images = unsafe { self.loader.get_swapchain_images(handle) }
            .context("failed to get swapchain images")?;

        for &image in &self.images {
            let info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .subresource_range(color_subresource_range());
            let view = unsafe { device.create_image_view(&info, None) }
                .context("failed to create swapchain image view")?;
            self.views.push(view);
        }

        Ok(())
    }

    pub fn create_framebuffers(&mut self, device: &ash::Device, render_pass: vk::RenderPass) -> Result<()> {
        for &view in &self.views {
            let attachments = [view];
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            let fb = unsafe { device.create_framebuffer(&info, None) }
                .context("failed to create framebuffer")?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    pub fn destroy_framebuffers(&mut self, device: &ash::Device) {
        for fb in self.framebuffers.drain(..) {
            unsafe { device.destroy_framebuffer(fb, None) };
        }
    }

    pub fn destroy_views(&mut self, device: &ash::Device) {
        for view in self.views.drain(..) {
            unsafe { device.destroy_image_view(view, None) };
        }
    }

    /// Destroys views and the swapchain itself. Framebuffers go separately.
    pub fn destroy(&mut self, device: &ash::Device) {
        self.destroy_views(device);
        if self.handle != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(self.handle, None) };
            self.handle = vk::SwapchainKHR::null();
        }
        self.images.clear();
    }
}

pub(crate) fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

pub(crate) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    prefer_srgb: bool,
) -> Option<vk::SurfaceFormatKHR> {
    let first = *formats.first()?;

    if prefer_srgb {
        let preferred = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB];
        for f in preferred {
            if let Some(found) = formats
                .iter()
                .find(|s| s.format == f && s.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            {
                return Some(*found);
            }
        }
    }

    Some(first)
}

pub(crate) fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's fixed extent, or the window size clamped to the supported range.
pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: (u32, u32)) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window_extent
            .0
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window_extent
            .1
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&m| supported.contains(m))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}
