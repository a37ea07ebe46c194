use std::mem::ManuallyDrop;

use anyhow::{bail, ensure, Context, Result};
use ash::vk;
use gpu_allocator::vulkan::Allocator;
use gpu_allocator::MemoryLocation;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::coords::Mat4;
use crate::render::{
    batch_bytes, write_batch, Acquire, PixelData, Present, QuadRecord, Rebuild, RenderBackend,
};

use super::config::ContextConfig;
use super::instance::{InstanceContext, PhysicalDeviceChoice};
use super::memory::{
    create_allocator, create_buffer, create_image, destroy_buffer, destroy_image, AllocatedBuffer,
    AllocatedImage,
};
use super::pipeline::{
    allocate_descriptor_set, create_descriptor_pool, create_descriptor_set_layout,
    create_pipeline_layout, create_quad_pipeline, create_render_pass, create_sampler,
    QUAD_BUFFER_BINDING, SAMPLER_BINDING, TEXTURE_ARRAY_BINDING,
};
use super::swapchain::{
    choose_present_mode, choose_surface_format, color_subresource_range, query_surface_target,
    SurfaceChoice, SwapchainState,
};
use super::teardown::DeletionQueue;
use super::upload::{record_image_upload, UploadContext};

/// Sampled texture format. Pixels are sRGB-encoded RGBA8.
const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// State the deletion queue's actions operate on.
///
/// Swapchain handles are read here at flush time, so actions registered before a
/// rebuild still destroy the current objects.
pub(crate) struct DeviceCore {
    pub device: ash::Device,
    pub allocator: ManuallyDrop<Allocator>,
    pub swapchain: SwapchainState,
    pub quad_buffer: Option<AllocatedBuffer>,
}

/// A texture uploaded to device-local memory.
#[derive(Debug, Copy, Clone)]
pub struct GpuTexture {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

#[derive(Debug, Copy, Clone, Default)]
struct FrameSync {
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

/// Bring-up steps run once the logical device and allocator exist.
///
/// Each step pushes its teardown actions as it creates objects, so flushing the
/// deletion queue unwinds the steps in reverse.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum InitStep {
    Swapchain,
    RenderPass,
    Framebuffers,
    Commands,
    Sync,
    QuadBuffer,
    Descriptors,
    Pipeline,
}

pub(crate) const INIT_ORDER: [InitStep; 8] = [
    InitStep::Swapchain,
    InitStep::RenderPass,
    InitStep::Framebuffers,
    InitStep::Commands,
    InitStep::Sync,
    InitStep::QuadBuffer,
    InitStep::Descriptors,
    InitStep::Pipeline,
];

impl InitStep {
    pub fn label(self) -> &'static str {
        match self {
            InitStep::Swapchain => "swapchain",
            InitStep::RenderPass => "render pass",
            InitStep::Framebuffers => "framebuffers",
            InitStep::Commands => "command pools",
            InitStep::Sync => "sync objects",
            InitStep::QuadBuffer => "quad buffer",
            InitStep::Descriptors => "descriptors",
            InitStep::Pipeline => "pipeline",
        }
    }
}

/// Owns every Vulkan object used for rendering.
///
/// Created in a fixed order; each object registers its teardown with the
/// deletion queue as soon as it exists. Dropping waits for the GPU, flushes the
/// queue, releases the allocator and destroys the device. The instance, surface
/// and debug messenger go last when `instance` drops.
pub struct GraphicsDevice {
    core: DeviceCore,
    deletion_queue: DeletionQueue<DeviceCore>,

    physical_device: vk::PhysicalDevice,
    queue: vk::Queue,
    queue_family: u32,
    surface: SurfaceChoice,

    render_pass: vk::RenderPass,
    frame: FrameSync,
    upload: UploadContext,

    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_set: vk::DescriptorSet,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,

    quad_capacity: usize,
    max_textures: u32,
    clear_color: [f32; 4],
    frame_timeout_ns: u64,

    // Must be the last field: dropped after `Drop::drop` destroys the device.
    instance: InstanceContext,
}

impl GraphicsDevice {
    /// Brings up Vulkan for `window`. `window_extent` is its size in physical pixels.
    pub fn new<W>(window: &W, window_extent: (u32, u32), config: &ContextConfig) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let instance = InstanceContext::new(config, window)?;
        let choice = instance.select_physical_device()?;
        log::info!("using GPU `{}` (queue family {})", choice.name, choice.queue_family);

        let device = create_logical_device(&instance.instance, &choice)?;
        let allocator = match create_allocator(&instance.instance, &device, choice.physical_device) {
            Ok(a) => a,
            Err(err) => {
                unsafe { device.destroy_device(None) };
                return Err(err);
            }
        };

        let queue = unsafe { device.get_device_queue(choice.queue_family, 0) };
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance.instance, &device);

        // From here on `Drop` cleans up whatever the init steps managed to create.
        let mut gpu = Self {
            core: DeviceCore {
                device,
                allocator: ManuallyDrop::new(allocator),
                swapchain: SwapchainState::empty(swapchain_loader),
                quad_buffer: None,
            },
            deletion_queue: DeletionQueue::new(),
            physical_device: choice.physical_device,
            queue,
            queue_family: choice.queue_family,
            surface: SurfaceChoice {
                format: vk::SurfaceFormatKHR::default(),
                present_mode: vk::PresentModeKHR::FIFO,
            },
            render_pass: vk::RenderPass::null(),
            frame: FrameSync::default(),
            upload: UploadContext::default(),
            descriptor_set_layout: vk::DescriptorSetLayout::null(),
            descriptor_set: vk::DescriptorSet::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            quad_capacity: config.quad_capacity,
            max_textures: config.max_textures,
            clear_color: config.clear_color.to_array(),
            frame_timeout_ns: config.frame_timeout_ns(),
            instance,
        };

        for step in INIT_ORDER {
            gpu.run_init_step(step, config, window_extent)
                .with_context(|| format!("graphics init failed at {}", step.label()))?;
        }

        log::debug!("graphics device ready ({} teardown actions)", gpu.deletion_queue.len());
        Ok(gpu)
    }

    #[inline]
    pub fn surface_format(&self) -> vk::Format {
        self.core.swapchain.format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.surface.present_mode
    }

    // ── init steps ────────────────────────────────────────────────────────

    fn run_init_step(&mut self, step: InitStep, config: &ContextConfig, window_extent: (u32, u32)) -> Result<()> {
        match step {
            InitStep::Swapchain => self.init_swapchain(config, window_extent),
            InitStep::RenderPass => self.init_render_pass(),
            InitStep::Framebuffers => self.init_framebuffers(),
            InitStep::Commands => self.init_commands(),
            InitStep::Sync => self.init_sync(),
            InitStep::QuadBuffer => self.init_quad_buffer(),
            InitStep::Descriptors => self.init_descriptors(),
            InitStep::Pipeline => self.init_pipeline(),
        }
    }

    fn init_swapchain(&mut self, config: &ContextConfig, window_extent: (u32, u32)) -> Result<()> {
        let loader = &self.instance.surface_loader;
        let surface = self.instance.surface;
        let formats = unsafe { loader.get_physical_device_surface_formats(self.physical_device, surface) }
            .context("failed to query surface formats")?;
        let modes = unsafe { loader.get_physical_device_surface_present_modes(self.physical_device, surface) }
            .context("failed to query present modes")?;

        let format = choose_surface_format(&formats, config.prefer_srgb).context("surface reports no formats")?;
        let present_mode = choose_present_mode(&modes, config.present_mode);
        if present_mode != config.present_mode {
            log::warn!("present mode {:?} unavailable, using FIFO", config.present_mode);
        }
        self.surface = SurfaceChoice { format, present_mode };

        let target = query_surface_target(loader, self.physical_device, surface, window_extent)?
            .context("surface has zero extent")?;

        let core = &mut self.core;
        if let Err(err) = core.swapchain.recreate(&core.device, surface, self.surface, &target) {
            core.swapchain.destroy(&core.device);
            return Err(err);
        }
        self.deletion_queue
            .push(|core: &mut DeviceCore| core.swapchain.destroy(&core.device));

        let sc = &self.core.swapchain;
        log::info!(
            "swapchain {}x{} {:?} {:?}, {} images",
            sc.extent.width,
            sc.extent.height,
            sc.format,
            present_mode,
            sc.images.len()
        );
        Ok(())
    }

    fn init_render_pass(&mut self) -> Result<()> {
        let render_pass = create_render_pass(&self.core.device, self.core.swapchain.format)?;
        self.render_pass = render_pass;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_render_pass(render_pass, None);
        });
        Ok(())
    }

    fn init_framebuffers(&mut self) -> Result<()> {
        let core = &mut self.core;
        if let Err(err) = core.swapchain.create_framebuffers(&core.device, self.render_pass) {
            core.swapchain.destroy_framebuffers(&core.device);
            return Err(err);
        }
        self.deletion_queue
            .push(|core: &mut DeviceCore| core.swapchain.destroy_framebuffers(&core.device));
        Ok(())
    }

    fn init_commands(&mut self) -> Result<()> {
        let device = &self.core.device;

        let frame_pool = create_command_pool(
            device,
            self.queue_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_command_pool(frame_pool, None);
        });
        self.frame.pool = frame_pool;
        self.frame.command_buffer = allocate_primary(device, frame_pool)?;

        let upload_pool = create_command_pool(device, self.queue_family, vk::CommandPoolCreateFlags::TRANSIENT)?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_command_pool(upload_pool, None);
        });
        self.upload.pool = upload_pool;
        self.upload.command_buffer = allocate_primary(device, upload_pool)?;
        Ok(())
    }

    fn init_sync(&mut self) -> Result<()> {
        let device = &self.core.device;
        let semaphore_info = vk::SemaphoreCreateInfo::default();

        let image_available = unsafe { device.create_semaphore(&semaphore_info, None) }
            .context("failed to create semaphore")?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_semaphore(image_available, None);
        });
        self.frame.image_available = image_available;

        let render_finished = unsafe { device.create_semaphore(&semaphore_info, None) }
            .context("failed to create semaphore")?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_semaphore(render_finished, None);
        });
        self.frame.render_finished = render_finished;

        // Signaled so the first `begin_frame` does not wait on nothing.
        let in_flight = unsafe {
            device.create_fence(&vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED), None)
        }
        .context("failed to create frame fence")?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_fence(in_flight, None);
        });
        self.frame.in_flight = in_flight;

        let upload_fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .context("failed to create upload fence")?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_fence(upload_fence, None);
        });
        self.upload.fence = upload_fence;
        Ok(())
    }

    fn init_quad_buffer(&mut self) -> Result<()> {
        let core = &mut self.core;
        let mut buffer = create_buffer(
            &core.device,
            &mut core.allocator,
            "quad batch",
            batch_bytes(self.quad_capacity) as vk::DeviceSize,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::CpuToGpu,
        )?;

        match buffer.mapped_bytes_mut() {
            Ok(bytes) => bytes.fill(0),
            Err(err) => {
                destroy_buffer(&core.device, &mut core.allocator, buffer);
                return Err(err);
            }
        }

        log::debug!(
            "quad batch buffer: {} records, {} bytes",
            self.quad_capacity,
            buffer.size
        );
        core.quad_buffer = Some(buffer);
        self.deletion_queue.push(|core: &mut DeviceCore| {
            if let Some(buffer) = core.quad_buffer.take() {
                destroy_buffer(&core.device, &mut core.allocator, buffer);
            }
        });
        Ok(())
    }

    fn init_descriptors(&mut self) -> Result<()> {
        let device = &self.core.device;

        let limits = unsafe {
            self.instance
                .instance
                .get_physical_device_properties(self.physical_device)
        }
        .limits;
        ensure!(
            self.max_textures <= limits.max_per_stage_descriptor_sampled_images
                && self.max_textures <= limits.max_descriptor_set_sampled_images,
            "{} textures exceed the device limit of {} sampled images per stage",
            self.max_textures,
            limits.max_per_stage_descriptor_sampled_images
        );

        let layout = create_descriptor_set_layout(device, self.max_textures)?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_descriptor_set_layout(layout, None);
        });
        self.descriptor_set_layout = layout;

        let pool = create_descriptor_pool(device, self.max_textures)?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_descriptor_pool(pool, None);
        });
        self.descriptor_set = allocate_descriptor_set(device, pool, layout)?;

        let sampler = create_sampler(device)?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_sampler(sampler, None);
        });

        let quad_buffer = self
            .core
            .quad_buffer
            .as_ref()
            .map(|b| b.buffer)
            .context("quad buffer must exist before descriptors")?;

        let buffer_info = [vk::DescriptorBufferInfo::default()
            .buffer(quad_buffer)
            .offset(0)
            .range(vk::WHOLE_SIZE)];
        let sampler_info = [vk::DescriptorImageInfo::default().sampler(sampler)];
        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(self.descriptor_set)
                .dst_binding(QUAD_BUFFER_BINDING)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&buffer_info),
            vk::WriteDescriptorSet::default()
                .dst_set(self.descriptor_set)
                .dst_binding(SAMPLER_BINDING)
                .descriptor_type(vk::DescriptorType::SAMPLER)
                .image_info(&sampler_info),
        ];
        unsafe { self.core.device.update_descriptor_sets(&writes, &[]) };
        Ok(())
    }

    fn init_pipeline(&mut self) -> Result<()> {
        let device = &self.core.device;

        let layout = create_pipeline_layout(device, self.descriptor_set_layout)?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_pipeline_layout(layout, None);
        });
        self.pipeline_layout = layout;

        let pipeline = create_quad_pipeline(device, self.render_pass, layout, self.max_textures)?;
        self.deletion_queue.push(move |core: &mut DeviceCore| unsafe {
            core.device.destroy_pipeline(pipeline, None);
        });
        self.pipeline = pipeline;
        Ok(())
    }

    // ── helpers ───────────────────────────────────────────────────────────

    fn wait_frame_fence(&self) -> Result<()> {
        match unsafe {
            self.core
                .device
                .wait_for_fences(&[self.frame.in_flight], true, self.frame_timeout_ns)
        } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => bail!("timed out waiting for the previous frame"),
            Err(err) => Err(err).context("failed waiting for frame fence"),
        }
    }

    /// Copies `bytes` through `staging` into a new image and returns it with its view.
    fn upload_image(
        &mut self,
        staging: &mut AllocatedBuffer,
        bytes: &[u8],
        extent: vk::Extent2D,
    ) -> Result<(AllocatedImage, vk::ImageView)> {
        staging
            .mapped_bytes_mut()?
            .get_mut(..bytes.len())
            .context("staging buffer smaller than pixel data")?
            .copy_from_slice(bytes);

        let core = &mut self.core;
        let image = create_image(
            &core.device,
            &mut core.allocator,
            "texture",
            extent,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;

        let staging_buffer = staging.buffer;
        let vk_image = image.image;
        let uploaded = self
            .upload
            .submit(&core.device, self.queue, |device, cb| {
                record_image_upload(device, cb, staging_buffer, vk_image, extent)
            })
            .and_then(|()| create_texture_view(&core.device, vk_image));

        match uploaded {
            Ok(view) => Ok((image, view)),
            Err(err) => {
                destroy_image(&core.device, &mut core.allocator, image);
                Err(err)
            }
        }
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            if self.frame.in_flight != vk::Fence::null() {
                if let Err(err) = self.wait_frame_fence() {
                    log::warn!("shutdown: {err:#}");
                }
            }
            if let Err(err) = self.core.device.device_wait_idle() {
                log::warn!("shutdown: device_wait_idle failed: {err}");
            }
        }

        self.deletion_queue.flush(&mut self.core);

        unsafe {
            ManuallyDrop::drop(&mut self.core.allocator);
            self.core.device.destroy_device(None);
        }
        log::debug!("graphics device destroyed");
    }
}

impl RenderBackend for GraphicsDevice {
    type Texture = GpuTexture;

    fn surface_extent(&self) -> (u32, u32) {
        let e = self.core.swapchain.extent;
        (e.width, e.height)
    }

    fn quad_capacity(&self) -> usize {
        self.quad_capacity
    }

    fn texture_capacity(&self) -> u32 {
        self.max_textures
    }

    fn wait_for_frame(&mut self) -> Result<()> {
        self.wait_frame_fence()
    }

    fn reset_frame_fence(&mut self) -> Result<()> {
        unsafe { self.core.device.reset_fences(&[self.frame.in_flight]) }.context("failed to reset frame fence")
    }

    fn acquire_image(&mut self) -> Result<Acquire> {
        let sc = &self.core.swapchain;
        let result = unsafe {
            sc.loader.acquire_next_image(
                sc.handle,
                self.frame_timeout_ns,
                self.frame.image_available,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, suboptimal)) => Ok(Acquire::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => bail!("timed out acquiring a swapchain image"),
            Err(err) => Err(err).context("failed to acquire swapchain image"),
        }
    }

    fn rebuild_swapchain(&mut self, window_extent: (u32, u32)) -> Result<Rebuild> {
        let Some(target) = query_surface_target(
            &self.instance.surface_loader,
            self.physical_device,
            self.instance.surface,
            window_extent,
        )?
        else {
            log::debug!("surface has zero extent; keeping the current swapchain");
            return Ok(Rebuild::ZeroExtent);
        };

        unsafe { self.core.device.device_wait_idle() }.context("device_wait_idle before swapchain rebuild")?;

        let core = &mut self.core;
        core.swapchain.destroy_framebuffers(&core.device);
        core.swapchain.destroy_views(&core.device);
        core.swapchain
            .recreate(&core.device, self.instance.surface, self.surface, &target)?;
        core.swapchain.create_framebuffers(&core.device, self.render_pass)?;

        log::debug!(
            "swapchain rebuilt at {}x{}",
            core.swapchain.extent.width,
            core.swapchain.extent.height
        );
        Ok(Rebuild::Rebuilt)
    }

    fn begin_pass(&mut self, image_index: u32) -> Result<()> {
        let device = &self.core.device;
        let cb = self.frame.command_buffer;
        let extent = self.core.swapchain.extent;
        let framebuffer = *self
            .core
            .swapchain
            .framebuffers
            .get(image_index as usize)
            .context("acquired image index has no framebuffer")?;

        let clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        let area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(area)
            .clear_values(&clear);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device
                .reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())
                .context("failed to reset frame command buffer")?;
            device
                .begin_command_buffer(
                    cb,
                    &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .context("failed to begin frame command buffer")?;
            device.cmd_begin_render_pass(cb, &pass_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(cb, 0, &[viewport]);
            device.cmd_set_scissor(cb, 0, &[area]);
        }
        Ok(())
    }

    fn write_quads(&mut self, quads: &[QuadRecord]) -> Result<()> {
        let buffer = self.core.quad_buffer.as_mut().context("quad buffer is gone")?;
        write_batch(buffer.mapped_bytes_mut()?, quads)
    }

    fn draw(&mut self, projection: &Mat4, vertex_count: u32) -> Result<()> {
        let device = &self.core.device;
        let cb = self.frame.command_buffer;
        unsafe {
            device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            device.cmd_bind_descriptor_sets(
                cb,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[self.descriptor_set],
                &[],
            );
            device.cmd_push_constants(
                cb,
                self.pipeline_layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(projection),
            );
            device.cmd_draw(cb, vertex_count, 1, 0, 0);
            device.cmd_end_render_pass(cb);
            device
                .end_command_buffer(cb)
                .context("failed to end frame command buffer")?;
        }
        Ok(())
    }

    fn submit_and_present(&mut self, image_index: u32) -> Result<Present> {
        let wait = [self.frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal = [self.frame.render_finished];
        let command_buffers = [self.frame.command_buffer];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal);

        unsafe {
            self.core
                .device
                .queue_submit(self.queue, &[submit], self.frame.in_flight)
        }
        .context("failed to submit frame")?;

        let swapchains = [self.core.swapchain.handle];
        let indices = [image_index];
        let present = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe { self.core.swapchain.loader.queue_present(self.queue, &present) } {
            Ok(false) => Ok(Present::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Present::Stale),
            Err(err) => Err(err).context("failed to present"),
        }
    }

    fn upload_texture(&mut self, pixels: &PixelData) -> Result<GpuTexture> {
        let extent = vk::Extent2D {
            width: pixels.width(),
            height: pixels.height(),
        };
        let bytes = pixels.bytes();

        let core = &mut self.core;
        let mut staging = create_buffer(
            &core.device,
            &mut core.allocator,
            "texture staging",
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;

        let uploaded = self.upload_image(&mut staging, bytes, extent);
        destroy_buffer(&self.core.device, &mut self.core.allocator, staging);
        let (image, view) = uploaded?;

        let texture = GpuTexture {
            image: image.image,
            view,
        };
        self.deletion_queue.push(move |core: &mut DeviceCore| {
            unsafe { core.device.destroy_image_view(view, None) };
            destroy_image(&core.device, &mut core.allocator, image);
        });
        Ok(texture)
    }

    fn write_texture_descriptors(&mut self, textures: &[&GpuTexture]) -> Result<()> {
        if textures.is_empty() {
            return Ok(());
        }
        // The set may still be read by the frame in flight.
        self.wait_frame_fence()?;

        let infos: Vec<vk::DescriptorImageInfo> = textures
            .iter()
            .map(|t| {
                vk::DescriptorImageInfo::default()
                    .image_view(t.view)
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            })
            .collect();

        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.descriptor_set)
            .dst_binding(TEXTURE_ARRAY_BINDING)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
            .image_info(&infos);

        unsafe { self.core.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }
}

fn create_logical_device(instance: &ash::Instance, choice: &PhysicalDeviceChoice) -> Result<ash::Device> {
    let priorities = [1.0f32];
    let queue_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(choice.queue_family)
        .queue_priorities(&priorities)];

    let extensions = [ash::khr::swapchain::NAME.as_ptr()];

    let features = vk::PhysicalDeviceFeatures::default().shader_sampled_image_array_dynamic_indexing(true);
    let mut v12 = vk::PhysicalDeviceVulkan12Features::default()
        .runtime_descriptor_array(true)
        .descriptor_binding_partially_bound(true)
        .shader_sampled_image_array_non_uniform_indexing(true);

    let info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&features)
        .push_next(&mut v12);

    unsafe { instance.create_device(choice.physical_device, &info, None) }
        .context("failed to create logical device")
}

fn create_command_pool(
    device: &ash::Device,
    queue_family: u32,
    flags: vk::CommandPoolCreateFlags,
) -> Result<vk::CommandPool> {
    let info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family)
        .flags(flags);
    unsafe { device.create_command_pool(&info, None) }.context("failed to create command pool")
}

fn allocate_primary(device: &ash::Device, pool: vk::CommandPool) -> Result<vk::CommandBuffer> {
    let info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let buffers = unsafe { device.allocate_command_buffers(&info) }
        .context("failed to allocate command buffer")?;
    buffers.first().copied().context("driver returned no command buffer")
}

fn create_texture_view(device: &ash::Device, image: vk::Image) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(TEXTURE_FORMAT)
        .subresource_range(color_subresource_range());
    unsafe { device.create_image_view(&info, None) }.context("failed to create texture view")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Objects each step reads while creating its own.
    fn prerequisites(step: InitStep) -> &'static [InitStep] {
        match step {
            InitStep::Framebuffers => &[InitStep::Swapchain, InitStep::RenderPass],
            InitStep::Descriptors => &[InitStep::QuadBuffer],
            InitStep::Pipeline => &[InitStep::RenderPass, InitStep::Descriptors],
            _ => &[],
        }
    }

    fn position(order: &[&str], step: InitStep) -> usize {
        order.iter().position(|l| *l == step.label()).unwrap()
    }

    #[test]
    fn every_step_runs_once() {
        let mut labels: Vec<&str> = INIT_ORDER.iter().map(|s| s.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), INIT_ORDER.len());
    }

    #[test]
    fn steps_run_after_their_prerequisites() {
        let order: Vec<&str> = INIT_ORDER.iter().map(|s| s.label()).collect();
        for step in INIT_ORDER {
            for &dep in prerequisites(step) {
                assert!(
                    position(&order, dep) < position(&order, step),
                    "{} must be created before {}",
                    dep.label(),
                    step.label()
                );
            }
        }
    }

    #[test]
    fn teardown_destroys_dependents_first() {
        let mut queue: DeletionQueue<Vec<&'static str>> = DeletionQueue::new();
        for step in INIT_ORDER {
            let label = step.label();
            queue.push(move |log: &mut Vec<&'static str>| log.push(label));
        }

        let mut log = Vec::new();
        queue.flush(&mut log);

        assert_eq!(log.first(), Some(&"pipeline"));
        assert_eq!(log.last(), Some(&"swapchain"));
        for step in INIT_ORDER {
            for &dep in prerequisites(step) {
                assert!(position(&log, step) < position(&log, dep));
            }
        }
    }
}
