//! One-shot command submission for texture uploads.

use anyhow::{Context, Result};
use ash::vk;

use super::swapchain::color_subresource_range;

/// Command pool, buffer and fence reserved for immediate submits.
#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct UploadContext {
    pub pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
    pub fence: vk::Fence,
}

impl UploadContext {
    /// Records `record` into the upload buffer, submits it and blocks until the GPU
    /// has finished.
    pub fn submit(
        &self,
        device: &ash::Device,
        queue: vk::Queue,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<()> {
        let cb = self.command_buffer;
        unsafe {
            device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
                .context("failed to reset upload command pool")?;

            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cb, &begin)
                .context("failed to begin upload command buffer")?;
        }

        record(device, cb);

        unsafe {
            device
                .end_command_buffer(cb)
                .context("failed to end upload command buffer")?;

            let buffers = [cb];
            let submit = vk::SubmitInfo::default().command_buffers(&buffers);
            device
                .queue_submit(queue, &[submit], self.fence)
                .context("failed to submit upload")?;

            device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .context("failed waiting for upload fence")?;
            device
                .reset_fences(&[self.fence])
                .context("failed to reset upload fence")?;
        }
        Ok(())
    }
}

/// Records UNDEFINED -> TRANSFER_DST, the buffer-to-image copy, then
/// TRANSFER_DST -> SHADER_READ_ONLY.
pub(crate) fn record_image_upload(
    device: &ash::Device,
    cb: vk::CommandBuffer,
    staging: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) {
    let to_transfer = vk::ImageMemoryBarrier::default()
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

    let region = vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(0)
                .base_array_layer(0)
                .layer_count(1),
        )
        .image_offset(vk::Offset3D::default())
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        });

    let to_shader = vk::ImageMemoryBarrier::default()
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ);

    unsafe {
        device.cmd_pipeline_barrier(
            cb,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );
        device.cmd_copy_buffer_to_image(
            cb,
            staging,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        device.cmd_pipeline_barrier(
            cb,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_shader],
        );
    }
}
