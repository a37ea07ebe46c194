//! Buffer and image allocation through `gpu-allocator`.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocationSizes, AllocatorDebugSettings, MemoryLocation};

/// A buffer and the memory bound to it.
pub(crate) struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Allocation,
    pub size: vk::DeviceSize,
}

impl AllocatedBuffer {
    /// Host view of a `CpuToGpu` buffer. The mapping lives as long as the allocation.
    pub fn mapped_bytes_mut(&mut self) -> Result<&mut [u8]> {
        self.allocation
            .mapped_slice_mut()
            .context("buffer memory is not host visible")
    }
}

/// An image and the memory bound to it.
pub(crate) struct AllocatedImage {
    pub image: vk::Image,
    pub allocation: Allocation,
}

pub(crate) fn create_allocator(
    instance: &ash::Instance,
    device: &ash::Device,
    physical_device: vk::PhysicalDevice,
) -> Result<Allocator> {
    Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device: device.clone(),
        physical_device,
        debug_settings: AllocatorDebugSettings {
            log_leaks_on_shutdown: true,
            ..Default::default()
        },
        buffer_device_address: false,
        allocation_sizes: AllocationSizes::default(),
    })
    .context("failed to create GPU memory allocator")
}

pub(crate) fn create_buffer(
    device: &ash::Device,
    allocator: &mut Allocator,
    name: &str,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    location: MemoryLocation,
) -> Result<AllocatedBuffer> {
    let info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&info, None) }
        .with_context(|| format!("failed to create buffer `{name}`"))?;
    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let allocation = match allocator.allocate(&AllocationCreateDesc {
        name,
        requirements,
        location,
        linear: true,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    }) {
        Ok(a) => a,
        Err(err) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(anyhow::Error::new(err).context(format!("failed to allocate memory for `{name}`")));
        }
    };

    if let Err(err) = unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) } {
        unsafe { device.destroy_buffer(buffer, None) };
        warn_on_free_error(allocator.free(allocation), name);
        return Err(anyhow::Error::new(err).context(format!("failed to bind memory for `{name}`")));
    }

    Ok(AllocatedBuffer {
        buffer,
        allocation,
        size,
    })
}

pub(crate) fn destroy_buffer(device: &ash::Device, allocator: &mut Allocator, buffer: AllocatedBuffer) {
    warn_on_free_error(allocator.free(buffer.allocation), "buffer");
    unsafe { device.destroy_buffer(buffer.buffer, None) };
}

/// Creates a single-mip 2D image in device-local memory.
pub(crate) fn create_image(
    device: &ash::Device,
    allocator: &mut Allocator,
    name: &str,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
) -> Result<AllocatedImage> {
    let info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.create_image(&info, None) }
        .with_context(|| format!("failed to create image `{name}`"))?;
    let requirements = unsafe { device.get_image_memory_requirements(image) };

    let allocation = match allocator.allocate(&AllocationCreateDesc {
        name,
        requirements,
        location: MemoryLocation::GpuOnly,
        linear: false,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    }) {
        Ok(a) => a,
        Err(err) => {
            unsafe { device.destroy_image(image, None) };
            return Err(anyhow::Error::new(err).context(format!("failed to allocate memory for `{name}`")));
        }
    };

    if let Err(err) = unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) } {
        unsafe { device.destroy_image(image, None) };
        warn_on_free_error(allocator.free(allocation), name);
        return Err(anyhow::Error::new(err).context(format!("failed to bind memory for `{name}`")));
    }

    Ok(AllocatedImage { image, allocation })
}

pub(crate) fn destroy_image(device: &ash::Device, allocator: &mut Allocator, image: AllocatedImage) {
    warn_on_free_error(allocator.free(image.allocation), "image");
    unsafe { device.destroy_image(image.image, None) };
}

/// Logs a failed `Allocator::free`. Returns whether the memory was released.
fn warn_on_free_error(result: gpu_allocator::Result<()>, what: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            log::warn!("failed to free memory for `{what}`: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_allocator::AllocationError;

    #[test]
    fn free_errors_are_reported_not_dropped() {
        assert!(warn_on_free_error(Ok(()), "quad batch"));
        assert!(!warn_on_free_error(
            Err(AllocationError::Internal("block already freed".to_owned())),
            "quad batch"
        ));
    }
}
