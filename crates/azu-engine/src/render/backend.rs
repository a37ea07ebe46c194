use anyhow::Result;

use crate::coords::Mat4;

use super::quad::QuadRecord;
use super::textures::PixelData;

/// Outcome of acquiring the next presentable image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// `suboptimal` images are still rendered to; the swapchain is rebuilt next frame.
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// Outcome of submitting and presenting a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Present {
    Presented,
    /// Out of date or suboptimal; rebuild before the next acquire.
    Stale,
}

/// Outcome of rebuilding the swapchain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rebuild {
    Rebuilt,
    /// The surface currently has no area (e.g. minimized). Nothing was torn down
    /// and the old swapchain is still in place.
    ZeroExtent,
}

/// GPU operations the frame protocol is built from.
///
/// The Vulkan implementation is [`crate::device::GraphicsDevice`]. Every method
/// error is treated as fatal by the caller.
pub trait RenderBackend {
    /// Handle to a texture uploaded by [`RenderBackend::upload_texture`].
    type Texture;

    /// Extent of the current swapchain images.
    fn surface_extent(&self) -> (u32, u32);

    /// Maximum number of quads the batch buffer holds.
    fn quad_capacity(&self) -> usize;

    /// Number of descriptors in the texture array.
    fn texture_capacity(&self) -> u32;

    /// Blocks until the previous frame's GPU work has completed.
    fn wait_for_frame(&mut self) -> Result<()>;

    /// Returns the in-flight fence to the unsignaled state.
    fn reset_frame_fence(&mut self) -> Result<()>;

    fn acquire_image(&mut self) -> Result<Acquire>;

    /// Recreates the swapchain and its framebuffers for `window_extent`.
    ///
    /// Returns [`Rebuild::ZeroExtent`] without touching the current swapchain when
    /// the surface reports a zero-sized extent.
    fn rebuild_swapchain(&mut self, window_extent: (u32, u32)) -> Result<Rebuild>;

    /// Starts command recording and the clearing render pass on `image_index`.
    fn begin_pass(&mut self, image_index: u32) -> Result<()>;

    /// Copies this frame's quads into the batch buffer.
    fn write_quads(&mut self, quads: &[QuadRecord]) -> Result<()>;

    /// Records the batch draw and closes the render pass.
    fn draw(&mut self, projection: &Mat4, vertex_count: u32) -> Result<()>;

    fn submit_and_present(&mut self, image_index: u32) -> Result<Present>;

    /// Uploads `pixels` into a device-local sampled image.
    fn upload_texture(&mut self, pixels: &PixelData) -> Result<Self::Texture>;

    /// Rewrites descriptor slots `0..textures.len()` from `textures`.
    fn write_texture_descriptors(&mut self, textures: &[&Self::Texture]) -> Result<()>;
}
