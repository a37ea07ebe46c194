//! In-memory backend for exercising the frame protocol without a GPU.

use anyhow::{bail, Result};

use crate::coords::Mat4;

use super::backend::{Acquire, Present, Rebuild, RenderBackend};
use super::batch::{batch_bytes, write_batch};
use super::quad::QuadRecord;
use super::textures::PixelData;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    WaitFrame,
    ResetFence,
    Acquire,
    Rebuild((u32, u32)),
    BeginPass(u32),
    WriteQuads(usize),
    Draw(u32),
    SubmitPresent(u32),
}

#[derive(Debug)]
pub(crate) struct MockTexture {
    pub id: u32,
}

pub(crate) struct MockBackend {
    pub calls: Vec<Call>,
    pub extent: (u32, u32),
    pub batch: Vec<u8>,
    pub draws: Vec<u32>,
    pub last_projection: Option<Mat4>,
    pub uploads: u32,
    pub descriptor_writes: Vec<Vec<u32>>,

    pub out_of_date_acquires: u32,
    pub suboptimal_acquires: u32,
    pub stale_presents: u32,
    /// Rebuilds that find a zero-sized surface before one succeeds.
    pub zero_extent_rebuilds: u32,
    pub fail_upload: bool,
    pub fail_descriptor_write: bool,
    pub fail_present: bool,

    quad_capacity: usize,
    texture_capacity: u32,
    image_count: u32,
    next_image: u32,
}

impl MockBackend {
    pub fn new(quad_capacity: usize, texture_capacity: u32) -> Self {
        Self {
            calls: Vec::new(),
            extent: (800, 600),
            batch: vec![0; batch_bytes(quad_capacity)],
            draws: Vec::new(),
            last_projection: None,
            uploads: 0,
            descriptor_writes: Vec::new(),
            out_of_date_acquires: 0,
            suboptimal_acquires: 0,
            stale_presents: 0,
            zero_extent_rebuilds: 0,
            fail_upload: false,
            fail_descriptor_write: false,
            fail_present: false,
            quad_capacity,
            texture_capacity,
            image_count: 1,
            next_image: 0,
        }
    }
}

impl RenderBackend for MockBackend {
    type Texture = MockTexture;

    fn surface_extent(&self) -> (u32, u32) {
        self.extent
    }

    fn quad_capacity(&self) -> usize {
        self.quad_capacity
    }

    fn texture_capacity(&self) -> u32 {
        self.texture_capacity
    }

    fn wait_for_frame(&mut self) -> Result<()> {
        self.calls.push(Call::WaitFrame);
        Ok(())
    }

    fn reset_frame_fence(&mut self) -> Result<()> {
        self.calls.push(Call::ResetFence);
        Ok(())
    }

    fn acquire_image(&mut self) -> Result<Acquire> {
        self.calls.push(Call::Acquire);
        if self.out_of_date_acquires > 0 {
            self.out_of_date_acquires -= 1;
            return Ok(Acquire::OutOfDate);
        }
        let suboptimal = self.suboptimal_acquires > 0;
        if suboptimal {
            self.suboptimal_acquires -= 1;
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(Acquire::Image { index, suboptimal })
    }

    fn rebuild_swapchain(&mut self, window_extent: (u32, u32)) -> Result<Rebuild> {
        self.calls.push(Call::Rebuild(window_extent));
        if self.zero_extent_rebuilds > 0 {
            self.zero_extent_rebuilds -= 1;
            return Ok(Rebuild::ZeroExtent);
        }
        self.extent = window_extent;
        Ok(Rebuild::Rebuilt)
    }

    fn begin_pass(&mut self, image_index: u32) -> Result<()> {
        self.calls.push(Call::BeginPass(image_index));
        Ok(())
    }

    fn write_quads(&mut self, quads: &[QuadRecord]) -> Result<()> {
        self.calls.push(Call::WriteQuads(quads.len()));
        write_batch(&mut self.batch, quads)
    }

    fn draw(&mut self, projection: &Mat4, vertex_count: u32) -> Result<()> {
        self.calls.push(Call::Draw(vertex_count));
        self.draws.push(vertex_count);
        self.last_projection = Some(*projection);
        Ok(())
    }

    fn submit_and_present(&mut self, image_index: u32) -> Result<Present> {
        self.calls.push(Call::SubmitPresent(image_index));
        if self.fail_present {
            bail!("device lost");
        }
        if self.stale_presents > 0 {
            self.stale_presents -= 1;
            return Ok(Present::Stale);
        }
        Ok(Present::Presented)
    }

    fn upload_texture(&mut self, pixels: &PixelData) -> Result<Self::Texture> {
        if self.fail_upload {
            bail!("out of device memory uploading {}x{}", pixels.width(), pixels.height());
        }
        let id = self.uploads;
        self.uploads += 1;
        Ok(MockTexture { id })
    }

    fn write_texture_descriptors(&mut self, textures: &[&Self::Texture]) -> Result<()> {
        if self.fail_descriptor_write {
            bail!("descriptor update failed");
        }
        self.descriptor_writes.push(textures.iter().map(|t| t.id).collect());
        Ok(())
    }
}
