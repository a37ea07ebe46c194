use std::path::Path;

use crate::coords::{ortho, Rect, Vec2};

use super::backend::{Acquire, Present, Rebuild, RenderBackend};
use super::error::RenderError;
use super::quad::{Fill, QuadOptions, QuadRecord};
use super::textures::{PixelData, TextureTable};

/// Where the renderer is in the begin/submit/end cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    /// `target` is the acquired swapchain image, or `None` when the window is
    /// minimized and the frame records nothing on the GPU.
    Recording { target: Option<u32> },
    /// GPU work for the frame is being submitted and presented.
    Submitted,
}

impl FrameState {
    pub fn name(self) -> &'static str {
        match self {
            FrameState::Idle => "idle",
            FrameState::Recording { .. } => "recording",
            FrameState::Submitted => "submitted",
        }
    }
}

/// Frame protocol and texture bookkeeping on top of a [`RenderBackend`].
///
/// One frame is in flight at a time: `begin_frame` waits for the previous frame's
/// fence before touching the batch buffer or the command buffer.
pub struct Renderer<B: RenderBackend> {
    backend: B,
    state: FrameState,
    quads: Vec<QuadRecord>,
    textures: TextureTable<B::Texture>,

    /// Window size in physical pixels.
    window_extent: (u32, u32),
    scale_factor: f32,
    swapchain_stale: bool,
    max_swapchain_rebuilds: u32,

    frame_number: u64,
}

impl<B: RenderBackend> Renderer<B> {
    pub fn new(backend: B, window_extent: (u32, u32), scale_factor: f32, max_swapchain_rebuilds: u32) -> Self {
        let capacity = backend.quad_capacity();
        Self {
            backend,
            state: FrameState::Idle,
            quads: Vec::with_capacity(capacity),
            textures: TextureTable::new(),
            window_extent,
            scale_factor: sanitize_scale(scale_factor),
            swapchain_stale: false,
            max_swapchain_rebuilds: max_swapchain_rebuilds.max(1),
            frame_number: 0,
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of frames ended so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Quads submitted in the current frame.
    #[inline]
    pub fn quad_count(&self) -> usize {
        self.quads.len()
    }

    #[inline]
    pub fn textures(&self) -> &TextureTable<B::Texture> {
        &self.textures
    }

    #[inline]
    pub fn is_swapchain_stale(&self) -> bool {
        self.swapchain_stale
    }

    /// Records a new window size. The swapchain is rebuilt at the next `begin_frame`.
    pub fn resize(&mut self, window_extent: (u32, u32), scale_factor: f32) {
        self.scale_factor = sanitize_scale(scale_factor);
        if window_extent != self.window_extent {
            log::debug!(
                "window resized {}x{} -> {}x{}",
                self.window_extent.0,
                self.window_extent.1,
                window_extent.0,
                window_extent.1
            );
            self.window_extent = window_extent;
            self.swapchain_stale = true;
        }
    }

    // ── frame protocol ────────────────────────────────────────────────────

    pub fn begin_frame(&mut self) -> Result<(), RenderError> {
        self.expect_state("begin_frame", FrameState::Idle)?;
        self.quads.clear();

        if self.window_extent.0 == 0 || self.window_extent.1 == 0 {
            self.state = FrameState::Recording { target: None };
            return Ok(());
        }

        self.backend.wait_for_frame()?;

        if self.swapchain_stale {
            if self.backend.rebuild_swapchain(self.window_extent)? == Rebuild::ZeroExtent {
                log::debug!("surface has zero extent; skipping GPU work this frame");
                self.state = FrameState::Recording { target: None };
                return Ok(());
            }
            self.swapchain_stale = false;
        }

        let Some(image_index) = self.acquire_with_rebuild()? else {
            self.state = FrameState::Recording { target: None };
            return Ok(());
        };

        // Reset only once an image is in hand so an early return cannot leave the
        // fence unsignaled with nothing submitted.
        self.backend.reset_frame_fence()?;
        self.backend.begin_pass(image_index)?;

        self.state = FrameState::Recording {
            target: Some(image_index),
        };
        Ok(())
    }

    /// Acquires an image, rebuilding on out-of-date up to the configured limit.
    ///
    /// `None` means the surface shrank to nothing while rebuilding; the swapchain
    /// stays stale so the next frame tries again.
    fn acquire_with_rebuild(&mut self) -> Result<Option<u32>, RenderError> {
        let mut rebuilds = 0;
        loop {
            match self.backend.acquire_image()? {
                Acquire::Image { index, suboptimal } => {
                    if suboptimal {
                        self.swapchain_stale = true;
                    }
                    return Ok(Some(index));
                }
                Acquire::OutOfDate => {
                    if rebuilds == self.max_swapchain_rebuilds {
                        return Err(RenderError::SwapchainRebuildLimit { attempts: rebuilds });
                    }
                    rebuilds += 1;
                    log::debug!("swapchain out of date on acquire; rebuild {rebuilds}");
                    if self.backend.rebuild_swapchain(self.window_extent)? == Rebuild::ZeroExtent {
                        log::debug!("surface has zero extent; skipping GPU work this frame");
                        self.swapchain_stale = true;
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Appends a quad to the current frame.
    pub fn submit(&mut self, rect: Rect, fill: Fill<'_>, options: QuadOptions) -> Result<(), RenderError> {
        if !matches!(self.state, FrameState::Recording { .. }) {
            return Err(self.invalid_state("submit_quad"));
        }

        let record = match fill {
            Fill::Color(color) => QuadRecord::color(rect, color, options),
            Fill::Texture(name) => {
                let slot = self
                    .textures
                    .slot(name)
                    .ok_or_else(|| RenderError::UnknownTexture(name.to_owned()))?;
                QuadRecord::textured(rect, slot, options)
            }
        };

        let capacity = self.backend.quad_capacity();
        if self.quads.len() >= capacity {
            return Err(RenderError::BatchFull { capacity });
        }

        self.quads.push(record);
        Ok(())
    }

    pub fn end_frame(&mut self) -> Result<(), RenderError> {
        let target = match self.state {
            FrameState::Recording { target } => target,
            _ => return Err(self.invalid_state("end_frame")),
        };

        self.state = FrameState::Submitted;
        let result = match target {
            Some(image_index) => self.submit_frame(image_index),
            None => Ok(()),
        };

        self.state = FrameState::Idle;
        self.frame_number += 1;
        result
    }

    fn submit_frame(&mut self, image_index: u32) -> Result<(), RenderError> {
        self.backend.write_quads(&self.quads)?;

        let (w, h) = self.backend.surface_extent();
        let projection = ortho(w as f32 / self.scale_factor, h as f32 / self.scale_factor);
        let vertex_count = (self.quads.len() * 6) as u32;
        self.backend.draw(&projection, vertex_count)?;

        if self.backend.submit_and_present(image_index)? == Present::Stale {
            log::debug!("swapchain stale after present");
            self.swapchain_stale = true;
        }
        Ok(())
    }

    // ── textures ──────────────────────────────────────────────────────────

    /// Uploads `pixels` under `name` and returns the assigned slot.
    pub fn create_texture(&mut self, name: &str, pixels: &PixelData) -> Result<u32, RenderError> {
        self.check_texture_admissible(name)?;

        let texture = self.backend.upload_texture(pixels)?;

        // The new texture takes the next dense slot; it only enters the table once
        // its descriptor is written.
        let mut all: Vec<&B::Texture> = self.textures.iter_by_slot().collect();
        all.push(&texture);
        self.backend.write_texture_descriptors(&all)?;

        let slot = self.textures.insert(name, texture, pixels.width(), pixels.height())?;

        log::debug!("texture `{name}` ({}x{}) -> slot {slot}", pixels.width(), pixels.height());
        Ok(slot)
    }

    /// Decodes the image at `path` and uploads it under `name`.
    ///
    /// Name and state checks run before the file is read.
    pub fn create_texture_from_file(&mut self, name: &str, path: &Path) -> Result<u32, RenderError> {
        self.check_texture_admissible(name)?;
        let pixels = PixelData::decode_file(path)?;
        self.create_texture(name, &pixels)
    }

    /// Dimensions of texture `name` in pixels.
    pub fn texture_dimensions(&self, name: &str) -> Result<Vec2, RenderError> {
        self.textures
            .get(name)
            .map(|e| Vec2::new(e.width as f32, e.height as f32))
            .ok_or_else(|| RenderError::UnknownTexture(name.to_owned()))
    }

    fn check_texture_admissible(&self, name: &str) -> Result<(), RenderError> {
        if matches!(self.state, FrameState::Recording { .. }) {
            return Err(self.invalid_state("create_texture"));
        }
        if self.textures.contains(name) {
            return Err(RenderError::DuplicateTexture(name.to_owned()));
        }
        let capacity = self.backend.texture_capacity();
        if self.textures.len() >= capacity as usize {
            return Err(RenderError::TextureTableFull { capacity });
        }
        Ok(())
    }

    // ── helpers ───────────────────────────────────────────────────────────

    fn expect_state(&self, op: &'static str, expected: FrameState) -> Result<(), RenderError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(op))
        }
    }

    fn invalid_state(&self, op: &'static str) -> RenderError {
        RenderError::InvalidState {
            op,
            state: self.state.name(),
        }
    }
}

fn sanitize_scale(scale_factor: f32) -> f32 {
    if scale_factor.is_finite() && scale_factor > 0.0 {
        scale_factor
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Color, CornerRadii};
    use crate::render::batch::read_record;
    use crate::render::mock::{Call, MockBackend};
    use crate::render::quad::{FILL_COLOR, FILL_TEXTURE};

    fn renderer(backend: MockBackend) -> Renderer<MockBackend> {
        let extent = backend.extent;
        Renderer::new(backend, extent, 1.0, 4)
    }

    fn red_square() -> (Rect, Fill<'static>) {
        (Rect::new(0.0, 0.0, 10.0, 10.0), Fill::Color(Color::red()))
    }

    #[test]
    fn single_color_quad_frame() {
        let mut r = renderer(MockBackend::new(16, 8));

        r.begin_frame().unwrap();
        r.submit(
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Fill::Color(Color::white()),
            QuadOptions::default(),
        )
        .unwrap();
        r.end_frame().unwrap();

        let b = r.backend();
        assert_eq!(b.draws, vec![6]);
        let q = read_record(&b.batch, 0);
        assert_eq!(q.pos, [0.0, 0.0]);
        assert_eq!(q.size, [100.0, 100.0]);
        assert_eq!(q.color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(q.fill_kind, FILL_COLOR);
        assert!(b.batch[64..].iter().all(|&x| x == 0));
        assert_eq!(r.frame_number(), 1);
        assert_eq!(r.state(), FrameState::Idle);
    }

    #[test]
    fn frame_calls_follow_protocol_order() {
        let mut r = renderer(MockBackend::new(16, 8));
        r.begin_frame().unwrap();
        let (rect, fill) = red_square();
        r.submit(rect, fill, QuadOptions::default()).unwrap();
        r.end_frame().unwrap();

        assert_eq!(
            r.backend().calls,
            vec![
                Call::WaitFrame,
                Call::Acquire,
                Call::ResetFence,
                Call::BeginPass(0),
                Call::WriteQuads(1),
                Call::Draw(6),
                Call::SubmitPresent(0),
            ]
        );
    }

    #[test]
    fn textured_quad_uses_assigned_slot() {
        let mut r = renderer(MockBackend::new(16, 8));
        let pixels = PixelData::solid(4, 4, [255, 0, 0, 255]).unwrap();
        assert_eq!(r.create_texture("red", &pixels).unwrap(), 0);

        r.begin_frame().unwrap();
        r.submit(
            Rect::new(10.0, 10.0, 64.0, 64.0),
            Fill::Texture("red"),
            QuadOptions::default(),
        )
        .unwrap();
        r.end_frame().unwrap();

        let q = read_record(&r.backend().batch, 0);
        assert_eq!(q.fill_kind, FILL_TEXTURE);
        assert_eq!(q.texture_slot, 0);
        assert_eq!(q.color, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn texture_slots_are_dense_and_descriptors_rewritten() {
        let mut r = renderer(MockBackend::new(16, 8));
        let px = PixelData::solid(2, 2, [0, 0, 0, 255]).unwrap();

        assert_eq!(r.create_texture("a", &px).unwrap(), 0);
        assert_eq!(r.create_texture("b", &px).unwrap(), 1);
        assert_eq!(r.create_texture("c", &px).unwrap(), 2);

        // Every add rewrites the full populated range in slot order.
        assert_eq!(r.backend().descriptor_writes, vec![vec![0], vec![0, 1], vec![0, 1, 2]]);
    }

    #[test]
    fn duplicate_texture_is_rejected_and_original_kept() {
        let mut r = renderer(MockBackend::new(16, 8));
        r.create_texture("a", &PixelData::solid(2, 2, [0; 4]).unwrap()).unwrap();

        let err = r
            .create_texture("a", &PixelData::solid(8, 8, [0; 4]).unwrap())
            .unwrap_err();
        assert!(matches!(err, RenderError::DuplicateTexture(ref n) if n == "a"));
        assert_eq!(r.texture_dimensions("a").unwrap(), Vec2::new(2.0, 2.0));
        assert_eq!(r.backend().uploads, 1);
    }

    #[test]
    fn duplicate_is_detected_before_decoding() {
        let mut r = renderer(MockBackend::new(16, 8));
        r.create_texture("a", &PixelData::solid(1, 1, [0; 4]).unwrap()).unwrap();

        // The path does not exist; a decode attempt would report `Decode`.
        let err = r
            .create_texture_from_file("a", Path::new("/no/such/file.png"))
            .unwrap_err();
        assert!(matches!(err, RenderError::DuplicateTexture(_)));
    }

    #[test]
    fn failed_decode_consumes_no_slot() {
        let mut r = renderer(MockBackend::new(16, 8));
        let err = r
            .create_texture_from_file("bad", Path::new("/no/such/file.png"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Decode { .. }));
        assert!(r.textures().is_empty());

        let slot = r.create_texture("good", &PixelData::solid(1, 1, [0; 4]).unwrap()).unwrap();
        assert_eq!(slot, 0);
    }

    #[test]
    fn failed_upload_consumes_no_slot() {
        let mut backend = MockBackend::new(16, 8);
        backend.fail_upload = true;
        let mut r = renderer(backend);

        let err = r.create_texture("x", &PixelData::solid(1, 1, [0; 4]).unwrap()).unwrap_err();
        assert!(matches!(err, RenderError::Device(_)));
        assert!(!r.textures().contains("x"));
    }

    #[test]
    fn failed_descriptor_write_consumes_no_slot() {
        let mut backend = MockBackend::new(16, 8);
        backend.fail_descriptor_write = true;
        let mut r = renderer(backend);
        let px = PixelData::solid(1, 1, [0; 4]).unwrap();

        let err = r.create_texture("a", &px).unwrap_err();
        assert!(matches!(err, RenderError::Device(_)));
        assert!(r.textures().is_empty());
        assert!(matches!(r.texture_dimensions("a"), Err(RenderError::UnknownTexture(_))));

        r.backend.fail_descriptor_write = false;
        assert_eq!(r.create_texture("a", &px).unwrap(), 0);
        // Only the second upload (id 1) ever reaches the descriptor array.
        assert_eq!(r.backend().descriptor_writes, vec![vec![1]]);
    }

    #[test]
    fn texture_table_capacity_is_enforced() {
        let mut r = renderer(MockBackend::new(16, 2));
        let px = PixelData::solid(1, 1, [0; 4]).unwrap();
        r.create_texture("a", &px).unwrap();
        r.create_texture("b", &px).unwrap();
        assert!(matches!(
            r.create_texture("c", &px),
            Err(RenderError::TextureTableFull { capacity: 2 })
        ));
    }

    #[test]
    fn unknown_texture_leaves_quad_list_unchanged() {
        let mut r = renderer(MockBackend::new(16, 8));
        r.begin_frame().unwrap();
        let (rect, fill) = red_square();
        r.submit(rect, fill, QuadOptions::default()).unwrap();

        let err = r
            .submit(rect, Fill::Texture("missing"), QuadOptions::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::UnknownTexture(ref n) if n == "missing"));
        assert_eq!(r.quad_count(), 1);
        r.end_frame().unwrap();
    }

    #[test]
    fn texture_dimensions_of_unknown_name_fails() {
        let r = renderer(MockBackend::new(16, 8));
        assert!(matches!(r.texture_dimensions("nope"), Err(RenderError::UnknownTexture(_))));
    }

    #[test]
    fn batch_full_is_reported_at_capacity() {
        let mut r = renderer(MockBackend::new(2, 8));
        r.begin_frame().unwrap();
        let (rect, fill) = red_square();
        r.submit(rect, fill, QuadOptions::default()).unwrap();
        r.submit(rect, fill, QuadOptions::default()).unwrap();
        assert!(matches!(
            r.submit(rect, fill, QuadOptions::default()),
            Err(RenderError::BatchFull { capacity: 2 })
        ));
        r.end_frame().unwrap();
        assert_eq!(r.backend().draws, vec![12]);
    }

    #[test]
    fn shrinking_frame_clears_trailing_records() {
        let mut r = renderer(MockBackend::new(8, 8));
        let (rect, fill) = red_square();

        r.begin_frame().unwrap();
        for _ in 0..5 {
            r.submit(rect, fill, QuadOptions::default()).unwrap();
        }
        r.end_frame().unwrap();

        r.begin_frame().unwrap();
        for _ in 0..3 {
            r.submit(rect, fill, QuadOptions::default()).unwrap();
        }
        r.end_frame().unwrap();

        let b = r.backend();
        assert_eq!(b.draws, vec![30, 18]);
        assert!(b.batch[3 * 64..].iter().all(|&x| x == 0));
    }

    #[test]
    fn five_zero_three_frames() {
        let mut r = renderer(MockBackend::new(8, 8));
        let (rect, fill) = red_square();

        for count in [5, 0, 3] {
            r.begin_frame().unwrap();
            for _ in 0..count {
                r.submit(rect, fill, QuadOptions::default()).unwrap();
            }
            r.end_frame().unwrap();
            if count == 0 {
                assert!(r.backend().batch.iter().all(|&x| x == 0));
            }
        }

        assert_eq!(r.backend().draws, vec![30, 0, 18]);
    }

    #[test]
    fn same_file_loaded_twice_under_one_name() {
        let path = std::env::temp_dir().join(format!("azu-texture-{}.png", std::process::id()));
        image::RgbaImage::from_pixel(3, 2, image::Rgba([0, 255, 0, 255]))
            .save(&path)
            .unwrap();

        let mut r = renderer(MockBackend::new(8, 8));
        assert_eq!(r.create_texture_from_file("a", &path).unwrap(), 0);
        assert!(matches!(
            r.create_texture_from_file("a", &path),
            Err(RenderError::DuplicateTexture(_))
        ));
        assert_eq!(r.textures().len(), 1);
        assert_eq!(r.texture_dimensions("a").unwrap(), Vec2::new(3.0, 2.0));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn empty_frame_still_draws_and_presents() {
        let mut r = renderer(MockBackend::new(8, 8));
        r.begin_frame().unwrap();
        r.end_frame().unwrap();

        let b = r.backend();
        assert_eq!(b.draws, vec![0]);
        assert!(b.calls.contains(&Call::SubmitPresent(0)));
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let mut r = renderer(MockBackend::new(8, 8));
        let (rect, fill) = red_square();

        assert!(matches!(r.end_frame(), Err(RenderError::InvalidState { op: "end_frame", state: "idle" })));
        assert!(matches!(
            r.submit(rect, fill, QuadOptions::default()),
            Err(RenderError::InvalidState { op: "submit_quad", .. })
        ));

        r.begin_frame().unwrap();
        assert!(matches!(
            r.begin_frame(),
            Err(RenderError::InvalidState { op: "begin_frame", state: "recording" })
        ));
        assert!(matches!(
            r.create_texture("t", &PixelData::solid(1, 1, [0; 4]).unwrap()),
            Err(RenderError::InvalidState { op: "create_texture", .. })
        ));
        r.end_frame().unwrap();
        assert_eq!(r.frame_number(), 1);
    }

    #[test]
    fn resize_rebuilds_before_next_acquire() {
        let mut r = renderer(MockBackend::new(8, 8));
        r.resize((1024, 768), 1.0);
        r.begin_frame().unwrap();
        r.end_frame().unwrap();

        let calls = &r.backend().calls;
        assert_eq!(calls[0], Call::WaitFrame);
        assert_eq!(calls[1], Call::Rebuild((1024, 768)));
        assert_eq!(calls[2], Call::Acquire);
        assert!(!r.is_swapchain_stale());
    }

    #[test]
    fn out_of_date_acquire_rebuilds_and_retries() {
        let mut backend = MockBackend::new(8, 8);
        backend.out_of_date_acquires = 2;
        let mut r = renderer(backend);

        r.begin_frame().unwrap();
        r.end_frame().unwrap();

        let rebuilds = r
            .backend()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Rebuild(_)))
            .count();
        assert_eq!(rebuilds, 2);
        assert_eq!(r.backend().draws, vec![0]);
    }

    #[test]
    fn persistent_out_of_date_hits_rebuild_limit() {
        let mut backend = MockBackend::new(8, 8);
        backend.out_of_date_acquires = u32::MAX;
        let mut r = renderer(backend);

        assert!(matches!(
            r.begin_frame(),
            Err(RenderError::SwapchainRebuildLimit { attempts: 4 })
        ));
        // The fence was never reset, so waiting on it again cannot deadlock.
        assert!(!r.backend().calls.contains(&Call::ResetFence));
    }

    #[test]
    fn suboptimal_acquire_renders_then_rebuilds() {
        let mut backend = MockBackend::new(8, 8);
        backend.suboptimal_acquires = 1;
        let mut r = renderer(backend);

        r.begin_frame().unwrap();
        assert!(r.is_swapchain_stale());
        r.end_frame().unwrap();
        assert_eq!(r.backend().draws, vec![0]);

        r.begin_frame().unwrap();
        r.end_frame().unwrap();
        assert!(r.backend().calls.iter().any(|c| matches!(c, Call::Rebuild(_))));
    }

    #[test]
    fn stale_present_marks_swapchain_for_rebuild() {
        let mut backend = MockBackend::new(8, 8);
        backend.stale_presents = 1;
        let mut r = renderer(backend);

        r.begin_frame().unwrap();
        r.end_frame().unwrap();
        assert!(r.is_swapchain_stale());
    }

    #[test]
    fn minimized_window_records_no_gpu_work() {
        let mut r = renderer(MockBackend::new(8, 8));
        r.resize((0, 0), 1.0);

        r.begin_frame().unwrap();
        let (rect, fill) = red_square();
        r.submit(rect, fill, QuadOptions::default()).unwrap();
        r.end_frame().unwrap();

        assert!(r.backend().calls.is_empty());
        assert_eq!(r.frame_number(), 1);
    }

    #[test]
    fn zero_surface_while_retrying_acquire_skips_the_frame() {
        let mut backend = MockBackend::new(8, 8);
        backend.out_of_date_acquires = 1;
        backend.zero_extent_rebuilds = 1;
        let mut r = renderer(backend);

        r.begin_frame().unwrap();
        assert_eq!(r.state(), FrameState::Recording { target: None });
        let (rect, fill) = red_square();
        r.submit(rect, fill, QuadOptions::default()).unwrap();
        r.end_frame().unwrap();

        assert_eq!(
            r.backend().calls,
            vec![Call::WaitFrame, Call::Acquire, Call::Rebuild((800, 600))]
        );
        assert!(r.is_swapchain_stale());
        assert_eq!(r.frame_number(), 1);

        // The surface is back: rebuild first, then render normally.
        r.begin_frame().unwrap();
        r.end_frame().unwrap();
        assert_eq!(
            r.backend().calls[3..],
            [
                Call::WaitFrame,
                Call::Rebuild((800, 600)),
                Call::Acquire,
                Call::ResetFence,
                Call::BeginPass(0),
                Call::WriteQuads(0),
                Call::Draw(0),
                Call::SubmitPresent(0),
            ]
        );
        assert!(!r.is_swapchain_stale());
    }

    #[test]
    fn zero_surface_on_resize_rebuild_keeps_swapchain_stale() {
        let mut backend = MockBackend::new(8, 8);
        backend.zero_extent_rebuilds = 1;
        let mut r = renderer(backend);
        r.resize((1024, 768), 1.0);

        r.begin_frame().unwrap();
        assert_eq!(r.state(), FrameState::Recording { target: None });
        r.end_frame().unwrap();

        assert_eq!(r.backend().calls, vec![Call::WaitFrame, Call::Rebuild((1024, 768))]);
        assert!(r.is_swapchain_stale());
    }

    #[test]
    fn projection_uses_logical_size() {
        let mut r = renderer(MockBackend::new(8, 8));
        r.resize((800, 600), 2.0);
        r.begin_frame().unwrap();
        r.end_frame().unwrap();

        // Logical 400x300 -> x scale 2/400.
        let proj = r.backend().last_projection.unwrap();
        assert!((proj[0][0] - 2.0 / 400.0).abs() < 1e-6);
        assert!((proj[1][1] - 2.0 / 300.0).abs() < 1e-6);
    }

    #[test]
    fn options_flow_into_records() {
        let mut r = renderer(MockBackend::new(8, 8));
        r.begin_frame().unwrap();
        r.submit(
            Rect::new(0.0, 0.0, 50.0, 20.0),
            Fill::Color(Color::blue()),
            QuadOptions::default()
                .with_radii(CornerRadii::all(4.0))
                .with_opacity(0.25),
        )
        .unwrap();
        r.end_frame().unwrap();

        let q = read_record(&r.backend().batch, 0);
        assert_eq!(q.radii, [4.0; 4]);
        assert_eq!(q.opacity, 0.25);
    }

    #[test]
    fn device_errors_propagate_and_return_to_idle() {
        let mut backend = MockBackend::new(8, 8);
        backend.fail_present = true;
        let mut r = renderer(backend);

        r.begin_frame().unwrap();
        let err = r.end_frame().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(r.state(), FrameState::Idle);
    }
}
