use bytemuck::{Pod, Zeroable};

use crate::coords::{Color, CornerRadii, Rect};

/// `QuadRecord::fill_kind` value for a flat color fill.
pub const FILL_COLOR: u32 = 0;
/// `QuadRecord::fill_kind` value for a texture fill.
pub const FILL_TEXTURE: u32 = 1;

/// What a submitted quad is filled with.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Fill<'a> {
    Color(Color),
    /// Name of a texture previously created on the context.
    Texture(&'a str),
}

/// Optional per-quad parameters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct QuadOptions {
    pub corner_radii: CornerRadii,
    /// Constant opacity multiplied into the fill alpha.
    pub opacity: f32,
}

impl Default for QuadOptions {
    fn default() -> Self {
        Self {
            corner_radii: CornerRadii::zero(),
            opacity: 1.0,
        }
    }
}

impl QuadOptions {
    #[inline]
    pub fn with_radii(mut self, corner_radii: CornerRadii) -> Self {
        self.corner_radii = corner_radii;
        self
    }

    #[inline]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

/// One quad as read by the vertex shader from the storage buffer.
///
/// Layout (std430, 64 bytes), must match `Quad` in `shaders/quad.wgsl`:
///
///  offset  0  pos           [f32; 2]
///  offset  8  size          [f32; 2]
///  offset 16  color         [f32; 4]   (white for texture fills)
///  offset 32  radii         [f32; 4]   (tl, tr, br, bl)
///  offset 48  texture_slot  u32
///  offset 52  fill_kind     u32        (FILL_COLOR | FILL_TEXTURE)
///  offset 56  opacity       f32
///  offset 60  _pad          f32
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct QuadRecord {
    pub pos: [f32; 2],
    pub size: [f32; 2],
    pub color: [f32; 4],
    pub radii: [f32; 4],
    pub texture_slot: u32,
    pub fill_kind: u32,
    pub opacity: f32,
    pub _pad: f32,
}

const _: () = assert!(std::mem::size_of::<QuadRecord>() == 64);

impl QuadRecord {
    pub fn color(rect: Rect, color: Color, options: QuadOptions) -> Self {
        Self::build(rect, color.to_array(), 0, FILL_COLOR, options)
    }

    pub fn textured(rect: Rect, slot: u32, options: QuadOptions) -> Self {
        Self::build(rect, Color::white().to_array(), slot, FILL_TEXTURE, options)
    }

    fn build(rect: Rect, color: [f32; 4], slot: u32, fill_kind: u32, options: QuadOptions) -> Self {
        let rect = rect.normalized();
        Self {
            pos: rect.pos.to_array(),
            size: rect.size.to_array(),
            color,
            radii: options.corner_radii.to_array(),
            texture_slot: slot,
            fill_kind,
            opacity: options.opacity.clamp(0.0, 1.0),
            _pad: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn layout_matches_shader_struct() {
        assert_eq!(offset_of!(QuadRecord, pos), 0);
        assert_eq!(offset_of!(QuadRecord, size), 8);
        assert_eq!(offset_of!(QuadRecord, color), 16);
        assert_eq!(offset_of!(QuadRecord, radii), 32);
        assert_eq!(offset_of!(QuadRecord, texture_slot), 48);
        assert_eq!(offset_of!(QuadRecord, fill_kind), 52);
        assert_eq!(offset_of!(QuadRecord, opacity), 56);
        assert_eq!(std::mem::align_of::<QuadRecord>(), 4);
    }

    #[test]
    fn color_record_carries_rect_and_color() {
        let q = QuadRecord::color(Rect::new(0.0, 0.0, 100.0, 100.0), Color::white(), QuadOptions::default());
        assert_eq!(q.pos, [0.0, 0.0]);
        assert_eq!(q.size, [100.0, 100.0]);
        assert_eq!(q.color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(q.fill_kind, FILL_COLOR);
        assert_eq!(q.opacity, 1.0);
    }

    #[test]
    fn textured_record_uses_slot_and_options() {
        let opts = QuadOptions::default()
            .with_radii(CornerRadii::new(1.0, 2.0, 3.0, 4.0))
            .with_opacity(0.5);
        let q = QuadRecord::textured(Rect::new(5.0, 6.0, -10.0, 20.0), 7, opts);
        assert_eq!(q.pos, [-5.0, 6.0]);
        assert_eq!(q.size, [10.0, 20.0]);
        assert_eq!(q.texture_slot, 7);
        assert_eq!(q.fill_kind, FILL_TEXTURE);
        assert_eq!(q.radii, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(q.opacity, 0.5);
    }

    #[test]
    fn opacity_is_clamped() {
        let q = QuadRecord::color(Rect::new(0.0, 0.0, 1.0, 1.0), Color::red(), QuadOptions::default().with_opacity(3.0));
        assert_eq!(q.opacity, 1.0);
    }
}
