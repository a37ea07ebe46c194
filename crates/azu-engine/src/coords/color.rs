/// Straight-alpha RGBA color, components in `[0, 1]`.
///
/// Blending is `src_alpha / one_minus_src_alpha`, so colors are never premultiplied.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    #[inline]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    #[inline]
    pub const fn red() -> Self {
        Self::rgb(1.0, 0.0, 0.0)
    }

    #[inline]
    pub const fn green() -> Self {
        Self::rgb(0.0, 1.0, 0.0)
    }

    #[inline]
    pub const fn blue() -> Self {
        Self::rgb(0.0, 0.0, 1.0)
    }

    #[inline]
    pub const fn white() -> Self {
        Self::rgb(1.0, 1.0, 1.0)
    }

    #[inline]
    pub const fn black() -> Self {
        Self::rgb(0.0, 0.0, 0.0)
    }

    /// From 8-bit channels, e.g. hex literals.
    #[inline]
    pub fn from_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::rgba(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, a as f32 / 255.0)
    }

    #[inline]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite() && self.a.is_finite()
    }
}
