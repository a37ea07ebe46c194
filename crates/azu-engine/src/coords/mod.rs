//! Plain value types shared by the draw API and the GPU layer.
//!
//! Canonical CPU space:
//! - logical pixels, origin top-left
//! - +X right, +Y down
//!
//! The projection pushed with every draw converts this space to clip space.

mod color;
mod corner_radii;
mod projection;
mod rect;
mod vec2;

pub use color::Color;
pub use corner_radii::CornerRadii;
pub use projection::{ortho, Mat4};
pub use rect::Rect;
pub use vec2::Vec2;
