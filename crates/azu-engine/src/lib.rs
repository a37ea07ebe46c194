//! azu engine crate.
//!
//! A thin 2D renderer over Vulkan: a window, a per-frame list of color or
//! texture quads, one storage buffer and one draw call per frame.

pub mod coords;
pub mod device;
pub mod logging;
pub mod render;
pub mod window;

mod context;

pub use context::Context;
pub use coords::{Color, CornerRadii, Rect, Vec2};
pub use device::ContextConfig;
pub use render::{Fill, QuadOptions, RenderError};
pub use window::{HostEvents, WindowConfig};
