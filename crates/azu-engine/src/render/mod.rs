//! Frame protocol, quad batching and the texture table.
//!
//! Everything here is backend-agnostic: [`Renderer`] drives any
//! [`RenderBackend`], and the Vulkan device lives in [`crate::device`].

mod backend;
mod batch;
mod error;
mod frame;
mod quad;
mod textures;

#[cfg(test)]
mod mock;

pub use backend::{Acquire, Present, Rebuild, RenderBackend};
pub use batch::{batch_bytes, write_batch};
pub use error::RenderError;
pub use frame::{FrameState, Renderer};
pub use quad::{Fill, QuadOptions, QuadRecord, FILL_COLOR, FILL_TEXTURE};
pub use textures::{PixelData, TextureEntry, TextureTable};
