//! Vulkan device and surface management.
//!
//! This module is responsible for:
//! - creating the instance, surface, physical + logical device and queue
//! - creating and rebuilding the swapchain and its framebuffers
//! - the quad pipeline, descriptor set and batch buffer
//! - texture uploads
//! - ordered teardown through a deletion queue
//!
//! [`GraphicsDevice`] implements [`crate::render::RenderBackend`].

mod config;
mod gpu;
mod instance;
mod memory;
mod pipeline;
mod shader;
mod swapchain;
mod teardown;
mod upload;

pub use config::{ContextConfig, MAX_TEXTURES, QUAD_CAPACITY, VALIDATION_ENV};
pub use gpu::{GpuTexture, GraphicsDevice};
pub use teardown::{DeletionQueue, TeardownFn};
