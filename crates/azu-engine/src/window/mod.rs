//! Host window.
//!
//! Owns the `winit` EventLoop and Window and reports close/resize events to the
//! frame loop.

mod host;

pub use host::{HostEvents, HostWindow, WindowConfig};
