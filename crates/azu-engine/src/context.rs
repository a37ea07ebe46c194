use std::path::Path;

use anyhow::{Context as _, Result};

use crate::coords::{Color, Rect, Vec2};
use crate::device::{ContextConfig, GraphicsDevice};
use crate::render::{Fill, FrameState, PixelData, QuadOptions, RenderError, Renderer};
use crate::window::{HostEvents, HostWindow, WindowConfig};

/// A window with a Vulkan renderer attached.
///
/// Typical loop:
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// use azu_engine::{Color, Context, Rect};
///
/// let mut ctx = Context::new("demo", 800, 600)?;
/// loop {
///     if ctx.poll_events().close_requested {
///         break;
///     }
///     ctx.begin_frame()?;
///     ctx.submit_quad(Rect::new(10.0, 10.0, 100.0, 50.0), Color::red())?;
///     ctx.end_frame()?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Context {
    // Declared first: the device must be destroyed before the window it renders to.
    renderer: Renderer<GraphicsDevice>,
    window: HostWindow,
}

impl Context {
    /// Opens a `width` x `height` (logical pixels) window with default settings.
    ///
    /// Validation layers follow `AZU_VALIDATION` when set, else the build profile.
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        let window = WindowConfig {
            title: title.to_owned(),
            width,
            height,
            ..Default::default()
        };
        Self::with_config(window, ContextConfig::from_env())
    }

    pub fn with_config(window: WindowConfig, config: ContextConfig) -> Result<Self> {
        let window = HostWindow::new(window)?;
        let extent = window.inner_size();

        let device = GraphicsDevice::new(window.window(), extent, &config)
            .context("failed to initialize graphics device")?;
        let renderer = Renderer::new(device, extent, window.scale_factor(), config.max_swapchain_rebuilds);

        Ok(Self { renderer, window })
    }

    /// Pumps window events and forwards size changes to the renderer.
    pub fn poll_events(&mut self) -> HostEvents {
        let events = self.window.poll_events();
        if events.surface_changed() {
            self.renderer
                .resize(self.window.inner_size(), self.window.scale_factor());
        }
        events
    }

    pub fn begin_frame(&mut self) -> Result<(), RenderError> {
        self.renderer.begin_frame()
    }

    /// Queues a flat-colored quad.
    pub fn submit_quad(&mut self, rect: Rect, color: Color) -> Result<(), RenderError> {
        self.renderer
            .submit(rect, Fill::Color(color), QuadOptions::default())
    }

    /// Queues a quad sampling texture `name`.
    pub fn submit_textured_quad(&mut self, rect: Rect, name: &str, options: QuadOptions) -> Result<(), RenderError> {
        self.renderer.submit(rect, Fill::Texture(name), options)
    }

    pub fn submit(&mut self, rect: Rect, fill: Fill<'_>, options: QuadOptions) -> Result<(), RenderError> {
        self.renderer.submit(rect, fill, options)
    }

    pub fn end_frame(&mut self) -> Result<(), RenderError> {
        self.renderer.end_frame()
    }

    /// Loads an image file as texture `name`. Failures are logged and reported as `false`.
    pub fn create_texture_from_file(&mut self, name: &str, path: impl AsRef<Path>) -> bool {
        match self.try_create_texture_from_file(name, path) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("texture `{name}` not created: {err}");
                false
            }
        }
    }

    /// Loads an image file as texture `name` and returns its slot.
    pub fn try_create_texture_from_file(&mut self, name: &str, path: impl AsRef<Path>) -> Result<u32, RenderError> {
        self.renderer.create_texture_from_file(name, path.as_ref())
    }

    /// Uploads already-decoded pixels as texture `name` and returns its slot.
    pub fn create_texture(&mut self, name: &str, pixels: &PixelData) -> Result<u32, RenderError> {
        self.renderer.create_texture(name, pixels)
    }

    pub fn texture_dimensions(&self, name: &str) -> Result<Vec2, RenderError> {
        self.renderer.texture_dimensions(name)
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.renderer.frame_number()
    }

    #[inline]
    pub fn frame_state(&self) -> FrameState {
        self.renderer.state()
    }

    #[inline]
    pub fn window(&self) -> &HostWindow {
        &self.window
    }

    #[inline]
    pub fn device(&self) -> &GraphicsDevice {
        self.renderer.backend()
    }
}
