use std::time::Duration;

use anyhow::{bail, Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

/// Window configuration.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    /// Initial inner size in logical pixels.
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "azu".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Events collected since the last poll.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct HostEvents {
    pub close_requested: bool,
    /// Latest inner size in physical pixels, if it changed.
    pub resized: Option<(u32, u32)>,
    /// Latest scale factor, if it changed.
    pub scale_factor: Option<f64>,
}

impl HostEvents {
    #[inline]
    pub fn surface_changed(&self) -> bool {
        self.resized.is_some() || self.scale_factor.is_some()
    }
}

/// A native window driven by polling rather than by a blocking event loop.
///
/// The caller owns the frame loop and calls [`HostWindow::poll_events`] once per
/// frame.
pub struct HostWindow {
    window: Window,
    event_loop: EventLoop<()>,
    state: HostState,
}

impl HostWindow {
    pub fn new(config: WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = HostState::new(config);

        // Windows can only be created once the loop has delivered `resumed`.
        let window = loop {
            if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(Duration::from_millis(16)), &mut state) {
                bail!("event loop exited with code {code} before the window was created");
            }
            if let Some(err) = state.create_error.take() {
                return Err(err);
            }
            if let Some(window) = state.window.take() {
                break window;
            }
        };

        let size = window.inner_size();
        log::info!(
            "window `{}` created: {}x{} physical, scale {}",
            window.title(),
            size.width,
            size.height,
            window.scale_factor()
        );

        // Events seen while waiting for creation describe the initial state.
        state.pending = HostEvents::default();

        Ok(Self {
            window,
            event_loop,
            state,
        })
    }

    /// Pumps pending platform events without blocking.
    pub fn poll_events(&mut self) -> HostEvents {
        if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.state) {
            self.state.pending.close_requested = true;
        }
        std::mem::take(&mut self.state.pending)
    }

    #[inline]
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Inner size in physical pixels.
    pub fn inner_size(&self) -> (u32, u32) {
        let s = self.window.inner_size();
        (s.width, s.height)
    }

    pub fn scale_factor(&self) -> f32 {
        self.window.scale_factor() as f32
    }
}

struct HostState {
    config: WindowConfig,
    window: Option<Window>,
    window_id: Option<WindowId>,
    create_error: Option<anyhow::Error>,
    pending: HostEvents,
}

impl HostState {
    fn new(config: WindowConfig) -> Self {
        Self {
            config,
            window: None,
            window_id: None,
            create_error: None,
            pending: HostEvents::default(),
        }
    }

    fn apply(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => self.pending.close_requested = true,
            WindowEvent::Resized(size) => self.pending.resized = Some((size.width, size.height)),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.pending.scale_factor = Some(*scale_factor);
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for HostState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window_id.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height))
            .with_resizable(self.config.resizable);

        match event_loop.create_window(attrs) {
            Ok(window) => {
                self.window_id = Some(window.id());
                self.window = Some(window);
            }
            Err(err) => {
                self.create_error = Some(anyhow::Error::new(err).context("failed to create window"));
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if Some(window_id) == self.window_id {
            self.apply(&event);
        }
    }
}
