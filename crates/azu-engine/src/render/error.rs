use std::path::PathBuf;

/// Errors surfaced by the frame and texture API.
///
/// `Device` is fatal: the frame loop should stop rather than keep rendering with a
/// device in an unknown state. Every other variant leaves the context usable.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("texture `{0}` does not exist")]
    UnknownTexture(String),

    #[error("texture `{0}` already exists")]
    DuplicateTexture(String),

    #[error("`{op}` is not valid while the frame is {state}")]
    InvalidState { op: &'static str, state: &'static str },

    #[error("quad batch is full ({capacity} quads per frame)")]
    BatchFull { capacity: usize },

    #[error("texture table is full ({capacity} slots)")]
    TextureTableFull { capacity: u32 },

    #[error("swapchain still out of date after {attempts} rebuilds")]
    SwapchainRebuildLimit { attempts: u32 },

    #[error("failed to decode image `{}`", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid pixel data: {0}")]
    InvalidPixels(String),

    #[error("graphics device error: {0:#}")]
    Device(#[from] anyhow::Error),
}

impl RenderError {
    /// Whether the error leaves the device in an unknown state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::Device(_) | RenderError::SwapchainRebuildLimit { .. })
    }
}
