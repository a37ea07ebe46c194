use std::time::Duration;

use ash::vk;

use crate::coords::Color;

/// Quad records the batch buffer holds per frame.
pub const QUAD_CAPACITY: usize = 10_000;

/// Descriptors in the bindless texture array.
pub const MAX_TEXTURES: u32 = 1000;

/// Environment variable overriding [`ContextConfig::validation`] (`0` or `1`).
pub const VALIDATION_ENV: &str = "AZU_VALIDATION";

/// Initialization parameters for the graphics device.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Application name reported to the Vulkan driver.
    pub app_name: String,

    /// Enable `VK_LAYER_KHRONOS_validation` and route its messages into `log`.
    ///
    /// Silently disabled when the layer is not installed.
    pub validation: bool,

    /// Prefer an sRGB swapchain format when available.
    pub prefer_srgb: bool,

    /// Preferred present mode. Falls back to FIFO, which is always supported.
    pub present_mode: vk::PresentModeKHR,

    /// Color the render pass clears to.
    pub clear_color: Color,

    pub quad_capacity: usize,
    pub max_textures: u32,

    /// Bound on the frame fence wait and on image acquisition.
    pub frame_timeout: Duration,

    /// Consecutive out-of-date acquisitions tolerated within one `begin_frame`.
    pub max_swapchain_rebuilds: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            app_name: "azu".to_owned(),
            validation: cfg!(debug_assertions),
            prefer_srgb: true,
            present_mode: vk::PresentModeKHR::FIFO,
            clear_color: Color::black(),
            quad_capacity: QUAD_CAPACITY,
            max_textures: MAX_TEXTURES,
            frame_timeout: Duration::from_secs(1),
            max_swapchain_rebuilds: 16,
        }
    }
}

impl ContextConfig {
    /// Defaults, with `validation` taken from `AZU_VALIDATION` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = std::env::var(VALIDATION_ENV).ok().as_deref().and_then(parse_flag) {
            config.validation = v;
        }
        config
    }

    pub(crate) fn frame_timeout_ns(&self) -> u64 {
        u64::try_from(self.frame_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_renderer_limits() {
        let c = ContextConfig::default();
        assert_eq!(c.quad_capacity, 10_000);
        assert_eq!(c.max_textures, 1000);
        assert_eq!(c.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(c.frame_timeout_ns(), 1_000_000_000);
    }

    #[test]
    fn validation_flag_parsing() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
