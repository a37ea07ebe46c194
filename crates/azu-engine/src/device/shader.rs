use std::ffi::CStr;

use anyhow::{anyhow, ensure, Context, Result};
use ash::vk;

const QUAD_SHADER: &str = include_str!("shaders/quad.wgsl");
const TEXTURE_CAPACITY_TOKEN: &str = "TEXTURE_CAPACITY";

pub(crate) const VERTEX_ENTRY: &CStr = c"vs_main";
pub(crate) const FRAGMENT_ENTRY: &CStr = c"fs_main";

/// Quad shader source with the texture array sized to `max_textures`, which must
/// match the descriptor count of the texture binding.
pub(crate) fn quad_shader_source(max_textures: u32) -> Result<String> {
    ensure!(max_textures > 0, "texture array needs at least one descriptor");
    Ok(QUAD_SHADER.replace(TEXTURE_CAPACITY_TOKEN, &max_textures.to_string()))
}

/// Compiles WGSL source to SPIR-V words.
///
/// Clip space is emitted unchanged, so projections must already target Vulkan's
/// y-down convention.
pub(crate) fn compile_wgsl(source: &str) -> Result<Vec<u32>> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("WGSL parse error:\n{}", e.emit_to_string(source)))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("WGSL validation error:\n{}", e.emit_to_string(source)))?;

    naga::back::spv::write_vec(
        &module,
        &info,
        &naga::back::spv::Options {
            lang_version: (1, 5),
            flags: naga::back::spv::WriterFlags::empty(),
            ..Default::default()
        },
        None,
    )
    .context("SPIR-V generation failed")
}

pub(crate) fn create_shader_module(device: &ash::Device, spirv: &[u32]) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(spirv);
    unsafe { device.create_shader_module(&info, None) }.context("failed to create shader module")
}
