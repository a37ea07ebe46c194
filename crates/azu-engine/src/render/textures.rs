use std::collections::HashMap;
use std::path::Path;

use super::error::RenderError;

/// Tightly packed RGBA8 pixels, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelData {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl PixelData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidPixels(format!("zero-sized image {width}x{height}")));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(RenderError::InvalidPixels(format!(
                "{width}x{height} RGBA needs {expected} bytes, got {}",
                rgba.len()
            )));
        }
        Ok(Self { width, height, rgba })
    }

    /// Decodes any supported image file and converts it to RGBA8.
    pub fn decode_file(path: &Path) -> Result<Self, RenderError> {
        let decoded = image::open(path).map_err(|source| RenderError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = decoded.into_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(width, height, rgba.into_raw())
    }

    /// A `width` x `height` image filled with one RGBA value.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, RenderError> {
        let pixels = rgba.repeat(width as usize * height as usize);
        Self::new(width, height, pixels)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.rgba
    }
}

/// A texture registered in the table.
#[derive(Debug)]
pub struct TextureEntry<T> {
    pub texture: T,
    pub width: u32,
    pub height: u32,
    pub slot: u32,
}

/// Name-to-texture map with dense slot assignment.
///
/// Slots are handed out in insertion order starting at 0 and never reused, so
/// `entries[i].slot == i` always holds and the descriptor array can be written
/// straight from `entries`.
#[derive(Debug)]
pub struct TextureTable<T> {
    by_name: HashMap<String, usize>,
    entries: Vec<TextureEntry<T>>,
}

impl<T> Default for TextureTable<T> {
    fn default() -> Self {
        Self {
            by_name: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<T> TextureTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&TextureEntry<T>> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn slot(&self, name: &str) -> Option<u32> {
        self.get(name).map(|e| e.slot)
    }

    /// Registers `texture` under `name` and returns its slot.
    pub fn insert(&mut self, name: &str, texture: T, width: u32, height: u32) -> Result<u32, RenderError> {
        if self.contains(name) {
            return Err(RenderError::DuplicateTexture(name.to_owned()));
        }
        let slot = self.entries.len() as u32;
        self.entries.push(TextureEntry {
            texture,
            width,
            height,
            slot,
        });
        self.by_name.insert(name.to_owned(), slot as usize);
        Ok(slot)
    }

    /// Textures in slot order.
    pub fn iter_by_slot(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.texture)
    }
}
