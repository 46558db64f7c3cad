// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Texture sets handed to the renderer.

use crate::frame::Field;

/// OpenGL texture target constants.
pub mod gl_constants {
    /// GL_TEXTURE_2D - standard 2D texture.
    pub const GL_TEXTURE_2D: u32 = 0x0DE1;
    /// GL_TEXTURE_RECTANGLE - required for IOSurface textures on macOS.
    pub const GL_TEXTURE_RECTANGLE: u32 = 0x84F5;
    /// GL_TEXTURE_EXTERNAL_OES - SurfaceTexture / EGLImage external sampling.
    pub const GL_TEXTURE_EXTERNAL_OES: u32 = 0x8D65;
}

/// Maximum planes in a texture set (Y, Cb, Cr).
pub const MAX_PLANES: usize = 3;

/// Native texture name issued by the render context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Sampling target the texture is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTarget {
    #[default]
    Texture2D,
    Rectangle,
    External,
}

impl TextureTarget {
    pub fn gl_enum(&self) -> u32 {
        match self {
            Self::Texture2D => gl_constants::GL_TEXTURE_2D,
            Self::Rectangle => gl_constants::GL_TEXTURE_RECTANGLE,
            Self::External => gl_constants::GL_TEXTURE_EXTERNAL_OES,
        }
    }
}

/// Per-plane texel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneFormat {
    R8,
    Rg8,
    R16,
    Rg16,
    Rgba8,
}

impl PlaneFormat {
    pub fn bytes_per_texel(&self) -> u32 {
        match self {
            Self::R8 => 1,
            Self::Rg8 | Self::R16 => 2,
            Self::Rg16 | Self::Rgba8 => 4,
        }
    }
}

/// Visible region of a frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self::new(x, y, self.width.min(width - x), self.height.min(height - y))
    }
}

/// One renderer texture backing one plane of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoTexture {
    pub id: TextureId,
    pub target: TextureTarget,
    pub format: PlaneFormat,
    pub width: u32,
    pub height: u32,
    pub plane: u8,
}

/// Texture list longer than [`MAX_PLANES`], returned by [`TextureSet::new`].
#[derive(Debug, thiserror::Error)]
#[error("{} planes exceed the limit of {}", .textures.len(), MAX_PLANES)]
pub struct TooManyPlanes {
    pub textures: Vec<VideoTexture>,
}

impl TooManyPlanes {
    pub fn texture_ids(&self) -> Vec<TextureId> {
        self.textures.iter().map(|t| t.id).collect()
    }
}

/// Textures for one frame, in plane order.
///
/// Borrowed from the interop: valid until the next `acquire` on the same
/// instance or until the instance is torn down. Do not keep it longer.
/// An empty set means the frame could not be imported; keep showing the
/// previous frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureSet {
    textures: Vec<VideoTexture>,
    width: u32,
    height: u32,
    crop: CropRect,
    field: Option<Field>,
}

impl TextureSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from up to [`MAX_PLANES`] textures.
    ///
    /// Extra planes are rejected, handing every texture back so the caller
    /// can delete them.
    pub fn new(
        textures: Vec<VideoTexture>,
        width: u32,
        height: u32,
        crop: CropRect,
    ) -> Result<Self, TooManyPlanes> {
        if textures.len() > MAX_PLANES {
            return Err(TooManyPlanes { textures });
        }
        Ok(Self {
            textures,
            width,
            height,
            crop,
            field: None,
        })
    }

    /// Set backed by one packed texture.
    pub fn single(texture: VideoTexture, width: u32, height: u32, crop: CropRect) -> Self {
        Self {
            textures: vec![texture],
            width,
            height,
            crop,
            field: None,
        }
    }

    /// Mark the set for field-separated sampling.
    pub fn with_field(mut self, field: Option<Field>) -> Self {
        self.field = field;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn textures(&self) -> &[VideoTexture] {
        &self.textures
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VideoTexture> {
        self.textures.iter()
    }

    pub fn texture_ids(&self) -> Vec<TextureId> {
        self.textures.iter().map(|t| t.id).collect()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn crop(&self) -> CropRect {
        self.crop
    }

    /// Field to sample, or `None` for progressive sampling.
    pub fn field(&self) -> Option<Field> {
        self.field
    }
}

impl<'a> IntoIterator for &'a TextureSet {
    type Item = &'a VideoTexture;
    type IntoIter = std::slice::Iter<'a, VideoTexture>;

    fn into_iter(self) -> Self::IntoIter {
        self.textures.iter()
    }
}
