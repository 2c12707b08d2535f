//! Logical textures.
//!
//! A [`Texture`] owns CPU-side pixel data for a 2D image, a cube map or
//! describes a render target. GPU copies are managed per context by the
//! texture pool.

use std::borrow::Cow;

use crate::resources::version_tracker::ChangeTracker;

/// Pixel layout of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit BGRA, four bytes per pixel.
    #[default]
    Bgra,
    /// Block-compressed colour without alpha.
    Compressed,
    /// Block-compressed colour with alpha.
    CompressedAlpha,
}

/// Sampler dimension a texture binds as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    Texture2d,
    Cube,
}

/// Number of faces of a cube texture.
pub const CUBE_FACES: usize = 6;

#[derive(Debug, Clone)]
pub enum TextureSource {
    /// 2D image; `levels[0]` is the base level.
    Image {
        width: u32,
        height: u32,
        levels: Vec<Vec<u8>>,
    },
    /// Cube map; each face holds its own mip chain.
    Cube {
        size: u32,
        faces: [Vec<Vec<u8>>; CUBE_FACES],
    },
    /// Render target; never uploaded.
    RenderTarget { width: u32, height: u32 },
}

#[derive(Debug, Clone)]
pub struct Texture {
    source: TextureSource,
    format: TextureFormat,
    generate_mipmaps: bool,
    tracker: ChangeTracker,
}

impl Texture {
    #[must_use]
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, data: Vec<u8>) -> Self {
        Self::from_source(
            TextureSource::Image {
                width,
                height,
                levels: vec![data],
            },
            format,
        )
    }

    #[must_use]
    pub fn new_cube(size: u32, format: TextureFormat, faces: [Vec<u8>; CUBE_FACES]) -> Self {
        Self::from_source(
            TextureSource::Cube {
                size,
                faces: faces.map(|face| vec![face]),
            },
            format,
        )
    }

    #[must_use]
    pub fn render_target(width: u32, height: u32) -> Self {
        Self::from_source(TextureSource::RenderTarget { width, height }, TextureFormat::Bgra)
    }

    #[must_use]
    pub fn from_source(source: TextureSource, format: TextureFormat) -> Self {
        Self {
            source,
            format,
            generate_mipmaps: false,
            tracker: ChangeTracker::new(),
        }
    }

    /// Builds the mip chain on upload when only a base level is present.
    #[must_use]
    pub fn with_generated_mipmaps(mut self) -> Self {
        self.generate_mipmaps = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[must_use]
    pub fn sampler_type(&self) -> SamplerType {
        match self.source {
            TextureSource::Cube { .. } => SamplerType::Cube,
            _ => SamplerType::Texture2d,
        }
    }

    #[must_use]
    pub fn is_render_target(&self) -> bool {
        matches!(self.source, TextureSource::RenderTarget { .. })
    }

    #[must_use]
    pub fn has_mipmaps(&self) -> bool {
        self.generate_mipmaps
            || match &self.source {
                TextureSource::Image { levels, .. } => levels.len() > 1,
                TextureSource::Cube { faces, .. } => faces[0].len() > 1,
                TextureSource::RenderTarget { .. } => false,
            }
    }

    /// Width and height of the base level.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        match self.source {
            TextureSource::Image { width, height, .. }
            | TextureSource::RenderTarget { width, height } => (width, height),
            TextureSource::Cube { size, .. } => (size, size),
        }
    }

    /// Replaces the whole payload. Contexts recreate their GPU copy when the
    /// size, level count or kind differs.
    pub fn set_source(&mut self, source: TextureSource) {
        self.source = source;
        self.tracker.changed();
    }

    /// Changes the pixel format; contexts recreate their GPU copy.
    pub fn set_format(&mut self, format: TextureFormat) {
        if self.format != format {
            self.format = format;
            self.tracker.changed();
        }
    }

    /// Replaces one mip level of a 2D image (or of every cube face when
    /// `face` is `None`).
    pub fn set_level(&mut self, face: Option<usize>, level: usize, data: Vec<u8>) {
        let chains: Vec<&mut Vec<Vec<u8>>> = match (&mut self.source, face) {
            (TextureSource::Image { levels, .. }, _) => vec![levels],
            (TextureSource::Cube { faces, .. }, Some(f)) => faces.get_mut(f).into_iter().collect(),
            (TextureSource::Cube { faces, .. }, None) => faces.iter_mut().collect(),
            (TextureSource::RenderTarget { .. }, _) => Vec::new(),
        };
        for chain in chains {
            if chain.len() <= level {
                chain.resize(level + 1, Vec::new());
            }
            chain[level].clone_from(&data);
        }
        self.tracker.changed();
    }

    /// Forces every GPU copy to re-upload.
    pub fn invalidate(&mut self) {
        self.tracker.changed();
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }

    /// Mip chain to upload for `face` (0 for 2D images).
    #[must_use]
    pub fn mip_chain(&self, face: usize) -> Cow<'_, [Vec<u8>]> {
        let (chain, size) = match &self.source {
            TextureSource::Image {
                levels,
                width,
                height,
            } => (levels.as_slice(), (*width, *height)),
            TextureSource::Cube { faces, size } => match faces.get(face) {
                Some(chain) => (chain.as_slice(), (*size, *size)),
                None => return Cow::Borrowed(&[]),
            },
            TextureSource::RenderTarget { .. } => return Cow::Borrowed(&[]),
        };

        if self.generate_mipmaps && chain.len() == 1 && self.format == TextureFormat::Bgra {
            Cow::Owned(generate_mip_chain(size.0, size.1, &chain[0]))
        } else {
            Cow::Borrowed(chain)
        }
    }
}

/// Box-filters a four-byte-per-pixel base level down to 1×1.
#[must_use]
pub fn generate_mip_chain(width: u32, height: u32, base: &[u8]) -> Vec<Vec<u8>> {
    let mut chain = vec![base.to_vec()];
    let (mut w, mut h) = (width.max(1) as usize, height.max(1) as usize);

    while w > 1 || h > 1 {
        let (nw, nh) = ((w / 2).max(1), (h / 2).max(1));
        let src = &chain[chain.len() - 1];
        let mut dst = vec![0u8; nw * nh * 4];

        for y in 0..nh {
            for x in 0..nw {
                let (x0, y0) = ((x * 2).min(w - 1), (y * 2).min(h - 1));
                let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
                for c in 0..4 {
                    let texel = |px: usize, py: usize| {
                        u32::from(src.get((py * w + px) * 4 + c).copied().unwrap_or(0))
                    };
                    let sum = texel(x0, y0) + texel(x1, y0) + texel(x0, y1) + texel(x1, y1);
                    dst[(y * nw + x) * 4 + c] = (sum / 4) as u8;
                }
            }
        }

        chain.push(dst);
        w = nw;
        h = nh;
    }

    chain
}
