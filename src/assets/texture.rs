//! Decoded 2D images, keyed by their normalized file path.
//!
//! Decoding itself is left to an external `TextureDecoder`. The loader only makes sure that
//! the same file is decoded once no matter how it is spelled (`a/./b.png`, `a//b.png` and
//! `a\b.png` all resolve to `a/b.png`), and that textures are accounted by their pixel bytes
//! against the memory budget of the cache.

use std::fmt;

use crate::errors::{Error, Result};
use crate::res::pool::ResourceLoader;
use crate::res::Identifier;

/// A decoded, tightly packed 8-bit image.
#[derive(Clone, PartialEq, Eq)]
pub struct Texture {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// The number of 8-bit components per pixel.
    pub channels: u8,
}

impl Texture {
    /// Gets the size of the pixel buffer in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.pixels.len()
    }

    /// Checks that the pixel buffer matches the dimensions.
    pub fn validate(&self) -> ::std::result::Result<(), failure::Error> {
        if self.channels == 0 || self.channels > 4 {
            bail!("Unsupported number of channels {}.", self.channels);
        }

        let expected = self.width as usize * self.height as usize * self.channels as usize;
        if self.pixels.len() != expected {
            bail!(
                "{}x{}x{} texture has {} bytes of pixels, {} expected.",
                self.width,
                self.height,
                self.channels,
                self.pixels.len(),
                expected
            );
        }

        Ok(())
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Turns the file at a normalized path into pixels.
pub trait TextureDecoder: Send + Sync + 'static {
    fn decode(&self, path: &str) -> ::std::result::Result<Texture, failure::Error>;
}

impl<F> TextureDecoder for F
where
    F: Fn(&str) -> ::std::result::Result<Texture, failure::Error> + Send + Sync + 'static,
{
    fn decode(&self, path: &str) -> ::std::result::Result<Texture, failure::Error> {
        self(path)
    }
}

pub struct TextureLoader {
    decoder: Box<dyn TextureDecoder>,
}

impl TextureLoader {
    pub fn new<T: TextureDecoder>(decoder: T) -> Self {
        TextureLoader {
            decoder: Box::new(decoder),
        }
    }
}

impl ResourceLoader for TextureLoader {
    type Descriptor = str;
    type Resource = Texture;

    const NAME: &'static str = "Texture";

    fn identify(&self, path: &str) -> Result<Identifier> {
        let normalized = normalize_path(path);
        if normalized.is_empty() || normalized == "/" {
            return Err(Error::InvalidParams(format!(
                "{:?} does not name a texture file.",
                path
            )));
        }

        Ok(Identifier::from(normalized))
    }

    fn load(
        &self,
        identifier: &Identifier,
        _: &str,
    ) -> ::std::result::Result<Texture, failure::Error> {
        let texture = self.decoder.decode(identifier)?;
        texture.validate()?;

        info!(
            "[TextureLoader] loads {} ({}x{}x{}).",
            identifier, texture.width, texture.height, texture.channels
        );

        Ok(texture)
    }

    fn size(&self, texture: &Texture) -> usize {
        texture.size()
    }

    fn weight(&self, texture: &Texture) -> usize {
        texture.size()
    }

    fn delete(&self, identifier: &Identifier, _: Texture) {
        info!("[TextureLoader] deletes {}.", identifier);
    }
}

/// Normalizes `path` lexically: separators are unified to `/`, empty and `.` segments are
/// dropped, and `..` removes the preceding segment when there is one. A leading `..` of a
/// relative path is kept, while a `..` right below the root of an absolute path is dropped.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for v in path.split('/') {
        match v {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ => {
                    if !absolute {
                        segments.push(v);
                    }
                }
            },
            _ => segments.push(v),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}
