//! Deterministic identifiers derived from resource content.
//!
//! Every value is fed as little-endian bytes into a 64-bit FNV-1a state, so the same content
//! produces the same identifier on every host and in every run. Floats are canonicalized
//! first: `-0.0` hashes like `0.0` and every NaN hashes alike.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::identifier::Identifier;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Bounds how much of large buffers goes into a content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherParams {
    /// The maximum number of vertices sampled from a mesh, all of them if 0.
    pub vertex_samples: usize,
    /// The maximum number of indices sampled from a mesh, all of them if 0.
    pub index_samples: usize,
}

impl Default for HasherParams {
    fn default() -> Self {
        HasherParams {
            vertex_samples: 256,
            index_samples: 256,
        }
    }
}

/// A 64-bit content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub u64);

impl ContentHash {
    /// Renders this digest as a fixed-width, 16 digits hexadecimal identifier.
    pub fn to_identifier(self) -> Identifier {
        Identifier::from(self.to_string())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Types whose content identifies them.
pub trait ContentHashable {
    fn hash_content(&self, state: &mut ContentHasher);
}

#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    state: u64,
}

impl Default for ContentHasher {
    fn default() -> Self {
        ContentHasher::new()
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        ContentHasher {
            state: FNV_OFFSET_BASIS,
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &v in bytes {
            self.state ^= u64::from(v);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    #[inline]
    pub fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    #[inline]
    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    #[inline]
    pub fn write_u32(&mut self, v: u32) {
        let mut buf = [0; 4];
        LittleEndian::write_u32(&mut buf, v);
        self.write_bytes(&buf);
    }

    #[inline]
    pub fn write_u64(&mut self, v: u64) {
        let mut buf = [0; 8];
        LittleEndian::write_u64(&mut buf, v);
        self.write_bytes(&buf);
    }

    /// Lengths are always hashed as 64-bit values.
    #[inline]
    pub fn write_usize(&mut self, v: usize) {
        self.write_u64(v as u64);
    }

    #[inline]
    pub fn write_f32(&mut self, v: f32) {
        let v = if v == 0.0 {
            0.0
        } else if v.is_nan() {
            std::f32::NAN
        } else {
            v
        };

        let mut buf = [0; 4];
        LittleEndian::write_f32(&mut buf, v);
        self.write_bytes(&buf);
    }

    pub fn write_f32s(&mut self, v: &[f32]) {
        for &f in v {
            self.write_f32(f);
        }
    }

    pub fn write_u32s(&mut self, v: &[u32]) {
        let mut buf = vec![0; v.len() * 4];
        LittleEndian::write_u32_into(v, &mut buf);
        self.write_bytes(&buf);
    }

    /// Hashes an optional value with a presence tag, so `None` never collides with
    /// any `Some`.
    pub fn write_option<T, F>(&mut self, v: Option<T>, func: F)
    where
        F: FnOnce(&mut Self, T),
    {
        match v {
            Some(v) => {
                self.write_u8(1);
                func(self, v);
            }
            None => self.write_u8(0),
        }
    }

    #[inline]
    pub fn finish(&self) -> ContentHash {
        ContentHash(self.state)
    }
}

/// Hashes the content of `v`.
pub fn hash_content<T: ContentHashable + ?Sized>(v: &T) -> ContentHash {
    let mut state = ContentHasher::new();
    v.hash_content(&mut state);
    state.finish()
}

/// Picks at most `limit` indices out of `0..len`, evenly spread and always including the
/// first and last one. Every index is picked if `limit` is 0 or `len <= limit`.
pub fn sample_indices(len: usize, limit: usize) -> impl Iterator<Item = usize> {
    let picks = if limit == 0 || len <= limit {
        len
    } else {
        limit.max(2)
    };

    (0..picks).map(move |i| {
        if picks == len {
            i
        } else {
            i * (len - 1) / (picks - 1)
        }
    })
}
