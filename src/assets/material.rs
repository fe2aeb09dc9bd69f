//! Metallic-roughness materials, keyed by a hash of their content.
//!
//! Two descriptions with identical factors, texture slots and texture transforms share one
//! `Material`, no matter where they come from. The name of a material is for humans only and
//! never takes part in its identity.

use std::ops::Deref;

use crate::errors::Result;
use crate::res::hasher::{hash_content, ContentHashable, ContentHasher};
use crate::res::pool::ResourceLoader;
use crate::res::Identifier;

/// The UV transform of a texture slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTransform {
    pub offset: [f32; 2],
    /// Rotation in radians, counter-clockwise.
    pub rotation: f32,
    pub scale: [f32; 2],
    /// Overrides the texture coordinate set of the slot.
    pub tex_coord: Option<u32>,
}

impl Default for TextureTransform {
    fn default() -> Self {
        TextureTransform {
            offset: [0.0, 0.0],
            rotation: 0.0,
            scale: [1.0, 1.0],
            tex_coord: None,
        }
    }
}

/// A reference from a material to a texture of the same scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureSlot {
    /// The index of the texture in the scene description.
    pub index: u32,
    /// The texture coordinate set used to sample it.
    pub tex_coord: u32,
    pub transform: Option<TextureTransform>,
}

impl TextureSlot {
    pub fn new(index: u32) -> Self {
        TextureSlot {
            index,
            tex_coord: 0,
            transform: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    Opaque,
    Mask,
    Blend,
}

impl Default for AlphaMode {
    fn default() -> Self {
        AlphaMode::Opaque
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDesc {
    pub name: String,
    pub base_color_factor: [f32; 4],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub emissive_factor: [f32; 3],
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub base_color_texture: Option<TextureSlot>,
    pub metallic_roughness_texture: Option<TextureSlot>,
    pub normal_texture: Option<TextureSlot>,
    pub occlusion_texture: Option<TextureSlot>,
    pub emissive_texture: Option<TextureSlot>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        MaterialDesc {
            name: String::new(),
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            emissive_factor: [0.0, 0.0, 0.0],
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
        }
    }
}

impl MaterialDesc {
    /// Iterates over all the texture slots in a fixed order.
    pub fn textures(&self) -> impl Iterator<Item = Option<&TextureSlot>> {
        vec![
            self.base_color_texture.as_ref(),
            self.metallic_roughness_texture.as_ref(),
            self.normal_texture.as_ref(),
            self.occlusion_texture.as_ref(),
            self.emissive_texture.as_ref(),
        ]
        .into_iter()
    }
}

impl ContentHashable for TextureTransform {
    fn hash_content(&self, state: &mut ContentHasher) {
        state.write_f32s(&self.offset);
        state.write_f32(self.rotation);
        state.write_f32s(&self.scale);
        state.write_option(self.tex_coord, ContentHasher::write_u32);
    }
}

impl ContentHashable for TextureSlot {
    fn hash_content(&self, state: &mut ContentHasher) {
        state.write_u32(self.index);
        state.write_u32(self.tex_coord);
        state.write_option(self.transform.as_ref(), |s, v| v.hash_content(s));
    }
}

impl ContentHashable for MaterialDesc {
    fn hash_content(&self, state: &mut ContentHasher) {
        state.write_f32s(&self.base_color_factor);
        state.write_f32(self.metallic_factor);
        state.write_f32(self.roughness_factor);
        state.write_f32s(&self.emissive_factor);
        state.write_f32(self.normal_scale);
        state.write_f32(self.occlusion_strength);
        state.write_u8(self.alpha_mode as u8);
        state.write_f32(self.alpha_cutoff);
        state.write_bool(self.double_sided);

        for v in self.textures() {
            state.write_option(v, |s, v| v.hash_content(s));
        }
    }
}

/// A material ready for use at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    desc: MaterialDesc,
}

impl Material {
    pub fn new(desc: MaterialDesc) -> Self {
        Material { desc }
    }

    #[inline]
    pub fn desc(&self) -> &MaterialDesc {
        &self.desc
    }

    /// Returns true if any texture slot is used.
    pub fn is_textured(&self) -> bool {
        self.desc.textures().any(|v| v.is_some())
    }
}

impl Deref for Material {
    type Target = MaterialDesc;

    fn deref(&self) -> &MaterialDesc {
        &self.desc
    }
}

/// Builds the runtime `Material` out of a description.
pub trait MaterialFactory: Send + Sync + 'static {
    fn create(&self, desc: &MaterialDesc) -> ::std::result::Result<Material, failure::Error> {
        validate(desc)?;
        Ok(Material { desc: desc.clone() })
    }
}

/// Validates and copies descriptions.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMaterialFactory;

impl MaterialFactory for DefaultMaterialFactory {}

/// Checks that all factors of `desc` are in range.
pub fn validate(desc: &MaterialDesc) -> ::std::result::Result<(), failure::Error> {
    let unit = |name: &str, v: f32| -> ::std::result::Result<(), failure::Error> {
        if !(0.0..=1.0).contains(&v) {
            bail!("{} {} of material {:?} is out of [0, 1].", name, v, desc.name);
        }
        Ok(())
    };

    for &v in &desc.base_color_factor {
        unit("Base color factor", v)?;
    }

    unit("Metallic factor", desc.metallic_factor)?;
    unit("Roughness factor", desc.roughness_factor)?;
    unit("Occlusion strength", desc.occlusion_strength)?;
    unit("Alpha cutoff", desc.alpha_cutoff)?;

    if desc.emissive_factor.iter().any(|v| !v.is_finite() || *v < 0.0) {
        bail!("Emissive factor of material {:?} is invalid.", desc.name);
    }

    if !desc.normal_scale.is_finite() {
        bail!("Normal scale of material {:?} is invalid.", desc.name);
    }

    Ok(())
}

pub struct MaterialLoader {
    factory: Box<dyn MaterialFactory>,
}

impl MaterialLoader {
    pub fn new<T: MaterialFactory>(factory: T) -> Self {
        MaterialLoader {
            factory: Box::new(factory),
        }
    }
}

impl Default for MaterialLoader {
    fn default() -> Self {
        MaterialLoader::new(DefaultMaterialFactory)
    }
}

impl ResourceLoader for MaterialLoader {
    type Descriptor = MaterialDesc;
    type Resource = Material;

    const NAME: &'static str = "Material";

    fn identify(&self, desc: &MaterialDesc) -> Result<Identifier> {
        Ok(hash_content(desc).to_identifier())
    }

    fn load(
        &self,
        identifier: &Identifier,
        desc: &MaterialDesc,
    ) -> ::std::result::Result<Material, failure::Error> {
        let material = self.factory.create(desc)?;
        debug!("[MaterialLoader] loads {:?} as {}.", desc.name, identifier);
        Ok(material)
    }

    fn size(&self, material: &Material) -> usize {
        ::std::mem::size_of::<Material>() + material.desc.name.len()
    }
}
