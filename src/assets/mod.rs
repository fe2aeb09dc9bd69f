//! Built-in asset kinds including `Texture`, `Material` and `Mesh`.

pub mod material;
pub mod mesh;
pub mod texture;

pub mod prelude {
    pub use super::material::{
        AlphaMode, DefaultMaterialFactory, Material, MaterialDesc, MaterialFactory,
        MaterialLoader, TextureSlot, TextureTransform,
    };
    pub use super::mesh::{
        Aabb, DefaultMeshFactory, Mesh, MeshDesc, MeshFactory, MeshLoader, SubMesh, Vertex,
    };
    pub use super::texture::{Texture, TextureDecoder, TextureLoader};
}
