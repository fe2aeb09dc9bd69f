//! Indexed triangle meshes, keyed by a hash of their content.
//!
//! Meshes could be large, so only an evenly spread sample of vertices and indices is hashed
//! (see `HasherParams`). The lengths of both buffers and every sub-mesh always take part.

use std::mem;
use std::ops::Deref;

use smallvec::SmallVec;

use crate::errors::Result;
use crate::res::hasher::{sample_indices, ContentHasher, HasherParams};
use crate::res::pool::ResourceLoader;
use crate::res::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3]) -> Self {
        Vertex {
            position,
            ..Default::default()
        }
    }
}

/// A range of indices drawn with one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubMesh {
    pub start: u32,
    pub count: u32,
    /// The index of the material in the scene description.
    pub material: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshDesc {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub sub_meshes: SmallVec<[SubMesh; 4]>,
}

impl MeshDesc {
    /// Hashes the content of this mesh, sampling the buffers as `params` says.
    pub fn hash_content(&self, params: &HasherParams, state: &mut ContentHasher) {
        state.write_usize(self.vertices.len());
        for i in sample_indices(self.vertices.len(), params.vertex_samples) {
            let v = &self.vertices[i];
            state.write_f32s(&v.position);
            state.write_f32s(&v.normal);
            state.write_f32s(&v.uv);
        }

        state.write_usize(self.indices.len());
        for i in sample_indices(self.indices.len(), params.index_samples) {
            state.write_u32(self.indices[i]);
        }

        state.write_usize(self.sub_meshes.len());
        for v in &self.sub_meshes {
            state.write_u32(v.start);
            state.write_u32(v.count);
            state.write_option(v.material, ContentHasher::write_u32);
        }
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    pub fn from_vertices(vertices: &[Vertex]) -> Option<Self> {
        let first = vertices.first()?;
        let mut aabb = Aabb {
            min: first.position,
            max: first.position,
        };

        for v in &vertices[1..] {
            for i in 0..3 {
                aabb.min[i] = aabb.min[i].min(v.position[i]);
                aabb.max[i] = aabb.max[i].max(v.position[i]);
            }
        }

        Some(aabb)
    }
}

/// A mesh ready for use at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    desc: MeshDesc,
    aabb: Option<Aabb>,
}

impl Mesh {
    pub fn new(desc: MeshDesc) -> Self {
        let aabb = Aabb::from_vertices(&desc.vertices);
        Mesh { desc, aabb }
    }

    #[inline]
    pub fn desc(&self) -> &MeshDesc {
        &self.desc
    }

    /// Gets the bounds of all vertices, `None` if there is none.
    #[inline]
    pub fn aabb(&self) -> Option<Aabb> {
        self.aabb
    }

    /// Gets the size of the vertex and index buffers in bytes.
    pub fn size(&self) -> usize {
        self.desc.vertices.len() * mem::size_of::<Vertex>()
            + self.desc.indices.len() * mem::size_of::<u32>()
    }
}

impl Deref for Mesh {
    type Target = MeshDesc;

    fn deref(&self) -> &MeshDesc {
        &self.desc
    }
}

/// Builds the runtime `Mesh` out of a description.
pub trait MeshFactory: Send + Sync + 'static {
    fn create(&self, desc: &MeshDesc) -> ::std::result::Result<Mesh, failure::Error> {
        validate(desc)?;
        Ok(Mesh::new(desc.clone()))
    }
}

/// Validates and copies descriptions.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMeshFactory;

impl MeshFactory for DefaultMeshFactory {}

/// Checks that every index points at a vertex, and every sub-mesh covers whole triangles
/// inside the index buffer.
pub fn validate(desc: &MeshDesc) -> ::std::result::Result<(), failure::Error> {
    let num = desc.vertices.len();
    if let Some(i) = desc.indices.iter().find(|&&v| v as usize >= num) {
        bail!("Index {} of mesh {:?} is out of {} vertices.", i, desc.name, num);
    }

    for v in &desc.sub_meshes {
        let end = v.start as usize + v.count as usize;
        if end > desc.indices.len() || v.count % 3 != 0 {
            bail!(
                "Sub-mesh [{}, {}) of mesh {:?} is invalid.",
                v.start,
                end,
                desc.name
            );
        }
    }

    Ok(())
}

pub struct MeshLoader {
    factory: Box<dyn MeshFactory>,
    params: HasherParams,
}

impl MeshLoader {
    pub fn new<T: MeshFactory>(factory: T, params: HasherParams) -> Self {
        MeshLoader {
            factory: Box::new(factory),
            params,
        }
    }
}

impl Default for MeshLoader {
    fn default() -> Self {
        MeshLoader::new(DefaultMeshFactory, HasherParams::default())
    }
}

impl ResourceLoader for MeshLoader {
    type Descriptor = MeshDesc;
    type Resource = Mesh;

    const NAME: &'static str = "Mesh";

    fn identify(&self, desc: &MeshDesc) -> Result<Identifier> {
        let mut state = ContentHasher::new();
        desc.hash_content(&self.params, &mut state);
        Ok(state.finish().to_identifier())
    }

    fn load(
        &self,
        identifier: &Identifier,
        desc: &MeshDesc,
    ) -> ::std::result::Result<Mesh, failure::Error> {
        let mesh = self.factory.create(desc)?;
        info!(
            "[MeshLoader] loads {:?} as {} ({} vertices, {} indices).",
            desc.name,
            identifier,
            desc.vertices.len(),
            desc.indices.len()
        );

        Ok(mesh)
    }

    fn size(&self, mesh: &Mesh) -> usize {
        mesh.size()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn quad() -> MeshDesc {
        let mut desc = MeshDesc::default();
        desc.vertices = vec![
            Vertex::new([0.0, 0.0, 0.0]),
            Vertex::new([1.0, 0.0, 0.0]),
            Vertex::new([1.0, 1.0, 0.0]),
            Vertex::new([0.0, 1.0, -1.0]),
        ];
        desc.indices = vec![0, 1, 2, 0, 2, 3];
        desc.sub_meshes.push(SubMesh {
            start: 0,
            count: 6,
            material: Some(0),
        });
        desc
    }

    #[test]
    fn aabb() {
        let mesh = Mesh::new(quad());
        let aabb = mesh.aabb().unwrap();
        assert_eq!(aabb.min, [0.0, 0.0, -1.0]);
        assert_eq!(aabb.max, [1.0, 1.0, 0.0]);
        assert_eq!(mesh.size(), 4 * mem::size_of::<Vertex>() + 6 * 4);
        assert!(Mesh::new(MeshDesc::default()).aabb().is_none());
    }

    #[test]
    fn identity() {
        let loader = MeshLoader::default();

        let mut renamed = quad();
        renamed.name = "quad".into();
        assert_eq!(loader.identify(&quad()).unwrap(), loader.identify(&renamed).unwrap());

        let mut moved = quad();
        moved.vertices[3].position[2] = 1.0;
        assert_ne!(loader.identify(&quad()).unwrap(), loader.identify(&moved).unwrap());

        let mut split = quad();
        split.sub_meshes[0].count = 3;
        split.sub_meshes.push(SubMesh {
            start: 3,
            count: 3,
            material: Some(1),
        });
        assert_ne!(loader.identify(&quad()).unwrap(), loader.identify(&split).unwrap());
    }

    #[test]
    fn sampled_identity() {
        let params = HasherParams {
            vertex_samples: 2,
            index_samples: 2,
        };
        let loader = MeshLoader::new(DefaultMeshFactory, params);

        // Only the first and last vertex are sampled, so an inner change is not observed.
        let mut inner = quad();
        inner.vertices[1].position[0] = 5.0;
        assert_eq!(loader.identify(&quad()).unwrap(), loader.identify(&inner).unwrap());

        let mut last = quad();
        last.vertices[3].position[0] = 5.0;
        assert_ne!(loader.identify(&quad()).unwrap(), loader.identify(&last).unwrap());
    }

    #[test]
    fn factory_validates() {
        let loader = MeshLoader::default();
        let id = Identifier::from("m");
        assert!(loader.load(&id, &quad()).is_ok());

        let mut desc = quad();
        desc.indices[5] = 4;
        assert!(loader.load(&id, &desc).is_err());

        let mut desc = quad();
        desc.sub_meshes[0].count = 4;
        assert!(loader.load(&id, &desc).is_err());
    }
}
