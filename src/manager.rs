//! The `AssetManager` is the context every asset request goes through. It owns one
//! `ResourcePool` per asset kind and the scheduler used by asynchronous loads, so several
//! independent managers could live side by side (in tests for instance).

use std::borrow::Borrow;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::assets::material::{
    DefaultMaterialFactory, Material, MaterialDesc, MaterialFactory, MaterialLoader,
};
use crate::assets::mesh::{DefaultMeshFactory, Mesh, MeshDesc, MeshFactory, MeshLoader};
use crate::assets::texture::{Texture, TextureDecoder, TextureLoader};
use crate::errors::Result;
use crate::res::cache::CacheStats;
use crate::res::pool::ResourcePool;
use crate::res::registry::Resource;
use crate::sched::Scheduler;
use crate::settings::Settings;

/// The statistics of every cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AssetStats {
    pub textures: CacheStats,
    pub materials: CacheStats,
    pub meshes: CacheStats,
}

pub struct AssetManager {
    textures: ResourcePool<TextureLoader>,
    materials: ResourcePool<MaterialLoader>,
    meshes: ResourcePool<MeshLoader>,
    sched: Scheduler,
    settings: Settings,
    terminated: AtomicBool,
}

impl AssetManager {
    /// Creates a new manager which decodes textures with `decoder`, and builds materials and
    /// meshes with the default factories.
    pub fn new<T: TextureDecoder>(settings: Settings, decoder: T) -> Result<Self> {
        AssetManager::with_factories(settings, decoder, DefaultMaterialFactory, DefaultMeshFactory)
    }

    pub fn with_factories<T, M, N>(
        settings: Settings,
        decoder: T,
        material: M,
        mesh: N,
    ) -> Result<Self>
    where
        T: TextureDecoder,
        M: MaterialFactory,
        N: MeshFactory,
    {
        settings.validate()?;

        let timeout = settings.load_timeout();
        let textures =
            ResourcePool::new(TextureLoader::new(decoder), settings.texture, timeout)?;
        let materials =
            ResourcePool::new(MaterialLoader::new(material), settings.material, timeout)?;
        let meshes = ResourcePool::new(
            MeshLoader::new(mesh, settings.hasher),
            settings.mesh,
            timeout,
        )?;

        let sched = Scheduler::new(settings.sched, None)?;

        info!("AssetManager is up with {:?}.", settings);
        Ok(AssetManager {
            textures,
            materials,
            meshes,
            sched,
            settings,
            terminated: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn textures(&self) -> &ResourcePool<TextureLoader> {
        &self.textures
    }

    #[inline]
    pub fn materials(&self) -> &ResourcePool<MaterialLoader> {
        &self.materials
    }

    #[inline]
    pub fn meshes(&self) -> &ResourcePool<MeshLoader> {
        &self.meshes
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    /// Gets the texture at `path`, decoding it if nobody did so far.
    #[inline]
    pub fn load_texture(&self, path: &str) -> Result<Resource<Texture>> {
        self.textures.load_with_ref_counting(path)
    }

    /// Gets the material which matches `desc`, building it if nobody did so far.
    #[inline]
    pub fn load_material(&self, desc: &MaterialDesc) -> Result<Resource<Material>> {
        self.materials.load_with_ref_counting(desc)
    }

    /// Gets the mesh which matches `desc`, building it if nobody did so far.
    #[inline]
    pub fn load_mesh(&self, desc: &MeshDesc) -> Result<Resource<Mesh>> {
        self.meshes.load_with_ref_counting(desc)
    }

    #[inline]
    pub fn release_texture(&self, texture: Resource<Texture>) -> bool {
        self.textures.release(texture)
    }

    #[inline]
    pub fn release_material(&self, material: Resource<Material>) -> bool {
        self.materials.release(material)
    }

    #[inline]
    pub fn release_mesh(&self, mesh: Resource<Mesh>) -> bool {
        self.meshes.release(mesh)
    }

    pub fn load_texture_async<P, F>(&self, path: P, func: F)
    where
        P: Borrow<str> + Send + 'static,
        F: FnOnce(Result<Resource<Texture>>) + Send + 'static,
    {
        self.textures.load_async(&self.sched, path, func);
    }

    pub fn load_material_async<D, F>(&self, desc: D, func: F)
    where
        D: Borrow<MaterialDesc> + Send + 'static,
        F: FnOnce(Result<Resource<Material>>) + Send + 'static,
    {
        self.materials.load_async(&self.sched, desc, func);
    }

    pub fn load_mesh_async<D, F>(&self, desc: D, func: F)
    where
        D: Borrow<MeshDesc> + Send + 'static,
        F: FnOnce(Result<Resource<Mesh>>) + Send + 'static,
    {
        self.meshes.load_async(&self.sched, desc, func);
    }

    pub fn stats(&self) -> AssetStats {
        AssetStats {
            textures: self.textures.stats(),
            materials: self.materials.stats(),
            meshes: self.meshes.stats(),
        }
    }

    /// Drops every reference held by the caches. Returns the number of dropped entries.
    pub fn clear(&self) -> usize {
        self.textures.clear() + self.materials.clear() + self.meshes.clear()
    }

    /// Waits for pending asynchronous loads, then drains every cache. Resources still held
    /// by callers are reported and stay valid until released. Shutting down twice is a no-op.
    pub fn shutdown(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        self.sched.terminate();

        let released =
            self.textures.shutdown() + self.materials.shutdown() + self.meshes.shutdown();
        info!("AssetManager is down, {} cached resources released.", released);
    }
}

impl Drop for AssetManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
