//! The loading layer of the engine. It turns asset descriptions (textures, materials and
//! meshes) into in-memory resources which are shared safely between any number of worker
//! threads.
//!
//! # Resource
//!
//! A _resource_ is a piece of data that is fully prepared for use at runtime. Every resource
//! lives in a `Registry` under a stable `Identifier`, and is handed out as a reference-counted
//! `Resource<T>` handle. When the last handle to a resource is dropped, the registry invokes
//! its `Destructor` and forgets about it.
//!
//! ## Identifier
//!
//! Textures are identified by their normalized file path. Materials and meshes are
//! _content-addressable_: their identifier is a hash of the fields that make them what they
//! are, so two structurally identical materials requested from unrelated call sites end up
//! sharing one resource.
//!
//! # Loading
//!
//! The `ResourcePool` is the get-or-load entry point for an asset kind. It composes a bounded
//! `Cache`, the `Registry` and a `StateTracker`, and guarantees that concurrent first requests
//! of the same identifier trigger the underlying decoder exactly once. Everybody else either
//! hits the cache or blocks (with a timeout) until the loading thread publishes the result.
//!
//! # AssetManager
//!
//! `AssetManager` owns one pool per asset kind and the worker threads used by asynchronous
//! loading. Drop it, or call `shutdown`, to drain every cache before the registries go away.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

pub mod errors;
pub mod utils;
pub mod assets;
pub mod manager;
pub mod res;
pub mod sched;
pub mod settings;

pub mod prelude {
    pub use crate::assets::prelude::*;
    pub use crate::errors::{Error, Result};
    pub use crate::manager::{AssetManager, AssetStats};
    pub use crate::res::prelude::*;
    pub use crate::sched::prelude::*;
    pub use crate::settings::Settings;
}
