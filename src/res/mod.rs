//! The resource layer provides a concurrent, content-addressable cache of loaded data shared
//! across threads.
//!
//! # Resource
//!
//! A _resource_ is a read-only payload that is fully prepared for using at runtime, such as
//! a decoded texture or a mesh. Every resource is registered under a stable `Identifier`
//! and shared by reference counting; it is destroyed as soon as its last reference goes away.
//!
//! # Identifier
//!
//! A resource is either identified by the normalized path it was decoded from, or by the
//! hexadecimal rendering of a hash of its content (see `ContentHasher`). Two descriptions with
//! the same content always resolve to the same identifier, and therefore the same resource.
//!
//! # Loading
//!
//! The `ResourcePool` glues a bounded `Cache`, the `Registry` and the `StateTracker` together.
//! It makes sure that concurrent first requests of the same identifier run the loader at most
//! once, while everybody else waits for the result.

pub mod cache;
pub mod hasher;
pub mod identifier;
pub mod pool;
pub mod registry;
pub mod state;

pub use self::identifier::Identifier;

pub mod prelude {
    pub use super::cache::{Cache, CacheParams, CacheStats, Policy};
    pub use super::hasher::{
        hash_content, ContentHash, ContentHashable, ContentHasher, HasherParams,
    };
    pub use super::identifier::Identifier;
    pub use super::pool::{ResourceLoader, ResourcePool};
    pub use super::registry::{Destructor, Registry, Resource};
    pub use super::state::{ResourceState, Snapshot, StateTracker};
}
