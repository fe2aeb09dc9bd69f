//! Commonly used utilities like pools, hashers and scope guards.

pub mod finally;
pub mod handle;
pub mod hash;
pub mod object_pool;

pub mod prelude {
    pub use super::finally::{finally, FinallyGuard};
    pub use super::handle::{Handle, HandleIndex};
    pub use super::hash::{hash64, FastHashMap, FastHashSet, FxHasher};
    pub use super::object_pool::ObjectPool;
}
