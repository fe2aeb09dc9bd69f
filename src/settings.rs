use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::res::cache::CacheParams;
use crate::res::hasher::HasherParams;
use crate::sched::SchedulerParams;

/// A structure containing configuration data for the `AssetManager`. Missing fields of a
/// JSON document fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Textures are bounded by both entries and pixel bytes.
    pub texture: CacheParams,
    pub material: CacheParams,
    pub mesh: CacheParams,
    pub sched: SchedulerParams,
    pub hasher: HasherParams,
    /// How long a thread waits for a resource loaded by another thread, in milliseconds.
    pub load_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            texture: CacheParams::lru(256, 512 * 1024 * 1024),
            material: CacheParams::fifo(1024),
            mesh: CacheParams::fifo(512),
            sched: SchedulerParams::default(),
            hasher: HasherParams::default(),
            load_timeout_ms: 5000,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.texture.validate()?;
        self.material.validate()?;
        self.mesh.validate()?;
        Ok(())
    }

    #[inline]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}
