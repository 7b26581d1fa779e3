//! A pack directory on disk: its configuration and its mod index.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::runtime::Runtime;

mod config;
mod index;

pub use config::{
    LOCAL_PACK_FILE, LoaderConfig, LocalMetadata, MODS_DIR, PACK_FILE, PackConstraints, PackMetadata, is_within_mods,
};
pub use index::{INDEX_FILE, INDEX_FORMAT, LOCAL_PREFIX, ModEntry, ModIndex};

#[cfg(test)]
pub(crate) use index::entry as test_entry;

pub struct LocalPack {
    pub dir: PathBuf,
    pub metadata: PackMetadata,
    pub local: LocalMetadata,
    pub index: ModIndex,
}

impl LocalPack {
    /// Loads `pack.toml`, `localpack.toml` and the mod index from `dir`.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, dir: &Path) -> Result<Self> {
        let metadata = PackMetadata::load(runtime, dir)?;
        let local = LocalMetadata::load(runtime, dir)?;
        let index = ModIndex::load(runtime, dir)?;
        Ok(LocalPack {
            dir: dir.to_path_buf(),
            metadata,
            local,
            index,
        })
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.dir.join("mods")
    }

    pub fn save_index<R: Runtime>(&self, runtime: &R) -> Result<()> {
        self.index.save(runtime, &self.dir)
    }
}
