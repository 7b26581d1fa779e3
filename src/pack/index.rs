//! The persisted mod index, `<pack>/mods/index.toml`.
//!
//! The index is the single source of truth for what a pack contains. Keys this
//! version does not know about are carried through a rewrite untouched, both at
//! the top level and inside each `[[mods]]` table.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ModError;
use crate::runtime::Runtime;

pub const INDEX_FORMAT: u32 = 1;
pub const INDEX_FILE: &str = "index.toml";
pub const LOCAL_PREFIX: &str = "local:";

fn default_format() -> u32 {
    INDEX_FORMAT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModEntry {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub client_only: bool,
    /// Projects that pulled this one in. Empty for explicitly requested mods.
    #[serde(default)]
    pub dependency_of: BTreeSet<String>,
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl ModEntry {
    /// A jar the user dropped into the pack's `mods/` directory.
    pub fn local(filename: &str) -> Self {
        ModEntry {
            project_id: format!("{}{}", LOCAL_PREFIX, filename),
            version_id: None,
            name: filename.trim_end_matches(".jar").to_string(),
            version: String::new(),
            filename: filename.to_string(),
            url: None,
            sha512: None,
            size: None,
            pinned: false,
            local: true,
            client_only: false,
            dependency_of: BTreeSet::new(),
            extra: toml::Table::new(),
        }
    }

    /// Explicitly requested, as opposed to pulled in as a dependency.
    pub fn is_root(&self) -> bool {
        self.dependency_of.is_empty()
    }

    /// Case-insensitive match on project id or display name.
    pub fn matches(&self, query: &str) -> bool {
        self.project_id == query || self.name.eq_ignore_ascii_case(query)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModIndex {
    #[serde(default = "default_format")]
    pub format: u32,
    #[serde(flatten)]
    pub extra: toml::Table,
    #[serde(default)]
    pub mods: Vec<ModEntry>,
}

impl Default for ModIndex {
    fn default() -> Self {
        ModIndex {
            format: INDEX_FORMAT,
            extra: toml::Table::new(),
            mods: Vec::new(),
        }
    }
}

impl ModIndex {
    pub fn path(pack_dir: &Path) -> PathBuf {
        pack_dir.join("mods").join(INDEX_FILE)
    }

    pub fn parse(path: &Path, contents: &str) -> Result<Self, ModError> {
        let index: ModIndex = toml::from_str(contents).map_err(|e| ModError::IndexCorruption {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })?;
        index.validate().map_err(|reason| ModError::IndexCorruption {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(index)
    }

    fn validate(&self) -> Result<(), String> {
        if self.format > INDEX_FORMAT {
            return Err(format!(
                "format {} is newer than this tool supports ({})",
                self.format, INDEX_FORMAT
            ));
        }
        let mut seen = HashSet::new();
        for entry in &self.mods {
            if !seen.insert(entry.project_id.as_str()) {
                return Err(format!("duplicate entry for {}", entry.project_id));
            }
            if !entry.local && entry.version_id.is_none() {
                return Err(format!("{} has no version_id", entry.project_id));
            }
            if entry.filename.is_empty() {
                return Err(format!("{} has no filename", entry.project_id));
            }
        }
        Ok(())
    }

    /// Loads the index of `pack_dir`. A missing file is an empty index.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, pack_dir: &Path) -> Result<Self> {
        let path = Self::path(pack_dir);
        if !runtime.exists(&path) {
            debug!("no index at {:?}, starting empty", path);
            return Ok(Self::default());
        }
        let contents = runtime.read_to_string(&path)?;
        Ok(Self::parse(&path, &contents)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize mod index")
    }

    /// Writes the index through a temporary file and a rename, so readers
    /// never observe a half-written index.
    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R, pack_dir: &Path) -> Result<()> {
        let path = Self::path(pack_dir);
        let tmp = path.with_extension("toml.tmp");
        if let Some(parent) = path.parent() {
            runtime.create_dir_all(parent)?;
        }
        runtime
            .write(&tmp, self.to_toml_string()?.as_bytes())
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        runtime
            .rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {:?}", path))?;
        debug!("wrote {} mods to {:?}", self.mods.len(), path);
        Ok(())
    }

    pub fn get(&self, project_id: &str) -> Option<&ModEntry> {
        self.mods.iter().find(|m| m.project_id == project_id)
    }

    pub fn get_mut(&mut self, project_id: &str) -> Option<&mut ModEntry> {
        self.mods.iter_mut().find(|m| m.project_id == project_id)
    }

    /// Finds an entry by project id, falling back to a case-insensitive name match.
    pub fn find(&self, query: &str) -> Option<&ModEntry> {
        self.get(query)
            .or_else(|| self.mods.iter().find(|m| m.matches(query)))
    }

    /// Replaces the entry with the same project id in place, or appends.
    pub fn upsert(&mut self, entry: ModEntry) {
        match self.get_mut(&entry.project_id) {
            Some(existing) => *existing = entry,
            None => self.mods.push(entry),
        }
    }

    /// Removes an entry. Edges pointing at it stay until [`ModIndex::prune_orphans`]
    /// runs, so its dependencies are still recognisable as dependencies.
    pub fn remove(&mut self, project_id: &str) -> Option<ModEntry> {
        let pos = self.mods.iter().position(|m| m.project_id == project_id)?;
        Some(self.mods.remove(pos))
    }

    /// Drops dependency entries no longer reachable from an explicitly
    /// requested, pinned or local entry, then strips edges that point at
    /// projects absent from the index. Cycles between otherwise unreachable
    /// dependencies are dropped too.
    pub fn prune_orphans(&mut self) -> Vec<ModEntry> {
        let mut kept: HashSet<String> = self
            .mods
            .iter()
            .filter(|m| m.is_root() || m.pinned || m.local)
            .map(|m| m.project_id.clone())
            .collect();

        loop {
            let before = kept.len();
            for entry in &self.mods {
                if !kept.contains(&entry.project_id)
                    && entry.dependency_of.iter().any(|p| kept.contains(p))
                {
                    kept.insert(entry.project_id.clone());
                }
            }
            if kept.len() == before {
                break;
            }
        }

        let (keep, orphans): (Vec<_>, Vec<_>) = std::mem::take(&mut self.mods)
            .into_iter()
            .partition(|m| kept.contains(&m.project_id));
        self.mods = keep;

        let present: HashSet<String> = self.mods.iter().map(|m| m.project_id.clone()).collect();
        for entry in &mut self.mods {
            entry.dependency_of.retain(|p| present.contains(p));
        }
        orphans
    }

    pub fn roots(&self) -> impl Iterator<Item = &ModEntry> {
        self.mods.iter().filter(|m| !m.local && m.is_root())
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &ModEntry> {
        self.mods.iter().filter(|m| !m.local && !m.is_root())
    }

    pub fn local_mods(&self) -> impl Iterator<Item = &ModEntry> {
        self.mods.iter().filter(|m| m.local)
    }

    pub fn managed(&self) -> impl Iterator<Item = &ModEntry> {
        self.mods.iter().filter(|m| !m.local)
    }

    /// Brings local entries in line with the regular `*.jar` files in the
    /// pack's `mods/` directory. Symlinks are ignored since a deploy into the
    /// pack itself links managed jars there.
    ///
    /// Returns the file names added and removed.
    #[tracing::instrument(skip(self, runtime))]
    pub fn sync_local_mods<R: Runtime>(
        &mut self,
        runtime: &R,
        pack_dir: &Path,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mods_dir = pack_dir.join("mods");
        let mut present: Vec<String> = Vec::new();
        if runtime.is_dir(&mods_dir) {
            for path in runtime.read_dir(&mods_dir)? {
                let is_jar = path.extension().is_some_and(|e| e == "jar");
                if !is_jar || runtime.is_symlink(&path) || runtime.is_dir(&path) {
                    continue;
                }
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    present.push(name.to_string());
                }
            }
        }

        let tracked: HashMap<String, String> = self
            .local_mods()
            .map(|m| (m.filename.clone(), m.project_id.clone()))
            .collect();

        let removed: Vec<String> = tracked
            .keys()
            .filter(|f| !present.contains(f))
            .cloned()
            .collect();
        self.mods
            .retain(|m| !(m.local && removed.contains(&m.filename)));

        let mut added = Vec::new();
        for filename in present {
            if !tracked.contains_key(&filename) {
                self.mods.push(ModEntry::local(&filename));
                added.push(filename);
            }
        }

        let mut removed = removed;
        removed.sort();
        Ok((added, removed))
    }
}

#[cfg(test)]
pub(crate) fn entry(project_id: &str, version_id: &str, dependency_of: &[&str]) -> ModEntry {
    ModEntry {
        project_id: project_id.to_string(),
        version_id: Some(version_id.to_string()),
        name: project_id.to_string(),
        version: "1.0.0".to_string(),
        filename: format!("{}-{}.jar", project_id, version_id),
        url: Some(format!("https://cdn.example.org/{}/{}.jar", project_id, version_id)),
        sha512: None,
        size: None,
        pinned: false,
        local: false,
        client_only: false,
        dependency_of: dependency_of.iter().map(|s| s.to_string()).collect(),
        extra: toml::Table::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    const INDEX: &str = r#"
format = 1
curator = "someone"

[[mods]]
project_id = "QkdE4vQs"
version_id = "Ufdd8LjN"
name = "Big Globe"
version = "4.3.2"
filename = "bigglobe.jar"
pinned = true
note = "keep at 4.3 until worldgen settles"

[[mods]]
project_id = "Aqlf1Shp"
version_id = "x1"
name = "Forgified Fabric API"
filename = "ffapi.jar"
dependency_of = ["QkdE4vQs"]
"#;

    #[test]
    fn test_parse_index() {
        let index = ModIndex::parse(Path::new("index.toml"), INDEX).unwrap();
        assert_eq!(index.mods.len(), 2);
        assert!(index.mods[0].pinned);
        assert!(index.mods[0].is_root());
        assert!(!index.mods[1].is_root());
        assert_eq!(index.roots().count(), 1);
        assert_eq!(index.dependencies().count(), 1);
    }

    #[test]
    fn test_unknown_keys_survive_rewrite() {
        let index = ModIndex::parse(Path::new("index.toml"), INDEX).unwrap();
        let written = index.to_toml_string().unwrap();
        let reread = ModIndex::parse(Path::new("index.toml"), &written).unwrap();

        assert_eq!(reread, index);
        assert_eq!(
            reread.extra.get("curator").and_then(|v| v.as_str()),
            Some("someone")
        );
        assert_eq!(
            reread.mods[0].extra.get("note").and_then(|v| v.as_str()),
            Some("keep at 4.3 until worldgen settles")
        );
    }

    #[test]
    fn test_duplicate_project_is_corruption() {
        let contents = format!(
            "{}\n[[mods]]\nproject_id = \"QkdE4vQs\"\nversion_id = \"y\"\nname = \"dup\"\nfilename = \"dup.jar\"\n",
            INDEX
        );
        let err = ModIndex::parse(Path::new("index.toml"), &contents).unwrap_err();
        assert!(matches!(err, ModError::IndexCorruption { reason, .. } if reason.contains("duplicate")));
    }

    #[test]
    fn test_missing_version_id_is_corruption() {
        let contents = "[[mods]]\nproject_id = \"a\"\nname = \"A\"\nfilename = \"a.jar\"\n";
        let err = ModIndex::parse(Path::new("index.toml"), contents).unwrap_err();
        assert!(matches!(err, ModError::IndexCorruption { .. }));
    }

    #[test]
    fn test_garbage_is_corruption() {
        let err = ModIndex::parse(Path::new("index.toml"), "[[mods]\nnope").unwrap_err();
        assert!(matches!(err, ModError::IndexCorruption { .. }));
    }

    #[test]
    fn test_find_by_name_is_case_insensitive() {
        let index = ModIndex::parse(Path::new("index.toml"), INDEX).unwrap();
        assert_eq!(index.find("big globe").unwrap().project_id, "QkdE4vQs");
        assert_eq!(index.find("Aqlf1Shp").unwrap().name, "Forgified Fabric API");
        assert!(index.find("sodium").is_none());
    }

    #[test]
    fn test_remove_strips_edges_and_prunes_orphans() {
        let mut index = ModIndex::default();
        index.upsert(entry("a", "a1", &[]));
        index.upsert(entry("b", "b1", &["a"]));
        index.upsert(entry("c", "c1", &["b"]));
        index.upsert(entry("shared", "s1", &["a", "d"]));
        index.upsert(entry("d", "d1", &[]));

        index.remove("a").unwrap();
        let orphans = index.prune_orphans();

        let orphan_ids: Vec<_> = orphans.iter().map(|m| m.project_id.as_str()).collect();
        assert_eq!(orphan_ids, vec!["b", "c"]);
        let kept: Vec<_> = index.mods.iter().map(|m| m.project_id.as_str()).collect();
        assert_eq!(kept, vec!["shared", "d"]);
        assert_eq!(
            index.get("shared").unwrap().dependency_of,
            BTreeSet::from(["d".to_string()])
        );
    }

    #[test]
    fn test_prune_drops_unreachable_cycles_but_keeps_pinned() {
        let mut index = ModIndex::default();
        index.upsert(entry("b", "b1", &["c"]));
        index.upsert(entry("c", "c1", &["b"]));
        let mut pinned = entry("p", "p1", &["gone"]);
        pinned.pinned = true;
        index.upsert(pinned);

        let orphans = index.prune_orphans();
        assert_eq!(orphans.len(), 2);
        assert_eq!(index.mods.len(), 1);
        assert_eq!(index.mods[0].project_id, "p");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let mut index = ModIndex::default();
        index.upsert(entry("a", "a1", &[]));

        index.save(&runtime, dir.path()).unwrap();
        assert!(!ModIndex::path(dir.path()).with_extension("toml.tmp").exists());

        let loaded = ModIndex::load(&runtime, dir.path()).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_load_missing_index_is_empty() {
        let dir = tempdir().unwrap();
        let index = ModIndex::load(&RealRuntime, dir.path()).unwrap();
        assert!(index.mods.is_empty());
        assert_eq!(index.format, INDEX_FORMAT);
    }

    #[cfg_attr(
        modsmith_skip_cross_windows_tests,
        ignore = "cross windows tests disabled; set MODSMITH_RUN_CROSS_WINDOWS_TESTS=1 to enable"
    )]
    #[test]
    fn test_sync_local_mods() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let mods = dir.path().join("mods");
        std::fs::create_dir_all(&mods).unwrap();
        std::fs::write(mods.join("custom.jar"), b"jar").unwrap();
        std::fs::write(mods.join("notes.txt"), b"txt").unwrap();
        std::fs::write(dir.path().join("cached.jar"), b"jar").unwrap();
        runtime
            .symlink(&dir.path().join("cached.jar"), &mods.join("cached.jar"))
            .unwrap();

        let mut index = ModIndex::default();
        index.upsert(ModEntry::local("deleted.jar"));
        index.upsert(entry("a", "a1", &[]));

        let (added, removed) = index.sync_local_mods(&runtime, dir.path()).unwrap();

        assert_eq!(added, vec!["custom.jar"]);
        assert_eq!(removed, vec!["deleted.jar"]);
        let local: Vec<_> = index.local_mods().map(|m| m.project_id.as_str()).collect();
        assert_eq!(local, vec!["local:custom.jar"]);
        assert_eq!(index.managed().count(), 1);
    }
}
