//! Dependency closure over the registry graph.
//!
//! The closure is a breadth-first walk with an explicit visited map, so cyclic
//! graphs terminate. Edges are recorded on the dependent side only, as the
//! `dependency_of` set of each entry. Nothing is written to the index until
//! the whole walk succeeds.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use anyhow::{Context, Result};
use log::{debug, warn};

use super::version::{ModRequest, ResolvedVersion, VersionResolver};
use crate::pack::{ModEntry, ModIndex, PackConstraints};
use crate::registry::{DependencyType, RegistryClient, VersionInfo};

/// Outcome of an `add` or `update` pass. `index` is the full replacement index.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub index: ModIndex,
    /// New entries and entries whose version changed.
    pub changed: Vec<ModEntry>,
    /// Entries dropped because nothing depends on them anymore.
    pub pruned: Vec<ModEntry>,
    /// Project ids of the explicitly requested mods of this pass.
    pub roots: Vec<String>,
    /// Dependencies that could not be followed, as human-readable notes.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Existing, unpinned dependencies count as satisfied. They are not
    /// checked again against the pack's current loader and game version;
    /// after changing either, `update` re-resolves every unpinned entry.
    Add,
    /// Every unpinned entry is resolved again.
    Update,
}

#[derive(Debug)]
enum Target {
    Request(ModRequest),
    Project(String),
    /// A dependency that names only a version; mapped to its project first.
    DependencyVersion(String),
}

#[derive(Debug)]
struct Item {
    target: Target,
    parent: Option<String>,
}

/// Working state of one closure computation.
#[derive(Default)]
struct Walk {
    queue: VecDeque<Item>,
    order: Vec<String>,
    nodes: HashMap<String, ModEntry>,
    roots: Vec<String>,
    root_set: HashSet<String>,
    skipped: Vec<String>,
}

impl Walk {
    fn visit(&mut self, entry: ModEntry) {
        self.order.push(entry.project_id.clone());
        self.nodes.insert(entry.project_id.clone(), entry);
    }

    fn mark_root(&mut self, project_id: &str) {
        if self.root_set.insert(project_id.to_string()) {
            self.roots.push(project_id.to_string());
        }
    }

    /// Unions `parent` into an already visited node. Roots and pinned
    /// entries keep their edges as they are.
    fn add_edge(&mut self, project_id: &str, parent: Option<&str>) {
        let Some(parent) = parent else { return };
        if parent == project_id || self.root_set.contains(project_id) {
            return;
        }
        if let Some(node) = self.nodes.get_mut(project_id) {
            if !node.pinned && !node.local {
                node.dependency_of.insert(parent.to_string());
            }
        }
    }
}

pub struct DependencyResolver<'a, C: RegistryClient> {
    registry: &'a C,
    versions: VersionResolver<'a, C>,
}

impl<'a, C: RegistryClient> DependencyResolver<'a, C> {
    pub fn new(registry: &'a C, constraints: &'a PackConstraints) -> Self {
        DependencyResolver {
            registry,
            versions: VersionResolver::new(registry, constraints),
        }
    }

    /// Resolves `requests` and everything they require, merging the result
    /// into a copy of `index`. Pinned and local entries are left alone.
    #[tracing::instrument(skip(self, index))]
    pub async fn add(&self, requests: &[ModRequest], index: &ModIndex) -> Result<Resolution> {
        let mut walk = Walk::default();
        for request in requests {
            walk.queue.push_back(Item {
                target: Target::Request(request.clone()),
                parent: None,
            });
        }
        self.run(&mut walk, index, Mode::Add).await?;

        let mut merged = index.clone();
        let mut changed = Vec::new();
        for id in &walk.order {
            let Some(entry) = walk.nodes.remove(id) else { continue };
            if is_changed(index.get(id), &entry) {
                changed.push(entry.clone());
            }
            merged.upsert(entry);
        }

        Ok(Resolution {
            index: merged,
            changed,
            pruned: Vec::new(),
            roots: walk.roots,
            skipped: walk.skipped,
        })
    }

    /// Re-resolves every explicitly requested mod and its dependencies.
    /// Pinned entries keep their version and their dependency edges, and
    /// entries nothing reaches anymore are pruned.
    #[tracing::instrument(skip(self, index))]
    pub async fn update(&self, index: &ModIndex) -> Result<Resolution> {
        let mut walk = Walk::default();
        for root in index.roots() {
            walk.queue.push_back(Item {
                target: Target::Project(root.project_id.clone()),
                parent: None,
            });
        }
        self.run(&mut walk, index, Mode::Update).await?;

        let mut merged = ModIndex {
            format: index.format,
            extra: index.extra.clone(),
            mods: Vec::with_capacity(index.mods.len()),
        };
        let mut changed = Vec::new();
        let mut pruned = Vec::new();

        for previous in &index.mods {
            if let Some(entry) = walk.nodes.remove(&previous.project_id) {
                if is_changed(Some(previous), &entry) {
                    changed.push(entry.clone());
                }
                merged.mods.push(entry);
            } else if previous.local || previous.pinned {
                merged.mods.push(previous.clone());
            } else {
                pruned.push(previous.clone());
            }
        }
        for id in &walk.order {
            if let Some(entry) = walk.nodes.remove(id) {
                changed.push(entry.clone());
                merged.mods.push(entry);
            }
        }
        pruned.extend(merged.prune_orphans());

        Ok(Resolution {
            index: merged,
            changed,
            pruned,
            roots: walk.roots,
            skipped: walk.skipped,
        })
    }

    async fn run(&self, walk: &mut Walk, index: &ModIndex, mode: Mode) -> Result<()> {
        while let Some(item) = walk.queue.pop_front() {
            match item.target {
                Target::Request(request) => self.visit_request(walk, index, request).await?,
                Target::Project(id) => {
                    self.visit_project(walk, index, mode, id, item.parent).await?
                }
                Target::DependencyVersion(version_id) => {
                    let version = self
                        .registry
                        .get_version(&version_id)
                        .await
                        .with_context(|| format!("Failed to look up dependency version {}", version_id))?;
                    walk.queue.push_front(Item {
                        target: Target::Project(version.project_id),
                        parent: item.parent,
                    });
                }
            }
        }
        Ok(())
    }

    async fn visit_request(&self, walk: &mut Walk, index: &ModIndex, request: ModRequest) -> Result<()> {
        let (project, explicit) = self.versions.identify(&request).await?;
        let id = project.id.clone();
        if walk.nodes.contains_key(&id) {
            debug!("{} requested twice", project.title);
            return Ok(());
        }
        walk.mark_root(&id);

        if let Some(existing) = index.get(&id).filter(|e| e.pinned) {
            println!("      pinned {} stays at {}", existing.name, existing.version);
            self.expand_frozen(walk, existing).await?;
            walk.visit(existing.clone());
            return Ok(());
        }

        let resolved = self.versions.resolve_project(&project, explicit).await?;
        println!("    resolved {} {}", resolved.project.title, resolved.version.version_number);
        let entry = entry_for(&resolved, index.get(&id), BTreeSet::new())?;
        self.enqueue_dependencies(walk, index, &resolved.version, &id);
        walk.visit(entry);
        Ok(())
    }

    async fn visit_project(
        &self,
        walk: &mut Walk,
        index: &ModIndex,
        mode: Mode,
        id: String,
        parent: Option<String>,
    ) -> Result<()> {
        if walk.nodes.contains_key(&id) {
            walk.add_edge(&id, parent.as_deref());
            return Ok(());
        }
        if parent.is_none() {
            walk.mark_root(&id);
        }

        let existing = index.get(&id);
        match existing {
            Some(e) if e.local => return Ok(()),
            Some(e) if e.pinned => {
                self.expand_frozen(walk, e).await?;
                walk.visit(e.clone());
                return Ok(());
            }
            Some(e) if mode == Mode::Add => {
                let mut entry = e.clone();
                if let Some(parent) = parent.filter(|_| !entry.is_root()) {
                    entry.dependency_of.insert(parent);
                }
                walk.visit(entry);
                return Ok(());
            }
            _ => {}
        }

        let project = self
            .registry
            .get_project(&id)
            .await
            .with_context(|| describe_edge(&id, parent.as_deref()))?;

        // A slug in a dependency resolves to a canonical id that may already be visited.
        if project.id != id && walk.nodes.contains_key(&project.id) {
            walk.add_edge(&project.id, parent.as_deref());
            return Ok(());
        }

        let resolved = self
            .versions
            .resolve_project(&project, None)
            .await
            .with_context(|| describe_edge(&project.title, parent.as_deref()))?;

        let dependency_of: BTreeSet<String> = parent.into_iter().collect();
        let entry = entry_for(&resolved, index.get(&project.id), dependency_of)?;
        if let Some(previous) = existing.filter(|p| p.version_id != entry.version_id) {
            println!(
                "    updating {} {} -> {}",
                entry.name, previous.version, entry.version
            );
        } else if existing.is_none() {
            println!("    resolved {} {}", entry.name, entry.version);
        }
        self.enqueue_dependencies(walk, index, &resolved.version, &project.id);
        walk.visit(entry);
        Ok(())
    }

    /// Follows the recorded version of a pinned entry without re-resolving it.
    async fn expand_frozen(&self, walk: &mut Walk, entry: &ModEntry) -> Result<()> {
        let Some(version_id) = entry.version_id.as_deref() else {
            return Ok(());
        };
        let version = self
            .registry
            .get_version(version_id)
            .await
            .with_context(|| format!("Failed to look up pinned {} ({})", entry.name, version_id))?;
        self.enqueue_dependencies(walk, &ModIndex::default(), &version, &entry.project_id);
        Ok(())
    }

    fn enqueue_dependencies(&self, walk: &mut Walk, index: &ModIndex, version: &VersionInfo, parent: &str) {
        for dep in self.versions.rule().rewrite_dependencies(version) {
            match dep.dependency_type {
                DependencyType::Required => {}
                DependencyType::Incompatible => {
                    if let Some(conflict) = dep.project_id.as_deref().and_then(|p| index.get(p)) {
                        warn!("{} is marked incompatible with {}", conflict.name, parent);
                    }
                    continue;
                }
                DependencyType::Optional | DependencyType::Embedded => continue,
            }

            let target = match (dep.project_id, dep.version_id) {
                (Some(project_id), _) => Target::Project(project_id),
                (None, Some(version_id)) => Target::DependencyVersion(version_id),
                (None, None) => {
                    let note = format!(
                        "{} requires external file {}",
                        parent,
                        dep.file_name.as_deref().unwrap_or("<unnamed>")
                    );
                    warn!("{}, skipping", note);
                    walk.skipped.push(note);
                    continue;
                }
            };
            walk.queue.push_back(Item {
                target,
                parent: Some(parent.to_string()),
            });
        }
    }
}

fn describe_edge(what: &str, parent: Option<&str>) -> String {
    match parent {
        Some(parent) => format!("Failed to resolve {} (required by {})", what, parent),
        None => format!("Failed to resolve {}", what),
    }
}

/// Index entry for `resolved`, keeping unknown keys of the entry it replaces.
fn entry_for(
    resolved: &ResolvedVersion,
    previous: Option<&ModEntry>,
    dependency_of: BTreeSet<String>,
) -> Result<ModEntry> {
    let mut entry = resolved.to_entry()?;
    entry.dependency_of = dependency_of;
    if let Some(previous) = previous {
        entry.extra = previous.extra.clone();
    }
    Ok(entry)
}

fn is_changed(previous: Option<&ModEntry>, entry: &ModEntry) -> bool {
    previous.is_none_or(|p| p.version_id != entry.version_id)
}
