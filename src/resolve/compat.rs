//! Fabric-on-Forge substitution.
//!
//! With compat mode on a Forge-family pack, Fabric builds of a project become
//! installable through a bridge loader, but only when the project ships no
//! native build for the pack's game version. Dependencies of a substituted
//! Fabric build that name Fabric-only companion libraries are rewritten to
//! their Forge-side counterparts.

use crate::pack::PackConstraints;
use crate::registry::{Dependency, Loader, ProjectInfo, VersionInfo};

/// Fabric API.
pub const FABRIC_API: &str = "P7dR8mSH";
/// Forgified Fabric API, the Forge-side port of Fabric API.
pub const FORGIFIED_FABRIC_API: &str = "Aqlf1Shp";
/// Connector Extras, which bundles the Forge-side shims for common Fabric libraries.
pub const CONNECTOR_EXTRAS: &str = "FYpiwiBR";

/// Fabric-only project id, and the project that replaces it under substitution.
const REWRITES: &[(&str, &str)] = &[
    (FABRIC_API, FORGIFIED_FABRIC_API),
    // ModMenu
    ("mOgUt4GM", CONNECTOR_EXTRAS),
    // Forge Config API Port
    ("ohNO6lps", CONNECTOR_EXTRAS),
];

/// Forge-side replacement for a Fabric-only companion library, if any.
pub fn rewrite_target(project_id: &str) -> Option<&'static str> {
    REWRITES
        .iter()
        .find(|(from, _)| *from == project_id)
        .map(|(_, to)| *to)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatibilityRule {
    loader: Loader,
    compat_mode: bool,
}

impl CompatibilityRule {
    pub fn new(constraints: &PackConstraints) -> Self {
        CompatibilityRule {
            loader: constraints.loader,
            compat_mode: constraints.compat_mode,
        }
    }

    pub fn loader(&self) -> Loader {
        self.loader
    }

    /// Whether Fabric builds may stand in for native ones on this pack.
    pub fn substitution_active(&self) -> bool {
        self.compat_mode && self.loader.is_forge_family()
    }

    /// Loaders to ask the registry for, native first.
    pub fn query_loaders(&self) -> Vec<Loader> {
        if self.substitution_active() {
            vec![self.loader, Loader::Fabric]
        } else {
            vec![self.loader]
        }
    }

    /// True when `version` would be installed through substitution rather than natively.
    pub fn is_substituted(&self, version: &VersionInfo) -> bool {
        self.substitution_active()
            && !version.supports_loader(self.loader)
            && version.supports_loader(Loader::Fabric)
    }

    /// Filters `candidates` (already restricted to the pack's game version) down
    /// to the loader-eligible ones. Native builds exclude Fabric builds entirely,
    /// however recent the Fabric build is.
    pub fn eligible<'a>(
        &self,
        project: &ProjectInfo,
        candidates: &[&'a VersionInfo],
    ) -> Vec<&'a VersionInfo> {
        let native: Vec<&VersionInfo> = candidates
            .iter()
            .copied()
            .filter(|v| v.supports_loader(self.loader))
            .collect();

        if !native.is_empty() || !self.substitution_active() || !project.is_fabric_tagged() {
            return native;
        }

        candidates
            .iter()
            .copied()
            .filter(|v| v.supports_loader(Loader::Fabric))
            .collect()
    }

    /// Checks an explicitly requested version. Explicit requests may pick a
    /// Fabric build even when a native one exists.
    pub fn check_explicit(&self, project: &ProjectInfo, version: &VersionInfo) -> Result<(), String> {
        if version.supports_loader(self.loader) {
            return Ok(());
        }
        if self.substitution_active() && version.supports_loader(Loader::Fabric) {
            if project.is_fabric_tagged() {
                return Ok(());
            }
            return Err(format!(
                "{} is not tagged as a Fabric mod, so it cannot be substituted on {}",
                project.title, self.loader
            ));
        }
        Err(format!("it does not support the {} loader", self.loader))
    }

    /// Dependencies to follow for a selected version: rewritten when the
    /// version is substituted, untouched otherwise.
    pub fn rewrite_dependencies(&self, version: &VersionInfo) -> Vec<Dependency> {
        let substituted = self.is_substituted(version);
        version
            .dependencies
            .iter()
            .map(|dep| {
                let mut dep = dep.clone();
                if !substituted {
                    return dep;
                }
                if let Some(target) = dep.project_id.as_deref().and_then(rewrite_target) {
                    dep.project_id = Some(target.to_string());
                    dep.version_id = None;
                }
                dep
            })
            .collect()
    }
}
