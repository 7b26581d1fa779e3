//! Domain error taxonomy.
//!
//! Plumbing code returns `anyhow::Result`; these variants travel inside the
//! `anyhow::Error` and can be recovered with `downcast_ref::<ModError>()` when a
//! caller needs to tell a constraint failure from a network or filesystem one.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModError {
    /// No candidate version satisfies the pack constraints.
    #[error("no compatible version of {project} for {loader} on {game_version}")]
    NoCompatibleVersion {
        project: String,
        loader: String,
        game_version: String,
    },

    /// An explicitly requested version violates the pack constraints.
    #[error("{project} {version} is incompatible with this pack: {reason}")]
    IncompatibleVersion {
        project: String,
        version: String,
        reason: String,
    },

    #[error("no such project: {0}")]
    ProjectNotFound(String),

    #[error("search for '{query}' is ambiguous, use a project id instead; candidates: {}", candidates.join(", "))]
    AmbiguousSearch {
        query: String,
        candidates: Vec<String>,
    },

    #[error("failed to download {project} ({version_id}): {reason}")]
    Download {
        project: String,
        version_id: String,
        reason: String,
    },

    #[error("hash mismatch for {project} ({version_id}): expected {expected}, got {actual}")]
    Integrity {
        project: String,
        version_id: String,
        expected: String,
        actual: String,
    },

    #[error("cannot replace {path:?}: {reason}")]
    FilesystemConflict { path: PathBuf, reason: String },

    #[error("mod index {path:?} is corrupt: {reason}")]
    IndexCorruption { path: PathBuf, reason: String },

    #[error("invalid pack configuration {path:?}: {reason}")]
    PackConfig { path: PathBuf, reason: String },

    #[error("unknown mod loader '{0}', expected one of legacyforge, neoforge, fabric, quilt")]
    UnknownLoader(String),

    #[error("unknown dependency type '{0}'")]
    UnknownDependencyType(String),

    #[error("unknown mod: {0}")]
    UnknownMod(String),
}

impl ModError {
    /// Short category label used in batch reports.
    pub fn category(&self) -> &'static str {
        match self {
            ModError::NoCompatibleVersion { .. }
            | ModError::IncompatibleVersion { .. }
            | ModError::AmbiguousSearch { .. }
            | ModError::ProjectNotFound(_)
            | ModError::UnknownMod(_) => "constraint",
            ModError::Download { .. } => "network",
            ModError::Integrity { .. } => "integrity",
            ModError::FilesystemConflict { .. } => "filesystem",
            ModError::IndexCorruption { .. }
            | ModError::PackConfig { .. }
            | ModError::UnknownLoader(_)
            | ModError::UnknownDependencyType(_) => "configuration",
        }
    }
}
