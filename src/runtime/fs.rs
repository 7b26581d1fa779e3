//! `std::fs` calls with the offending path in every error.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[tracing::instrument]
pub(super) fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

#[tracing::instrument(skip(contents), fields(len = contents.len()))]
pub(super) fn write(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))
}

#[tracing::instrument]
pub(super) fn open(path: &Path) -> Result<Box<dyn Read + Send>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    Ok(Box::new(file))
}

#[tracing::instrument]
pub(super) fn create(path: &Path) -> Result<Box<dyn Write + Send>> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    Ok(Box::new(file))
}

pub(super) fn file_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).with_context(|| format!("Failed to stat {:?}", path))?;
    Ok(metadata.len())
}

#[tracing::instrument]
pub(super) fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).with_context(|| format!("Failed to move {:?} to {:?}", from, to))
}

#[tracing::instrument]
pub(super) fn remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path).with_context(|| format!("Failed to remove {:?}", path))
}

#[tracing::instrument]
pub(super) fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("Failed to create directory {:?}", path))
}

#[tracing::instrument]
pub(super) fn remove_dir_all(path: &Path) -> Result<()> {
    fs::remove_dir_all(path).with_context(|| format!("Failed to remove directory {:?}", path))
}

#[tracing::instrument]
pub(super) fn read_dir_sorted(path: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(path)
        .with_context(|| format!("Failed to list {:?}", path))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to list {:?}", path))?;
    entries.sort();
    Ok(entries)
}

pub(super) fn canonicalize(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve {:?}", path))
}
