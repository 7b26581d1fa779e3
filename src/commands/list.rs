use anyhow::Result;

use super::{Config, open_pack};
use crate::download::Downloader;
use crate::pack::{ModEntry, ModIndex};
use crate::registry::RegistryClient;
use crate::runtime::Runtime;

/// Prints explicitly added mods, dependencies and local jars.
pub fn list<R: Runtime, C: RegistryClient, D: Downloader>(config: &Config<R, C, D>) -> Result<()> {
    let pack = open_pack(config)?;
    print!("{}", render(&pack.index));
    Ok(())
}

fn render(index: &ModIndex) -> String {
    if index.mods.is_empty() {
        return "No mods added.\n".to_string();
    }

    let width = index.mods.iter().map(|m| m.name.len()).max().unwrap_or(0);
    let version_width = index.mods.iter().map(|m| m.version.len()).max().unwrap_or(0);
    let mut out = String::new();

    let mut section = |title: &str, entries: Vec<&ModEntry>| {
        if entries.is_empty() {
            return;
        }
        out.push_str(&format!("{} ({}):\n", title, entries.len()));
        for entry in entries {
            let mut notes = Vec::new();
            if entry.pinned {
                notes.push("pinned".to_string());
            }
            if entry.client_only {
                notes.push("client only".to_string());
            }
            if !entry.dependency_of.is_empty() {
                let parents: Vec<&str> = entry
                    .dependency_of
                    .iter()
                    .map(|id| index.get(id).map_or(id.as_str(), |p| p.name.as_str()))
                    .collect();
                notes.push(format!("required by {}", parents.join(", ")));
            }
            let line = format!(
                "  {:<width$}  {:<version_width$}  {}",
                entry.name,
                entry.version,
                notes.join("; "),
                width = width,
                version_width = version_width
            );
            out.push_str(line.trim_end());
            out.push('\n');
        }
    };

    section("Mods", index.roots().collect());
    section("Dependencies", index.dependencies().collect());
    section("Local mods", index.local_mods().collect());
    out
}
