//! Writes `files.json` describing a directory's folder tree.
//!
//! Folders become objects and files become `null`, the same shape `/api/list`
//! serves. Empty folders are kept. Hidden entries and an existing
//! `files.json` at the root are skipped.
//!
//! Usage: `generate-files-json [DIR]` (default: `public`)

#[path = "../services/tree.rs"]
mod tree;

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

const MANIFEST: &str = "files.json";

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Relative names under `root`, directories with a trailing `/`.
fn scan(root: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_hidden(e)) {
        let entry = entry.with_context(|| format!("Failed to scan {}", root.display()))?;
        if entry.depth() == 0 {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .context("Entry outside scanned directory")?;
        let mut name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            name.push('/');
        } else if name == MANIFEST {
            continue;
        }
        names.push(name);
    }

    names.sort();
    Ok(names)
}

fn generate(root: &Path) -> anyhow::Result<PathBuf> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }

    let names = scan(root)?;
    let tree = tree::build_tree(names.iter().map(String::as_str));
    let json = serde_json::to_string_pretty(&tree)?;

    let out = root.join(MANIFEST);
    std::fs::write(&out, json).with_context(|| format!("Failed to write {}", out.display()))?;
    info!("Updated {} with {} entries", out.display(), names.len());
    Ok(out)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("public"));

    generate(&root)?;
    Ok(())
}
