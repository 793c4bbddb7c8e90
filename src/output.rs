use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::unit::{ContentKind, Format, Scope};

/// Host-side destination allocator.
pub trait OutputAllocator: Send + Sync {
    fn allocate(
        &self,
        name: &str,
        content_kinds: &BTreeSet<ContentKind>,
        scopes: &BTreeSet<Scope>,
        format: Format,
    ) -> PathBuf;

    /// Clears every destination. Called before a full build.
    fn delete_all(&self) -> Result<()>;
}

/// Allocates destinations as children of one output root. The child name is
/// stable for a given (name, kinds, scopes, format) so incremental runs land
/// on the same paths.
#[derive(Debug, Clone)]
pub struct DirOutputAllocator {
    root: PathBuf,
}

impl DirOutputAllocator {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl OutputAllocator for DirOutputAllocator {
    fn allocate(
        &self,
        name: &str,
        content_kinds: &BTreeSet<ContentKind>,
        scopes: &BTreeSet<Scope>,
        format: Format,
    ) -> PathBuf {
        let key = format!("{name}|{content_kinds:?}|{scopes:?}|{format:?}");
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        let stem = format!("{}-{}", sanitize(name), &digest[..8]);
        match format {
            Format::Directory => self.root.join(stem),
            Format::Jar => self.root.join(format!("{stem}.jar")),
        }
    }

    fn delete_all(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list output root: {}", self.root.display()))?
        {
            let path = entry?.path();
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            removed.with_context(|| format!("Failed to clear output: {}", path.display()))?;
        }
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unit".to_string()
    } else {
        cleaned
    }
}

/// Creates `path` and its parents if missing, without touching existing content.
pub fn touch(path: &Path) -> Result<()> {
    ensure_parent(path)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    Ok(())
}

pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    ensure_parent(to)?;
    std::fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} -> {}", from.display(), to.display()))?;
    Ok(())
}

pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, bytes).with_context(|| format!("Failed to write file: {}", path.display()))
}

/// Returns whether something was deleted.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let removed = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    removed.with_context(|| format!("Failed to delete: {}", path.display()))?;
    Ok(true)
}
