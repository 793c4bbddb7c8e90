use anyhow::Result;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::config::WeaverConfig;
use crate::hooks::TransformStrategy;

pub const CLASS_SUFFIX: &str = ".class";

/// Recursively lists every `.class` file under `root`, sorted by path.
pub fn scan_class_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if entry.file_type().is_some_and(|t| t.is_file())
                    && path.extension().is_some_and(|e| e == "class")
                {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut files: Vec<PathBuf> = rx.iter().collect();
    files.sort();
    Ok(files)
}

/// `R.class`, `R$*.class` and `BuildConfig.class` are generated per module
/// and never carry registrars.
pub fn is_generated_resource(file_name: &str) -> bool {
    file_name.starts_with("R.class")
        || file_name.starts_with("R$")
        || file_name == "BuildConfig.class"
}

/// Whether a loose file goes through the class reader or is copied as-is.
pub fn is_instrumentable(
    path: &Path,
    config: &WeaverConfig,
    strategy: &dyn TransformStrategy,
) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    name.ends_with(CLASS_SUFFIX)
        && !is_generated_resource(&name)
        && !config.is_excluded_path(path)
        && strategy.classify_file_name(path)
}
