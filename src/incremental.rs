use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Incremental status the host reports for a unit or a single file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    NotChanged,
    Added,
    Changed,
    Removed,
}

/// Per-file statuses of a directory unit, iterated in path order.
pub type ChangeMap = BTreeMap<PathBuf, Status>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Skip,
    Transform,
    Delete,
}

/// Full builds transform everything; incremental builds follow the status.
pub fn decide(status: Status, incremental: bool) -> Action {
    if !incremental {
        return Action::Transform;
    }
    match status {
        Status::NotChanged => Action::Skip,
        Status::Added | Status::Changed => Action::Transform,
        Status::Removed => Action::Delete,
    }
}

/// Maps a file under `input_root` onto the same relative path under `dest_root`.
pub fn mirror_path(input: &Path, input_root: &Path, dest_root: &Path) -> Result<PathBuf> {
    let relative = input.strip_prefix(input_root).with_context(|| {
        format!(
            "File {} is not inside unit root {}",
            input.display(),
            input_root.display()
        )
    })?;
    Ok(dest_root.join(relative))
}
