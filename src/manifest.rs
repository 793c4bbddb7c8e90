use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::unit::{ArchiveUnit, DirectoryUnit, InputUnit, Scope};

/// Which scopes a transform consumes. Application modules see the whole
/// dependency graph, library modules only their own classes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    #[default]
    Application,
    Library,
}

impl Flavor {
    pub fn consumes(&self, scope: Scope) -> bool {
        match self {
            Flavor::Application => true,
            Flavor::Library => scope == Scope::Project,
        }
    }
}

/// One build invocation as handed over by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub directories: Vec<DirectoryUnit>,
    #[serde(default)]
    pub archives: Vec<ArchiveUnit>,
}

impl BuildManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read build manifest: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse build manifest: {}", path.display()))
    }

    /// Directories first, then archives, each in manifest order.
    pub fn units(&self) -> Vec<InputUnit<'_>> {
        self.directories
            .iter()
            .map(InputUnit::Directory)
            .chain(self.archives.iter().map(InputUnit::Archive))
            .collect()
    }

    /// Drops units the flavor does not consume.
    pub fn retain_flavor(&mut self, flavor: Flavor) -> usize {
        let before = self.directories.len() + self.archives.len();
        self.directories
            .retain(|d| d.scopes.iter().any(|s| flavor.consumes(*s)));
        self.archives
            .retain(|a| a.scopes.iter().any(|s| flavor.consumes(*s)));
        before - self.directories.len() - self.archives.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incremental::Status;
    use crate::unit::ContentKind;
    use std::path::PathBuf;

    const MANIFEST: &str = r#"{
        "incremental": true,
        "directories": [
            {
                "name": "app-classes",
                "path": "/build/app/classes",
                "status": "changed",
                "changed_files": { "/build/app/classes/a/B.class": "added" }
            }
        ],
        "archives": [
            { "name": "feed", "path": "/build/libs/feed.jar", "scopes": ["sub_projects"], "status": "removed" },
            { "name": "support", "path": "/m2/support.jar", "scopes": ["external_libraries"] }
        ]
    }"#;

    #[test]
    fn manifest_defaults_and_statuses() -> Result<()> {
        let manifest: BuildManifest = serde_json::from_str(MANIFEST)?;
        assert!(manifest.incremental);

        let dir = &manifest.directories[0];
        assert_eq!(dir.status, Status::Changed);
        assert!(dir.content_kinds.contains(&ContentKind::Classes));
        assert!(dir.scopes.contains(&Scope::Project));
        assert_eq!(
            dir.changed_files.get(&PathBuf::from("/build/app/classes/a/B.class")),
            Some(&Status::Added)
        );

        assert_eq!(manifest.archives[0].status, Status::Removed);
        assert_eq!(manifest.archives[1].status, Status::NotChanged);

        let names: Vec<_> = manifest.units().iter().map(|u| u.name().to_string()).collect();
        assert_eq!(names, vec!["app-classes", "feed", "support"]);
        Ok(())
    }

    #[test]
    fn library_flavor_keeps_project_scope_only() -> Result<()> {
        let mut manifest: BuildManifest = serde_json::from_str(MANIFEST)?;
        let dropped = manifest.retain_flavor(Flavor::Library);
        assert_eq!(dropped, 2);
        assert_eq!(manifest.units().len(), 1);

        let mut manifest: BuildManifest = serde_json::from_str(MANIFEST)?;
        assert_eq!(manifest.retain_flavor(Flavor::Application), 0);
        Ok(())
    }
}
