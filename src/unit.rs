use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::incremental::{ChangeMap, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Classes,
    Resources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Project,
    SubProjects,
    ExternalLibraries,
    TestedCode,
    ProvidedOnly,
}

/// Physical form of an output destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Directory,
    Jar,
}

fn default_content_kinds() -> BTreeSet<ContentKind> {
    BTreeSet::from([ContentKind::Classes])
}

fn default_scopes() -> BTreeSet<Scope> {
    BTreeSet::from([Scope::Project])
}

/// A tree of loose class files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUnit {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_content_kinds")]
    pub content_kinds: BTreeSet<ContentKind>,
    #[serde(default = "default_scopes")]
    pub scopes: BTreeSet<Scope>,
    #[serde(default)]
    pub status: Status,
    /// Only consulted for incremental builds.
    #[serde(default)]
    pub changed_files: ChangeMap,
}

/// A single archive, processed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveUnit {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_content_kinds")]
    pub content_kinds: BTreeSet<ContentKind>,
    #[serde(default = "default_scopes")]
    pub scopes: BTreeSet<Scope>,
    #[serde(default)]
    pub status: Status,
}

#[derive(Debug, Clone, Copy)]
pub enum InputUnit<'a> {
    Directory(&'a DirectoryUnit),
    Archive(&'a ArchiveUnit),
}

impl InputUnit<'_> {
    pub fn name(&self) -> &str {
        match self {
            InputUnit::Directory(d) => &d.name,
            InputUnit::Archive(a) => &a.name,
        }
    }

    pub fn scopes(&self) -> &BTreeSet<Scope> {
        match self {
            InputUnit::Directory(d) => &d.scopes,
            InputUnit::Archive(a) => &a.scopes,
        }
    }

    pub fn content_kinds(&self) -> &BTreeSet<ContentKind> {
        match self {
            InputUnit::Directory(d) => &d.content_kinds,
            InputUnit::Archive(a) => &a.content_kinds,
        }
    }

    pub fn format(&self) -> Format {
        match self {
            InputUnit::Directory(_) => Format::Directory,
            InputUnit::Archive(_) => Format::Jar,
        }
    }
}
