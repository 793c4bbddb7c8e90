use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::RegistrationOrder;
use crate::transform::TransformError;

const VERSIONED_ENTRY_PREFIX: &str = "META-INF/versions/";

/// Where the collector's bytes live once every unit has been written out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectorLocation {
    File {
        destination: PathBuf,
    },
    Archive {
        source: PathBuf,
        destination: PathBuf,
        entry: String,
    },
}

impl CollectorLocation {
    /// Ordering key used when the same collector class is seen more than
    /// once: base entries before multi-release ones, then by path.
    fn preference(&self) -> (bool, &Path, &str) {
        match self {
            CollectorLocation::File { destination } => (false, destination.as_path(), ""),
            CollectorLocation::Archive {
                destination, entry, ..
            } => (
                entry.starts_with(VERSIONED_ENTRY_PREFIX),
                destination.as_path(),
                entry.as_str(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectorIdentity {
    pub class_name: String,
    pub location: CollectorLocation,
}

#[derive(Debug, Default)]
struct Inner {
    implementers: Vec<String>,
    collector: Option<CollectorIdentity>,
}

/// Build-wide scan results, shared by every unit task.
///
/// Implementers form an append-only log; the collector is a
/// single-assignment cell. Both sit behind one lock.
#[derive(Debug, Default)]
pub struct Discoveries {
    inner: Mutex<Inner>,
}

impl Discoveries {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_implementer(&self, class_name: &str) {
        self.lock().implementers.push(class_name.to_string());
    }

    /// Only one collector class may exist. Further copies of the same class
    /// (another unit, a multi-release entry) collapse onto one location,
    /// picked independently of arrival order.
    pub fn record_collector(&self, identity: CollectorIdentity) -> Result<(), TransformError> {
        let mut inner = self.lock();
        if inner.collector.is_none() {
            inner.collector = Some(identity);
            return Ok(());
        }
        let Some(existing) = inner.collector.as_mut() else {
            return Ok(());
        };
        if existing.class_name != identity.class_name {
            return Err(TransformError::MultipleCollectors {
                first: existing.class_name.clone(),
                second: identity.class_name,
            });
        }
        if existing.location != identity.location {
            if identity.location.preference() < existing.location.preference() {
                *existing = identity;
            }
            tracing::warn!(
                class = %existing.class_name,
                kept = ?existing.location,
                "collector class seen more than once"
            );
        }
        Ok(())
    }

    pub fn implementers(&self, order: RegistrationOrder) -> Vec<String> {
        let mut names = self.lock().implementers.clone();
        if order == RegistrationOrder::Lexicographic {
            names.sort();
            names.dedup();
        }
        names
    }

    pub fn collector(&self) -> Option<CollectorIdentity> {
        self.lock().collector.clone()
    }
}
