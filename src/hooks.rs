use anyhow::Result;
use std::path::Path;

use crate::classfile::ClassFile;

/// Extension points the transform calls into. Every method has a default so
/// hosts only override what they need.
pub trait TransformStrategy: Send + Sync {
    /// Extra veto on top of the built-in file filters.
    fn classify_file_name(&self, _path: &Path) -> bool {
        true
    }

    /// When true, classes are scanned but the input bytes are copied as-is.
    fn scan_only(&self) -> bool {
        false
    }

    /// Mutates a class before it is written. Ignored in scan-only mode.
    fn instrument_class(&self, _class: &mut ClassFile) -> Result<()> {
        Ok(())
    }

    fn on_class_transformed(&self, _input: &Path, _destination: &Path) {}

    fn on_archive_scanned(&self, _input: &Path, _destination: &Path) {}
}

/// The stock registration weaver: rewrites nothing during the scan pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterStrategy {
    pub scan_only: bool,
}

impl TransformStrategy for RegisterStrategy {
    fn scan_only(&self) -> bool {
        self.scan_only
    }

    fn on_class_transformed(&self, input: &Path, destination: &Path) {
        tracing::trace!(
            input = %input.display(),
            destination = %destination.display(),
            "class written"
        );
    }

    fn on_archive_scanned(&self, input: &Path, destination: &Path) {
        tracing::debug!(
            input = %input.display(),
            destination = %destination.display(),
            "archive scanned"
        );
    }
}
