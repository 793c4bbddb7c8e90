//! The two-pass registration transform.
//!
//! Pass one fans out over every input unit on a rayon pool: each unit is
//! scanned and copied (or reconciled, for incremental builds) into its
//! destination. Pass two starts after the join and rewrites the collector's
//! registration method in whatever destination it landed in.

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capability::{CapabilityScanner, ScanOutcome};
use crate::catalog::scan_archive;
use crate::config::WeaverConfig;
use crate::hooks::TransformStrategy;
use crate::incremental::{Action, Status, decide, mirror_path};
use crate::manifest::BuildManifest;
use crate::output::{OutputAllocator, copy_file, remove_if_exists, touch, write_file};
use crate::patch::patch_entry;
use crate::registry::{CollectorIdentity, CollectorLocation, Discoveries};
use crate::scan::{is_instrumentable, scan_class_files};
use crate::synth;
use crate::unit::{ArchiveUnit, DirectoryUnit, Format, InputUnit};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("more than one collector class found: {first} and {second}")]
    MultipleCollectors { first: String, second: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub format: Format,
    pub destination: PathBuf,
    pub status: Status,
    pub files_written: usize,
    pub files_deleted: usize,
    pub classes_scanned: usize,
}

/// What the rewrite pass did with the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rewrite {
    /// No registrar was found anywhere.
    NotNeeded,
    /// Registrars exist but no class carries the collector marker.
    MissingCollector,
    ClassFile { path: PathBuf },
    Archive { path: PathBuf, entry: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformReport {
    pub incremental: bool,
    pub scan_only: bool,
    pub units: Vec<UnitReport>,
    pub implementers: Vec<String>,
    pub collector: Option<CollectorIdentity>,
    pub rewrite: Rewrite,
    pub duration_ms: u64,
}

pub struct Transform<'a> {
    config: WeaverConfig,
    scanner: CapabilityScanner,
    strategy: &'a dyn TransformStrategy,
    allocator: &'a dyn OutputAllocator,
}

impl<'a> Transform<'a> {
    pub fn new(
        config: WeaverConfig,
        strategy: &'a dyn TransformStrategy,
        allocator: &'a dyn OutputAllocator,
    ) -> Self {
        let scanner = CapabilityScanner::new(&config);
        Self {
            config,
            scanner,
            strategy,
            allocator,
        }
    }

    pub fn run(&self, manifest: &BuildManifest) -> Result<TransformReport> {
        let start = Instant::now();
        if !manifest.incremental {
            self.allocator.delete_all()?;
        }

        let found = Discoveries::new();
        let units = manifest.units();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.unwrap_or(0))
            .thread_name(|i| format!("register-weaver-{i}"))
            .build()
            .context("Failed to build worker pool")?;

        let reports = pool.install(|| {
            units
                .par_iter()
                .map(|unit| self.process_unit(*unit, manifest.incremental, &found))
                .collect::<Result<Vec<_>>>()
        })?;

        let implementers = found.implementers(self.config.registration_order);
        let collector = found.collector();
        let rewrite = self.rewrite(&implementers, collector.as_ref())?;

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            units = reports.len(),
            implementers = implementers.len(),
            collector = collector.as_ref().map(|c| c.class_name.as_str()),
            cost_ms = duration_ms,
            "register transform finished"
        );

        Ok(TransformReport {
            incremental: manifest.incremental,
            scan_only: self.strategy.scan_only(),
            units: reports,
            implementers,
            collector,
            rewrite,
            duration_ms,
        })
    }

    pub fn process_unit(
        &self,
        unit: InputUnit<'_>,
        incremental: bool,
        found: &Discoveries,
    ) -> Result<UnitReport> {
        let _span = tracing::debug_span!("unit", name = unit.name()).entered();
        let destination = self.allocator.allocate(
            unit.name(),
            unit.content_kinds(),
            unit.scopes(),
            unit.format(),
        );
        let mut report = UnitReport {
            name: unit.name().to_string(),
            format: unit.format(),
            destination: destination.clone(),
            status: match unit {
                InputUnit::Directory(d) => d.status,
                InputUnit::Archive(a) => a.status,
            },
            files_written: 0,
            files_deleted: 0,
            classes_scanned: 0,
        };

        match unit {
            InputUnit::Directory(dir) => {
                self.process_directory(dir, &destination, incremental, found, &mut report)?
            }
            InputUnit::Archive(jar) => {
                self.process_archive(jar, &destination, incremental, found, &mut report)?
            }
        }
        debug!(
            written = report.files_written,
            deleted = report.files_deleted,
            scanned = report.classes_scanned,
            "unit done"
        );
        Ok(report)
    }

    fn process_directory(
        &self,
        dir: &DirectoryUnit,
        destination: &Path,
        incremental: bool,
        found: &Discoveries,
        report: &mut UnitReport,
    ) -> Result<()> {
        std::fs::create_dir_all(destination)
            .with_context(|| format!("Failed to create directory: {}", destination.display()))?;

        if !incremental {
            for input in scan_class_files(&dir.path)? {
                let target = mirror_path(&input, &dir.path, destination)?;
                touch(&target)?;
                self.transform_file(&input, &target, found, report)?;
            }
            return Ok(());
        }

        for (path, status) in &dir.changed_files {
            let action = decide(*status, true);
            if action == Action::Skip {
                continue;
            }
            let input = if path.is_absolute() {
                path.clone()
            } else {
                dir.path.join(path)
            };
            let target = mirror_path(&input, &dir.path, destination)?;
            if action == Action::Delete {
                if remove_if_exists(&target)? {
                    report.files_deleted += 1;
                }
            } else {
                touch(&target)?;
                self.transform_file(&input, &target, found, report)?;
            }
        }
        Ok(())
    }

    fn process_archive(
        &self,
        jar: &ArchiveUnit,
        destination: &Path,
        incremental: bool,
        found: &Discoveries,
        report: &mut UnitReport,
    ) -> Result<()> {
        match decide(jar.status, incremental) {
            Action::Skip => {}
            Action::Transform => self.transform_archive(&jar.path, destination, found, report)?,
            Action::Delete => {
                if remove_if_exists(destination)? {
                    report.files_deleted += 1;
                }
            }
        }
        Ok(())
    }

    fn transform_file(
        &self,
        input: &Path,
        destination: &Path,
        found: &Discoveries,
        report: &mut UnitReport,
    ) -> Result<()> {
        if !is_instrumentable(input, &self.config, self.strategy) {
            copy_file(input, destination)?;
            report.files_written += 1;
            return Ok(());
        }

        let bytes = std::fs::read(input)
            .with_context(|| format!("Failed to read class file: {}", input.display()))?;
        let (mut class, outcome) = self
            .scanner
            .scan_bytes(&bytes)
            .with_context(|| format!("Malformed class file: {}", input.display()))?;
        report.classes_scanned += 1;
        self.record(&outcome, found, || CollectorLocation::File {
            destination: destination.to_path_buf(),
        })?;

        if self.strategy.scan_only() {
            copy_file(input, destination)?;
        } else {
            self.strategy
                .instrument_class(&mut class)
                .with_context(|| format!("Failed to instrument {}", input.display()))?;
            write_file(destination, &class.to_bytes())?;
        }
        report.files_written += 1;
        self.strategy.on_class_transformed(input, destination);
        Ok(())
    }

    fn transform_archive(
        &self,
        input: &Path,
        destination: &Path,
        found: &Discoveries,
        report: &mut UnitReport,
    ) -> Result<()> {
        if self.config.is_excluded_path(input) {
            debug!(archive = %input.display(), "excluded archive copied without scanning");
        } else {
            for class in scan_archive(input, &self.scanner)? {
                report.classes_scanned += 1;
                self.record(&class.outcome, found, || CollectorLocation::Archive {
                    source: input.to_path_buf(),
                    destination: destination.to_path_buf(),
                    entry: class.entry.clone(),
                })?;
            }
            self.strategy.on_archive_scanned(input, destination);
        }

        // Archives are never patched during the scan pass.
        copy_file(input, destination)?;
        report.files_written += 1;
        Ok(())
    }

    fn record(
        &self,
        outcome: &ScanOutcome,
        found: &Discoveries,
        location: impl FnOnce() -> CollectorLocation,
    ) -> Result<()> {
        if outcome.implementer {
            debug!(class = %outcome.class_name, "registrar found");
            found.record_implementer(&outcome.class_name);
        }
        if outcome.collector {
            info!(class = %outcome.class_name, "collector found");
            found.record_collector(CollectorIdentity {
                class_name: outcome.class_name.clone(),
                location: location(),
            })?;
        }
        Ok(())
    }

    fn rewrite(
        &self,
        implementers: &[String],
        collector: Option<&CollectorIdentity>,
    ) -> Result<Rewrite> {
        if implementers.is_empty() {
            return Ok(Rewrite::NotNeeded);
        }
        let Some(collector) = collector else {
            warn!(
                implementers = implementers.len(),
                "registrars found but no collector class, nothing emitted"
            );
            return Ok(Rewrite::MissingCollector);
        };

        let method = &self.config.register_method;
        match &collector.location {
            CollectorLocation::File { destination } => {
                info!(path = %destination.display(), "rewriting collector class file");
                let bytes = std::fs::read(destination).with_context(|| {
                    format!("Failed to read collector: {}", destination.display())
                })?;
                let patched = synth::rewrite_collector(&bytes, method, implementers)
                    .with_context(|| {
                        format!("Failed to rewrite collector: {}", destination.display())
                    })?;
                write_file(destination, &patched)?;
                Ok(Rewrite::ClassFile {
                    path: destination.clone(),
                })
            }
            CollectorLocation::Archive {
                destination, entry, ..
            } => {
                info!(
                    archive = %destination.display(),
                    entry = %entry,
                    "rewriting collector inside archive"
                );
                let patched = patch_entry(
                    destination,
                    |name| name == entry,
                    |name, bytes| {
                        synth::rewrite_collector(&bytes, method, implementers)
                            .with_context(|| format!("Failed to rewrite collector entry {name}"))
                    },
                )?;
                if patched == 0 {
                    bail!(
                        "Collector entry {entry} not found in {}",
                        destination.display()
                    );
                }
                Ok(Rewrite::Archive {
                    path: destination.clone(),
                    entry: entry.clone(),
                })
            }
        }
    }
}
