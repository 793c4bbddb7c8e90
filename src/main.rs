use anyhow::{Context, Result};
use clap::Parser;
use register_weaver::capability::{CapabilityScanner, ScanOutcome};
use register_weaver::catalog::{ArchiveClass, scan_archive};
use register_weaver::cli::{Cli, Commands};
use register_weaver::config::{WeaverConfig, resolve_config};
use register_weaver::hooks::RegisterStrategy;
use register_weaver::manifest::{BuildManifest, Flavor};
use register_weaver::output::DirOutputAllocator;
use register_weaver::synth::{Instruction, decode_body};
use register_weaver::transform::{Transform, TransformReport};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "REGISTER_WEAVER_LOG";

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = resolve_config(&cli)?;

    match cli.command.clone() {
        Commands::Transform {
            manifest,
            output,
            incremental,
            scan_only,
            flavor,
            threads,
        } => {
            let report = run_transform(
                config,
                TransformArgs {
                    manifest,
                    output,
                    incremental,
                    scan_only,
                    flavor,
                    threads,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Inspect { path } => {
            let scanner = CapabilityScanner::new(&config);
            let report = if is_archive_path(&path) {
                InspectReport::Archive {
                    path: path.clone(),
                    classes: scan_archive(&path, &scanner)?
                        .into_iter()
                        .map(ArchiveEntryReport::from)
                        .collect(),
                }
            } else {
                inspect_class(&path, &scanner, &config)?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("register_weaver=debug")
        } else {
            EnvFilter::new("register_weaver=info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct TransformArgs {
    manifest: PathBuf,
    output: PathBuf,
    incremental: bool,
    scan_only: bool,
    flavor: Flavor,
    threads: Option<usize>,
}

#[derive(Debug, Serialize)]
struct TransformOutput {
    manifest: String,
    output: String,
    flavor: Flavor,
    units_dropped: usize,
    #[serde(flatten)]
    report: TransformReport,
}

fn run_transform(mut config: WeaverConfig, args: TransformArgs) -> Result<TransformOutput> {
    if args.threads.is_some() {
        config.threads = args.threads;
    }

    let mut manifest = BuildManifest::load(&args.manifest)?;
    manifest.incremental |= args.incremental;
    let units_dropped = manifest.retain_flavor(args.flavor);
    if units_dropped > 0 {
        tracing::info!(
            dropped = units_dropped,
            flavor = ?args.flavor,
            "units outside flavor scopes ignored"
        );
    }

    let allocator = DirOutputAllocator::new(args.output.clone());
    let strategy = RegisterStrategy {
        scan_only: args.scan_only,
    };
    let report = Transform::new(config, &strategy, &allocator).run(&manifest)?;

    Ok(TransformOutput {
        manifest: args.manifest.to_string_lossy().to_string(),
        output: args.output.to_string_lossy().to_string(),
        flavor: args.flavor,
        units_dropped,
        report,
    })
}

fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jar") || e.eq_ignore_ascii_case("zip"))
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum InspectReport {
    Class {
        path: PathBuf,
        major_version: u16,
        super_name: Option<String>,
        interfaces: Vec<String>,
        annotations: Vec<String>,
        outcome: ScanOutcome,
        register_body: Option<Vec<Instruction>>,
    },
    Archive {
        path: PathBuf,
        classes: Vec<ArchiveEntryReport>,
    },
}

#[derive(Debug, Serialize)]
struct ArchiveEntryReport {
    entry: String,
    #[serde(flatten)]
    outcome: ScanOutcome,
}

impl From<ArchiveClass> for ArchiveEntryReport {
    fn from(class: ArchiveClass) -> Self {
        Self {
            entry: class.entry,
            outcome: class.outcome,
        }
    }
}

fn inspect_class(
    path: &Path,
    scanner: &CapabilityScanner,
    config: &WeaverConfig,
) -> Result<InspectReport> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read class file: {}", path.display()))?;
    let (class, outcome) = scanner
        .scan_bytes(&bytes)
        .with_context(|| format!("Malformed class file: {}", path.display()))?;

    let method = &config.register_method;
    let register_body = match class.find_method(&method.name, &method.descriptor) {
        Some(m) => match m.code(&class.constant_pool)? {
            Some(code) => Some(decode_body(&class, &code.code)?),
            None => None,
        },
        None => None,
    };

    Ok(InspectReport::Class {
        path: path.to_path_buf(),
        major_version: class.major_version,
        super_name: class.super_name()?.map(|s| s.into_owned()),
        interfaces: class
            .interface_names()?
            .into_iter()
            .map(|s| s.into_owned())
            .collect(),
        annotations: class.annotation_descriptors()?,
        outcome,
        register_body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_paths_are_recognized_by_extension() {
        assert!(is_archive_path(Path::new("/libs/feed.jar")));
        assert!(is_archive_path(Path::new("/libs/feed.JAR")));
        assert!(is_archive_path(Path::new("bundle.zip")));
        assert!(!is_archive_path(Path::new("/classes/a/B.class")));
        assert!(!is_archive_path(Path::new("/libs/jar")));
    }

    #[test]
    fn library_flavor_drops_external_units() -> Result<()> {
        let base = std::env::temp_dir().join(format!(
            "register_weaver_main_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&base)?;
        let manifest = base.join("manifest.json");
        std::fs::write(
            &manifest,
            r#"{ "archives": [ { "name": "ext", "path": "/nowhere/ext.jar", "scopes": ["external_libraries"] } ] }"#,
        )?;

        let out = run_transform(
            WeaverConfig::default(),
            TransformArgs {
                manifest: manifest.clone(),
                output: base.join("out"),
                incremental: false,
                scan_only: false,
                flavor: Flavor::Library,
                threads: Some(1),
            },
        )?;
        assert_eq!(out.units_dropped, 1);
        assert!(out.report.units.is_empty());

        std::fs::remove_dir_all(base)?;
        Ok(())
    }
}
