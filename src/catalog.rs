use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

use crate::capability::{CapabilityScanner, ScanOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveClass {
    pub entry: String,
    pub outcome: ScanOutcome,
}

/// Scans every `.class` entry of an archive. Generated-resource filters do
/// not apply here; a malformed entry fails the whole archive.
pub fn scan_archive(archive_path: &Path, scanner: &CapabilityScanner) -> Result<Vec<ArchiveClass>> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    // SAFETY: The file is opened read-only and outlives the mapping; the
    // archive is not modified while it is being scanned.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap archive: {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", archive_path.display()))?;

    let mut classes = Vec::new();
    let mut buf = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || !entry.name().ends_with(".class") {
            continue;
        }
        let name = entry.name().to_string();
        buf.clear();
        entry
            .read_to_end(&mut buf)
            .with_context(|| format!("Failed to read {name} in {}", archive_path.display()))?;

        let (_, outcome) = scanner
            .scan_bytes(&buf)
            .with_context(|| format!("Malformed class {name} in {}", archive_path.display()))?;
        classes.push(ArchiveClass {
            entry: name,
            outcome,
        });
    }
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassFile;
    use crate::config::WeaverConfig;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "register_weaver_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (name, content) in entries {
            zip.start_file(*name, options)?;
            zip.write_all(content)?;
        }

        zip.finish()?;
        Ok(())
    }

    fn registrar(name: &str) -> Vec<u8> {
        let mut class = ClassFile::new(name, "java/lang/Object").unwrap();
        class
            .add_interface("com/kuaishou/commercial/utility/ioc/ICommercialServiceRegister")
            .unwrap();
        class.to_bytes()
    }

    #[test]
    fn scan_archive_reports_every_class_entry() -> Result<()> {
        let jar = temp_path("scan_ok.jar");
        write_jar(
            &jar,
            &[
                (
                    "feed/FeedCommercialServiceRegister.class",
                    registrar("feed/FeedCommercialServiceRegister"),
                ),
                ("feed/R$string.class", registrar("feed/R$string")),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec()),
            ],
        )?;

        let scanner = CapabilityScanner::new(&WeaverConfig::default());
        let classes = scan_archive(&jar, &scanner)?;
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].entry, "feed/FeedCommercialServiceRegister.class");
        assert!(classes[0].outcome.implementer);
        assert!(!classes[1].outcome.implementer);

        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn malformed_entry_fails_the_archive() -> Result<()> {
        let jar = temp_path("scan_bad.jar");
        write_jar(&jar, &[("a/Broken.class", b"dummy".to_vec())])?;

        let scanner = CapabilityScanner::new(&WeaverConfig::default());
        let err = scan_archive(&jar, &scanner).unwrap_err();
        assert!(format!("{err:#}").contains("Malformed class a/Broken.class"));

        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn scan_archive_handles_empty_jar() -> Result<()> {
        let jar = temp_path("scan_empty.jar");
        write_jar(&jar, &[])?;
        let scanner = CapabilityScanner::new(&WeaverConfig::default());
        assert!(scan_archive(&jar, &scanner)?.is_empty());
        std::fs::remove_file(jar)?;
        Ok(())
    }
}
