//! In-place rewrite of selected archive entries.
//!
//! The patched archive is assembled in a temporary sibling file. The original
//! is only replaced once that file is complete, so a failure while streaming
//! leaves the original archive untouched.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Rewrites every entry whose name satisfies `matches`, copying the others
/// byte for byte. Returns the number of rewritten entries.
pub fn patch_entry<P, F>(archive_path: &Path, matches: P, rewrite: F) -> Result<usize>
where
    P: FnMut(&str) -> bool,
    F: FnMut(&str, Vec<u8>) -> Result<Vec<u8>>,
{
    let stamp = unique_stamp();
    let tmp = sibling(archive_path, &format!("{stamp}.tmp"));

    let rewritten = match write_patched(archive_path, &tmp, matches, rewrite) {
        Ok(n) => n,
        Err(err) => {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
    };

    let backup = sibling(archive_path, &format!("{stamp}.bak"));
    std::fs::rename(archive_path, &backup).with_context(|| {
        format!(
            "Failed to move archive aside: {} -> {}",
            archive_path.display(),
            backup.display()
        )
    })?;
    if let Err(err) = std::fs::rename(&tmp, archive_path) {
        let _ = std::fs::rename(&backup, archive_path);
        let _ = std::fs::remove_file(&tmp);
        return Err(err).with_context(|| {
            format!("Failed to move patched archive into place: {}", archive_path.display())
        });
    }
    std::fs::remove_file(&backup)
        .with_context(|| format!("Failed to delete archive backup: {}", backup.display()))?;

    Ok(rewritten)
}

fn write_patched<P, F>(
    source: &Path,
    target: &Path,
    mut matches: P,
    mut rewrite: F,
) -> Result<usize>
where
    P: FnMut(&str) -> bool,
    F: FnMut(&str, Vec<u8>) -> Result<Vec<u8>>,
{
    let input = File::open(source)
        .with_context(|| format!("Failed to open archive: {}", source.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(input))
        .with_context(|| format!("Failed to read zip structure: {}", source.display()))?;

    let output = File::create(target)
        .with_context(|| format!("Failed to create archive: {}", target.display()))?;
    let mut writer = ZipWriter::new(BufWriter::new(output));

    let mut rewritten = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() || !matches(&name) {
            writer
                .raw_copy_file(entry)
                .with_context(|| format!("Failed to copy entry {name} from {}", source.display()))?;
            continue;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read entry {name} from {}", source.display()))?;

        let method = match entry.compression() {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let mut options = FileOptions::default()
            .compression_method(method)
            .last_modified_time(entry.last_modified());
        if let Some(mode) = entry.unix_mode() {
            options = options.unix_permissions(mode);
        }
        drop(entry);

        let patched = rewrite(&name, bytes)?;
        writer.start_file(name.as_str(), options)?;
        writer
            .write_all(&patched)
            .with_context(|| format!("Failed to write entry {name} to {}", target.display()))?;
        rewritten += 1;
    }

    let mut out = writer.finish()?;
    out.flush()?;
    out.get_ref()
        .sync_all()
        .with_context(|| format!("Failed to sync archive: {}", target.display()))?;
    Ok(rewritten)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn unique_stamp() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{nanos}", std::process::id())
}
