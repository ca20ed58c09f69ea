use memmap2::Mmap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use zip::ZipArchive;

use crate::error::ArchiveError;
use crate::scan::is_class_file;

/// Summary of one archive expansion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Expanded {
    pub files_written: usize,
    pub class_files: usize,
    /// Entry names refused because they resolve outside the target directory.
    pub rejected_entries: Vec<String>,
}

/// Copies every entry of `archive_path` under `target_dir`.
///
/// Directory entries become directories, regular entries are written with
/// their parents created as needed and existing files replaced. Entries whose
/// name is absolute or climbs out of `target_dir` are not written and are
/// reported in [`Expanded::rejected_entries`] instead.
pub fn expand_archive(archive_path: &Path, target_dir: &Path) -> Result<Expanded, ArchiveError> {
    let file = File::open(archive_path).map_err(ArchiveError::Open)?;
    // SAFETY: The file is opened read-only and outlives the map, which is
    // dropped at the end of this function on every path.
    let mmap = unsafe { Mmap::map(&file) }.map_err(ArchiveError::Open)?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))?;

    std::fs::create_dir_all(target_dir).map_err(|source| ArchiveError::Io {
        path: target_dir.to_path_buf(),
        source,
    })?;

    let mut expanded = Expanded::default();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            expanded.rejected_entries.push(entry.name().to_string());
            continue;
        };
        let out_path = target_dir.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|source| ArchiveError::Io {
                path: out_path.clone(),
                source,
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ArchiveError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut out = File::create(&out_path).map_err(|source| ArchiveError::Io {
            path: out_path.clone(),
            source,
        })?;
        std::io::copy(&mut entry, &mut out).map_err(|source| ArchiveError::Io {
            path: out_path.clone(),
            source,
        })?;

        expanded.files_written += 1;
        if is_class_file(&relative) {
            expanded.class_files += 1;
        }
    }

    Ok(expanded)
}

/// Hex-encoded SHA-256 of a file's contents.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
