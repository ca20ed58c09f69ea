use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::error::ScanError;

/// Extensions (lowercase) treated as nested archives.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["jar", "war", "ear"];

pub const CLASS_EXTENSION: &str = "class";

pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ARCHIVE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

pub fn is_class_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == CLASS_EXTENSION)
}

/// File name without its archive extension, e.g. `util.jar` -> `util`.
pub fn strip_archive_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && ARCHIVE_EXTENSIONS
                    .iter()
                    .any(|x| ext.eq_ignore_ascii_case(x)) =>
        {
            stem
        }
        _ => file_name,
    }
}

/// Every archive under `base_path`, sorted by path.
pub fn find_archives(base_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
    walk_files(base_path, is_archive)
}

/// Every compiled-class file under `base_path`, sorted by path.
pub fn find_class_files(base_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
    walk_files(base_path, is_class_file)
}

fn walk_files(base_path: &Path, keep: fn(&Path) -> bool) -> Result<Vec<PathBuf>, ScanError> {
    match base_path.metadata() {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(ScanError::NotADirectory {
                path: base_path.to_path_buf(),
                source: None,
            });
        }
        Err(e) => {
            return Err(ScanError::NotADirectory {
                path: base_path.to_path_buf(),
                source: Some(e),
            });
        }
    }

    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    let is_file = entry.file_type().is_some_and(|t| t.is_file());
                    if is_file && keep(path) {
                        let _ = tx.send(path.to_path_buf());
                    }
                }
                Err(err) => tracing::debug!(error = %err, "skipping unreadable entry"),
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut found: Vec<PathBuf> = rx.iter().collect();
    found.sort();
    Ok(found)
}
