//! Recursive, whitelist-pruned archive expansion.
//!
//! The root archive is expanded into `<output>/<root name without extension>`.
//! Nested archives found under an expanded directory are queued with their
//! depth (children of the root are depth 1) and the content hashes of the
//! archives they came from. Each queued archive is then, in order:
//!
//! - skipped and left in place when its name matches the whitelist;
//! - left alone when its sibling directory already exists (earlier run);
//! - left alone when its content equals one of its ancestors (cycle);
//! - otherwise expanded next to itself and, by default, deleted.
//!
//! Archives queued beyond `max_depth` are never touched. Extraction is
//! single-threaded; overlapping subtrees must not be expanded concurrently.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{Expanded, expand_archive, hash_file};
use crate::error::{ArchiveError, ExtractError};
use crate::scan::{find_archives, strip_archive_extension};
use crate::whitelist::WhitelistFilter;

pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub max_depth: usize,
    /// Remove a nested archive once it has been expanded.
    pub delete_extracted: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            delete_extracted: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFailureKind {
    Corrupt,
    PathTraversal,
    Io,
    Cleanup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveFailure {
    pub kind: ArchiveFailureKind,
    pub message: String,
}

impl From<&ArchiveError> for ArchiveFailure {
    fn from(err: &ArchiveError) -> Self {
        let kind = match err {
            ArchiveError::Corrupt(_) => ArchiveFailureKind::Corrupt,
            ArchiveError::Open(_) | ArchiveError::Io { .. } => ArchiveFailureKind::Io,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Counters and names gathered by one extraction call.
///
/// `extracted_archives + skipped_archives <= total_archives`: archives that
/// failed, were already expanded, or form a cycle count only towards the
/// total. Keys of `errors` are archive names for failed archives; problems
/// inside an expanded archive use `archive!entry`, and a failed deletion
/// `archive!cleanup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    pub total_archives: usize,
    pub extracted_archives: usize,
    pub skipped_archives: usize,
    pub class_files_found: usize,
    pub extracted: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: BTreeMap<String, ArchiveFailure>,
    pub cycles: Vec<String>,
    pub depth_limit_reached: bool,
}

impl ExtractionResult {
    fn record_extracted(&mut self, name: &str, expanded: &Expanded) {
        self.extracted_archives += 1;
        self.extracted.push(name.to_string());
        self.class_files_found += expanded.class_files;
        for entry in &expanded.rejected_entries {
            tracing::warn!(archive = name, entry = %entry, "rejected entry escaping target directory");
            self.errors.insert(
                format!("{name}!{entry}"),
                ArchiveFailure {
                    kind: ArchiveFailureKind::PathTraversal,
                    message: format!("entry '{entry}' resolves outside the target directory"),
                },
            );
        }
    }

    fn record_skipped(&mut self, name: &str) {
        self.skipped_archives += 1;
        self.skipped.push(name.to_string());
    }

    fn record_error(&mut self, name: &str, failure: ArchiveFailure) {
        self.errors.insert(name.to_string(), failure);
    }

    // The archive itself was expanded, so it stays out of the per-archive keys.
    fn record_cleanup_failure(&mut self, name: &str, err: &std::io::Error) {
        self.errors.insert(
            format!("{name}!cleanup"),
            ArchiveFailure {
                kind: ArchiveFailureKind::Cleanup,
                message: format!("failed to delete expanded archive: {err}"),
            },
        );
    }

    /// Folds another result into this one.
    pub fn merge(&mut self, other: ExtractionResult) {
        self.total_archives += other.total_archives;
        self.extracted_archives += other.extracted_archives;
        self.skipped_archives += other.skipped_archives;
        self.class_files_found += other.class_files_found;
        self.extracted.extend(other.extracted);
        self.skipped.extend(other.skipped);
        self.errors.extend(other.errors);
        self.cycles.extend(other.cycles);
        self.depth_limit_reached |= other.depth_limit_reached;
    }
}

#[derive(Debug)]
struct Pending {
    path: PathBuf,
    depth: usize,
    lineage: Arc<Vec<String>>,
}

pub struct Extractor<'a> {
    whitelist: &'a WhitelistFilter,
    options: ExtractOptions,
}

impl<'a> Extractor<'a> {
    pub fn new(whitelist: &'a WhitelistFilter, options: ExtractOptions) -> Self {
        Self { whitelist, options }
    }

    /// Fully expands `root_archive` under `output_dir`, then every nested
    /// non-whitelisted archive down to `max_depth`.
    pub fn extract_recursively(
        &self,
        root_archive: &Path,
        output_dir: &Path,
    ) -> Result<ExtractionResult, ExtractError> {
        if !root_archive.is_file() {
            return Err(ExtractError::ArchiveNotFound(root_archive.to_path_buf()));
        }
        std::fs::create_dir_all(output_dir).map_err(|source| ExtractError::CreateOutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let root_name = file_name(root_archive);
        let _span = tracing::info_span!("extract", archive = %root_name).entered();
        tracing::info!(output = %output_dir.display(), "expanding root archive");

        let mut result = ExtractionResult {
            total_archives: 1,
            ..Default::default()
        };
        let root_target = output_dir.join(strip_archive_extension(&root_name));
        let expanded =
            expand_archive(root_archive, &root_target).map_err(|source| ExtractError::RootArchive {
                path: root_archive.to_path_buf(),
                source,
            })?;
        result.record_extracted(&root_name, &expanded);

        let root_hash = hash_file(root_archive).map_err(|source| ExtractError::RootArchive {
            path: root_archive.to_path_buf(),
            source: ArchiveError::Io {
                path: root_archive.to_path_buf(),
                source,
            },
        })?;

        let mut queue = VecDeque::new();
        self.enqueue_children(&root_target, 1, Arc::new(vec![root_hash]), &mut queue, &mut result);
        self.drain(queue, &mut result);

        tracing::info!(
            total = result.total_archives,
            extracted = result.extracted_archives,
            skipped = result.skipped_archives,
            class_files = result.class_files_found,
            errors = result.errors.len(),
            "extraction finished"
        );
        Ok(result)
    }

    /// Expands, in place, every archive currently under `directory`.
    ///
    /// Each archive is expanded next to itself and kept; per-archive failures
    /// are recorded, never raised.
    pub fn extract_directory(&self, directory: &Path) -> Result<ExtractionResult, ExtractError> {
        let archives = find_archives(directory)?;
        let _span = tracing::info_span!("extract_directory", dir = %directory.display()).entered();
        tracing::info!(archives = archives.len(), "expanding archives in place");

        let mut total = ExtractionResult::default();
        for archive in archives {
            // Expanding an earlier archive may have consumed this one.
            if !archive.is_file() {
                continue;
            }
            let name = file_name(&archive);
            if self.whitelist.matches(&name) {
                tracing::debug!(archive = %name, "whitelisted, left packed");
                total.total_archives += 1;
                total.record_skipped(&name);
                continue;
            }
            let parent = archive.parent().unwrap_or(directory);
            if parent.join(strip_archive_extension(&name)).exists() {
                tracing::debug!(archive = %name, "already expanded");
                total.total_archives += 1;
                continue;
            }

            match self.extract_recursively(&archive, parent) {
                Ok(result) => total.merge(result),
                Err(err) => {
                    tracing::warn!(archive = %name, error = %err, "failed to expand archive");
                    total.total_archives += 1;
                    let failure = match &err {
                        ExtractError::RootArchive { source, .. } => ArchiveFailure::from(source),
                        other => ArchiveFailure {
                            kind: ArchiveFailureKind::Io,
                            message: other.to_string(),
                        },
                    };
                    total.record_error(&name, failure);
                }
            }
        }
        Ok(total)
    }

    fn drain(&self, mut queue: VecDeque<Pending>, result: &mut ExtractionResult) {
        let mut seen: HashSet<PathBuf> = HashSet::new();

        while let Some(item) = queue.pop_front() {
            if !seen.insert(item.path.clone()) {
                continue;
            }
            let name = file_name(&item.path);
            result.total_archives += 1;

            if self.whitelist.matches(&name) {
                tracing::debug!(archive = %name, depth = item.depth, "whitelisted, left packed");
                result.record_skipped(&name);
                continue;
            }

            let parent = match item.path.parent() {
                Some(p) => p.to_path_buf(),
                None => continue,
            };
            let target = parent.join(strip_archive_extension(&name));
            if target.exists() {
                tracing::debug!(archive = %name, "sibling directory exists, already expanded");
                continue;
            }

            let hash = match hash_file(&item.path) {
                Ok(h) => h,
                Err(source) => {
                    let err = ArchiveError::Io {
                        path: item.path.clone(),
                        source,
                    };
                    result.record_error(&name, ArchiveFailure::from(&err));
                    continue;
                }
            };
            if item.lineage.contains(&hash) {
                tracing::warn!(archive = %name, depth = item.depth, "archive contains a copy of an ancestor, not expanding");
                result.cycles.push(name);
                continue;
            }

            match expand_archive(&item.path, &target) {
                Ok(expanded) => {
                    tracing::info!(archive = %name, depth = item.depth, classes = expanded.class_files, "expanded nested archive");
                    result.record_extracted(&name, &expanded);
                    if self.options.delete_extracted
                        && let Err(err) = std::fs::remove_file(&item.path)
                    {
                        tracing::warn!(archive = %name, error = %err, "failed to delete expanded archive");
                        result.record_cleanup_failure(&name, &err);
                    }

                    let mut lineage = (*item.lineage).clone();
                    lineage.push(hash);
                    self.enqueue_children(&target, item.depth + 1, Arc::new(lineage), &mut queue, result);
                }
                Err(err) => {
                    tracing::warn!(archive = %name, error = %err, "failed to expand nested archive");
                    result.record_error(&name, ArchiveFailure::from(&err));
                    let _ = std::fs::remove_dir_all(&target);
                }
            }
        }
    }

    fn enqueue_children(
        &self,
        dir: &Path,
        depth: usize,
        lineage: Arc<Vec<String>>,
        queue: &mut VecDeque<Pending>,
        result: &mut ExtractionResult,
    ) {
        let children = match find_archives(dir) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "failed to scan for nested archives");
                return;
            }
        };
        if children.is_empty() {
            return;
        }
        if depth > self.options.max_depth {
            tracing::warn!(
                dir = %dir.display(),
                depth,
                max_depth = self.options.max_depth,
                "depth limit reached, leaving nested archives packed"
            );
            result.depth_limit_reached = true;
            return;
        }
        tracing::debug!(depth, archives = children.len(), "queued nested archives");
        queue.extend(children.into_iter().map(|path| Pending {
            path,
            depth,
            lineage: Arc::clone(&lineage),
        }));
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
