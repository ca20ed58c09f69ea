//! Bulk conversion of compiled classes to source files.
//!
//! Every class file under a directory becomes one unit of work: read the
//! bytes, decompile, write the source next to the input. Failures are
//! captured per file and never stop the batch. In parallel mode the units
//! run on a rayon pool inside a scope, which is the join barrier: the call
//! returns only once every unit has finished.

use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use crate::decompile::Decompiler;
use crate::error::ConvertError;
use crate::scan::find_class_files;

/// Observer for per-file completion: `(done, total, file_name)`.
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize, &str) + Sync);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Worker count for parallel runs; `None` uses the logical CPU count.
    pub workers: Option<usize>,
    /// Extension given to written source files.
    pub source_extension: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            workers: None,
            source_extension: "java".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Read,
    Decompile,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedFile {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub input: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub total_files: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub duration_millis: u64,
    pub converted: Vec<ConvertedFile>,
    pub failures: Vec<FailedFile>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.total_files == self.success_count + self.fail_count
    }

    pub fn files_per_second(&self) -> f64 {
        if self.duration_millis == 0 {
            return 0.0;
        }
        self.success_count as f64 * 1000.0 / self.duration_millis as f64
    }
}

type Outcome = Result<PathBuf, (FailureKind, String)>;

/// Shared sink for worker outcomes. Progress is reported under the same lock
/// as the counters, so observers see `done` strictly increasing.
struct Aggregator<'a> {
    state: Mutex<BatchResult>,
    on_progress: Option<ProgressFn<'a>>,
}

impl<'a> Aggregator<'a> {
    fn new(total_files: usize, on_progress: Option<ProgressFn<'a>>) -> Self {
        Self {
            state: Mutex::new(BatchResult {
                total_files,
                ..Default::default()
            }),
            on_progress,
        }
    }

    fn record(&self, input: &Path, outcome: Outcome) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(output) => {
                state.success_count += 1;
                state.converted.push(ConvertedFile {
                    input: input.to_path_buf(),
                    output,
                });
            }
            Err((kind, message)) => {
                tracing::warn!(file = %input.display(), ?kind, %message, "conversion failed");
                state.fail_count += 1;
                state.failures.push(FailedFile {
                    input: input.to_path_buf(),
                    kind,
                    message,
                });
            }
        }

        if let Some(on_progress) = self.on_progress {
            let done = state.success_count + state.fail_count;
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            on_progress(done, state.total_files, &name);
        }
    }

    fn finish(self) -> BatchResult {
        self.state.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct BatchConverter<D> {
    decompiler: D,
    options: ConvertOptions,
}

impl<D: Decompiler> BatchConverter<D> {
    pub fn new(decompiler: D, options: ConvertOptions) -> Self {
        Self {
            decompiler,
            options,
        }
    }

    pub fn decompiler(&self) -> &D {
        &self.decompiler
    }

    /// Converts every class file under `directory`.
    ///
    /// Fails only when `directory` cannot be traversed; everything else ends
    /// up in the returned result.
    pub fn convert_all(
        &self,
        directory: &Path,
        parallel: bool,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<BatchResult, ConvertError> {
        let start = Instant::now();
        let _span = tracing::info_span!("convert", dir = %directory.display(), parallel).entered();

        let files = find_class_files(directory)?;
        tracing::info!(files = files.len(), "found class files");
        if files.is_empty() {
            return Ok(BatchResult::default());
        }

        let aggregator = Aggregator::new(files.len(), on_progress);
        if parallel {
            self.run_parallel(&files, &aggregator);
        } else {
            for file in &files {
                aggregator.record(file, self.convert_isolated(file));
            }
        }

        let mut result = aggregator.finish();
        result.duration_millis = start.elapsed().as_millis() as u64;
        tracing::info!(
            total = result.total_files,
            succeeded = result.success_count,
            failed = result.fail_count,
            duration_ms = result.duration_millis,
            "conversion finished"
        );
        Ok(result)
    }

    fn run_parallel(&self, files: &[PathBuf], aggregator: &Aggregator<'_>) {
        let workers = self.worker_count();
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("class-harvest-convert-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                tracing::warn!(error = %err, "failed to build worker pool, converting sequentially");
                for file in files {
                    aggregator.record(file, self.convert_isolated(file));
                }
                return;
            }
        };

        tracing::debug!(workers, "converting in parallel");
        pool.scope(|scope| {
            for file in files {
                scope.spawn(move |_| aggregator.record(file, self.convert_isolated(file)));
            }
        });
    }

    fn worker_count(&self) -> usize {
        self.options
            .workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Runs one unit of work; a panicking decompiler fails only that file.
    fn convert_isolated(&self, class_file: &Path) -> Outcome {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.convert_one(class_file)))
            .unwrap_or_else(|payload| Err((FailureKind::Decompile, panic_message(&*payload))))
    }

    fn convert_one(&self, class_file: &Path) -> Outcome {
        let bytes =
            std::fs::read(class_file).map_err(|e| (FailureKind::Read, e.to_string()))?;
        let source = self
            .decompiler
            .decompile(&bytes)
            .map_err(|e| (FailureKind::Decompile, e.to_string()))?;

        let output = class_file.with_extension(&self.options.source_extension);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| (FailureKind::Write, e.to_string()))?;
        }
        std::fs::write(&output, source).map_err(|e| (FailureKind::Write, e.to_string()))?;
        tracing::debug!(file = %class_file.display(), "converted");
        Ok(output)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("decompiler panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::{DecompileError, validate_class_bytes};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "class_harvest_convert_test_{}_{}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos(),
            n,
            name
        ))
    }

    /// Emits a comment naming the byte count; rejects non-class input.
    struct FakeDecompiler {
        calls: AtomicUsize,
    }

    impl FakeDecompiler {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Decompiler for FakeDecompiler {
        fn decompile(&self, class_bytes: &[u8]) -> Result<String, DecompileError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            validate_class_bytes(class_bytes)?;
            Ok(format!("// {} bytes\nclass Fake {{}}\n", class_bytes.len()))
        }
    }

    const GOOD: &[u8] = &[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];

    fn populate(base: &Path, good: usize, bad: usize) {
        for i in 0..good {
            let p = base.join(format!("pkg{}/Good{i}.class", i % 3));
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, GOOD).unwrap();
        }
        for i in 0..bad {
            let p = base.join(format!("bad/Bad{i}.class"));
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, b"not a class").unwrap();
        }
    }

    fn partition(result: &BatchResult) -> (BTreeSet<PathBuf>, BTreeSet<PathBuf>) {
        (
            result.converted.iter().map(|c| c.input.clone()).collect(),
            result.failures.iter().map(|f| f.input.clone()).collect(),
        )
    }

    #[test]
    fn sequential_run_writes_sources_and_records_failures() {
        let base = temp_dir("sequential");
        populate(&base, 3, 1);
        let converter = BatchConverter::new(FakeDecompiler::new(), ConvertOptions::default());

        let result = converter.convert_all(&base, false, None).unwrap();
        assert_eq!(result.total_files, 4);
        assert_eq!(result.success_count, 3);
        assert_eq!(result.fail_count, 1);
        assert!(result.is_complete());
        assert_eq!(result.failures[0].kind, FailureKind::Decompile);
        assert!(result.failures[0].message.contains("bad magic"));
        for c in &result.converted {
            assert_eq!(c.output, c.input.with_extension("java"));
            let text = std::fs::read_to_string(&c.output).unwrap();
            assert!(text.contains("class Fake"));
        }
        assert!(!base.join("bad/Bad0.java").exists());

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn parallel_and_sequential_agree_on_outcome() {
        let base = temp_dir("agree");
        populate(&base, 40, 7);
        let converter = BatchConverter::new(
            FakeDecompiler::new(),
            ConvertOptions {
                workers: Some(4),
                ..Default::default()
            },
        );

        let seq = converter.convert_all(&base, false, None).unwrap();
        let par = converter.convert_all(&base, true, None).unwrap();
        assert!(seq.is_complete() && par.is_complete());
        assert_eq!(par.success_count, 40);
        assert_eq!(par.fail_count, 7);
        assert_eq!(partition(&seq), partition(&par));
        assert_eq!(converter.decompiler().calls.load(Ordering::Relaxed), 94);

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn progress_is_monotonic_and_called_once_per_file() {
        let base = temp_dir("progress");
        populate(&base, 30, 5);
        let converter = BatchConverter::new(
            FakeDecompiler::new(),
            ConvertOptions {
                workers: Some(8),
                ..Default::default()
            },
        );

        let seen = Mutex::new(Vec::new());
        let on_progress = |done: usize, total: usize, name: &str| {
            assert!(name.ends_with(".class"));
            seen.lock().unwrap().push((done, total));
        };
        let result = converter.convert_all(&base, true, Some(&on_progress)).unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), result.total_files);
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(seen.iter().all(|(done, total)| *done <= *total && *total == 35));
        assert_eq!(seen.last().map(|s| s.0), Some(35));

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn empty_directory_returns_empty_result_without_progress() {
        let base = temp_dir("empty");
        std::fs::create_dir_all(&base).unwrap();
        let converter = BatchConverter::new(FakeDecompiler::new(), ConvertOptions::default());

        let calls = AtomicUsize::new(0);
        let on_progress = |_: usize, _: usize, _: &str| {
            calls.fetch_add(1, Ordering::Relaxed);
        };
        let result = converter.convert_all(&base, true, Some(&on_progress)).unwrap();
        assert_eq!(result, BatchResult::default());
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn missing_directory_is_a_hard_failure() {
        let base = temp_dir("missing");
        let converter = BatchConverter::new(FakeDecompiler::new(), ConvertOptions::default());
        assert!(matches!(
            converter.convert_all(&base, false, None),
            Err(ConvertError::Scan(_))
        ));
    }

    #[test]
    fn custom_source_extension_is_used() {
        let base = temp_dir("extension");
        populate(&base, 1, 0);
        let converter = BatchConverter::new(
            FakeDecompiler::new(),
            ConvertOptions {
                workers: None,
                source_extension: "txt".to_string(),
            },
        );
        let result = converter.convert_all(&base, true, None).unwrap();
        assert_eq!(result.converted[0].output.extension().unwrap(), "txt");

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn unwritable_output_is_a_write_failure_in_both_modes() {
        let base = temp_dir("unwritable");
        populate(&base, 3, 0);
        let blocked = base.join("pkg0/Good0.java");
        std::fs::create_dir_all(&blocked).unwrap();
        let converter = BatchConverter::new(FakeDecompiler::new(), ConvertOptions::default());

        for parallel in [false, true] {
            let result = converter.convert_all(&base, parallel, None).unwrap();
            assert_eq!(result.total_files, 3);
            assert_eq!(result.success_count, 2);
            assert_eq!(result.fail_count, 1);
            assert_eq!(result.success_count + result.fail_count, result.total_files);
            assert_eq!(result.failures[0].input, base.join("pkg0/Good0.class"));
            assert_eq!(result.failures[0].kind, FailureKind::Write);
        }
        assert!(blocked.is_dir());

        let _ = std::fs::remove_dir_all(base);
    }

    /// Panics on class files of one particular length.
    struct PanickyDecompiler;

    impl Decompiler for PanickyDecompiler {
        fn decompile(&self, class_bytes: &[u8]) -> Result<String, DecompileError> {
            if class_bytes.len() == 9 {
                panic!("decompiler blew up");
            }
            Ok("class Ok {}\n".to_string())
        }
    }

    #[test]
    fn panicking_decompiler_fails_only_its_own_file() {
        let base = temp_dir("panic");
        populate(&base, 4, 0);
        std::fs::write(base.join("pkg1/Boom.class"), [0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52, 0])
            .unwrap();
        let converter = BatchConverter::new(
            PanickyDecompiler,
            ConvertOptions {
                workers: Some(2),
                ..Default::default()
            },
        );

        for parallel in [false, true] {
            let result = converter.convert_all(&base, parallel, None).unwrap();
            assert_eq!(result.total_files, 5);
            assert_eq!(result.success_count, 4);
            assert_eq!(result.fail_count, 1);
            let failure = &result.failures[0];
            assert_eq!(failure.input, base.join("pkg1/Boom.class"));
            assert_eq!(failure.kind, FailureKind::Decompile);
            assert!(failure.message.contains("decompiler blew up"));
        }

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn files_per_second_uses_successes_over_wall_time() {
        let result = BatchResult {
            total_files: 4,
            success_count: 3,
            fail_count: 1,
            duration_millis: 1500,
            ..Default::default()
        };
        assert_eq!(result.files_per_second(), 2.0);
        assert_eq!(BatchResult::default().files_per_second(), 0.0);
    }
}
