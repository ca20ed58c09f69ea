use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::decompile::{DecompileError, Decompiler, validate_class_bytes};

fn java_command(args: &[&str]) -> Result<std::process::Output, DecompileError> {
    let java_bin = std::env::var("CLASS_HARVEST_JAVA").unwrap_or_else(|_| "java".to_string());

    #[cfg(windows)]
    {
        let lower = java_bin.to_ascii_lowercase();
        if lower.ends_with(".cmd") || lower.ends_with(".bat") {
            return Command::new("cmd")
                .arg("/C")
                .arg(&java_bin)
                .args(args)
                .output()
                .map_err(|e| {
                    DecompileError::Engine(format!(
                        "failed to execute java (ensure JRE/JDK is installed): {e}"
                    ))
                });
        }
    }

    Command::new(&java_bin).args(args).output().map_err(|e| {
        DecompileError::Engine(format!(
            "failed to execute java (ensure JRE/JDK is installed): {e}"
        ))
    })
}

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Scratch copy of one class handed to CFR, removed on drop.
struct ScratchClass {
    dir: PathBuf,
    file: PathBuf,
}

impl ScratchClass {
    fn write(bytes: &[u8]) -> std::io::Result<Self> {
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("class-harvest-cfr-{}-{n}", std::process::id()));
        std::fs::create_dir_all(&dir)?;
        let scratch = Self {
            file: dir.join("Input.class"),
            dir,
        };
        std::fs::write(&scratch.file, bytes)?;
        Ok(scratch)
    }
}

impl Drop for ScratchClass {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// CFR run as an external `java -jar cfr.jar` process.
#[derive(Debug, Clone)]
pub struct Cfr {
    cfr_jar: PathBuf,
}

impl Cfr {
    pub fn new(cfr_jar: PathBuf) -> Self {
        Self { cfr_jar }
    }

    pub fn jar_path(&self) -> &Path {
        &self.cfr_jar
    }

    pub fn decompile_class_file(&self, class_path: &Path) -> Result<String, DecompileError> {
        let output = java_command(&[
            "-jar",
            self.cfr_jar
                .to_str()
                .ok_or_else(|| DecompileError::Engine("cfr.jar path is not valid UTF-8".into()))?,
            class_path
                .to_str()
                .ok_or_else(|| DecompileError::Engine("class path is not valid UTF-8".into()))?,
            "--silent",
            "true",
            "--comments",
            "false",
        ])?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DecompileError::Engine(format!(
                "CFR decompilation failed: {}",
                stderr.trim()
            )));
        }

        let source = String::from_utf8_lossy(&output.stdout).to_string();
        if source.trim().is_empty() {
            return Err(DecompileError::NoOutput);
        }
        Ok(source)
    }
}

impl Decompiler for Cfr {
    fn decompile(&self, class_bytes: &[u8]) -> Result<String, DecompileError> {
        validate_class_bytes(class_bytes)?;
        let scratch = ScratchClass::write(class_bytes)?;
        self.decompile_class_file(&scratch.file)
    }
}
