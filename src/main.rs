use anyhow::{Context, Result};
use clap::Parser;
use class_harvest::cfr::Cfr;
use class_harvest::cli::{Cli, Commands, WhitelistAction};
use class_harvest::config::{resolve_cfr_path, resolve_whitelist_path};
use class_harvest::convert::{BatchResult, ConvertOptions};
use class_harvest::extract::{ExtractOptions, ExtractionResult, Extractor};
use class_harvest::pipeline::Pipeline;
use class_harvest::whitelist::{FilePatternStore, WhitelistFilter, parse_pattern_lines};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command.clone() {
        Commands::Extract {
            archive,
            output,
            max_depth,
            keep_archives,
        } => {
            let whitelist = open_whitelist(&cli)?;
            let output = output.unwrap_or_else(|| default_output_dir(&archive));
            let options = ExtractOptions {
                max_depth,
                delete_extracted: !keep_archives,
            };
            let result = Extractor::new(&whitelist, options)
                .extract_recursively(&archive, &output)
                .with_context(|| format!("Failed to extract {}", archive.display()))?;
            print_json(&result)?;
        }
        Commands::Unpack { dir, max_depth } => {
            let whitelist = open_whitelist(&cli)?;
            let options = ExtractOptions {
                max_depth,
                ..Default::default()
            };
            let result = Extractor::new(&whitelist, options)
                .extract_directory(&dir)
                .with_context(|| format!("Failed to unpack {}", dir.display()))?;
            print_json(&result)?;
        }
        Commands::Convert {
            dir,
            sequential,
            jobs,
        } => {
            let pipeline = build_pipeline(&cli, jobs)?;
            let bar = progress_bar();
            let on_progress = progress_callback(&bar);
            let result = pipeline
                .convert_all(&dir, !sequential, Some(&on_progress))
                .with_context(|| format!("Failed to convert {}", dir.display()))?;
            bar.finish_and_clear();
            print_json(&ConversionSummary::new(&result))?;
        }
        Commands::Run {
            dir,
            sequential,
            jobs,
        } => {
            let pipeline = build_pipeline(&cli, jobs)?;
            let bar = progress_bar();
            let on_progress = progress_callback(&bar);
            let report = pipeline.process(&dir, !sequential, Some(&on_progress))?;
            bar.finish_and_clear();
            print_json(&RunSummary {
                extraction: &report.extraction,
                conversion: ConversionSummary::new(&report.conversion),
            })?;
        }
        Commands::Whitelist { action } => {
            let whitelist = open_whitelist(&cli)?;
            run_whitelist_action(&whitelist, action)?;
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct ConversionSummary<'a> {
    #[serde(flatten)]
    result: &'a BatchResult,
    files_per_second: f64,
}

impl<'a> ConversionSummary<'a> {
    fn new(result: &'a BatchResult) -> Self {
        Self {
            result,
            files_per_second: result.files_per_second(),
        }
    }
}

#[derive(Serialize)]
struct RunSummary<'a> {
    extraction: &'a ExtractionResult,
    conversion: ConversionSummary<'a>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "class_harvest=debug"
    } else {
        "class_harvest=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_whitelist(cli: &Cli) -> Result<WhitelistFilter> {
    let store = FilePatternStore::new(resolve_whitelist_path(cli)?);
    tracing::debug!(path = %store.path().display(), "using whitelist file");
    Ok(WhitelistFilter::open(Box::new(store)))
}

fn build_pipeline(cli: &Cli, jobs: Option<usize>) -> Result<Pipeline<Cfr>> {
    let cfr = Cfr::new(resolve_cfr_path(cli)?);
    tracing::debug!(jar = %cfr.jar_path().display(), "using CFR");
    let whitelist = Arc::new(open_whitelist(cli)?);
    Ok(Pipeline::new(
        whitelist,
        cfr,
        ExtractOptions::default(),
        ConvertOptions {
            workers: jobs,
            ..Default::default()
        },
    ))
}

fn default_output_dir(archive: &Path) -> PathBuf {
    archive
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn run_whitelist_action(whitelist: &WhitelistFilter, action: WhitelistAction) -> Result<()> {
    #[derive(Serialize)]
    struct Changed {
        changed: usize,
        patterns: usize,
    }

    let changed = match action {
        WhitelistAction::List => {
            print_json(&whitelist.patterns())?;
            return Ok(());
        }
        WhitelistAction::Add { patterns } => whitelist.add_all(&patterns),
        WhitelistAction::Remove { pattern } => usize::from(whitelist.remove(&pattern)),
        WhitelistAction::Clear => {
            let before = whitelist.len();
            whitelist.clear();
            before
        }
        WhitelistAction::Reset => {
            whitelist.reset_to_default();
            whitelist.len()
        }
        WhitelistAction::Import { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read pattern file: {}", file.display()))?;
            whitelist.add_all(parse_pattern_lines(&content))
        }
    };

    print_json(&Changed {
        changed,
        patterns: whitelist.len(),
    })
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_callback(bar: &ProgressBar) -> impl Fn(usize, usize, &str) + Sync + '_ {
    move |done, total, name| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
        bar.set_message(name.to_string());
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_summary_adds_throughput() -> Result<()> {
        let result = BatchResult {
            total_files: 2,
            success_count: 2,
            duration_millis: 500,
            ..Default::default()
        };
        let value = serde_json::to_value(ConversionSummary::new(&result))?;
        assert_eq!(value["success_count"], 2);
        assert_eq!(value["files_per_second"], 4.0);
        Ok(())
    }

    #[test]
    fn default_output_dir_is_archive_parent() {
        assert_eq!(
            default_output_dir(Path::new("/data/in/app.jar")),
            PathBuf::from("/data/in")
        );
        assert_eq!(default_output_dir(Path::new("app.jar")), PathBuf::from("."));
    }
}
