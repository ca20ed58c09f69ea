use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-harvest")]
#[command(about = "Unpack nested Java archives and bulk-decompile the classes inside")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "FILE", global = true)]
    pub cfr: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    pub whitelist: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Expand one archive and every nested non-whitelisted archive
    Extract {
        archive: PathBuf,

        #[arg(short = 'o', long, value_name = "DIR")]
        output: Option<PathBuf>,

        #[arg(long, value_name = "N", default_value_t = default_max_depth())]
        max_depth: usize,

        /// Keep nested archives after expanding them
        #[arg(long)]
        keep_archives: bool,
    },
    /// Expand every archive under a directory in place
    Unpack {
        dir: PathBuf,

        #[arg(long, value_name = "N", default_value_t = default_max_depth())]
        max_depth: usize,
    },
    /// Decompile every class file under a directory
    Convert {
        dir: PathBuf,

        #[arg(long)]
        sequential: bool,

        #[arg(short = 'j', long, value_name = "N")]
        jobs: Option<usize>,
    },
    /// Unpack, then convert
    Run {
        dir: PathBuf,

        #[arg(long)]
        sequential: bool,

        #[arg(short = 'j', long, value_name = "N")]
        jobs: Option<usize>,
    },
    /// Manage the archive whitelist
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum WhitelistAction {
    List,
    Add {
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    Remove {
        pattern: String,
    },
    Clear,
    Reset,
    /// Add patterns from a file (one per line, `#` comments allowed)
    Import {
        file: PathBuf,
    },
}

fn default_max_depth() -> usize {
    crate::extract::DEFAULT_MAX_DEPTH
}
