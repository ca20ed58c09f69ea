//! # class-harvest
//!
//! Unpacks a tree of nested Java archives, leaving third-party dependencies
//! packed, and decompiles every class that comes out.
//!
//! ## Architecture
//!
//! - **whitelist**: Case-insensitive archive-name patterns and their persistence
//! - **scan**: Archive and class-file discovery under a directory
//! - **archive**: Single-archive expansion with entry sanitization
//! - **extract**: Recursive, depth-bounded, cycle-safe extraction engine
//! - **decompile**: Decompiler capability contract
//! - **cfr**: CFR decompiler integration
//! - **convert**: Parallel batch conversion with progress reporting
//! - **pipeline**: Top-level wiring of whitelist, extraction and conversion

pub mod archive;
pub mod cfr;
pub mod cli;
pub mod config;
pub mod convert;
pub mod decompile;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod scan;
pub mod whitelist;
