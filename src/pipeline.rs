use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::convert::{BatchConverter, BatchResult, ConvertOptions, ProgressFn};
use crate::decompile::Decompiler;
use crate::error::{ConvertError, ExtractError};
use crate::extract::{ExtractOptions, ExtractionResult, Extractor};
use crate::whitelist::WhitelistFilter;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub extraction: ExtractionResult,
    pub conversion: BatchResult,
}

/// Owns the whitelist and wires extraction and conversion together.
pub struct Pipeline<D> {
    whitelist: Arc<WhitelistFilter>,
    extract_options: ExtractOptions,
    converter: BatchConverter<D>,
}

impl<D: Decompiler> Pipeline<D> {
    pub fn new(
        whitelist: Arc<WhitelistFilter>,
        decompiler: D,
        extract_options: ExtractOptions,
        convert_options: ConvertOptions,
    ) -> Self {
        Self {
            whitelist,
            extract_options,
            converter: BatchConverter::new(decompiler, convert_options),
        }
    }

    fn extractor(&self) -> Extractor<'_> {
        Extractor::new(&self.whitelist, self.extract_options)
    }

    pub fn extract_recursively(
        &self,
        archive: &Path,
        output_dir: &Path,
    ) -> Result<ExtractionResult, ExtractError> {
        self.extractor().extract_recursively(archive, output_dir)
    }

    pub fn extract_directory(&self, directory: &Path) -> Result<ExtractionResult, ExtractError> {
        self.extractor().extract_directory(directory)
    }

    pub fn convert_all(
        &self,
        directory: &Path,
        parallel: bool,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<BatchResult, ConvertError> {
        self.converter.convert_all(directory, parallel, on_progress)
    }

    /// Expands every archive under `directory` in place, then converts the
    /// resulting class files.
    pub fn process(
        &self,
        directory: &Path,
        parallel: bool,
        on_progress: Option<ProgressFn<'_>>,
    ) -> anyhow::Result<ProcessReport> {
        let extraction = self.extract_directory(directory)?;
        let conversion = self.convert_all(directory, parallel, on_progress)?;
        Ok(ProcessReport {
            extraction,
            conversion,
        })
    }

    pub fn add_pattern(&self, pattern: &str) -> bool {
        self.whitelist.add(pattern)
    }

    pub fn add_patterns<I, S>(&self, patterns: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.whitelist.add_all(patterns)
    }

    pub fn remove_pattern(&self, pattern: &str) -> bool {
        self.whitelist.remove(pattern)
    }

    pub fn clear_patterns(&self) {
        self.whitelist.clear();
    }

    pub fn reset_patterns(&self) {
        self.whitelist.reset_to_default();
    }

    pub fn list_patterns(&self) -> Vec<String> {
        self.whitelist.patterns()
    }
}
