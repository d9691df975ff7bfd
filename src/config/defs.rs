use std::path::PathBuf;
use std::sync::Arc;
use crate::cli::Arguments;
use lazy_static::lazy_static;
use rayon::ThreadPool;
use thiserror::Error;

// External software
pub const WEBLOGO_TAG: &str = "weblogo";
pub const RSCRIPT_TAG: &str = "Rscript";

// File-name conventions shared across modules
pub const R1_TAG: &str = "R1_001";
pub const R2_TAG: &str = "R2_001";
pub const TRIMMED_SUFFIX: &str = "_trimmed";
pub const MERGED_COUNTS_FILE: &str = "merged_by_barcode_Astart_readCount.csv";
pub const GENE_LIST_COUNTS_FILE: &str = "nad_genes_readCount.csv";
pub const FILTERED_RESULTS_FILE: &str = "results_log2FC_broad_filtered.csv";

// Static parameters
pub const FASTQ_WRITE_BUFFER_RECORDS: usize = 25_000;
pub const LOW_COUNT_SUM: f64 = 10.0;
pub const INTERGENIC_FLANK: i64 = 100;
pub const TSS_PLOT_WINDOW: i64 = 30;
pub const LOGO_WINDOW_START: i64 = -40;
pub const LOGO_WINDOW_END: i64 = 4;

lazy_static! {
    /// Per-bin draw sizes for `sample_normalizations`.
    pub static ref SAMPLING_BIN_DRAWS: Vec<usize> = vec![3, 3, 3];
}

/// Names the timepoint columns `tp1..tpN`.
pub fn tp_columns(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("tp{}", i)).collect()
}

/// Names the barcode directories/columns `bc01..bcNN`.
pub fn barcode_names(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("bc{:02}", i)).collect()
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    IOError(String),

    #[error("Missing required column '{column}' in {file}")]
    MissingColumn { file: String, column: String },

    #[error("Empty table: {0}")]
    EmptyTable(String),

    #[error("{tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}

pub struct RunConfig {
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
    pub args: Arguments,
    pub thread_pool: Arc<ThreadPool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tp_columns() {
        assert_eq!(tp_columns(3), vec!["tp1", "tp2", "tp3"]);
    }

    #[test]
    fn test_barcode_names_zero_padded() {
        let names = barcode_names(8);
        assert_eq!(names.first().map(String::as_str), Some("bc01"));
        assert_eq!(names.last().map(String::as_str), Some("bc08"));
    }
}
