use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use log::{info, warn};

use crate::config::defs::{
    tp_columns, PipelineError, RunConfig, FILTERED_RESULTS_FILE, LOW_COUNT_SUM,
    MERGED_COUNTS_FILE, RSCRIPT_TAG,
};
use crate::utils::command::{check_version, rscript, run_tool};
use crate::utils::file::list_files_matching;
use crate::utils::table::{parse_f64, Table};

const EXPECTED_SAMPLES: usize = 8;
const TREATED_SAMPLES: usize = 4;
const LOG2FC_MIN: f64 = -1.0;
const LOG2FC_MAX: f64 = 1.0;
const BASE_MEAN_MIN: f64 = 100.0;

pub const COUNTS_FILE: &str = "deseq_counts.csv";
pub const METADATA_FILE: &str = "deseq_metadata.csv";
pub const RESULTS_SUFFIX: &str = "_results.csv";

/// Splits the merged counts table into the model inputs: a counts matrix with
/// low-expression genes removed (row sum < 10) and the condition metadata
/// (first four samples Treated, last four Control).
pub fn prepare_counts(table: &Table, file: &Path) -> Result<(Table, Table), PipelineError> {
    let n_samples = table.headers.len().saturating_sub(1);
    if n_samples != EXPECTED_SAMPLES {
        return Err(PipelineError::InvalidConfig(format!(
            "{:?}: expected {} samples, found {}",
            file, EXPECTED_SAMPLES, n_samples
        )));
    }

    let mut counts = Table::new(table.headers.clone());
    for row in &table.rows {
        // Non-numeric cells poison the row, matching a coerce-to-NaN load
        let values: Option<Vec<f64>> = row[1..].iter().map(|c| parse_f64(c)).collect();
        let Some(values) = values else { continue };
        if values.iter().sum::<f64>() >= LOW_COUNT_SUM {
            counts.rows.push(row.clone());
        }
    }
    if counts.rows.is_empty() {
        return Err(PipelineError::EmptyTable(format!(
            "{:?} has no genes above the low-count threshold",
            file
        )));
    }

    let mut metadata = Table::new(vec!["sample_id".to_string(), "conditions".to_string()]);
    for (i, sample) in table.headers[1..].iter().enumerate() {
        let condition = if i < TREATED_SAMPLES { "Treated" } else { "Control" };
        metadata.rows.push(vec![sample.clone(), condition.to_string()]);
    }

    Ok((counts, metadata))
}

/// Fits and tests one timepoint with the external DESeq2 runner.
async fn run_timepoint(tp_dir: &Path, script: &Path) -> Result<(), PipelineError> {
    let counts_path = tp_dir.join(MERGED_COUNTS_FILE);
    if !counts_path.exists() {
        warn!("Skipping {:?}: no file at {:?}", tp_dir, counts_path);
        return Ok(());
    }
    info!("Processing {:?}", counts_path);

    let table = Table::read(&counts_path, b',')?;
    let (counts, metadata) = prepare_counts(&table, &counts_path)?;

    let model_counts = tp_dir.join(COUNTS_FILE);
    let model_metadata = tp_dir.join(METADATA_FILE);
    counts.write(&model_counts, b',')?;
    metadata.write(&model_metadata, b',')?;

    let stem = counts_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "counts".to_string());
    let results = tp_dir.join(format!("{}{}", stem, RESULTS_SUFFIX));

    let args = rscript::arg_generator(script, &model_counts, &model_metadata, &results);
    run_tool(RSCRIPT_TAG, args).await?;
    info!("Saved results to {:?}", results);
    Ok(())
}

pub async fn diff_expr_run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let base = config
        .args
        .in_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("diff_expr requires --in-dir".to_string()))?;
    let script = PathBuf::from(&config.args.deseq_script);
    if !script.exists() {
        return Err(PipelineError::InvalidConfig(format!(
            "DESeq2 runner script not found at {:?} (--deseq-script)",
            script
        )));
    }

    let version = check_version(RSCRIPT_TAG)
        .await
        .map_err(|e| PipelineError::Other(anyhow!(e)))?;
    info!("Using Rscript {}", version);

    for tp in tp_columns(config.args.timepoints) {
        let tp_dir = base.join(&tp);
        if !tp_dir.is_dir() {
            warn!("[{}] directory not found, skipping", tp);
            continue;
        }
        run_timepoint(&tp_dir, &script).await?;
    }
    Ok(())
}

/// Broad filter on the Wald results: non-changing (|log2FC| <= 1),
/// well-expressed (baseMean >= 100) genes.
pub fn filter_de_table(table: &Table, file: &Path) -> Result<Table, PipelineError> {
    let lfc = table.require_column("log2FoldChange", file)?;
    table.require_column("padj", file)?;
    let base_mean = table.require_column("baseMean", file)?;

    let mut filtered = Table::new(table.headers.clone());
    for row in &table.rows {
        let lfc_val = row.get(lfc).and_then(|c| parse_f64(c));
        let bm_val = row.get(base_mean).and_then(|c| parse_f64(c));
        if let (Some(l), Some(b)) = (lfc_val, bm_val) {
            if l >= LOG2FC_MIN && l <= LOG2FC_MAX && b >= BASE_MEAN_MIN {
                filtered.rows.push(row.clone());
            }
        }
    }
    Ok(filtered)
}

pub async fn filter_results_run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let base = config
        .args
        .in_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("filter_results requires --in-dir".to_string()))?;
    let pattern = config
        .args
        .pattern
        .clone()
        .unwrap_or_else(|| RESULTS_SUFFIX.to_string());

    for tp in tp_columns(config.args.timepoints) {
        let tp_dir = base.join(&tp);
        if !tp_dir.is_dir() {
            warn!("Skipping missing folder: {:?}", tp_dir);
            continue;
        }

        let candidates = list_files_matching(&tp_dir, &pattern)?;
        let Some(input) = candidates.first() else {
            warn!("No input file found in {:?}", tp_dir);
            continue;
        };

        let table = Table::read(input, b',')?;
        let filtered = filter_de_table(&table, input)?;
        let out = tp_dir.join(FILTERED_RESULTS_FILE);
        filtered.write(&out, b',')?;
        info!("Filtered data saved to {:?} ({} rows)", out, filtered.rows.len());
    }
    Ok(())
}
