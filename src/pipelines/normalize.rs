use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::config::defs::{tp_columns, PipelineError, RunConfig};
use crate::utils::stats::percent_cv;
use crate::utils::table::{fmt_f64, parse_f64, Table};

const REPLICATE_COLUMNS: [&str; 4] = ["3PAB_rep1", "3PAB_rep2", "3PAB_rep3", "3PAB_rep4"];
const MAIN_COLUMNS: [&str; 3] = ["gene_name", "timepoint", "gene_biotype"];

/// Reads the per-timepoint values from the first data row of a normalization
/// file and derives one factor per tp column: `value(tp)/value(tp1)`.
pub fn factors_from_first_row(path: &Path) -> Result<HashMap<String, f64>, PipelineError> {
    let table = Table::read(path, b',')?;
    let row = table
        .rows
        .first()
        .ok_or_else(|| PipelineError::EmptyTable(format!("{:?} has no data rows", path)))?;
    factors_from_row(&table.headers, row, path)
}

/// Same factor derivation for an arbitrary row (used per sampling row).
pub fn factors_from_row(
    headers: &[String],
    row: &[String],
    file: &Path,
) -> Result<HashMap<String, f64>, PipelineError> {
    let tp1_idx = headers.iter().position(|h| h == "tp1").ok_or_else(|| {
        PipelineError::MissingColumn { file: file.display().to_string(), column: "tp1".to_string() }
    })?;
    let tp1 = row
        .get(tp1_idx)
        .and_then(|c| parse_f64(c))
        .ok_or_else(|| PipelineError::InvalidConfig(format!("Non-numeric tp1 value in {:?}", file)))?;
    if tp1 == 0.0 {
        return Err(PipelineError::InvalidConfig(format!(
            "tp1 is zero in {:?}, cannot derive factors",
            file
        )));
    }

    let mut factors = HashMap::new();
    for (i, header) in headers.iter().enumerate() {
        if !header.starts_with("tp") {
            continue;
        }
        let value = row.get(i).and_then(|c| parse_f64(c)).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("Non-numeric value in column '{}' of {:?}", header, file))
        })?;
        factors.insert(header.clone(), value / tp1);
    }
    Ok(factors)
}

/// Maps a timepoint cell ("3" or "tp3") to its factor; unknown timepoints
/// normalize by 1.
pub fn factor_for_timepoint(factors: &HashMap<String, f64>, timepoint: &str) -> f64 {
    let tp = timepoint.trim();
    let key = if tp.starts_with("tp") { tp.to_string() } else { format!("tp{}", tp) };
    factors.get(&key).copied().unwrap_or(1.0)
}

// ---- normalize_counts (per-timepoint summary with %CV) ----

/// Scales every tp column by `depth(tp1)/depth(tp)` and appends a %CV column.
pub fn normalize_summary(
    table: &Table,
    depths: &HashMap<String, f64>,
    tp_names: &[String],
    file: &Path,
) -> Result<Table, PipelineError> {
    let mut indices = Vec::with_capacity(tp_names.len());
    for tp in tp_names {
        indices.push(table.require_column(tp, file)?);
    }

    let mut out = Table::new(table.headers.clone());
    out.headers.push("%CV".to_string());
    for row in &table.rows {
        let mut new_row = row.clone();
        let mut values = Vec::with_capacity(indices.len());
        for (tp, &idx) in tp_names.iter().zip(&indices) {
            let value = row.get(idx).and_then(|c| parse_f64(c)).unwrap_or(0.0);
            // depths factor is tp/tp1; the summary multiplies by its inverse
            let factor = factor_for_timepoint(depths, tp);
            let scaled = if factor == 0.0 { 0.0 } else { value / factor };
            new_row[idx] = fmt_f64(scaled);
            values.push(scaled);
        }
        new_row.push(fmt_f64(percent_cv(&values)));
        out.rows.push(new_row);
    }
    Ok(out)
}

pub async fn normalize_counts_run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let counts_path = config
        .args
        .counts
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("normalize_counts requires --counts".to_string()))?;
    let norm_path = config
        .args
        .norm_file
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("normalize_counts requires --norm-file".to_string()))?;

    let table = Table::read(&counts_path, b',')?;
    let depths = factors_from_first_row(&norm_path)?;
    let tp_names = tp_columns(config.args.timepoints);

    let normalized = normalize_summary(&table, &depths, &tp_names, &counts_path)?;

    let out = match &config.args.out_file {
        Some(path) => {
            let path = PathBuf::from(path);
            if path.is_absolute() { path } else { config.out_dir.join(path) }
        }
        None => {
            let stem = counts_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "counts".to_string());
            config.out_dir.join(format!("{}_assigned_reads_normalized.csv", stem))
        }
    };
    normalized.write(&out, b',')?;
    info!("Normalized gene counts with %CV saved to {:?}", out);
    Ok(())
}

// ---- normalize_replicates (per-row timepoint normalization) ----

/// Loads the main replicate TSV, falling back to whitespace splitting when
/// the tab parse does not yield the expected columns.
pub fn load_replicate_table(path: &Path) -> Result<Table, PipelineError> {
    let table = Table::read(path, b'\t')?;
    if has_replicate_columns(&table) {
        return Ok(table);
    }

    let text = std::fs::read_to_string(path)?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let headers: Vec<String> = lines
        .next()
        .map(|l| l.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let rows = lines
        .map(|l| l.split_whitespace().map(str::to_string).collect())
        .collect();
    let table = Table { headers, rows };

    if !has_replicate_columns(&table) {
        let missing: Vec<&str> = MAIN_COLUMNS
            .iter()
            .chain(REPLICATE_COLUMNS.iter())
            .filter(|c| table.column_index(c).is_none())
            .copied()
            .collect();
        return Err(PipelineError::InvalidConfig(format!(
            "Missing required columns in {:?}: {:?}",
            path, missing
        )));
    }
    Ok(table)
}

fn has_replicate_columns(table: &Table) -> bool {
    MAIN_COLUMNS
        .iter()
        .chain(REPLICATE_COLUMNS.iter())
        .all(|c| table.column_index(c).is_some())
}

/// Divides each replicate column by the factor of the row's timepoint.
pub fn apply_replicate_factors(
    table: &Table,
    factors: &HashMap<String, f64>,
    file: &Path,
) -> Result<Table, PipelineError> {
    let tp_idx = table.require_column("timepoint", file)?;
    let rep_indices: Vec<usize> = REPLICATE_COLUMNS
        .iter()
        .map(|c| table.require_column(c, file))
        .collect::<Result<_, _>>()?;

    let mut out = table.clone();
    for row in &mut out.rows {
        // Ragged rows pass through untouched
        let factor = match row.get(tp_idx) {
            Some(cell) => factor_for_timepoint(factors, cell),
            None => continue,
        };
        for &idx in &rep_indices {
            if let Some(value) = row.get(idx).and_then(|c| parse_f64(c)) {
                row[idx] = fmt_f64(value / factor);
            }
        }
    }
    Ok(out)
}

pub async fn normalize_replicates_run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let main_path = config
        .args
        .counts
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("normalize_replicates requires --counts".to_string()))?;
    let read_depth_path = config
        .args
        .norm_file
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("normalize_replicates requires --norm-file".to_string()))?;
    let assigned_path = config
        .args
        .assigned_file
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("normalize_replicates requires --assigned-file".to_string()))?;
    let sampling_path = config
        .args
        .sampling_summary
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("normalize_replicates requires --sampling-summary".to_string()))?;

    let main = load_replicate_table(&main_path)?;

    let sources = [
        ("read_depth", read_depth_path),
        ("assigned_reads", assigned_path),
    ];
    let mut normalized: Vec<(&str, Table)> = Vec::new();
    for (label, path) in &sources {
        let factors = factors_from_first_row(path)?;
        let table = apply_replicate_factors(&main, &factors, &main_path)?;
        let out = config.out_dir.join(format!("{}_normalized.tsv", label));
        table.write(&out, b'\t')?;
        info!("Wrote normalized file: {:?}", out);
        normalized.push((label, table));
    }

    // Second pass: one extra normalization per sampling row
    let sampling = Table::read(&sampling_path, b',')?;
    let sampling_col = sampling.require_column("Sampling", &sampling_path)?;
    for tp in tp_columns(config.args.timepoints) {
        sampling.require_column(&tp, &sampling_path)?;
    }

    for row in &sampling.rows {
        let Some(name) = row.get(sampling_col) else { continue };
        let index: usize = name
            .rsplit('_')
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                PipelineError::InvalidConfig(format!("Unexpected Sampling format: {}", name))
            })?;
        let factors = factors_from_row(&sampling.headers, row, &sampling_path)?;

        for (label, base) in &normalized {
            let table = apply_replicate_factors(base, &factors, &main_path)?;
            let prefix = match *label {
                "assigned_reads" => "assigned_read_common_genes_normalized",
                _ => "read_depth_common_genes_normalized",
            };
            let out = config.out_dir.join(format!("{}_{}.tsv", prefix, index));
            table.write(&out, b'\t')?;
            info!("Wrote sampling normalized file: {:?}", out);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Arguments;
    use rayon::ThreadPoolBuilder;
    use tempfile::tempdir;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_factors_from_row_relative_to_tp1() -> Result<(), PipelineError> {
        let headers: Vec<String> = vec!["Sampling".into(), "tp1".into(), "tp2".into()];
        let row: Vec<String> = vec!["Sampling_1".into(), "10".into(), "25".into()];
        let factors = factors_from_row(&headers, &row, Path::new("s.csv"))?;
        assert_eq!(factors["tp1"], 1.0);
        assert_eq!(factors["tp2"], 2.5);
        Ok(())
    }

    #[test]
    fn test_factors_zero_tp1_is_error() {
        let headers: Vec<String> = vec!["tp1".into(), "tp2".into()];
        let row: Vec<String> = vec!["0".into(), "5".into()];
        assert!(factors_from_row(&headers, &row, Path::new("s.csv")).is_err());
    }

    #[test]
    fn test_factor_for_timepoint_accepts_bare_numbers() {
        let mut factors = HashMap::new();
        factors.insert("tp3".to_string(), 2.0);
        assert_eq!(factor_for_timepoint(&factors, "3"), 2.0);
        assert_eq!(factor_for_timepoint(&factors, "tp3"), 2.0);
        assert_eq!(factor_for_timepoint(&factors, "tp9"), 1.0);
    }

    #[test]
    fn test_normalize_summary_keeps_tp1_and_adds_cv() -> Result<(), PipelineError> {
        let t = table(&["Geneid", "tp1", "tp2"], &[&["g1", "10", "40"]]);
        let mut depths = HashMap::new();
        depths.insert("tp1".to_string(), 1.0);
        depths.insert("tp2".to_string(), 2.0);
        let tp_names = vec!["tp1".to_string(), "tp2".to_string()];

        let out = normalize_summary(&t, &depths, &tp_names, Path::new("c.csv"))?;
        assert_eq!(out.headers.last().map(String::as_str), Some("%CV"));
        // tp1 unchanged, tp2 divided by its depth ratio
        assert_eq!(out.rows[0][1], "10");
        assert_eq!(out.rows[0][2], "20");
        // constant row after normalization would have CV 0; here sd > 0
        let cv: f64 = out.rows[0][3].parse().unwrap();
        assert!(cv > 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_normalize_counts_run_honors_out_file() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        let counts = dir.path().join("summary.csv");
        std::fs::write(&counts, "Geneid,tp1,tp2\ng1,10,40\n")?;
        let depths = dir.path().join("depths.csv");
        std::fs::write(&depths, "tp1,tp2\n1000,2000\n")?;

        let mut args = Arguments::default();
        args.counts = Some(counts.to_string_lossy().into_owned());
        args.norm_file = Some(depths.to_string_lossy().into_owned());
        args.timepoints = 2;
        args.out_file = Some("custom_normalized.csv".to_string());

        let config = Arc::new(RunConfig {
            cwd: dir.path().to_path_buf(),
            out_dir: dir.path().to_path_buf(),
            args,
            thread_pool: Arc::new(ThreadPoolBuilder::new().num_threads(1).build().unwrap()),
        });
        normalize_counts_run(config).await?;

        let out = Table::read(&dir.path().join("custom_normalized.csv"), b',')?;
        assert_eq!(out.headers.last().map(String::as_str), Some("%CV"));
        // tp2 scaled by the inverse depth ratio 2000/1000
        assert_eq!(out.rows[0][2], "20");
        Ok(())
    }

    #[test]
    fn test_apply_replicate_factors_divides_by_row_timepoint() -> Result<(), PipelineError> {
        let t = table(
            &["gene_name", "timepoint", "gene_biotype", "3PAB_rep1", "3PAB_rep2", "3PAB_rep3", "3PAB_rep4"],
            &[&["g1", "2", "coding", "10", "20", "30", "40"]],
        );
        let mut factors = HashMap::new();
        factors.insert("tp2".to_string(), 2.0);
        let out = apply_replicate_factors(&t, &factors, Path::new("m.tsv"))?;
        assert_eq!(out.rows[0][3], "5");
        assert_eq!(out.rows[0][6], "20");
        Ok(())
    }

    #[test]
    fn test_apply_replicate_factors_leaves_ragged_rows_alone() -> Result<(), PipelineError> {
        let mut t = table(
            &["gene_name", "timepoint", "gene_biotype", "3PAB_rep1", "3PAB_rep2", "3PAB_rep3", "3PAB_rep4"],
            &[&["g1", "2", "coding", "10", "20", "30", "40"]],
        );
        t.rows.push(vec!["truncated".to_string()]);

        let mut factors = HashMap::new();
        factors.insert("tp2".to_string(), 2.0);
        let out = apply_replicate_factors(&t, &factors, Path::new("m.tsv"))?;
        assert_eq!(out.rows[0][3], "5");
        assert_eq!(out.rows[1], vec!["truncated"]);
        Ok(())
    }

    #[test]
    fn test_load_replicate_table_whitespace_fallback() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        let path = dir.path().join("main.tsv");
        std::fs::write(
            &path,
            "gene_name timepoint gene_biotype 3PAB_rep1 3PAB_rep2 3PAB_rep3 3PAB_rep4\ng1 1 coding 1 2 3 4\n",
        )?;
        let table = load_replicate_table(&path)?;
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], "g1");
        Ok(())
    }
}
