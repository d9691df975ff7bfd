use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;

use crate::config::defs::{tp_columns, PipelineError, RunConfig, SAMPLING_BIN_DRAWS};
use crate::utils::stats::median;
use crate::utils::table::{fmt_f64, parse_f64, Table};

pub const SUMMARY_FILE: &str = "sampling_summary.csv";

/// Appends a SUM column over the tp columns and sorts rows by it, highest
/// expression first.
pub fn build_sum_table(table: &Table, tp_names: &[String], file: &Path) -> Result<Table, PipelineError> {
    let mut indices = Vec::with_capacity(tp_names.len());
    for tp in tp_names {
        indices.push(table.require_column(tp, file)?);
    }

    let mut out = Table::new(table.headers.clone());
    out.headers.push("SUM".to_string());
    for row in &table.rows {
        let sum: f64 = indices
            .iter()
            .map(|&i| row.get(i).and_then(|c| parse_f64(c)).unwrap_or(0.0))
            .sum();
        let mut new_row = row.clone();
        new_row.push(fmt_f64(sum));
        out.rows.push(new_row);
    }
    if out.rows.is_empty() {
        return Err(PipelineError::EmptyTable(format!("{:?} has no data rows", file)));
    }

    let sum_col = out.headers.len() - 1;
    out.rows.sort_by(|a, b| {
        let sa = parse_f64(&a[sum_col]).unwrap_or(0.0);
        let sb = parse_f64(&b[sum_col]).unwrap_or(0.0);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(out)
}

/// Splits `n` sorted rows into three expression bins. The base size is n/3;
/// a remainder of one row goes to the middle bin, a remainder of two adds one
/// row to each of the middle and bottom bins.
pub fn bin_ranges(n: usize) -> Vec<std::ops::Range<usize>> {
    let base = n / 3;
    let rem = n % 3;
    let sizes = [base, base + usize::from(rem >= 1), base + usize::from(rem >= 2)];

    let mut ranges = Vec::with_capacity(3);
    let mut start = 0;
    for size in sizes {
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

fn bin_median(table: &Table, range: &std::ops::Range<usize>, sum_col: usize) -> f64 {
    let values: Vec<f64> = table.rows[range.clone()]
        .iter()
        .filter_map(|r| parse_f64(&r[sum_col]))
        .collect();
    median(&values)
}

/// Draws one sampling: a few rows from each bin, with the middle and bottom
/// bins rescaled to the top bin's median expression.
pub fn draw_sampling(
    sorted: &Table,
    tp_names: &[String],
    rng: &mut StdRng,
    file: &Path,
) -> Result<Table, PipelineError> {
    let sum_col = sorted.headers.len() - 1;
    let mut scale_cols: Vec<usize> = Vec::with_capacity(tp_names.len() + 1);
    for tp in tp_names {
        scale_cols.push(sorted.require_column(tp, file)?);
    }
    scale_cols.push(sum_col);

    let ranges = bin_ranges(sorted.rows.len());
    let top_median = bin_median(sorted, &ranges[0], sum_col);

    let mut out = Table::new(sorted.headers.clone());
    for (bin, range) in ranges.iter().enumerate() {
        let len = range.len();
        if len == 0 {
            continue;
        }
        let draws = SAMPLING_BIN_DRAWS.get(bin).copied().unwrap_or(3).min(len);
        let ratio = if bin == 0 {
            1.0
        } else {
            let m = bin_median(sorted, range, sum_col);
            if m == 0.0 { 1.0 } else { top_median / m }
        };

        let mut picks: Vec<usize> = sample(rng, len, draws).into_iter().collect();
        picks.sort_unstable();
        for pick in picks {
            let mut row = sorted.rows[range.start + pick].clone();
            if bin > 0 {
                for &col in &scale_cols {
                    if let Some(value) = row.get(col).and_then(|c| parse_f64(c)) {
                        row[col] = fmt_f64(value * ratio);
                    }
                }
            }
            out.rows.push(row);
        }
    }
    Ok(out)
}

fn column_sums(table: &Table, cols: &[usize]) -> Vec<f64> {
    cols.iter()
        .map(|&col| {
            table
                .rows
                .iter()
                .filter_map(|r| r.get(col).and_then(|c| parse_f64(c)))
                .sum()
        })
        .collect()
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let counts_path = config
        .args
        .counts
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| {
            PipelineError::InvalidConfig("sample_normalizations requires --counts".to_string())
        })?;

    let table = Table::read(&counts_path, b',')?;
    let tp_names = tp_columns(config.args.timepoints);
    let sorted = build_sum_table(&table, &tp_names, &counts_path)?;
    info!(
        "Loaded {} genes, binned as {:?}",
        sorted.rows.len(),
        bin_ranges(sorted.rows.len()).iter().map(|r| r.len()).collect::<Vec<_>>()
    );

    let stem = counts_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "counts".to_string());

    let mut summary_cols: Vec<usize> = Vec::new();
    for tp in &tp_names {
        summary_cols.push(sorted.require_column(tp, &counts_path)?);
    }
    summary_cols.push(sorted.headers.len() - 1);

    let mut summary = Table::new(
        std::iter::once("Sampling".to_string())
            .chain(tp_names.iter().cloned())
            .chain(std::iter::once("SUM".to_string()))
            .collect(),
    );

    for i in 1..=config.args.n_samplings {
        let mut rng = match config.args.seed {
            Some(seed) => StdRng::seed_from_u64(seed + i as u64),
            None => StdRng::from_os_rng(),
        };
        let sampled = draw_sampling(&sorted, &tp_names, &mut rng, &counts_path)?;

        let out = config.out_dir.join(format!("{}_sampled_{}.csv", stem, i));
        sampled.write(&out, b',')?;
        info!("Sampling {}: {} rows written to {:?}", i, sampled.rows.len(), out);

        let mut row = vec![format!("Sampling_{}", i)];
        row.extend(column_sums(&sampled, &summary_cols).iter().map(|v| fmt_f64(*v)));
        summary.rows.push(row);
    }

    let summary_path = config.out_dir.join(SUMMARY_FILE);
    summary.write(&summary_path, b',')?;
    info!("Sampling summary written to {:?}", summary_path);
    Ok(())
}
