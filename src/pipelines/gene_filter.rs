use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::config::defs::{
    tp_columns, PipelineError, RunConfig, GENE_LIST_COUNTS_FILE, MERGED_COUNTS_FILE,
};
use crate::utils::table::Table;

/// Loads the deduplicated, whitespace-trimmed gene list from the `Geneid`
/// column of `--gene-list`.
pub fn load_gene_list(path: &Path) -> Result<BTreeSet<String>, PipelineError> {
    let table = Table::read(path, b',')?;
    let col = table.require_column("Geneid", path)?;
    let genes: BTreeSet<String> = table
        .rows
        .iter()
        .filter_map(|row| row.get(col))
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect();
    if genes.is_empty() {
        return Err(PipelineError::EmptyTable(format!("{:?} lists no genes", path)));
    }
    Ok(genes)
}

/// Keeps only the listed genes, sorted by Geneid.
pub fn filter_by_gene_list(table: &Table, genes: &BTreeSet<String>, file: &Path) -> Result<Table, PipelineError> {
    let col = table.require_column("Geneid", file)?;
    let mut filtered = Table::new(table.headers.clone());
    for row in &table.rows {
        let gene = row.get(col).map(|g| g.trim()).unwrap_or("");
        if genes.contains(gene) {
            filtered.rows.push(row.clone());
        }
    }
    filtered.rows.sort_by(|a, b| a[col].trim().cmp(b[col].trim()));
    Ok(filtered)
}

pub async fn filter_gene_counts_run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let base = config
        .args
        .in_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("filter_gene_counts requires --in-dir".to_string()))?;
    let gene_list_path = config
        .args
        .gene_list
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("filter_gene_counts requires --gene-list".to_string()))?;

    let genes = load_gene_list(&gene_list_path)?;
    info!("Total unique genes from list: {}", genes.len());

    for tp in tp_columns(config.args.timepoints) {
        let tp_dir = base.join(&tp);
        let input = tp_dir.join(MERGED_COUNTS_FILE);
        if !input.exists() {
            warn!("{:?} not found. Skipping {}.", input, tp);
            continue;
        }

        let table = Table::read(&input, b',')?;
        if table.column_index("Geneid").is_none() {
            warn!("'Geneid' column not found in {:?}. Skipping {}.", input, tp);
            continue;
        }
        let filtered = filter_by_gene_list(&table, &genes, &input)?;
        let out = tp_dir.join(GENE_LIST_COUNTS_FILE);
        filtered.write(&out, b',')?;
        info!(
            "{}: wrote {} rows to {:?} (from {} target genes)",
            tp,
            filtered.rows.len(),
            out,
            genes.len()
        );
    }
    Ok(())
}

// ---- attach_stats ----

/// Formats one gene's per-timepoint entries the way downstream clustering
/// expects: a bracketed list of quoted "tp, avg, stderr" strings.
pub fn format_timepoints_cell(entries: &[(String, String, String)]) -> String {
    let parts: Vec<String> = entries
        .iter()
        .map(|(tp, avg, stderr)| format!("'{}, {}, {}'", tp, avg, stderr))
        .collect();
    format!("[{}]", parts.join(", "))
}

/// Per-gene (avg, stderr) pairs from one normalized per-timepoint table:
/// first column is the gene id, the last two columns hold average and
/// standard error.
pub fn load_timepoint_stats(path: &Path) -> Result<HashMap<String, (String, String)>, PipelineError> {
    let delimiter = if path.extension().map(|e| e == "tsv").unwrap_or(false) { b'\t' } else { b',' };
    let table = Table::read(path, delimiter)?;
    let n = table.headers.len();
    if n < 3 {
        return Err(PipelineError::InvalidConfig(format!(
            "{:?} needs at least gene, average and stderr columns",
            path
        )));
    }
    let mut stats = HashMap::new();
    for row in &table.rows {
        if row.len() < n {
            continue;
        }
        stats.insert(row[0].clone(), (row[n - 2].clone(), row[n - 1].clone()));
    }
    Ok(stats)
}

/// Finds `normalized_nad_readCount_<tp>.csv` in the timepoint directory or
/// one of its immediate subdirectories.
fn find_normalized_file(tp_dir: &Path, tp: &str) -> Option<PathBuf> {
    let name = format!("normalized_nad_readCount_{}.csv", tp);
    let direct = tp_dir.join(&name);
    if direct.is_file() {
        return Some(direct);
    }
    let entries = std::fs::read_dir(tp_dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let candidate = path.join(&name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Rewrites each row's TimePoints cell with the per-timepoint (avg, stderr)
/// entries for its gene; missing timepoints get NA. Ragged rows are skipped.
pub fn attach_timepoint_stats(
    table: &mut Table,
    tps: &[String],
    tp_data: &HashMap<String, HashMap<String, (String, String)>>,
    file: &Path,
) -> Result<(), PipelineError> {
    let gene_col = table.require_column("Geneid", file)?;
    let tp_col = table.require_column("TimePoints", file)?;

    for row in &mut table.rows {
        let Some(gene) = row.get(gene_col).cloned() else { continue };
        if row.len() <= tp_col {
            continue;
        }
        let entries: Vec<(String, String, String)> = tps
            .iter()
            .map(|tp| {
                let (avg, stderr) = tp_data
                    .get(tp)
                    .and_then(|m| m.get(&gene))
                    .cloned()
                    .unwrap_or_else(|| ("NA".to_string(), "NA".to_string()));
                (tp.clone(), avg, stderr)
            })
            .collect();
        row[tp_col] = format_timepoints_cell(&entries);
    }
    Ok(())
}

pub async fn attach_stats_run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let base = config
        .args
        .in_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("attach_stats requires --in-dir".to_string()))?;
    let input = config
        .args
        .gene_list
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("attach_stats requires --gene-list".to_string()))?;

    let tps = tp_columns(config.args.timepoints);
    let mut tp_data: HashMap<String, HashMap<String, (String, String)>> = HashMap::new();
    for tp in &tps {
        let tp_dir = base.join(tp);
        match find_normalized_file(&tp_dir, tp) {
            Some(path) => {
                tp_data.insert(tp.clone(), load_timepoint_stats(&path)?);
                info!("Loaded data for {} from {:?}", tp, path);
            }
            None => warn!("File not found for {}: no normalized_nad_readCount_{}.csv under {:?}", tp, tp, tp_dir),
        }
    }

    let mut table = Table::read(&input, b',')?;
    attach_timepoint_stats(&mut table, &tps, &tp_data, &input)?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "common_genes".to_string());
    let out = config.out_dir.join(format!("{}_with_stats.csv", stem));
    table.write(&out, b',')?;
    info!("Saved updated file with stats (all tps) to {:?}", out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_gene_list_trims_and_dedupes() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        let path = dir.path().join("genes.csv");
        std::fs::write(&path, "Geneid,TimePoints\n g1 ,x\ng2,y\ng1,z\n")?;
        let genes = load_gene_list(&path)?;
        assert_eq!(genes.len(), 2);
        assert!(genes.contains("g1"));
        Ok(())
    }

    #[test]
    fn test_filter_by_gene_list_sorts() -> Result<(), PipelineError> {
        let genes: BTreeSet<String> = ["g1", "g3"].iter().map(|s| s.to_string()).collect();
        let table = Table {
            headers: vec!["Geneid".to_string(), "bc01".to_string()],
            rows: vec![
                vec!["g3".to_string(), "2".to_string()],
                vec!["g2".to_string(), "5".to_string()],
                vec!["g1".to_string(), "1".to_string()],
            ],
        };
        let filtered = filter_by_gene_list(&table, &genes, Path::new("t.csv"))?;
        let names: Vec<&str> = filtered.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["g1", "g3"]);
        Ok(())
    }

    #[test]
    fn test_format_timepoints_cell() {
        let entries = vec![
            ("tp1".to_string(), "54455.75".to_string(), "12651.32".to_string()),
            ("tp2".to_string(), "NA".to_string(), "NA".to_string()),
        ];
        assert_eq!(
            format_timepoints_cell(&entries),
            "['tp1, 54455.75, 12651.32', 'tp2, NA, NA']"
        );
    }

    #[test]
    fn test_attach_timepoint_stats_skips_ragged_rows() -> Result<(), PipelineError> {
        let mut table = Table {
            headers: vec!["Geneid".to_string(), "TimePoints".to_string()],
            rows: vec![
                vec!["truncated".to_string()],
                vec!["g1".to_string(), "[]".to_string()],
            ],
        };
        let mut tp_data = HashMap::new();
        let mut g1 = HashMap::new();
        g1.insert("g1".to_string(), ("1.5".to_string(), "0.5".to_string()));
        tp_data.insert("tp1".to_string(), g1);

        let tps = vec!["tp1".to_string()];
        attach_timepoint_stats(&mut table, &tps, &tp_data, Path::new("g.csv"))?;
        assert_eq!(table.rows[0], vec!["truncated"]);
        assert_eq!(table.rows[1][1], "['tp1, 1.5, 0.5']");
        Ok(())
    }

    #[test]
    fn test_load_timepoint_stats_uses_last_two_columns() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        let path = dir.path().join("normalized_nad_readCount_tp1.csv");
        std::fs::write(&path, "Geneid,bc01,bc02,avg,stderr\ng1,1,2,1.5,0.5\n")?;
        let stats = load_timepoint_stats(&path)?;
        assert_eq!(stats["g1"], ("1.5".to_string(), "0.5".to_string()));
        Ok(())
    }
}
