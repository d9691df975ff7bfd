use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;

use crate::config::defs::{tp_columns, PipelineError, RunConfig, MERGED_COUNTS_FILE};
use crate::utils::file::list_files_matching_all;
use crate::utils::table::{fmt_f64, parse_f64, Table};

lazy_static! {
    static ref BARCODE_RE: Regex = Regex::new(r"(bc\d+)").unwrap();
}

pub fn extract_barcode(file_name: &str) -> Option<String> {
    BARCODE_RE
        .captures(file_name)
        .map(|cap| cap[1].to_string())
}

/// Sums the featureCounts `count` column (column 7) across one barcode's
/// paired and unpaired tables, outer-joined on Geneid with 0 fill.
/// Gene order follows first appearance.
pub fn sum_barcode_counts(files: &[PathBuf]) -> Result<(Vec<String>, HashMap<String, f64>), PipelineError> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, f64> = HashMap::new();

    for file in files {
        let table = Table::read(file, b'\t')?;
        if table.headers.len() < 7 {
            return Err(PipelineError::InvalidConfig(format!(
                "{:?} does not look like featureCounts output (needs 7 columns, found {})",
                file,
                table.headers.len()
            )));
        }
        for row in &table.rows {
            let gene = row.first().map(String::as_str).unwrap_or("");
            if gene.is_empty() {
                continue;
            }
            let count = row.get(6).and_then(|c| parse_f64(c)).unwrap_or(0.0);
            if !totals.contains_key(gene) {
                order.push(gene.to_string());
            }
            *totals.entry(gene.to_string()).or_insert(0.0) += count;
        }
    }
    Ok((order, totals))
}

/// Groups a timepoint directory's count tables by barcode and merges them
/// into one Geneid x barcode table.
pub fn merge_timepoint(tp_dir: &Path) -> Result<Option<Table>, PipelineError> {
    let paired = list_files_matching_all(tp_dir, &["_paired", "table"])?;
    let unpaired = list_files_matching_all(tp_dir, &["_unpaired", "table"])?;

    if paired.is_empty() || unpaired.is_empty() {
        warn!("Skipping {:?}: missing either paired or unpaired files", tp_dir);
        return Ok(None);
    }

    let mut paired_map: HashMap<String, Vec<PathBuf>> = HashMap::new();
    let mut unpaired_map: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for file in paired {
        if let Some(bc) = file.file_name().and_then(|n| extract_barcode(&n.to_string_lossy())) {
            paired_map.entry(bc).or_default().push(file);
        }
    }
    for file in unpaired {
        if let Some(bc) = file.file_name().and_then(|n| extract_barcode(&n.to_string_lossy())) {
            unpaired_map.entry(bc).or_default().push(file);
        }
    }

    let mut common: Vec<String> = paired_map
        .keys()
        .filter(|bc| unpaired_map.contains_key(*bc))
        .cloned()
        .collect();
    common.sort();
    if common.is_empty() {
        warn!("Skipping {:?}: no matching barcodes across paired and unpaired files", tp_dir);
        return Ok(None);
    }

    let mut merged: Option<Table> = None;
    for bc in &common {
        let mut files = paired_map.remove(bc).unwrap_or_default();
        files.extend(unpaired_map.remove(bc).unwrap_or_default());

        let (order, totals) = sum_barcode_counts(&files)?;
        let mut bc_table = Table::new(vec!["Geneid".to_string(), bc.clone()]);
        for gene in order {
            let count = totals.get(&gene).copied().unwrap_or(0.0);
            bc_table.rows.push(vec![gene, fmt_f64(count)]);
        }

        merged = Some(match merged {
            None => bc_table,
            Some(acc) => acc.outer_merge(&bc_table, "Geneid", "0")?,
        });
    }

    Ok(merged)
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let base = config
        .args
        .in_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("merge_counts requires --in-dir".to_string()))?;

    for tp in tp_columns(config.args.timepoints) {
        let tp_dir = base.join(&tp);
        if !tp_dir.is_dir() {
            continue;
        }
        match merge_timepoint(&tp_dir)? {
            Some(table) => {
                let out = tp_dir.join(MERGED_COUNTS_FILE);
                table.write(&out, b',')?;
                info!("Merged table written to {:?}", out);
            }
            None => continue,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const FC_HEADER: &str =
        "Geneid\tChr\tStart\tEnd\tStrand\tLength\tcount";

    fn write_fc(path: &Path, rows: &[(&str, u64)]) {
        let mut text = String::from("# Program:featureCounts v2.0\n");
        text.push_str(FC_HEADER);
        text.push('\n');
        for (gene, count) in rows {
            text.push_str(&format!("{}\tchr\t1\t10\t+\t10\t{}\n", gene, count));
        }
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_extract_barcode() {
        assert_eq!(extract_barcode("tp1_bc03_paired.table").as_deref(), Some("bc03"));
        assert_eq!(extract_barcode("no_code.table"), None);
    }

    #[test]
    fn test_merge_timepoint_sums_and_joins() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        write_fc(&dir.path().join("s_bc01_paired.table"), &[("g1", 5), ("g2", 2)]);
        write_fc(&dir.path().join("s_bc01_unpaired.table"), &[("g1", 3)]);
        write_fc(&dir.path().join("s_bc02_paired.table"), &[("g3", 7)]);
        write_fc(&dir.path().join("s_bc02_unpaired.table"), &[("g1", 1)]);

        let merged = merge_timepoint(dir.path())?.expect("merged table");
        assert_eq!(merged.headers, vec!["Geneid", "bc01", "bc02"]);

        let rows: HashMap<&str, &Vec<String>> =
            merged.rows.iter().map(|r| (r[0].as_str(), r)).collect();
        // paired + unpaired summed per barcode
        assert_eq!(rows["g1"][1], "8");
        assert_eq!(rows["g1"][2], "1");
        // outer fill with 0
        assert_eq!(rows["g2"][2], "0");
        assert_eq!(rows["g3"][1], "0");
        Ok(())
    }

    #[test]
    fn test_merge_timepoint_requires_both_groups() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        write_fc(&dir.path().join("s_bc01_paired.table"), &[("g1", 5)]);
        assert!(merge_timepoint(dir.path())?.is_none());
        Ok(())
    }
}
