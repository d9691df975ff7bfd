use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;

use crate::config::defs::{
    barcode_names, tp_columns, PipelineError, RunConfig, TSS_PLOT_WINDOW,
};
use crate::utils::file::list_files_matching_all;
use crate::utils::plotting::bar_chart;
use crate::utils::sam::SamAlignment;
use crate::utils::table::{parse_f64, Table};

pub const TSS_PLOT_DIR: &str = "tss_positions";

lazy_static! {
    static ref BED_NAME_RE: Regex =
        Regex::new(r"read_starts_relative_position_(bc\d{2})_eColi_(tp\d{1,2})\.bed").unwrap();
}

/// Sums the `count` column per relative position for one chromosome of a
/// read-starts BED table.
pub fn read_start_histogram(path: &Path, chrom: &str) -> Result<Vec<(i64, f64)>, PipelineError> {
    let table = Table::read(path, b'\t')?;
    let chrom_col = table.require_column("chrom", path)?;
    let pos_col = table.require_column("rel_pos", path)?;
    let count_col = table.require_column("count", path)?;

    let mut histogram: BTreeMap<i64, f64> = BTreeMap::new();
    for row in &table.rows {
        if row.get(chrom_col).map(String::as_str) != Some(chrom) {
            continue;
        }
        let Some(pos) = row.get(pos_col).and_then(|c| c.parse::<i64>().ok()) else { continue };
        let count = row.get(count_col).and_then(|c| parse_f64(c)).unwrap_or(0.0);
        *histogram.entry(pos).or_insert(0.0) += count;
    }
    Ok(histogram.into_iter().collect())
}

pub fn tss_plot_name(bc: &str, tp: &str, chrom: &str) -> String {
    format!("read_start_{}_{}_{}.png", bc, tp, chrom)
}

pub async fn plot_tss_run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let in_dir = config
        .args
        .in_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("plot_tss requires --in-dir".to_string()))?;

    let plot_dir = config.out_dir.join(TSS_PLOT_DIR);
    std::fs::create_dir_all(&plot_dir)?;

    let mut plotted = 0usize;
    for entry in std::fs::read_dir(&in_dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(caps) = BED_NAME_RE.captures(&name) else { continue };
        let (bc, tp) = (caps[1].to_string(), caps[2].to_string());

        for chrom in &config.args.chroms {
            let histogram = read_start_histogram(&path, chrom)?;
            let out = plot_dir.join(tss_plot_name(&bc, &tp, chrom));
            let title = format!("Read starts around TSS: {} ({} {})", chrom, bc, tp);
            match bar_chart(
                &histogram,
                &title,
                "Position relative to TSS",
                "Read count",
                (-TSS_PLOT_WINDOW, TSS_PLOT_WINDOW),
                None,
                &out,
            ) {
                Ok(()) => {
                    plotted += 1;
                    info!("Wrote {:?}", out);
                }
                Err(e) => warn!("Skipping {} for {} {}: {}", chrom, bc, tp, e),
            }
        }
    }
    info!("Wrote {} TSS plots to {:?}", plotted, plot_dir);
    Ok(())
}

// ---- internal standards ----

/// Start-position counts per reference from one spike-in SAM.
pub fn sam_start_counts(path: &Path) -> Result<HashMap<String, BTreeMap<i64, u64>>, PipelineError> {
    let reader = BufReader::new(File::open(path)?);
    let mut counts: HashMap<String, BTreeMap<i64, u64>> = HashMap::new();
    for line in reader.lines() {
        let line = line?;
        let Some(aln) = SamAlignment::parse(&line, 11) else { continue };
        let Some(pos) = aln.pos() else { continue };
        *counts
            .entry(aln.rname().to_string())
            .or_default()
            .entry(pos)
            .or_insert(0) += 1;
    }
    Ok(counts)
}

/// A reference has a majority start when more than a fifth of its reads begin
/// at position 1.
pub fn has_majority_start(histogram: &BTreeMap<i64, u64>) -> bool {
    let total: u64 = histogram.values().sum();
    if total == 0 {
        return false;
    }
    let first = histogram.get(&1).copied().unwrap_or(0);
    (first as f64) > (total as f64) / 5.0
}

/// Merges start-position counts per reference across all matched SAM files
/// for one barcode/timepoint.
pub fn aggregate_start_counts(
    files: &[PathBuf],
) -> Result<HashMap<String, BTreeMap<i64, u64>>, PipelineError> {
    let mut merged: HashMap<String, BTreeMap<i64, u64>> = HashMap::new();
    for sam in files {
        for (rname, histogram) in sam_start_counts(sam)? {
            let entry = merged.entry(rname).or_default();
            for (pos, count) in histogram {
                *entry.entry(pos).or_insert(0) += count;
            }
        }
    }
    Ok(merged)
}

pub async fn internal_standards_run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let in_dir = config
        .args
        .in_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| {
            PipelineError::InvalidConfig("plot_internal_standards requires --in-dir".to_string())
        })?;

    for tp in tp_columns(config.args.timepoints) {
        let tp_pattern = format!("{}_", tp);
        for bc in barcode_names(config.args.barcodes) {
            let files: Vec<PathBuf> = list_files_matching_all(&in_dir, &[&bc, &tp_pattern, "spike"])?
                .into_iter()
                .filter(|p| p.extension().map(|e| e == "sam").unwrap_or(false))
                .collect();
            if files.is_empty() {
                continue;
            }

            let plot_dir = in_dir.join(&tp).join(&bc);
            std::fs::create_dir_all(&plot_dir)?;

            let per_ref = aggregate_start_counts(&files)?;
            for (rname, histogram) in &per_ref {
                let Some((&min_pos, _)) = histogram.first_key_value() else { continue };
                let Some((&max_pos, _)) = histogram.last_key_value() else { continue };

                let bars: Vec<(i64, f64)> =
                    histogram.iter().map(|(&p, &c)| (p, c as f64)).collect();
                let name = if has_majority_start(histogram) {
                    format!("{}_tss_majority.png", rname)
                } else {
                    format!("{}_tss.png", rname)
                };
                let out = plot_dir.join(name);
                let title = format!("{} read starts ({} {})", rname, bc, tp);
                match bar_chart(
                    &bars,
                    &title,
                    "Alignment start position",
                    "Read count",
                    (min_pos, max_pos),
                    None,
                    &out,
                ) {
                    Ok(()) => info!("Wrote {:?}", out),
                    Err(e) => warn!("Skipping {} for {} {}: {}", rname, bc, tp, e),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn test_read_start_histogram_sums_per_chrom() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        let path = dir
            .path()
            .join("read_starts_relative_position_bc01_eColi_tp1.bed");
        std::fs::write(
            &path,
            "chrom\tstart\tend\trel_pos\tcount\tstrand\n\
             NC_000913.3\t10\t11\t-2\t4\t+\n\
             NC_000913.3\t99\t100\t-2\t1\t+\n\
             puc19C\t5\t6\t0\t9\t-\n",
        )?;
        let histogram = read_start_histogram(&path, "NC_000913.3")?;
        assert_eq!(histogram, vec![(-2, 5.0)]);
        Ok(())
    }

    #[test]
    fn test_bed_name_regex() {
        assert!(BED_NAME_RE.is_match("read_starts_relative_position_bc03_eColi_tp12.bed"));
        assert!(!BED_NAME_RE.is_match("read_starts_bc03_tp12.bed"));
    }

    #[test]
    fn test_sam_start_counts_groups_by_reference() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        let sam = dir.path().join("bc01_eColi_tp1_spikeIn.sam");
        let mut file = File::create(&sam)?;
        writeln!(file, "@SQ\tSN:spike1\tLN:100")?;
        for _ in 0..3 {
            writeln!(file, "r\t0\tspike1\t1\t60\t4M\t*\t0\t0\tACGT\tIIII")?;
        }
        writeln!(file, "r\t0\tspike1\t9\t60\t4M\t*\t0\t0\tACGT\tIIII")?;
        writeln!(file, "r\t0\tspike2\t5\t60\t4M\t*\t0\t0\tACGT\tIIII")?;

        let counts = sam_start_counts(&sam)?;
        assert_eq!(counts["spike1"][&1], 3);
        assert_eq!(counts["spike1"][&9], 1);
        assert_eq!(counts["spike2"][&5], 1);
        Ok(())
    }

    #[test]
    fn test_has_majority_start() {
        let mut histogram = BTreeMap::new();
        histogram.insert(1i64, 3u64);
        histogram.insert(9, 1);
        // 3 of 4 reads start at position 1
        assert!(has_majority_start(&histogram));

        let mut spread = BTreeMap::new();
        for p in 1..=10 {
            spread.insert(p as i64, 1u64);
        }
        assert!(!has_majority_start(&spread));

        // Position 1 specifically, not the first observed position
        let mut offset = BTreeMap::new();
        offset.insert(7i64, 10u64);
        assert!(!has_majority_start(&offset));
    }

    #[test]
    fn test_aggregate_start_counts_sums_across_files() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        let first = dir.path().join("bc01_eColi_tp1_spikeIn_a.sam");
        let mut file = File::create(&first)?;
        writeln!(file, "r\t0\tspike1\t1\t60\t4M\t*\t0\t0\tACGT\tIIII")?;
        writeln!(file, "r\t0\tspike1\t1\t60\t4M\t*\t0\t0\tACGT\tIIII")?;
        let second = dir.path().join("bc01_eColi_tp1_spikeIn_b.sam");
        let mut file = File::create(&second)?;
        writeln!(file, "r\t0\tspike1\t1\t60\t4M\t*\t0\t0\tACGT\tIIII")?;
        writeln!(file, "r\t0\tspike1\t9\t60\t4M\t*\t0\t0\tACGT\tIIII")?;

        let merged = aggregate_start_counts(&[first, second])?;
        assert_eq!(merged["spike1"][&1], 3);
        assert_eq!(merged["spike1"][&9], 1);
        Ok(())
    }

    #[test]
    fn test_tss_plot_name() {
        assert_eq!(
            tss_plot_name("bc01", "tp1", "NC_000913.3"),
            "read_start_bc01_tp1_NC_000913.3.png"
        );
    }
}
