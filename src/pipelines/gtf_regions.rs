use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::config::defs::{PipelineError, RunConfig, INTERGENIC_FLANK};
use crate::utils::gtf::GtfRecord;

const TSS_SKIP_MEDIUM: i64 = 50;
const TSS_SKIP_LONG: i64 = 100;
const MEDIUM_GENE_MIN: i64 = 100;
const MEDIUM_GENE_MAX: i64 = 200;

/// Computes the variable 3' window for one gene feature.
///
/// tRNA/rRNA genes keep their full interval, as do short genes, with the
/// boundary differing per strand: up to 100 bp on the plus strand, under
/// 100 bp on the minus strand (a 100 bp minus-strand gene already gets the
/// skip-50 window). Longer genes drop 50 bp (length up to 200) or 100 bp
/// (length > 200) downstream of the TSS on the plus strand; on the minus
/// strand the window is anchored at the gene end with length
/// `skip + (end - start)`, so it can reach up to `skip - 1` bp upstream of
/// the original start.
pub fn three_prime_window(gene: &GtfRecord) -> (i64, i64) {
    let len = gene.length();
    let special = gene.has_biotype(&["tRNA", "rRNA"]);
    let skip = if len <= MEDIUM_GENE_MAX { TSS_SKIP_MEDIUM } else { TSS_SKIP_LONG };

    if gene.strand == "+" {
        if special || len <= MEDIUM_GENE_MIN {
            (gene.start, gene.end)
        } else {
            (gene.start + skip, gene.end)
        }
    } else {
        let window = if special || len < MEDIUM_GENE_MIN {
            len
        } else {
            skip + (gene.end - gene.start)
        };
        (gene.end - window + 1, gene.end)
    }
}

/// Extracts per-gene variable 3' windows from `--gtf`.
pub async fn three_prime_run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let gtf_path = required_gtf(&config)?;
    let out_path = derived_output(&gtf_path, &config.out_dir, "_variable_3prime.gtf");

    let reader = BufReader::new(File::open(&gtf_path)?);
    let mut writer = BufWriter::new(File::create(&out_path)?);
    let mut emitted = 0u64;

    for line in reader.lines() {
        let line = line?;
        let Some(mut rec) = GtfRecord::parse(&line) else { continue };
        if rec.feature != "gene" {
            continue;
        }
        let (start, end) = three_prime_window(&rec);
        rec.start = start;
        rec.end = end;
        writeln!(writer, "{}", rec.to_line())?;
        emitted += 1;
    }
    writer.flush()?;

    info!("Wrote {} 3' window features to {:?}", emitted, out_path);
    Ok(())
}

/// Computed intergenic interval for one gene, given its neighbours.
///
/// Plus strand: up to 100 bp upstream of the gene start, clipped at the
/// previous gene on the chromosome. Minus strand: up to 100 bp past the gene
/// end, clipped at the next gene.
pub fn intergenic_interval(
    gene: &GtfRecord,
    prev_end: i64,
    next_start: Option<i64>,
) -> (i64, i64) {
    if gene.strand == "+" {
        let start = if prev_end >= gene.start {
            // overlapping upstream gene
            gene.start
        } else {
            (gene.start - INTERGENIC_FLANK).max(prev_end + 1)
        };
        (start, gene.end)
    } else {
        let end = match next_start {
            None => gene.end + INTERGENIC_FLANK,
            Some(ns) => {
                let gap = ns - gene.end - 1;
                if gap <= 0 {
                    gene.end
                } else if gap <= INTERGENIC_FLANK {
                    ns - 1
                } else {
                    gene.end + INTERGENIC_FLANK
                }
            }
        };
        (gene.start, end)
    }
}

/// Emits one `intergenic` feature per gene, preserving the original fields.
pub async fn intergenic_run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let gtf_path = required_gtf(&config)?;
    let out_path = derived_output(&gtf_path, &config.out_dir, "_intergenic.gtf");

    let mut header_lines = Vec::new();
    let mut genes: Vec<GtfRecord> = Vec::new();
    let reader = BufReader::new(File::open(&gtf_path)?);
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') {
            header_lines.push(line);
            continue;
        }
        if let Some(rec) = GtfRecord::parse(&line) {
            if rec.feature == "gene" {
                genes.push(rec);
            }
        }
    }

    genes.sort_by(|a, b| (a.chrom.as_str(), a.start).cmp(&(b.chrom.as_str(), b.start)));

    // Start coordinate of the next gene on the same chromosome, per gene index.
    let mut next_start: Vec<Option<i64>> = vec![None; genes.len()];
    for i in 0..genes.len() {
        if i + 1 < genes.len() && genes[i + 1].chrom == genes[i].chrom {
            next_start[i] = Some(genes[i + 1].start);
        }
    }

    let mut writer = BufWriter::new(File::create(&out_path)?);
    for line in &header_lines {
        writeln!(writer, "{}", line)?;
    }

    let mut prev_end: HashMap<String, i64> = HashMap::new();
    for (i, gene) in genes.iter().enumerate() {
        let pe = prev_end.get(&gene.chrom).copied().unwrap_or(0);
        let (start, end) = intergenic_interval(gene, pe, next_start[i]);

        let mut out = gene.clone();
        out.feature = "intergenic".to_string();
        out.start = start;
        out.end = end;
        writeln!(writer, "{}", out.to_line())?;

        prev_end.insert(gene.chrom.clone(), gene.end);
    }
    writer.flush()?;

    info!("Wrote {} intergenic features to {:?}", genes.len(), out_path);
    Ok(())
}

fn required_gtf(config: &RunConfig) -> Result<PathBuf, PipelineError> {
    config
        .args
        .gtf
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("This module requires --gtf".to_string()))
}

fn derived_output(gtf_path: &Path, out_dir: &Path, suffix: &str) -> PathBuf {
    let stem = gtf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "annotation".to_string());
    out_dir.join(format!("{}{}", stem, suffix))
}
