use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use lazy_static::lazy_static;
use log::{info, warn};
use rayon::prelude::*;
use regex::bytes::Regex;
use seq_io::fastq::Record;

use crate::config::defs::{
    PipelineError, RunConfig, FASTQ_WRITE_BUFFER_RECORDS, R1_TAG, R2_TAG, TRIMMED_SUFFIX,
};
use crate::utils::fastq::{write_fastq_record, PairedFastqReader};
use crate::utils::file::{list_files_matching, sibling_with_replaced};

lazy_static! {
    /// 5' adapter: a run of leading G or N bases on the forward read.
    static ref FORWARD_5PRIME: Regex = Regex::new(r"^[GN]*").unwrap();
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TrimStats {
    pub total_reads: u64,
    pub trimmed_5prime: u64,
    pub short_reads: u64,
    pub total_insert_length: u64,
}

impl TrimStats {
    pub fn mean_insert_length(&self) -> f64 {
        if self.total_reads == 0 {
            return 0.0;
        }
        self.total_insert_length as f64 / self.total_reads as f64
    }

    pub fn percent_trimmed(&self) -> f64 {
        if self.total_reads == 0 {
            return 0.0;
        }
        self.trimmed_5prime as f64 / self.total_reads as f64 * 100.0
    }

    pub fn percent_short(&self) -> f64 {
        if self.total_reads == 0 {
            return 0.0;
        }
        self.short_reads as f64 / self.total_reads as f64 * 100.0
    }
}

/// One R1/R2 pair discovered in the input directory.
#[derive(Debug, Clone)]
pub struct FastqPair {
    pub label: String,
    pub forward: PathBuf,
    pub reverse: PathBuf,
}

/// Finds R1 files and their R2 siblings; R1 files without a matching R2 are
/// reported and skipped.
pub fn discover_pairs(dir: &Path) -> Result<Vec<FastqPair>, PipelineError> {
    let mut pairs = Vec::new();
    for forward in list_files_matching(dir, R1_TAG)? {
        let reverse = match sibling_with_replaced(&forward, R1_TAG, R2_TAG) {
            Some(path) if path.exists() => path,
            _ => {
                warn!("No {} mate for {:?}; skipping pair", R2_TAG, forward);
                continue;
            }
        };
        let label = forward
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| forward.display().to_string());
        pairs.push(FastqPair { label, forward, reverse });
    }
    Ok(pairs)
}

/// Strips the matched 5' prefix from sequence and quality alike.
/// The pattern can match zero bytes, in which case the read is untouched.
pub fn trim_record(seq: &[u8], qual: &[u8]) -> (Vec<u8>, Vec<u8>, usize) {
    let end = FORWARD_5PRIME
        .find(seq)
        .map(|m| m.end())
        .unwrap_or(0)
        .min(qual.len());
    (seq[end..].to_vec(), qual[end..].to_vec(), end)
}

/// Trims one pair of FASTQ files, writing `*_trimmed` siblings.
/// Records are buffered and flushed in blocks to keep per-read syscalls down.
pub fn trim_pair(
    pair: &FastqPair,
    out_dir: Option<&Path>,
    min_insert_len: usize,
) -> Result<TrimStats, PipelineError> {
    let out_forward = output_path(&pair.forward, R1_TAG, out_dir)?;
    let out_reverse = output_path(&pair.reverse, R2_TAG, out_dir)?;

    let mut reader = PairedFastqReader::open(&pair.forward, &pair.reverse)?;
    let mut forward_out = BufWriter::new(File::create(&out_forward)?);
    let mut reverse_out = BufWriter::new(File::create(&out_reverse)?);

    let mut stats = TrimStats::default();
    let mut forward_buffer: Vec<u8> = Vec::new();
    let mut reverse_buffer: Vec<u8> = Vec::new();
    let mut buffered_records = 0usize;

    while let Some((fwd, rev)) = reader.next_pair() {
        stats.total_reads += 1;

        let (seq, qual, cut) = trim_record(fwd.seq(), fwd.qual());
        if cut > 0 {
            stats.trimmed_5prime += 1;
        }
        if seq.len() < min_insert_len {
            stats.short_reads += 1;
        }
        stats.total_insert_length += seq.len() as u64;

        write_fastq_record(&mut forward_buffer, fwd.head(), &seq, &qual)?;
        write_fastq_record(&mut reverse_buffer, rev.head(), rev.seq(), rev.qual())?;
        buffered_records += 1;

        if buffered_records >= FASTQ_WRITE_BUFFER_RECORDS {
            forward_out.write_all(&forward_buffer)?;
            reverse_out.write_all(&reverse_buffer)?;
            forward_buffer.clear();
            reverse_buffer.clear();
            buffered_records = 0;
        }
    }

    if !forward_buffer.is_empty() {
        forward_out.write_all(&forward_buffer)?;
        reverse_out.write_all(&reverse_buffer)?;
    }
    forward_out.flush()?;
    reverse_out.flush()?;

    Ok(stats)
}

fn output_path(input: &Path, tag: &str, out_dir: Option<&Path>) -> Result<PathBuf, PipelineError> {
    let renamed = sibling_with_replaced(input, tag, &format!("{}{}", tag, TRIMMED_SUFFIX))
        .ok_or_else(|| {
            PipelineError::InvalidConfig(format!("Input {:?} lacks the {} tag", input, tag))
        })?;
    match out_dir {
        Some(dir) => {
            let name = renamed
                .file_name()
                .ok_or_else(|| PipelineError::IOError(format!("Bad file name: {:?}", renamed)))?;
            Ok(dir.join(name))
        }
        None => Ok(renamed),
    }
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let in_dir = config
        .args
        .in_dir
        .as_ref()
        .ok_or_else(|| PipelineError::InvalidConfig("trim requires --in-dir".to_string()))?;
    let in_dir = PathBuf::from(in_dir);

    let pairs = discover_pairs(&in_dir)?;
    if pairs.is_empty() {
        return Err(PipelineError::Other(anyhow!(
            "No {}/{} FASTQ pairs found in {:?}",
            R1_TAG,
            R2_TAG,
            in_dir
        )));
    }
    info!("Trimming {} FASTQ pairs from {:?}", pairs.len(), in_dir);

    let out_dir = config.args.out_dir.as_ref().map(PathBuf::from);
    let min_insert_len = config.args.min_insert_len;

    // One task per barcode pair; each owns its own file handles.
    let results: Vec<(String, Result<TrimStats, PipelineError>)> = config.thread_pool.install(|| {
        pairs
            .par_iter()
            .map(|pair| {
                let stats = trim_pair(pair, out_dir.as_deref(), min_insert_len);
                (pair.label.clone(), stats)
            })
            .collect()
    });

    let mut failures = 0;
    for (label, result) in results {
        match result {
            Ok(stats) => {
                info!("{} forward insert average length: {:.2}", label, stats.mean_insert_length());
                info!(
                    "{} percentage of forward reads trimmed by 5 prime adapter: {:.2}%",
                    label,
                    stats.percent_trimmed()
                );
                info!(
                    "{} percentage short (shorter than {} bp): {:.2}%",
                    label,
                    min_insert_len,
                    stats.percent_short()
                );
            }
            Err(e) => {
                warn!("{} failed: {}", label, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(PipelineError::Other(anyhow!("{} pair(s) failed to trim", failures)));
    }
    Ok(())
}
