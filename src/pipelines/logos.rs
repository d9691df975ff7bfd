use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use seq_io::fasta::Record;

use crate::config::defs::{
    PipelineError, RunConfig, LOGO_WINDOW_END, LOGO_WINDOW_START, WEBLOGO_TAG,
};
use crate::utils::command::{check_version, run_tool, weblogo};
use crate::utils::file::{list_files_matching, open_maybe_gzipped};

lazy_static! {
    /// TSS site headers look like `17::NC_000913.3:4035531-4035576(+)`.
    static ref SITE_HEADER_RE: Regex =
        Regex::new(r"^(\d+)::(\S+):(\d+)-(\d+)\(([+-])\)").unwrap();
}

/// One TSS window sequence with its read support.
#[derive(Debug, PartialEq)]
pub struct LogoSite {
    pub count: u64,
    pub chrom: String,
    pub seq: Vec<u8>,
}

pub fn parse_site_header(head: &str) -> Option<(u64, String)> {
    let caps = SITE_HEADER_RE.captures(head)?;
    let count = caps[1].parse().ok()?;
    Some((count, caps[2].to_string()))
}

/// Reads a TSS-window FASTA and groups its sites per chromosome.
pub fn load_sites(path: &Path) -> Result<BTreeMap<String, Vec<LogoSite>>, PipelineError> {
    let mut reader = seq_io::fasta::Reader::new(open_maybe_gzipped(path)?);
    let mut sites: BTreeMap<String, Vec<LogoSite>> = BTreeMap::new();

    while let Some(result) = reader.next() {
        let record = result.map_err(|e| PipelineError::Other(anyhow!(e)))?;
        let head = String::from_utf8_lossy(record.head()).into_owned();
        let Some((count, chrom)) = parse_site_header(&head) else {
            warn!("Skipping unparseable FASTA header in {:?}: {}", path, head);
            continue;
        };
        let seq = record
            .full_seq()
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        sites
            .entry(chrom.clone())
            .or_default()
            .push(LogoSite { count, chrom, seq });
    }
    Ok(sites)
}

/// Replicates each site's sequence by its read count so the logo weighs
/// positions by coverage.
pub fn write_weighted_fasta<W: Write>(writer: &mut W, sites: &[LogoSite]) -> std::io::Result<u64> {
    let mut written = 0u64;
    for site in sites {
        for _ in 0..site.count {
            written += 1;
            writeln!(writer, ">site_{}", written)?;
            writer.write_all(&site.seq)?;
            writeln!(writer)?;
        }
    }
    Ok(written)
}

/// Number of bases a full TSS window spans (positions -40..-1 and +1..+5).
pub fn expected_window_len() -> usize {
    ((-LOGO_WINDOW_START) + LOGO_WINDOW_END + 1) as usize
}

/// Position labels for a full window, skipping 0 as genomic convention does.
pub fn annotate_labels() -> String {
    let labels: Vec<String> = (LOGO_WINDOW_START..=(LOGO_WINDOW_END + 1))
        .filter(|i| *i != 0)
        .map(|i| if i > 0 { format!("+{}", i) } else { i.to_string() })
        .collect();
    labels.join(",")
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let in_dir = config
        .args
        .in_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("logos requires --in-dir".to_string()))?;
    // ".fa" also matches ".fasta" as a substring
    let pattern = config.args.pattern.clone().unwrap_or_else(|| ".fa".to_string());

    let version = check_version(WEBLOGO_TAG)
        .await
        .map_err(|e| PipelineError::Other(anyhow!(e)))?;
    info!("Using weblogo {}", version);

    let fasta_files = list_files_matching(&in_dir, &pattern)?;
    if fasta_files.is_empty() {
        warn!("No FASTA files matching '{}' in {:?}", pattern, in_dir);
        return Ok(());
    }

    for fasta in &fasta_files {
        let sample = fasta
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample".to_string());
        let sites = load_sites(fasta)?;
        if sites.is_empty() {
            warn!("{:?} holds no usable TSS sites", fasta);
            continue;
        }

        for (chrom, chrom_sites) in &sites {
            let mut weighted = tempfile::Builder::new()
                .prefix("weighted_")
                .suffix(".fasta")
                .tempfile()?;
            let total = write_weighted_fasta(&mut weighted, chrom_sites)?;
            weighted.flush()?;

            let full_window = chrom_sites
                .iter()
                .all(|s| s.seq.len() == expected_window_len());
            let labels;
            let annotate = if full_window {
                labels = annotate_labels();
                Some(labels.as_str())
            } else {
                warn!(
                    "{} {}: sequences are not all {} bp, falling back to --first-index",
                    sample,
                    chrom,
                    expected_window_len()
                );
                None
            };

            let out = config
                .out_dir
                .join(format!("{}_{}.{}", sample, chrom, config.args.logo_format));
            let args = weblogo::arg_generator(
                weighted.path(),
                &out,
                &config.args.logo_format,
                config.args.dpi,
                &format!("{} | {}", sample, chrom),
                annotate,
                LOGO_WINDOW_START,
            );
            run_tool(WEBLOGO_TAG, args).await?;
            info!("{} {}: logo from {} weighted sequences at {:?}", sample, chrom, total, out);
        }
    }
    Ok(())
}
