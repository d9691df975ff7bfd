use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::config::defs::{PipelineError, RunConfig};
use crate::utils::file::list_files_matching;
use crate::utils::sam::{is_header, SamAlignment};

/// Copies headers and the alignments whose SEQ begins with `first_base`.
/// Returns (alignments seen, alignments kept).
pub fn filter_sam_by_first_base(
    sam_path: &Path,
    out_path: &Path,
    first_base: char,
) -> Result<(u64, u64), PipelineError> {
    let reader = BufReader::new(File::open(sam_path)?);
    let mut writer = BufWriter::new(File::create(out_path)?);

    let mut seen = 0u64;
    let mut kept = 0u64;
    for line in reader.lines() {
        let line = line?;
        if is_header(&line) {
            writeln!(writer, "{}", line)?;
            continue;
        }
        let Some(aln) = SamAlignment::parse(&line, 11) else { continue };
        seen += 1;
        if aln.seq().map(|s| s.starts_with(first_base)).unwrap_or(false) {
            writeln!(writer, "{}", line)?;
            kept += 1;
        }
    }
    writer.flush()?;
    Ok((seen, kept))
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let in_dir = config
        .args
        .in_dir
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig("filter_sam requires --in-dir".to_string()))?;
    let pattern = config.args.pattern.clone().unwrap_or_else(|| ".sam".to_string());
    let first_base = config.args.first_base;

    let sam_files: Vec<PathBuf> = list_files_matching(&in_dir, &pattern)?
        .into_iter()
        .filter(|p| p.extension().map(|e| e == "sam").unwrap_or(false))
        .collect();
    info!("Found {} SAM files matching '{}'", sam_files.len(), pattern);

    for sam in &sam_files {
        let name = sam
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out_name = name.replace(".sam", &format!(".{}start.sam", first_base));
        let out_path = config.out_dir.join(out_name);

        let (seen, kept) = filter_sam_by_first_base(sam, &out_path, first_base)?;
        info!("{}: kept {}/{} alignments starting with '{}'", name, kept, seen, first_base);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[test]
    fn test_filter_keeps_headers_and_a_starts() -> Result<(), PipelineError> {
        let dir = tempdir()?;
        let sam = dir.path().join("sample.sam");
        let mut file = File::create(&sam)?;
        writeln!(file, "@HD\tVN:1.6")?;
        writeln!(file, "@SQ\tSN:NC_000913.3\tLN:4641652")?;
        writeln!(file, "r1\t0\tNC_000913.3\t10\t60\t4M\t*\t0\t0\tACGT\tIIII")?;
        writeln!(file, "r2\t0\tNC_000913.3\t20\t60\t4M\t*\t0\t0\tGCGT\tIIII")?;
        writeln!(file, "short\tmalformed")?;

        let out = dir.path().join("sample.Astart.sam");
        let (seen, kept) = filter_sam_by_first_base(&sam, &out, 'A')?;
        assert_eq!(seen, 2);
        assert_eq!(kept, 1);

        let text = std::fs::read_to_string(&out)?;
        assert!(text.starts_with("@HD"));
        assert!(text.contains("\tACGT\t"));
        assert!(!text.contains("\tGCGT\t"));
        Ok(())
    }
}
