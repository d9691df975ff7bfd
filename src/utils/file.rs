use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

/// Checks the leading magic bytes of a file for the gzip signature.
pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]),
        // Shorter than two bytes cannot be gzip
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(GzDecoder<File>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

/// Opens a file for reading, transparently decompressing gzip.
pub fn open_maybe_gzipped(path: &Path) -> io::Result<FileReader> {
    let is_gz = is_gzipped(path)?;
    let file = File::open(path)?;
    if is_gz {
        Ok(FileReader::Gzipped(GzDecoder::new(file)))
    } else {
        Ok(FileReader::Uncompressed(BufReader::new(file)))
    }
}

/// Lists regular files in `dir` whose names contain `pattern`, sorted by name.
///
/// # Arguments
///
/// * `dir` - Directory to scan (not recursive).
/// * `pattern` - Substring that must occur in the file name; empty matches all.
///
/// # Returns
/// Sorted Vec of matching paths.
pub fn list_files_matching(dir: &Path, pattern: &str) -> io::Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if pattern.is_empty() || name.contains(pattern) {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}

/// Lists files whose names contain every one of `patterns`, in order of appearance
/// in the name. Used for the loose globs of the original workflow
/// (e.g. `bc01*tp1_*spike*.sam`).
pub fn list_files_matching_all(dir: &Path, patterns: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let mut rest: &str = &name;
        let mut ok = true;
        for pat in patterns {
            match rest.find(pat) {
                Some(idx) => rest = &rest[idx + pat.len()..],
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}

/// Replaces `from` with `to` in the file name of `path`, e.g. to derive the
/// trimmed-output name of a FASTQ. Returns None when `from` is absent.
pub fn sibling_with_replaced(path: &Path, from: &str, to: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy();
    if !name.contains(from) {
        return None;
    }
    let new_name = name.replace(from, to);
    Some(path.with_file_name(new_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_is_gzipped_plain_text() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("plain.txt");
        File::create(&path)?.write_all(b"hello")?;
        assert!(!is_gzipped(&path)?);
        Ok(())
    }

    #[test]
    fn test_list_files_matching_all_ordered() -> io::Result<()> {
        let dir = tempdir()?;
        for name in ["bc01_eColi_tp1_spikeIn.sam", "bc01_eColi_tp12_spikeIn.sam", "other.sam"] {
            File::create(dir.path().join(name))?;
        }
        let found = list_files_matching_all(dir.path(), &["bc01", "tp1_", "spike"])?;
        assert_eq!(found.len(), 1);
        assert!(found[0].to_string_lossy().contains("tp1_spikeIn"));
        Ok(())
    }

    #[test]
    fn test_sibling_with_replaced() {
        let path = PathBuf::from("/data/s1_R1_001.fastq");
        let out = sibling_with_replaced(&path, "R1_001", "R1_001_trimmed").unwrap();
        assert_eq!(out, PathBuf::from("/data/s1_R1_001_trimmed.fastq"));
        assert!(sibling_with_replaced(&path, "R2_001", "x").is_none());
    }
}
