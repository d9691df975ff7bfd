use seq_io::fastq::{OwnedRecord, Reader, RefRecord};
use std::io::{self, Write};
use std::path::Path;

use crate::utils::file::{open_maybe_gzipped, FileReader};

/// Opens a FASTQ file, transparently decompressing gzip.
pub fn fastq_reader(path: &Path) -> io::Result<Reader<FileReader>> {
    Ok(Reader::new(open_maybe_gzipped(path)?))
}

/// Writes one 4-line FASTQ record.
pub fn write_fastq_record<W: Write>(
    writer: &mut W,
    head: &[u8],
    seq: &[u8],
    qual: &[u8],
) -> io::Result<()> {
    writer.write_all(b"@")?;
    writer.write_all(head)?;
    writer.write_all(b"\n")?;
    writer.write_all(seq)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Reads two FASTQ files in lockstep, one record pair at a time.
/// Iteration ends at the first truncated or exhausted side, matching the
/// 4-line-block semantics of the format.
pub struct PairedFastqReader {
    forward: Reader<FileReader>,
    reverse: Reader<FileReader>,
}

impl PairedFastqReader {
    pub fn open(forward_path: &Path, reverse_path: &Path) -> io::Result<Self> {
        Ok(PairedFastqReader {
            forward: fastq_reader(forward_path)?,
            reverse: fastq_reader(reverse_path)?,
        })
    }

    /// Returns the next (forward, reverse) pair, or None when either file ends.
    pub fn next_pair(&mut self) -> Option<(OwnedRecord, OwnedRecord)> {
        let fwd = match self.forward.next() {
            Some(Ok(rec)) => to_owned(rec),
            _ => return None,
        };
        let rev = match self.reverse.next() {
            Some(Ok(rec)) => to_owned(rec),
            _ => return None,
        };
        Some((fwd, rev))
    }
}

fn to_owned(rec: RefRecord<'_>) -> OwnedRecord {
    use seq_io::fastq::Record;
    rec.to_owned_record()
}
