/// Line-oriented helpers for tab-separated SAM text.
/// Only the fields the pipelines read are exposed; everything else passes
/// through as raw lines.

pub fn is_header(line: &str) -> bool {
    line.starts_with('@')
}

/// Borrowed view of one alignment line.
pub struct SamAlignment<'a> {
    fields: Vec<&'a str>,
}

impl<'a> SamAlignment<'a> {
    /// Splits an alignment line, requiring at least `min_fields` columns.
    /// Header lines and short (malformed) lines yield None.
    pub fn parse(line: &'a str, min_fields: usize) -> Option<SamAlignment<'a>> {
        if is_header(line) {
            return None;
        }
        let fields: Vec<&str> = line.trim_end_matches('\n').split('\t').collect();
        if fields.len() < min_fields {
            return None;
        }
        Some(SamAlignment { fields })
    }

    /// Reference name (column 3).
    pub fn rname(&self) -> &str {
        self.fields[2]
    }

    /// 1-based alignment position (column 4).
    pub fn pos(&self) -> Option<i64> {
        self.fields[3].parse().ok()
    }

    /// Read sequence (column 10). None when the line has no SEQ field.
    pub fn seq(&self) -> Option<&str> {
        self.fields.get(9).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALIGNMENT: &str =
        "read1\t0\tNC_000913.3\t42\t60\t4M\t*\t0\t0\tACGT\tIIII";

    #[test]
    fn test_parse_alignment() {
        let aln = SamAlignment::parse(ALIGNMENT, 11).expect("valid alignment");
        assert_eq!(aln.rname(), "NC_000913.3");
        assert_eq!(aln.pos(), Some(42));
        assert_eq!(aln.seq(), Some("ACGT"));
    }

    #[test]
    fn test_headers_and_short_lines_rejected() {
        assert!(SamAlignment::parse("@HD\tVN:1.6", 4).is_none());
        assert!(SamAlignment::parse("read1\t0\tchr", 11).is_none());
    }
}
