use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ATTR_RE: Regex = Regex::new(r#"(\S+)\s+"([^"]+)""#).unwrap();
}

/// One row of a 9-column tab-separated GTF file.
/// Coordinates are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct GtfRecord {
    pub chrom: String,
    pub source: String,
    pub feature: String,
    pub start: i64,
    pub end: i64,
    pub score: String,
    pub strand: String,
    pub frame: String,
    pub attributes: String,
}

impl GtfRecord {
    /// Parses a GTF body line. Returns None for comments and malformed rows
    /// (fewer than 9 fields or non-numeric coordinates), which are skipped
    /// rather than treated as errors.
    pub fn parse(line: &str) -> Option<GtfRecord> {
        if line.starts_with('#') {
            return None;
        }
        let cols: Vec<&str> = line.trim_end_matches('\n').split('\t').collect();
        if cols.len() < 9 {
            return None;
        }
        let start: i64 = cols[3].parse().ok()?;
        let end: i64 = cols[4].parse().ok()?;
        Some(GtfRecord {
            chrom: cols[0].to_string(),
            source: cols[1].to_string(),
            feature: cols[2].to_string(),
            start,
            end,
            score: cols[5].to_string(),
            strand: cols[6].to_string(),
            frame: cols[7].to_string(),
            attributes: cols[8].to_string(),
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.source,
            self.feature,
            self.start,
            self.end,
            self.score,
            self.strand,
            self.frame,
            self.attributes
        )
    }

    /// Gene length in bp (inclusive coordinates).
    pub fn length(&self) -> i64 {
        self.end - self.start + 1
    }

    /// Looks up one attribute value, e.g. `gene_id`.
    pub fn attribute(&self, key: &str) -> Option<String> {
        for cap in ATTR_RE.captures_iter(&self.attributes) {
            if &cap[1] == key {
                return Some(cap[2].to_string());
            }
        }
        None
    }

    /// True when the record's transcript_biotype is one of `biotypes`.
    pub fn has_biotype(&self, biotypes: &[&str]) -> bool {
        match self.attribute("transcript_biotype") {
            Some(value) => biotypes.contains(&value.as_str()),
            None => false,
        }
    }
}
