use std::collections::HashMap;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::config::defs::PipelineError;

/// A small in-memory table: ordered header plus string cells.
/// Stands in for the DataFrame operations the pipelines need (column lookup,
/// key-based outer merge, numeric column math) without pulling in a frame
/// library for what are flat CSV/TSV files.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Table {
        Table { headers, rows: Vec::new() }
    }

    /// Reads a delimited file with a header row. Lines starting with `#` are
    /// treated as comments (featureCounts emits one above its header).
    pub fn read(path: &Path, delimiter: u8) -> Result<Table, PipelineError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .comment(Some(b'#'))
            .flexible(true)
            .from_path(path)?;

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }
        Ok(Table { headers, rows })
    }

    pub fn write(&self, path: &Path, delimiter: u8) -> Result<(), PipelineError> {
        let mut writer = WriterBuilder::new().delimiter(delimiter).from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush().map_err(|e| PipelineError::IOError(e.to_string()))?;
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Column lookup that fails with the file name, for required columns.
    pub fn require_column(&self, name: &str, file: &Path) -> Result<usize, PipelineError> {
        self.column_index(name).ok_or_else(|| PipelineError::MissingColumn {
            file: file.display().to_string(),
            column: name.to_string(),
        })
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows[row].get(col).map(String::as_str).unwrap_or("")
    }

    /// Parses one column as f64, erroring on the first non-numeric cell.
    pub fn numeric_column(&self, col: usize, file: &Path) -> Result<Vec<f64>, PipelineError> {
        self.rows
            .iter()
            .map(|row| {
                let cell = row.get(col).map(String::as_str).unwrap_or("");
                parse_f64(cell).ok_or_else(|| {
                    PipelineError::InvalidConfig(format!(
                        "Non-numeric value '{}' in column '{}' of {}",
                        cell,
                        self.headers.get(col).map(String::as_str).unwrap_or("?"),
                        file.display()
                    ))
                })
            })
            .collect()
    }

    /// Outer merge on a shared key column: one output row per key present in
    /// either table, `self` keys first in order, then new keys from `other`.
    /// Cells absent on one side are filled with `fill`.
    pub fn outer_merge(&self, other: &Table, key: &str, fill: &str) -> Result<Table, PipelineError> {
        let self_key = self.column_index(key).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("Merge key '{}' missing from left table", key))
        })?;
        let other_key = other.column_index(key).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("Merge key '{}' missing from right table", key))
        })?;

        let mut headers: Vec<String> = self.headers.clone();
        let other_cols: Vec<usize> = (0..other.headers.len()).filter(|&i| i != other_key).collect();
        for &i in &other_cols {
            headers.push(other.headers[i].clone());
        }

        let mut other_by_key: HashMap<&str, &Vec<String>> = HashMap::new();
        for row in &other.rows {
            other_by_key.insert(row[other_key].as_str(), row);
        }

        let mut merged = Table::new(headers);
        let mut seen: HashMap<String, ()> = HashMap::new();
        for row in &self.rows {
            let key_val = row[self_key].as_str();
            seen.insert(key_val.to_string(), ());
            let mut out = row.clone();
            match other_by_key.get(key_val) {
                Some(other_row) => {
                    for &i in &other_cols {
                        out.push(other_row.get(i).cloned().unwrap_or_else(|| fill.to_string()));
                    }
                }
                None => out.extend(other_cols.iter().map(|_| fill.to_string())),
            }
            merged.rows.push(out);
        }

        for row in &other.rows {
            let key_val = row[other_key].as_str();
            if seen.contains_key(key_val) {
                continue;
            }
            let mut out: Vec<String> = Vec::with_capacity(merged.headers.len());
            for i in 0..self.headers.len() {
                if i == self_key {
                    out.push(key_val.to_string());
                } else {
                    out.push(fill.to_string());
                }
            }
            for &i in &other_cols {
                out.push(row.get(i).cloned().unwrap_or_else(|| fill.to_string()));
            }
            merged.rows.push(out);
        }

        Ok(merged)
    }
}

pub fn parse_f64(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok()
}

/// Formats a float the way the tables expect: integral values without a
/// trailing `.0` would round-trip differently, so keep Rust's shortest repr.
pub fn fmt_f64(value: f64) -> String {
    format!("{}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_outer_merge_fills_missing_keys() {
        let left = table(&["Geneid", "bc01"], &[&["g1", "5"], &["g2", "7"]]);
        let right = table(&["Geneid", "bc02"], &[&["g2", "1"], &["g3", "9"]]);
        let merged = left.outer_merge(&right, "Geneid", "0").unwrap();

        assert_eq!(merged.headers, vec!["Geneid", "bc01", "bc02"]);
        assert_eq!(merged.rows.len(), 3);
        assert_eq!(merged.rows[0], vec!["g1", "5", "0"]);
        assert_eq!(merged.rows[1], vec!["g2", "7", "1"]);
        assert_eq!(merged.rows[2], vec!["g3", "0", "9"]);
    }

    #[test]
    fn test_merge_requires_key() {
        let left = table(&["a"], &[]);
        let right = table(&["b"], &[]);
        assert!(left.outer_merge(&right, "Geneid", "0").is_err());
    }

    #[test]
    fn test_read_write_round_trip() -> Result<(), PipelineError> {
        let dir = tempdir().map_err(|e| PipelineError::IOError(e.to_string()))?;
        let path = dir.path().join("counts.csv");
        let t = table(&["Geneid", "tp1"], &[&["g1", "3.5"]]);
        t.write(&path, b',')?;

        let back = Table::read(&path, b',')?;
        assert_eq!(back.headers, t.headers);
        assert_eq!(back.rows, t.rows);
        let col = back.require_column("tp1", &path)?;
        assert_eq!(back.numeric_column(col, &path)?, vec![3.5]);
        Ok(())
    }

    #[test]
    fn test_missing_column_error_names_file() {
        let t = table(&["Geneid"], &[]);
        let err = t.require_column("padj", Path::new("x.csv")).unwrap_err();
        assert!(err.to_string().contains("padj"));
        assert!(err.to_string().contains("x.csv"));
    }
}
