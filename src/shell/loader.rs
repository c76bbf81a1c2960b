use std::path::Path;

use csv::{ReaderBuilder, Trim};
use log::{debug, warn};

use crate::btree::BPlusKey;

use super::error::ShellResult;

/// Read integer keys from one column of a CSV file
///
/// Rows whose cell is missing or not an integer (a header, for instance)
/// are skipped.
pub fn load_keys<P: AsRef<Path>>(path: P, column: usize) -> ShellResult<Vec<BPlusKey>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // Allow varying number of fields per row
        .trim(Trim::All)
        .from_path(path)?;

    let mut keys = Vec::new();
    let mut skipped = 0;

    for result in reader.records() {
        let record = result?;

        match record.get(column).map(|field| field.parse::<BPlusKey>()) {
            Some(Ok(key)) => keys.push(key),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(
            "{}: skipped {skipped} rows without an integer in column {column}",
            path.display()
        );
    }
    debug!("{}: read {} keys", path.display(), keys.len());

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_first_column_with_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.csv");
        fs::write(&path, "id,name\n10,a\n-3,b\n 7 ,c\n").unwrap();

        let keys = load_keys(&path, 0).unwrap();
        assert_eq!(keys, vec![10, -3, 7]);
    }

    #[test]
    fn test_load_other_column_skips_bad_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys.csv");
        fs::write(&path, "a,1\nb\nc,x\nd,4\n").unwrap();

        let keys = load_keys(&path, 1).unwrap();
        assert_eq!(keys, vec![1, 4]);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_keys(temp_dir.path().join("nope.csv"), 0).is_err());
    }
}
