//! Excluded-code ("Xcode") list: Allele Codes whose within-cluster distance
//! exceeds the organism's outlier tolerance are tagged with a trailing `x`
//! rather than ever driving further placement decisions.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// A loaded list of dot-separated code prefixes to flag.
pub struct XcodeList {
    entries: Vec<Vec<i64>>,
}

impl XcodeList {
    pub fn empty() -> Self {
        XcodeList { entries: Vec::new() }
    }

    /// Loads the tab-delimited Xcodes file, if present; a missing file is
    /// not an error, it just means no codes are excluded this run.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let contents = fs::read_to_string(path)?;
        let mut lines: Vec<&str> = contents.lines().filter(|l| !l.is_empty()).collect();

        // A header row has no dot in its first field; the original
        // detects and discards it the same way.
        if let Some(first) = lines.first() {
            let first_field = first.split('\t').next().unwrap_or("");
            if !first_field.contains('.') {
                lines.remove(0);
            }
        }

        let entries = lines
            .iter()
            .filter_map(|line| {
                let prefix = line.split('\t').next()?;
                parse_digits(prefix)
            })
            .collect();

        Ok(XcodeList { entries })
    }

    /// Returns the matching Xcode prefix (truncated to its own length) if
    /// `digits` begins with one of the excluded prefixes.
    pub fn matching_prefix(&self, digits: &[i64]) -> Option<Vec<i64>> {
        self.entries.iter().find(|entry| digits.len() >= entry.len() && digits[..entry.len()] == entry[..]).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_digits(s: &str) -> Option<Vec<i64>> {
    s.split('.').map(|part| part.trim().parse::<i64>().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn strips_header_row_when_first_field_has_no_dot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Xcodes.tsv");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "Code\tReason").unwrap();
        writeln!(f, "1.2\toutlier").unwrap();
        drop(f);

        let list = XcodeList::load(&path).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.matching_prefix(&[1, 2, 3]), Some(vec![1, 2]));
    }

    #[test]
    fn no_header_row_when_first_field_has_a_dot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Xcodes.tsv");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "1.2\toutlier").unwrap();
        drop(f);

        let list = XcodeList::load(&path).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn missing_file_is_an_empty_list() {
        let list = XcodeList::load(Path::new("/nonexistent/Xcodes.tsv")).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn shorter_code_than_prefix_does_not_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Xcodes.tsv");
        fs::write(&path, "1.2.3\n").unwrap();
        let list = XcodeList::load(&path).unwrap();
        assert_eq!(list.matching_prefix(&[1, 2]), None);
    }
}
