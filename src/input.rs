//! Batch file and core-loci config parsing: converting the user-supplied
//! allele matrix (csv/tsv) and core loci list into the types the rest of
//! the crate works with.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{NomenclatureError, Result};
use crate::profile::{Key, Profile};

/// Loads the core loci names from a config file, keeping only lines that
/// begin with the organism's prefix string -- a plain string-prefix test,
/// not a delimited field match.
pub fn load_core_loci(path: &Path, organism_abbreviation: &str) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    let loci: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && l.starts_with(organism_abbreviation))
        .map(String::from)
        .collect();
    if loci.is_empty() {
        return Err(NomenclatureError::MalformedInput(format!(
            "no core loci in {} start with prefix {organism_abbreviation:?}",
            path.display()
        )));
    }
    Ok(loci)
}

/// Parses a batch allele-profile matrix (first column Key, remaining
/// columns loci named in the header row), reordering each row into
/// `core_loci` order and filling any locus absent from the file with `0`.
///
/// Returns rows in file order, not a map -- placement order is significant
/// (spec.md §5: later placements see the tree as mutated by earlier ones),
/// so callers must not launder this through something unordered like a
/// `HashMap`.
pub fn load_profiles(path: &Path, core_loci: &[String]) -> Result<Vec<(Key, Profile)>> {
    let delimiter = if path.extension().and_then(|e| e.to_str()) == Some("csv") { b',' } else { b'\t' };
    let mut reader = csv::ReaderBuilder::new().delimiter(delimiter).from_path(path)?;

    let headers = reader.headers()?.clone();
    let field_names: Vec<String> = headers.iter().skip(1).map(String::from).collect();

    let mut profiles = Vec::new();
    for record in reader.records() {
        let record = record?;
        let key = record
            .get(0)
            .ok_or_else(|| NomenclatureError::MalformedInput(format!("empty row in {}", path.display())))?
            .to_string();

        let mut by_locus: HashMap<&str, i32> = HashMap::with_capacity(field_names.len());
        for (name, raw) in field_names.iter().zip(record.iter().skip(1)) {
            let value: i32 = raw.trim().parse().map_err(|_| {
                NomenclatureError::MalformedInput(format!("non-integer allele call {raw:?} for key {key}"))
            })?;
            by_locus.insert(name.as_str(), value);
        }

        let profile: Profile = core_loci.iter().map(|locus| *by_locus.get(locus.as_str()).unwrap_or(&0)).collect();
        profiles.push((key, profile));
    }
    Ok(profiles)
}
