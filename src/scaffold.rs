//! Directory scaffolding (spec.md §4.6, §6): creating the fixed directory
//! layout a run's data and log directories need, and backing up whatever a
//! previous run left in `current/` before this run starts writing to it.

use std::fs;
use std::path::Path;

use crate::config::RunConfig;
use crate::error::Result;

const DATA_DIRS: &[&str] = &["tree", "tree/current", "allele_calls", "allele_calls/current"];
const LOG_DIRS: &[&str] = &["change_log", "Xcodes"];

/// Creates every directory a run needs under `config.data_dir` and
/// `config.log_dir`, if not already present. Idempotent.
pub fn ensure_directories(config: &RunConfig) -> Result<()> {
    let srcfiles = config.srcfiles_dir();
    for rel in DATA_DIRS {
        fs::create_dir_all(srcfiles.join(rel))?;
    }
    let logs = config.logs_dir();
    for rel in LOG_DIRS {
        fs::create_dir_all(logs.join(rel))?;
    }
    Ok(())
}

/// Copies whatever a previous run left in each `current/` subdirectory up
/// one level into its parent, so the parent always holds a backup copy of
/// the last persisted state before this run overwrites `current/` itself.
/// A `current/` directory with nothing in it yet (a brand-new data
/// directory) leaves its parent untouched.
pub fn backup_current(config: &RunConfig) -> Result<()> {
    let srcfiles = config.srcfiles_dir();
    for parent in ["tree", "allele_calls"] {
        let current = srcfiles.join(parent).join("current");
        backup_dir(&current, &srcfiles.join(parent))?;
    }
    Ok(())
}

fn backup_dir(current: &Path, parent: &Path) -> Result<()> {
    if !current.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let dest = parent.join(entry.file_name());
        fs::copy(entry.path(), dest)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Organism, DEFAULT_MIN_PRESENT};
    use std::path::PathBuf;

    fn test_config(dir: &Path) -> RunConfig {
        RunConfig {
            organism: Organism::Salmonella,
            core_loci: vec![],
            thresholds: Organism::Salmonella.thresholds(),
            min_present: DEFAULT_MIN_PRESENT,
            data_dir: dir.to_path_buf(),
            log_dir: dir.to_path_buf(),
            nosave: false,
            verbose: false,
        }
    }

    #[test]
    fn ensure_directories_creates_the_full_fixed_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        ensure_directories(&config).unwrap();
        assert!(config.srcfiles_dir().join("tree/current").is_dir());
        assert!(config.srcfiles_dir().join("allele_calls/current").is_dir());
        assert!(config.logs_dir().join("change_log").is_dir());
        assert!(config.logs_dir().join("Xcodes").is_dir());
    }

    #[test]
    fn backup_copies_current_files_up_one_level() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        ensure_directories(&config).unwrap();
        let current = config.srcfiles_dir().join("tree/current");
        fs::write(current.join("tree_2024-01-01@00-00-00.json"), "{}").unwrap();

        backup_current(&config).unwrap();

        let backed_up = config.srcfiles_dir().join("tree").join("tree_2024-01-01@00-00-00.json");
        assert!(backed_up.exists());
    }

    #[test]
    fn backup_on_empty_current_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        ensure_directories(&config).unwrap();
        backup_current(&config).unwrap();
        let entries: Vec<_> = fs::read_dir(config.srcfiles_dir().join("tree")).unwrap().collect();
        // Only the `current` subdirectory itself should be there.
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn missing_data_dir_entirely_is_a_no_op_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        backup_current(&config).unwrap();
    }
}
