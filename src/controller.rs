//! The Run Controller (spec.md §4.6): orchestrates one invocation end to
//! end -- lock, load, place, save, classify, unlock.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::classifier::{change_type_label, classify, ChangeType, RenderedCode};
use crate::config::RunConfig;
use crate::engine::{place, DistanceCache};
use crate::error::{NomenclatureError, Result};
use crate::input;
use crate::lock::RunLock;
use crate::logging::{log_error, log_message};
use crate::profile::{passes_core_qc, Key};
use crate::progress::ProgressSink;
use crate::scaffold;
use crate::store::ProfileStore;
use crate::tree::Tree;
use crate::xcodes::XcodeList;

/// Number of successfully placed-or-resurrected profiles between
/// intermittent saves (spec.md §4.6 step 5).
const SAVE_EVERY: usize = 1000;

/// One entry in the change log: what a key's code was before this run and
/// what it is now, and why the classifier called it that.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub key: Key,
    pub old_value: Option<String>,
    pub new_value: String,
    pub change: ChangeType,
}

/// Everything a caller needs to report on a completed run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// `(key, rendered_code)` for every key newly named or resurrected this
    /// run, in the order they were processed.
    pub new_codes: Vec<(Key, String)>,
    /// Every key whose rendered code differs from its pre-run value,
    /// including keys merely pulled along by someone else's merge.
    pub changes: Vec<ChangeRecord>,
    /// Keys rejected by the QC filter this run, with the reason(s).
    pub below_qc: Vec<(Key, Vec<String>)>,
    /// Total number of pairwise distances actually computed this run.
    pub distances_calculated: usize,
}

/// Runs one full assignment pass: scaffold directories, back up the
/// previous `current/`, acquire the lock, load persisted state, place every
/// unnamed profile in `alleles_path`, classify what changed, persist, and
/// release the lock.
pub fn run(
    config: &RunConfig,
    alleles_path: &Path,
    progress: &mut dyn ProgressSink,
) -> Result<RunSummary> {
    scaffold::ensure_directories(config)?;
    scaffold::backup_current(config)?;

    let lock = RunLock::acquire(&config.srcfiles_dir())?;

    log_message(0, "=== START OF NOMENCLATURE RUN ===");
    let result = run_locked(config, alleles_path, progress);
    match &result {
        Ok(summary) => {
            log_message(
                0,
                &format!(
                    "=== END OF NOMENCLATURE RUN ({} distance(s) calculated) ===",
                    summary.distances_calculated
                ),
            );
            lock.release()?;
        }
        Err(e) => {
            log_error(0, &format!("run aborted: {e}"));
        }
    }
    result
}

fn run_locked(config: &RunConfig, alleles_path: &Path, progress: &mut dyn ProgressSink) -> Result<RunSummary> {
    let tree_dir = config.srcfiles_dir().join("tree").join("current");
    let mut tree = load_tree(&tree_dir, config.depth())?;

    let calls_dir = config.srcfiles_dir().join("allele_calls").join("current");
    let mut store = ProfileStore::new(calls_dir);
    store.load()?;

    check_integrity(&tree, &store)?;

    let xcode_path = config.logs_dir().join("Xcodes").join("Xcodes.tsv");
    let xcodes = XcodeList::load(&xcode_path)?;

    let old_codes = rendered_codes(&tree, &xcodes);

    let profiles = input::load_profiles(alleles_path, &config.core_loci)?;
    progress.start(profiles.len());

    let mut summary = RunSummary::default();
    let mut processed_since_save = 0usize;

    for (key, profile) in profiles {
        if tree.has_name(&key) {
            if !store.has_key(&key) {
                if passes_core_qc(&profile, config.min_present) {
                    log_message(1, &format!("resurrecting {key}: named but missing from profile store"));
                    store.add(key.clone(), profile)?;
                    processed_since_save += 1;
                } else {
                    log_error(1, &format!("{key} is named but missing from the profile store and fails QC"));
                }
            }
            progress.tick();
            continue;
        }

        if !passes_core_qc(&profile, config.min_present) {
            summary.below_qc.push((key, vec!["CORE".to_string()]));
            progress.tick();
            continue;
        }

        store.add(key.clone(), profile)?;
        let path = {
            let mut cache = DistanceCache::new(&mut store);
            let path = place(&mut tree, &mut cache, config, &key)?;
            summary.distances_calculated += cache.computed_count();
            path
        };
        let rendered = render_with_xcode(config, &xcodes, &path);
        summary.new_codes.push((key, rendered));

        processed_since_save += 1;
        if processed_since_save >= SAVE_EVERY {
            save_all(config, &tree, &mut store, &tree_dir)?;
            processed_since_save = 0;
        }
        progress.tick();
    }
    progress.finish();

    let new_codes = rendered_codes(&tree, &xcodes);
    collect_changes(&old_codes, &new_codes, &mut summary);

    if !config.nosave {
        save_all(config, &tree, &mut store, &tree_dir)?;
        write_change_log(config, &summary.changes)?;
    }

    Ok(summary)
}

fn check_integrity(tree: &Tree, store: &ProfileStore) -> Result<()> {
    let tree_keys = tree.key_set();
    let store_keys = store.key_set();
    let tree_only: Vec<Key> = tree_keys.difference(&store_keys).cloned().collect();
    let store_only: Vec<Key> = store_keys.difference(&tree_keys).cloned().collect();
    if !tree_only.is_empty() || !store_only.is_empty() {
        return Err(NomenclatureError::Integrity { tree_only, store_only });
    }
    Ok(())
}

/// Renders every currently-named key's code, applying the Xcode list.
fn rendered_codes(tree: &Tree, xcodes: &XcodeList) -> HashMap<Key, RenderedCode> {
    tree.finalize_codes()
        .into_iter()
        .map(|(key, code, complete)| {
            let rendered = match xcodes.matching_prefix(&code) {
                Some(prefix) => RenderedCode { digits: prefix, complete: true, xcoded: true },
                None => RenderedCode { digits: code, complete, xcoded: false },
            };
            (key, rendered)
        })
        .collect()
}

/// Full `"<PREFIX><VERSION> - ..."` string for a freshly-placed path,
/// applying the Xcode list the same way `rendered_codes` does.
fn render_with_xcode(config: &RunConfig, xcodes: &XcodeList, path: &[i64]) -> String {
    match xcodes.matching_prefix(path) {
        Some(prefix) => {
            let mut rendered = config.render_code(&prefix);
            rendered.push('x');
            rendered
        }
        None => config.render_code(path),
    }
}

fn collect_changes(
    old_codes: &HashMap<Key, RenderedCode>,
    new_codes: &HashMap<Key, RenderedCode>,
    summary: &mut RunSummary,
) {
    let all_keys: HashSet<&Key> = old_codes.keys().chain(new_codes.keys()).collect();
    for key in all_keys {
        let Some(new) = new_codes.get(key) else { continue };
        let old = old_codes.get(key);
        let change = classify(old, new);
        if matches!(change, ChangeType::New | ChangeType::NoChange) {
            continue;
        }
        summary.changes.push(ChangeRecord {
            key: key.clone(),
            old_value: old.map(render_full_string),
            new_value: render_full_string(new),
            change,
        });
    }
}

fn render_full_string(code: &RenderedCode) -> String {
    let joined = code.digits.iter().map(i64::to_string).collect::<Vec<_>>().join(".");
    if code.xcoded {
        format!("{joined}x")
    } else {
        joined
    }
}

fn find_latest_tree_file(tree_dir: &Path) -> Result<Option<PathBuf>> {
    if !tree_dir.exists() {
        return Ok(None);
    }
    let mut candidates: Vec<PathBuf> = fs::read_dir(tree_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("tree_") && n.ends_with(".json"))
        })
        .collect();
    candidates.sort();
    Ok(candidates.pop())
}

fn load_tree(tree_dir: &Path, depth: usize) -> Result<Tree> {
    match find_latest_tree_file(tree_dir)? {
        Some(path) => {
            let file = fs::File::open(path)?;
            Tree::load(file, depth)
        }
        None => Ok(Tree::new(depth)),
    }
}

/// Writes a fresh timestamped tree file, then removes every older one in
/// the directory -- the new file exists on disk before the old one is
/// unlinked (spec.md §5's write-new-then-remove-old atomicity).
fn save_tree(tree: &Tree, tree_dir: &Path) -> Result<()> {
    fs::create_dir_all(tree_dir)?;
    let stamp = Local::now().format("%Y-%m-%d@%H-%M-%S");
    let new_path = tree_dir.join(format!("tree_{stamp}.json"));
    let file = fs::File::create(&new_path)?;
    tree.save(file)?;

    for entry in fs::read_dir(tree_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path != new_path
            && path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with("tree_"))
        {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

fn save_all(config: &RunConfig, tree: &Tree, store: &mut ProfileStore, tree_dir: &Path) -> Result<()> {
    if config.nosave {
        return Ok(());
    }
    save_tree(tree, tree_dir)?;
    store.save()?;
    Ok(())
}

/// Appends today's changes to `change_log/<YYYY-MM-DD>.tsv`, writing the
/// header row the first time the file is touched.
fn write_change_log(config: &RunConfig, changes: &[ChangeRecord]) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    let dir = config.logs_dir().join("change_log");
    fs::create_dir_all(&dir)?;
    let day = Local::now().format("%Y-%m-%d");
    let path = dir.join(format!("{day}.tsv"));

    let needs_header = !path.exists();
    let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
    use std::io::Write;
    if needs_header {
        writeln!(file, "Key\tOldValue\tNewValue\tChangeType")?;
    }
    for change in changes {
        writeln!(
            file,
            "{}\t{}\t{}\t{}",
            change.key,
            change.old_value.as_deref().unwrap_or(""),
            change.new_value,
            change_type_label(&change.change)
        )?;
    }
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file, "=====Assignment Complete ({now})=====")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Organism, DEFAULT_MIN_PRESENT};
    use crate::progress::NullProgress;
    use std::io::Write as _;

    fn test_config(dir: &Path, thresholds: Vec<f64>, core_loci: Vec<String>) -> RunConfig {
        RunConfig {
            organism: Organism::Salmonella,
            core_loci,
            thresholds,
            min_present: DEFAULT_MIN_PRESENT,
            data_dir: dir.to_path_buf(),
            log_dir: dir.to_path_buf(),
            nosave: false,
            verbose: false,
        }
    }

    fn write_batch(path: &Path, rows: &[(&str, &[i32])]) {
        let mut f = fs::File::create(path).unwrap();
        writeln!(f, "Key\tl1\tl2\tl3\tl4\tl5").unwrap();
        for (key, values) in rows {
            let joined = values.iter().map(i32::to_string).collect::<Vec<_>>().join("\t");
            writeln!(f, "{key}\t{joined}").unwrap();
        }
    }

    #[test]
    fn fresh_run_places_every_profile_and_persists_state() {
        let dir = tempfile::tempdir().unwrap();
        let core_loci = vec!["l1".into(), "l2".into(), "l3".into(), "l4".into(), "l5".into()];
        let config = test_config(dir.path(), vec![50.0, 10.0], core_loci);

        let batch_path = dir.path().join("batch.tsv");
        write_batch(&batch_path, &[("K1", &[1, 1, 1, 1, 1]), ("K2", &[1, 1, 1, 1, 2])]);

        let mut progress = NullProgress;
        let summary = run(&config, &batch_path, &mut progress).unwrap();
        assert_eq!(summary.new_codes.len(), 2);
        assert!(summary.below_qc.is_empty());

        let tree_dir = config.srcfiles_dir().join("tree").join("current");
        assert!(find_latest_tree_file(&tree_dir).unwrap().is_some());
        assert!(!config.srcfiles_dir().join("nomenclature.lock").exists());
    }

    #[test]
    fn rerunning_the_same_batch_yields_no_new_codes() {
        let dir = tempfile::tempdir().unwrap();
        let core_loci = vec!["l1".into(), "l2".into(), "l3".into(), "l4".into(), "l5".into()];
        let config = test_config(dir.path(), vec![50.0, 10.0], core_loci);

        let batch_path = dir.path().join("batch.tsv");
        write_batch(&batch_path, &[("K1", &[1, 1, 1, 1, 1])]);

        let mut progress = NullProgress;
        run(&config, &batch_path, &mut progress).unwrap();
        let second = run(&config, &batch_path, &mut progress).unwrap();
        assert!(second.new_codes.is_empty());
        assert!(second.changes.is_empty());
    }

    #[test]
    fn qc_failures_are_recorded_not_placed() {
        let dir = tempfile::tempdir().unwrap();
        let core_loci = vec!["l1".into(), "l2".into(), "l3".into(), "l4".into(), "l5".into()];
        let config = test_config(dir.path(), vec![50.0, 10.0], core_loci);

        let batch_path = dir.path().join("batch.tsv");
        write_batch(&batch_path, &[("K1", &[0, 0, 0, 1, 1])]);

        let mut progress = NullProgress;
        let summary = run(&config, &batch_path, &mut progress).unwrap();
        assert_eq!(summary.below_qc.len(), 1);
        assert_eq!(summary.below_qc[0].0, "K1");
        assert!(summary.new_codes.is_empty());
    }

    #[test]
    fn second_run_while_first_holds_the_lock_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let core_loci = vec!["l1".into(), "l2".into(), "l3".into(), "l4".into(), "l5".into()];
        let config = test_config(dir.path(), vec![50.0, 10.0], core_loci);
        scaffold::ensure_directories(&config).unwrap();
        let _lock = RunLock::acquire(&config.srcfiles_dir()).unwrap();

        let batch_path = dir.path().join("batch.tsv");
        write_batch(&batch_path, &[("K1", &[1, 1, 1, 1, 1])]);
        let mut progress = NullProgress;
        let result = run(&config, &batch_path, &mut progress);
        assert!(matches!(result, Err(NomenclatureError::LockHeld { .. })));
    }
}
