//! The Assignment Engine (spec.md §4.4, §4.4.1): places a single new
//! profile into the Nomenclature Tree, descending level by level and
//! merging sibling clusters that both match under single-linkage.

use std::collections::HashMap;

use crate::config::RunConfig;
use crate::distance::distance;
use crate::error::{NomenclatureError, Result};
use crate::profile::Key;
use crate::store::ProfileStore;
use crate::tree::node::{NodeId, ROOT};
use crate::tree::Tree;

/// Memoizes pairwise distances computed against the Profile Store for the
/// duration of one placement, so no pair is ever compared twice.
pub struct DistanceCache<'a> {
    store: &'a mut ProfileStore,
    cache: HashMap<(Key, Key), f64>,
    /// Count of distances actually computed (cache misses), mirroring the
    /// original's `cntDistancesCalculated` counter reported at the end of
    /// a run.
    computed: usize,
}

impl<'a> DistanceCache<'a> {
    pub fn new(store: &'a mut ProfileStore) -> Self {
        DistanceCache { store, cache: HashMap::new(), computed: 0 }
    }

    pub fn distance(&mut self, a: &str, b: &str) -> Result<f64> {
        let (x, y) = if a <= b { (a.to_string(), b.to_string()) } else { (b.to_string(), a.to_string()) };
        if let Some(&d) = self.cache.get(&(x.clone(), y.clone())) {
            return Ok(d);
        }
        let pa = self
            .store
            .get(a)?
            .cloned()
            .ok_or_else(|| NomenclatureError::Assertion(format!("no stored profile for {a}")))?;
        let pb = self
            .store
            .get(b)?
            .cloned()
            .ok_or_else(|| NomenclatureError::Assertion(format!("no stored profile for {b}")))?;
        let d = distance(&pa, &pb);
        self.computed += 1;
        self.cache.insert((x, y), d);
        Ok(d)
    }

    /// Total number of distances actually computed (not served from cache)
    /// across this cache's lifetime.
    pub fn computed_count(&self) -> usize {
        self.computed
    }
}

/// Places `key` into `tree`, returning its full root-to-terminal path.
/// `key`'s profile must already be present in the Profile Store backing
/// `cache`. Asserts `key` has no existing name.
pub fn place(tree: &mut Tree, cache: &mut DistanceCache, config: &RunConfig, key: &Key) -> Result<Vec<i64>> {
    if tree.has_name(key) {
        return Err(NomenclatureError::Assertion(format!("{key} is already named")));
    }

    let mut pattern: Vec<i64> = Vec::with_capacity(config.depth());
    let mut current = ROOT;

    for (level_idx, &threshold) in config.thresholds.iter().enumerate() {
        let children = tree.node(current).children_nodes();

        let mut matches: Vec<NodeId> = Vec::new();
        let mut digits: std::collections::HashSet<u32> = std::collections::HashSet::new();
        for child in children {
            if in_cluster(tree, cache, child, key, threshold, config.min_present)? {
                digits.insert(tree.node(child).id);
                matches.push(child);
            }
        }

        if digits.len() == 1 {
            let matched = matches[0];
            let founder = tree.node(matched).founder.clone().expect("non-root node has a founder");
            let d = cache.distance(key, &founder)?;
            let node = tree.node_mut(matched);
            node.diameter = node.diameter.max(d);
            node.members.insert(key.clone());
            pattern.push(node.id as i64);
            current = matched;
        } else if digits.is_empty() {
            let new_node = tree.new_child(current);
            {
                let node = tree.node_mut(new_node);
                node.diameter = 0.0;
                node.founder = Some(key.clone());
                node.members.insert(key.clone());
            }
            pattern.push(tree.node(new_node).id as i64);
            current = new_node;
        } else {
            let anchor_id = merge_matches(tree, cache, current, &matches, key)?;
            pattern.push(tree.node(anchor_id).id as i64);
            current = anchor_id;
        }

        debug_assert_eq!(pattern.len(), level_idx + 1);
    }

    tree.add_named_child(current, key.clone());
    tree.finalize_name(key, pattern.clone())?;
    Ok(pattern)
}

/// Whether `key` belongs in `node`, per the three-tier check: fast-path
/// distance to the founder, a triangle-inequality bound that rules the
/// node out early, and (only if neither settles it) a full comparison
/// against every key the node has ever absorbed.
fn in_cluster(
    tree: &Tree,
    cache: &mut DistanceCache,
    node_id: NodeId,
    key: &str,
    threshold: f64,
    min_present: f64,
) -> Result<bool> {
    let node = tree.node(node_id);
    let founder = node.founder.clone().expect("non-root node has a founder");
    let d = cache.distance(key, &founder)?;
    if d <= threshold {
        return Ok(true);
    }

    let buffer = 2.0 * (100.0 - 100.0 * min_present);
    if d - node.diameter - buffer > threshold {
        return Ok(false);
    }

    let members: Vec<Key> = tree.node(node_id).members.iter().cloned().collect();
    for member in members {
        if cache.distance(key, &member)? <= threshold {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Merges every node in `matches` (siblings under `parent`) into the
/// single largest one, then folds `key` in as an additional member.
/// Mirrors the original's single-linkage merge: whichever matching node
/// has the most members becomes the new founder/diameter anchor, and the
/// anchor's diameter is widened to cover every absorbed node's farthest
/// member.
fn merge_matches(
    tree: &mut Tree,
    cache: &mut DistanceCache,
    parent: NodeId,
    matches: &[NodeId],
    key: &str,
) -> Result<NodeId> {
    let pick = *matches
        .iter()
        .max_by_key(|&&n| (tree.node(n).members.len(), std::cmp::Reverse(tree.node(n).id)))
        .expect("merge requires at least one match");

    let new_founder = tree.node(pick).founder.clone().expect("non-root node has a founder");
    let mut diameter = tree.node(pick).diameter;
    diameter = diameter.max(cache.distance(key, &new_founder)?);

    for &m in matches {
        if m == pick {
            continue;
        }
        let members: Vec<Key> = tree.node(m).members.iter().cloned().collect();
        for member in members {
            let d = cache.distance(&new_founder, &member)?;
            diameter = diameter.max(d);
        }
    }

    let ids: Vec<u32> = matches.iter().map(|&n| tree.node(n).id).collect();
    let anchor = tree.merge_nodes(parent, &ids);

    let node = tree.node_mut(anchor);
    node.founder = Some(new_founder);
    node.diameter = diameter;
    node.members.insert(key.to_string());

    Ok(anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Organism, DEFAULT_MIN_PRESENT};
    use std::path::PathBuf;

    fn test_config(thresholds: Vec<f64>) -> RunConfig {
        RunConfig {
            organism: Organism::Campylobacter,
            core_loci: vec!["l1".into(), "l2".into(), "l3".into(), "l4".into(), "l5".into()],
            thresholds,
            min_present: DEFAULT_MIN_PRESENT,
            data_dir: PathBuf::from("/tmp"),
            log_dir: PathBuf::from("/tmp"),
            nosave: true,
            verbose: false,
        }
    }

    #[test]
    fn fresh_insert_into_empty_tree() {
        let config = test_config(vec![50.0, 10.0]);
        let mut tree = Tree::new(config.depth());
        let mut store = ProfileStore::new("/tmp/unused");
        store.add("K1".to_string(), vec![1, 1, 1, 1, 1]).unwrap();
        let mut cache = DistanceCache::new(&mut store);

        let path = place(&mut tree, &mut cache, &config, &"K1".to_string()).unwrap();
        assert_eq!(path, vec![1, 1]);
        assert!(tree.has_name("K1"));
    }

    #[test]
    fn nested_match_joins_existing_level1_cluster() {
        let config = test_config(vec![50.0, 10.0]);
        let mut tree = Tree::new(config.depth());
        let mut store = ProfileStore::new("/tmp/unused");
        store.add("K1".to_string(), vec![1, 1, 1, 1, 1]).unwrap();
        {
            let mut cache = DistanceCache::new(&mut store);
            place(&mut tree, &mut cache, &config, &"K1".to_string()).unwrap();
        }
        // distance to K1: 1 of 5 loci differ -> 20% (within 50%, outside 10%)
        store.add("K2".to_string(), vec![1, 1, 1, 1, 2]).unwrap();
        let mut cache = DistanceCache::new(&mut store);
        let path = place(&mut tree, &mut cache, &config, &"K2".to_string()).unwrap();
        assert_eq!(path[0], 1);
        assert_eq!(path.len(), 2);
        assert_ne!(path[1], 1);
    }

    #[test]
    fn disjoint_insert_creates_new_top_level_cluster() {
        let config = test_config(vec![50.0, 10.0]);
        let mut tree = Tree::new(config.depth());
        let mut store = ProfileStore::new("/tmp/unused");
        store.add("K1".to_string(), vec![1, 1, 1, 1, 1]).unwrap();
        {
            let mut cache = DistanceCache::new(&mut store);
            place(&mut tree, &mut cache, &config, &"K1".to_string()).unwrap();
        }
        // all loci differ -> 100% distant, beyond every threshold
        store.add("K3".to_string(), vec![2, 2, 2, 2, 2]).unwrap();
        let mut cache = DistanceCache::new(&mut store);
        let path = place(&mut tree, &mut cache, &config, &"K3".to_string()).unwrap();
        assert_eq!(path[0], 2);
    }

    #[test]
    fn merge_absorbs_two_matching_siblings() {
        let config = test_config(vec![90.0, 50.0]);
        let mut tree = Tree::new(config.depth());
        let mut store = ProfileStore::new("/tmp/unused");

        // Two founders far enough apart at level 2 to split, but both
        // within the generous level-1 threshold.
        store.add("A".to_string(), vec![1, 1, 1, 1, 1]).unwrap();
        store.add("B".to_string(), vec![1, 1, 1, 1, 9]).unwrap();
        {
            let mut cache = DistanceCache::new(&mut store);
            place(&mut tree, &mut cache, &config, &"A".to_string()).unwrap();
        }
        {
            let mut cache = DistanceCache::new(&mut store);
            place(&mut tree, &mut cache, &config, &"B".to_string()).unwrap();
        }
        assert!(tree.has_name("A"));
        assert!(tree.has_name("B"));

        // A third profile equidistant-ish from both should be able to
        // trigger a merge at level 1 if it matches both level-1 branches.
        // (Exact topology depends on the two inserts above; this mainly
        // exercises that placement completes without invariant violations.)
        store.add("C".to_string(), vec![1, 1, 1, 1, 5]).unwrap();
        let mut cache = DistanceCache::new(&mut store);
        let path = place(&mut tree, &mut cache, &config, &"C".to_string()).unwrap();
        assert_eq!(path.len(), 2);
    }
}
