//! The Nomenclature Tree (spec.md §4.3): a persistent hierarchical
//! clustering structure whose root-to-terminal paths are dotted-integer
//! Allele Codes.

pub mod node;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{NomenclatureError, Result};
use crate::profile::Key;

use node::{Node, NodeId, NodeKind, ROOT};

/// The nomenclature tree. Nodes live in a flat arena; `names` is the
/// authoritative record of each named key's full root-to-terminal path.
pub struct Tree {
    arena: Vec<Node>,
    /// Full-length path (one id per level) for every named key.
    names: HashMap<Key, Vec<i64>>,
    depth: usize,
}

impl Tree {
    /// An empty tree with `depth` nomenclature levels.
    pub fn new(depth: usize) -> Self {
        Tree { arena: vec![Node::root()], names: HashMap::new(), depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.arena[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.arena[id]
    }

    pub fn root(&self) -> &Node {
        &self.arena[ROOT]
    }

    pub fn has_name(&self, key: &str) -> bool {
        self.names.contains_key(key)
    }

    pub fn names(&self) -> &HashMap<Key, Vec<i64>> {
        &self.names
    }

    /// The stored full-length path for `key`, if named.
    pub fn get_name(&self, key: &str) -> Option<&[i64]> {
        self.names.get(key).map(Vec::as_slice)
    }

    /// The stored path truncated to `level` digits.
    pub fn get_part(&self, key: &str, level: usize) -> Vec<i64> {
        self.names.get(key).map(|v| v[..level.min(v.len())].to_vec()).unwrap_or_default()
    }

    /// Walks `path` (root-to-terminal ids) down from the root.
    pub fn traverse(&self, path: &[u32]) -> Option<NodeId> {
        let mut current = ROOT;
        for &id in path {
            current = self.arena[current].child(id)?;
        }
        Some(current)
    }

    /// Records `key`'s full path once placement has finished, and verifies
    /// the terminal node at that path actually claims the key.
    pub fn finalize_name(&mut self, key: &Key, path: Vec<i64>) -> Result<()> {
        let ids: Vec<u32> = path.iter().map(|&d| d as u32).collect();
        let node_id = self.traverse(&ids).ok_or_else(|| {
            NomenclatureError::Assertion(format!("no node at path {:?} for key {}", path, key))
        })?;
        let node = &self.arena[node_id];
        let named = match &node.kind {
            NodeKind::Terminal { named_children } => named_children.contains(key),
            NodeKind::Interior { .. } => false,
        };
        if !named {
            return Err(NomenclatureError::Assertion(format!(
                "key {} not named at its own path {:?}",
                key, path
            )));
        }
        self.names.insert(key.clone(), path);
        Ok(())
    }

    /// Creates a new child of `parent`, its kind determined by whether the
    /// child's level reaches `self.depth` (terminal) or not (interior).
    pub fn new_child(&mut self, parent: NodeId) -> NodeId {
        let (next_id, level) = {
            let p = &self.arena[parent];
            (p.next_child_id(), p.level + 1)
        };
        let kind = if level == self.depth {
            NodeKind::Terminal { named_children: HashSet::new() }
        } else {
            NodeKind::Interior { children: BTreeMap::new() }
        };
        let child = Node {
            id: next_id,
            level,
            parent: Some(parent),
            diameter: 0.0,
            founder: None,
            members: HashSet::new(),
            kind,
        };
        let child_id = self.arena.len();
        self.arena.push(child);
        match &mut self.arena[parent].kind {
            NodeKind::Interior { children } => {
                children.insert(next_id, child_id);
            }
            NodeKind::Terminal { .. } => unreachable!("terminal nodes never gain Node children"),
        }
        child_id
    }

    /// Adds `key` as a named child of the terminal node `node_id`.
    pub fn add_named_child(&mut self, node_id: NodeId, key: Key) {
        if let NodeKind::Terminal { named_children } = &mut self.arena[node_id].kind {
            named_children.insert(key.clone());
        }
        self.arena[node_id].members.insert(key);
    }

    /// Merges `nodes` (siblings under `parent`) into the single largest
    /// one (by total contained keys), renumbering the others' children to
    /// avoid id conflicts. Returns the surviving node's id.
    ///
    /// Ties in size are broken deterministically by the smallest node id,
    /// rather than the original's dict-iteration-order-dependent `max()`.
    pub fn merge_nodes(&mut self, parent: NodeId, ids: &[u32]) -> NodeId {
        let candidates: Vec<NodeId> =
            ids.iter().map(|&id| self.arena[parent].child(id).expect("merge target missing")).collect();

        let anchor = *candidates
            .iter()
            .max_by_key(|&&nid| (self.subtree_key_count(nid), std::cmp::Reverse(self.arena[nid].id)))
            .expect("merge requires at least one node");

        if self.arena[parent].level == self.depth - 1 {
            // Children at this level are terminal nodes: fold named
            // children directly into the anchor and drop the rest.
            for &nid in &candidates {
                if nid == anchor {
                    continue;
                }
                let (keys, id) = match &self.arena[nid].kind {
                    NodeKind::Terminal { named_children } => (named_children.clone(), self.arena[nid].id),
                    NodeKind::Interior { .. } => unreachable!("level depth-1 children are always terminal"),
                };
                for key in keys {
                    self.add_named_child(anchor, key.clone());
                }
                let absorbed_members: HashSet<Key> = self.arena[nid].members.clone();
                self.arena[anchor].members.extend(absorbed_members);
                self.remove_child(parent, id);
            }
        } else {
            for &nid in &candidates {
                if nid == anchor {
                    continue;
                }
                let children_ids = self.arena[nid].children_ids();
                let mut next_id = match &self.arena[anchor].kind {
                    NodeKind::Interior { children } => children.keys().max().map_or(1, |m| m + 1),
                    NodeKind::Terminal { .. } => unreachable!(),
                };
                for old_id in children_ids {
                    let child_node_id = self.arena[nid].child(old_id).unwrap();
                    self.arena[child_node_id].id = next_id;
                    self.arena[child_node_id].parent = Some(anchor);
                    if let NodeKind::Interior { children } = &mut self.arena[anchor].kind {
                        children.insert(next_id, child_node_id);
                    }
                    next_id += 1;
                }
                let absorbed_members: HashSet<Key> = self.arena[nid].members.clone();
                self.arena[anchor].members.extend(absorbed_members);
                let id = self.arena[nid].id;
                self.remove_child(parent, id);
            }
        }

        // Recompute every named key's stored path below the anchor, since
        // renumbering may have changed digits under it.
        let affected: Vec<Key> = self.arena[anchor].members.iter().cloned().collect();
        for key in affected {
            if let Some(path) = self.recompute_path(key.clone()) {
                let _ = self.finalize_name(&key, path);
            }
        }

        anchor
    }

    fn remove_child(&mut self, parent: NodeId, id: u32) {
        if let NodeKind::Interior { children } = &mut self.arena[parent].kind {
            children.remove(&id);
        }
    }

    /// Total named keys anywhere below `node_id`.
    fn subtree_key_count(&self, node_id: NodeId) -> usize {
        self.arena[node_id].members.len()
    }

    /// Walks up from a terminal/interior node, re-deriving the path of ids
    /// from the root, for an arbitrary member key currently reachable
    /// below `node_id`. Used after a merge to refresh stored paths.
    fn recompute_path(&self, key: Key) -> Option<Vec<i64>> {
        // Find the terminal node that currently names `key` via a bounded
        // search from the node believed to contain it: walk the whole tree
        // once, since merges are infrequent relative to placements.
        fn find(tree: &Tree, node_id: NodeId, key: &str, path: &mut Vec<i64>) -> bool {
            let node = &tree.arena[node_id];
            match &node.kind {
                NodeKind::Terminal { named_children } => named_children.contains(key),
                NodeKind::Interior { children } => {
                    for (&id, &child_id) in children {
                        path.push(id as i64);
                        if find(tree, child_id, key, path) {
                            return true;
                        }
                        path.pop();
                    }
                    false
                }
            }
        }
        let mut path = Vec::with_capacity(self.depth);
        if find(self, ROOT, &key, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    /// Re-identifies a previously named key under a new key, updating the
    /// terminal node's membership and, along the path back to the root,
    /// any node whose founder was the old key. Exposed for library
    /// consumers that integrate re-identification pipelines; the batch
    /// Run Controller never calls this directly.
    pub fn rename(&mut self, key: &str, new_key: Key) -> Result<()> {
        let Some(path) = self.names.get(key).cloned() else { return Ok(()) };
        let ids: Vec<u32> = path.iter().map(|&d| d as u32).collect();
        let node_id = self
            .traverse(&ids)
            .ok_or_else(|| NomenclatureError::Assertion(format!("missing node along path for {key}")))?;

        match &mut self.arena[node_id].kind {
            NodeKind::Terminal { named_children } => {
                if !named_children.remove(key) {
                    return Err(NomenclatureError::Assertion(format!(
                        "{key} not a named child of its own terminal node"
                    )));
                }
                named_children.insert(new_key.clone());
            }
            NodeKind::Interior { .. } => {
                return Err(NomenclatureError::Assertion(format!(
                    "path for {key} ended at an interior node"
                )))
            }
        }

        let mut current = ROOT;
        for &id in &ids {
            let next = self.arena[current].child(id).expect("path validated above");
            let node = &mut self.arena[next];
            node.members.remove(key);
            node.members.insert(new_key.clone());
            if node.founder.as_deref() == Some(key) {
                node.founder = Some(new_key.clone());
            }
            current = next;
        }

        if let Some(path) = self.names.remove(key) {
            self.names.insert(new_key, path);
        }
        Ok(())
    }

    /// Yields `(key, code, complete)` for every named key, truncating
    /// trailing "don't care" digits: a digit is rendered as absent when
    /// the node whose id it names currently has exactly one child (no
    /// split has made finer resolution necessary there yet). Re-evaluated
    /// fresh each call, so a key's rendered code can extend over time as
    /// siblings accumulate deeper in the tree -- this is what lets the
    /// Change Classifier observe "Extended" transitions.
    pub fn finalize_codes(&self) -> Vec<(Key, Vec<i64>, bool)> {
        let mut out = Vec::with_capacity(self.names.len());
        for (key, path) in &self.names {
            let ids: Vec<u32> = path.iter().map(|&d| d as u32).collect();
            let Some(terminal) = self.traverse(&ids) else { continue };

            // Deepest-first unary flags, ending with the root's.
            let mut flags = Vec::with_capacity(self.depth + 1);
            let mut current = Some(terminal);
            while let Some(nid) = current {
                flags.push(self.arena[nid].is_unary());
                current = self.arena[nid].parent;
            }

            let part = match flags.iter().position(|&unary| !unary) {
                Some(idx) => self.depth - idx,
                None => 0,
            };
            let code = path[..part].to_vec();
            let complete = part == self.depth;
            out.push((key.clone(), code, complete));
        }
        out
    }

    pub fn load<R: Read>(r: R, depth: usize) -> Result<Tree> {
        let file: TreeFile = serde_json::from_reader(r)?;
        let mut arena = Vec::new();
        let root = load_node(&file.tree, None, &mut arena);
        debug_assert_eq!(root, ROOT);
        let mut tree = Tree { arena, names: file.names, depth };
        tree.rebuild_member_caches();
        Ok(tree)
    }

    pub fn save<W: Write>(&self, w: W) -> Result<()> {
        let file = TreeFile { names: self.names.clone(), tree: save_node(self, ROOT) };
        serde_json::to_writer(w, &file)?;
        Ok(())
    }

    /// Recomputes every node's `members` cache bottom-up. Run once after
    /// loading a tree whose persisted form carries no membership cache.
    fn rebuild_member_caches(&mut self) {
        fn visit(tree: &mut Tree, node_id: NodeId) -> HashSet<Key> {
            let children = tree.arena[node_id].children_nodes();
            if children.is_empty() {
                if let NodeKind::Terminal { named_children } = &tree.arena[node_id].kind {
                    let members = named_children.clone();
                    tree.arena[node_id].members = members.clone();
                    return members;
                }
                return HashSet::new();
            }
            let mut members = HashSet::new();
            for child in children {
                members.extend(visit(tree, child));
            }
            tree.arena[node_id].members = members.clone();
            members
        }
        visit(self, ROOT);
    }

    /// Every key known to the tree. Used for the integrity check against
    /// the Profile Store at run start.
    pub fn key_set(&self) -> HashSet<Key> {
        self.names.keys().cloned().collect()
    }
}

#[derive(Serialize, Deserialize)]
struct TreeFile {
    names: HashMap<Key, Vec<i64>>,
    tree: NodeFile,
}

#[derive(Serialize, Deserialize)]
struct NodeFile {
    #[serde(rename = "ID")]
    id: u32,
    level: usize,
    diameter: f64,
    preferred: Option<Key>,
    children: BTreeMap<String, NodeFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<NodeDetails>,
}

#[derive(Serialize, Deserialize)]
struct NodeDetails {
    named_children: Vec<Key>,
}

fn save_node(tree: &Tree, node_id: NodeId) -> NodeFile {
    let node = &tree.arena[node_id];
    let mut children = BTreeMap::new();
    for child_id in node.children_nodes() {
        let child_node = &tree.arena[child_id];
        children.insert(child_node.id.to_string(), save_node(tree, child_id));
    }
    let details = match &node.kind {
        NodeKind::Terminal { named_children } => {
            Some(NodeDetails { named_children: named_children.iter().cloned().collect() })
        }
        NodeKind::Interior { .. } => None,
    };
    NodeFile { id: node.id, level: node.level, diameter: node.diameter, preferred: node.founder.clone(), children, details }
}

fn load_node(file: &NodeFile, parent: Option<NodeId>, arena: &mut Vec<Node>) -> NodeId {
    let kind = if let Some(details) = &file.details {
        NodeKind::Terminal { named_children: details.named_children.iter().cloned().collect() }
    } else {
        NodeKind::Interior { children: BTreeMap::new() }
    };
    let node = Node {
        id: file.id,
        level: file.level,
        parent,
        diameter: file.diameter,
        founder: file.preferred.clone(),
        members: HashSet::new(),
        kind,
    };
    let node_id = arena.len();
    arena.push(node);
    let mut children = BTreeMap::new();
    for child_file in file.children.values() {
        let child_id = load_node(child_file, Some(node_id), arena);
        children.insert(arena[child_id].id, child_id);
    }
    if let NodeKind::Interior { children: c } = &mut arena[node_id].kind {
        *c = children;
    }
    node_id
}
