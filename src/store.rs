//! The Profile Store (spec.md §4.2): a sharded, lazily-loaded map from Key
//! to allele profile.
//!
//! Profiles accumulate in a hot in-memory tier. Once more than
//! [`SHARD_SIZE`] accumulate, the oldest overflow is spilled to a
//! gzip-compressed JSON shard file and recorded in an index keyed by shard
//! number; shards are only decompressed back into memory the first time
//! one of their keys is actually requested.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{NomenclatureError, Result};
use crate::profile::{Key, Profile};

/// Maximum number of profiles kept in the hot tier before the overflow is
/// spilled to a new shard file.
pub const SHARD_SIZE: usize = 1000;

/// Sharded, lazily-loaded store of allele profiles.
pub struct ProfileStore {
    path: PathBuf,
    /// Profiles not yet spilled to a shard.
    hot: HashMap<Key, Profile>,
    /// Maps a key to the `[shard_no, slot]` pair addressing its profile,
    /// matching the on-disk index file's two-element array per spec.md
    /// §4.2. `slot` is the key's position within the shard at the time it
    /// was written; shard contents are themselves keyed by Key, so lookups
    /// never need to dereference it, but it is carried through so the
    /// persisted index round-trips the documented shape exactly.
    index: HashMap<Key, (u32, u32)>,
    /// Lazily-loaded shard contents, indexed by shard number.
    shards: Vec<Option<HashMap<Key, Profile>>>,
}

impl ProfileStore {
    /// An empty store rooted at `path` (typically `.../allele_calls/current`).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ProfileStore { path: path.into(), hot: HashMap::new(), index: HashMap::new(), shards: Vec::new() }
    }

    /// Loads the tail and index files from `self.path`, if present. A
    /// brand-new data directory has neither, which is not an error.
    pub fn load(&mut self) -> Result<()> {
        let tail_path = self.path.join("calls.gzip");
        if tail_path.exists() {
            self.hot = read_gz_json(&tail_path)?;
        }
        let index_path = self.path.join("index.gzip");
        if index_path.exists() {
            self.index = read_gz_json(&index_path)?;
        }
        let shard_count = self.index.values().map(|&(shard_no, _slot)| shard_no).max().map_or(0, |m| m as usize + 1);
        self.shards = vec![None; shard_count];
        Ok(())
    }

    /// Adds a brand-new profile. Asserts the key is not already present in
    /// either tier, matching the original's duplicate-key assertion.
    pub fn add(&mut self, key: Key, profile: Profile) -> Result<()> {
        if self.hot.contains_key(&key) || self.index.contains_key(&key) {
            return Err(NomenclatureError::Assertion(format!(
                "profile store already has a profile for key {key}"
            )));
        }
        self.hot.insert(key, profile);
        Ok(())
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.hot.contains_key(key) || self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.hot.len() + self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the profile for `key`, loading its shard from disk first if
    /// necessary.
    pub fn get(&mut self, key: &str) -> Result<Option<&Profile>> {
        if let Some(&(shard_no, _slot)) = self.index.get(key) {
            self.ensure_shard_loaded(shard_no)?;
            return Ok(self.shards[shard_no as usize].as_ref().and_then(|s| s.get(key)));
        }
        Ok(self.hot.get(key))
    }

    fn ensure_shard_loaded(&mut self, shard_no: u32) -> Result<()> {
        let idx = shard_no as usize;
        if idx >= self.shards.len() {
            self.shards.resize(idx + 1, None);
        }
        if self.shards[idx].is_none() {
            let path = self.shard_path(shard_no);
            let shard: HashMap<Key, Profile> = read_gz_json(&path)?;
            self.shards[idx] = Some(shard);
        }
        Ok(())
    }

    fn shard_path(&self, shard_no: u32) -> PathBuf {
        self.path.join(format!("matrix.{shard_no}.gzip"))
    }

    /// Spills hot-tier overflow into new shard files, then rewrites the
    /// tail and index files with whatever remains. The tail and index files
    /// are written last, after every shard they could reference already
    /// exists on disk.
    pub fn save(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.path)?;
        self.spill_overflow()?;
        write_gz_json(&self.path.join("calls.gzip"), &self.hot)?;
        write_gz_json(&self.path.join("index.gzip"), &self.index)?;
        Ok(())
    }

    fn spill_overflow(&mut self) -> Result<()> {
        while self.hot.len() > SHARD_SIZE {
            let shard_no = self.shards.len() as u32;
            let keys: Vec<Key> = self.hot.keys().take(SHARD_SIZE).cloned().collect();
            let mut shard = HashMap::with_capacity(SHARD_SIZE);
            for (slot, key) in keys.into_iter().enumerate() {
                let profile = self.hot.remove(&key).expect("key just listed from hot tier");
                self.index.insert(key.clone(), (shard_no, slot as u32));
                shard.insert(key, profile);
            }
            write_gz_json(&self.shard_path(shard_no), &shard)?;
            self.shards.push(Some(shard));
        }
        Ok(())
    }

    /// All keys currently known to the store, across both tiers. Used for
    /// the integrity check against the Tree at run start.
    pub fn key_set(&self) -> std::collections::HashSet<Key> {
        self.hot.keys().cloned().chain(self.index.keys().cloned()).collect()
    }
}

fn read_gz_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let mut decoder = GzDecoder::new(file);
    let mut contents = String::new();
    decoder.read_to_string(&mut contents)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_gz_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    let json = serde_json::to_vec(value)?;
    encoder.write_all(&json)?;
    encoder.finish()?;
    Ok(())
}
