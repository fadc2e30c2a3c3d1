//! Repack: rewrite the history reachable from a commit chain into delta-compressed packs.
//!
//! Every tracked path gets a version history, oldest first. The first version of a history is
//! stored whole; every later one as a ref-delta against the version right before it. Blocks are
//! then laid out breadth-first over the commit chain, split into size-bounded packs and
//! installed behind a freshly written manifest. Repacking an unchanged history with the same
//! settings reproduces the same files byte for byte.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    delta::{copied_ratio, make_deltas_with_chunk_size},
    errors::GitError,
    hash::ObjectHash,
    internal::pack::{
        EncodedPack,
        block::{Block, PackedObject},
        build_packs, idx_file_name,
        manifest::PackManifest,
    },
    store::{MANIFEST_PATH, ObjectStore, PACK_DIR, pack_path},
};

/// Where the next manifest is staged before it is renamed over [`MANIFEST_PATH`].
pub const MANIFEST_TMP_PATH: &str = "objects/info/packs.tmp";

/// One tracked file (or tree) of a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntry {
    pub path: String,
    pub id: ObjectHash,
}

impl TrackedEntry {
    pub fn new(path: impl Into<String>, id: ObjectHash) -> Self {
        TrackedEntry {
            path: path.into(),
            id,
        }
    }
}

/// A commit, the objects it tracks and its parents, forming a chain back to the root commits.
/// A commit id of [`ObjectHash::ZERO`] marks "no commit" and is skipped together with its
/// entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitChainItem {
    pub commit_id: ObjectHash,
    pub entries: Vec<TrackedEntry>,
    pub parents: Vec<CommitChainItem>,
}

impl CommitChainItem {
    pub fn new(commit_id: ObjectHash, entries: Vec<TrackedEntry>) -> Self {
        CommitChainItem {
            commit_id,
            entries,
            parents: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: Vec<CommitChainItem>) -> Self {
        self.parents = parents;
        self
    }

    /// Every path from this commit down to a root commit, head first. First parents are
    /// followed before later ones.
    pub fn chain_paths(&self) -> Vec<Vec<&CommitChainItem>> {
        let mut paths = Vec::new();
        let mut pending = vec![vec![self]];
        while let Some(mut path) = pending.pop() {
            while let Some(last) = path.last().copied() {
                let Some((first, rest)) = last.parents.split_first() else {
                    break;
                };
                for parent in rest.iter().rev() {
                    let mut fork = path.clone();
                    fork.push(parent);
                    pending.push(fork);
                }
                path.push(first);
            }
            paths.push(path);
        }
        paths
    }
}

/// What a repack wrote and removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepackReport {
    /// Names of the packs now listed in the manifest, in manifest order.
    pub packs: Vec<String>,
    /// Packs (and their indexes) deleted because the new manifest no longer lists them.
    pub removed: Vec<String>,
    /// Every packed id, in pack order.
    pub packed: Vec<ObjectHash>,
    /// Number of blocks stored as ref-deltas.
    pub deltas: usize,
}

/// A block to emit: `base` is the preceding version it is diffed against, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PlannedBlock {
    id: ObjectHash,
    base: Option<ObjectHash>,
}

pub struct Repacker<'a> {
    store: &'a ObjectStore,
    chunk_size: usize,
    size_limit: usize,
    prune_loose: bool,
}

impl<'a> Repacker<'a> {
    /// Repacker using the store's configured chunk size and pack size limit.
    pub fn new(store: &'a ObjectStore) -> Self {
        Repacker {
            store,
            chunk_size: store.config().chunk_size,
            size_limit: store.config().pack_size_limit,
            prune_loose: false,
        }
    }

    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Delete the loose copy of every object once it is safely packed.
    pub fn prune_loose(mut self, prune: bool) -> Self {
        self.prune_loose = prune;
        self
    }

    /// Repack everything reachable from `head` and replace the store's pack set with the result.
    pub fn run(&self, head: &CommitChainItem) -> Result<RepackReport, GitError> {
        info!("repack start: head {}", head.commit_id);
        let objects = self.pack_objects(head)?;
        let deltas = objects.iter().filter(|o| o.block.is_delta()).count();
        let packed: Vec<ObjectHash> = objects.iter().map(|o| o.id).collect();

        let packs = build_packs(&objects, self.size_limit)?;
        let removed = self.install(&packs)?;

        if self.prune_loose {
            for id in &packed {
                self.store.delete_loose(id)?;
            }
        }

        let report = RepackReport {
            packs: packs.iter().map(EncodedPack::pack_name).collect(),
            removed,
            packed,
            deltas,
        };
        info!(
            "repack end: {} objects ({} deltas) in {} packs, {} packs removed",
            report.packed.len(),
            report.deltas,
            report.packs.len(),
            report.removed.len()
        );
        Ok(report)
    }

    /// The blocks of a repack of `head`, in pack order.
    pub fn pack_objects(&self, head: &CommitChainItem) -> Result<Vec<PackedObject>, GitError> {
        let plan = plan_blocks(head);
        debug!("planned {} blocks", plan.len());
        let objects = plan
            .par_iter()
            .map(|planned| self.encode_block(planned))
            .collect::<Result<Vec<_>, GitError>>()?;
        order_blocks(head, objects)
    }

    fn encode_block(&self, planned: &PlannedBlock) -> Result<PackedObject, GitError> {
        let target = self.store.read(&planned.id)?;
        if let Some(base_id) = planned.base {
            let base = self.store.read(&base_id)?;
            // a delta inherits its base's kind, so a kind change needs a full copy
            if base.kind == target.kind {
                let deltas = make_deltas_with_chunk_size(&target.data, &base.data, self.chunk_size);
                debug!(
                    "{} {}: ref-delta on {}, {:.0}% copied",
                    target.kind,
                    planned.id,
                    base_id,
                    copied_ratio(&deltas) * 100.0
                );
                return Ok(PackedObject {
                    id: planned.id,
                    block: Block::RefDelta { base_id, deltas },
                });
            }
        }
        debug!("{} {}: base", target.kind, planned.id);
        Ok(PackedObject {
            id: planned.id,
            block: Block::Base {
                kind: target.kind,
                content: target.data,
            },
        })
    }

    /// Write packs and indexes, switch the manifest over to them, then delete every pack the new
    /// manifest does not list. Returns the deleted pack names.
    fn install(&self, packs: &[EncodedPack]) -> Result<Vec<String>, GitError> {
        let fs = self.store.fs();
        let old = self.store.manifest()?;

        for pack in packs {
            fs.write(&pack_path(&pack.pack_name()), &pack.pack)?;
            fs.write(&pack_path(&pack.idx_name()), &pack.index)?;
            debug!(
                "wrote {} ({} bytes, {} objects)",
                pack.pack_name(),
                pack.pack.len(),
                pack.entries.len()
            );
        }

        let manifest = PackManifest::from_names(packs.iter().map(EncodedPack::pack_name));
        fs.write(MANIFEST_TMP_PATH, &manifest.to_json()?)?;
        fs.rename(MANIFEST_TMP_PATH, MANIFEST_PATH)?;

        let mut stale: Vec<String> = old
            .names()
            .filter(|name| !manifest.contains(name))
            .map(str::to_string)
            .collect();
        for file in fs.list(PACK_DIR)? {
            let name = if let Some(stem) = file.strip_suffix(".idx") {
                format!("{stem}.pack")
            } else if file.ends_with(".pack") {
                file
            } else {
                continue;
            };
            if name.starts_with("pack_") && !manifest.contains(&name) && !stale.contains(&name) {
                stale.push(name);
            }
        }
        for name in &stale {
            fs.delete(&pack_path(name))?;
            fs.delete(&pack_path(&idx_file_name(name)))?;
            debug!("deleted stale pack {}", name);
        }

        self.store.invalidate_packs();
        Ok(stale)
    }
}

/// Repack `head` into `store` with the store's settings.
pub fn repack(store: &ObjectStore, head: &CommitChainItem) -> Result<RepackReport, GitError> {
    Repacker::new(store).run(head)
}

/// Decide, for every object reachable from `head`, whether it is stored whole or against which
/// preceding version. Each id is planned once, by the first history it shows up in.
fn plan_blocks(head: &CommitChainItem) -> Vec<PlannedBlock> {
    let mut placed = HashSet::new();
    let mut plan = Vec::new();

    for path in head.chain_paths() {
        let commits: Vec<&CommitChainItem> = path
            .into_iter()
            .rev()
            .filter(|commit| !commit.commit_id.is_zero())
            .collect();

        let mut histories: Vec<Vec<ObjectHash>> = Vec::new();
        let mut by_path: HashMap<&str, usize> = HashMap::new();
        for commit in &commits {
            for entry in &commit.entries {
                let slot = *by_path.entry(entry.path.as_str()).or_insert_with(|| {
                    histories.push(Vec::new());
                    histories.len() - 1
                });
                histories[slot].push(entry.id);
            }
        }
        histories.push(commits.iter().map(|commit| commit.commit_id).collect());

        for history in histories {
            let mut previous = None;
            for id in history {
                if id.is_zero() {
                    continue;
                }
                if placed.insert(id) {
                    plan.push(PlannedBlock { id, base: previous });
                }
                previous = Some(id);
            }
        }
    }
    plan
}

/// Lay `objects` out breadth-first over the chain: each commit, then its entries, then the next
/// generation of parents. Ids already laid out are not repeated.
fn order_blocks(
    head: &CommitChainItem,
    objects: Vec<PackedObject>,
) -> Result<Vec<PackedObject>, GitError> {
    let mut by_id: HashMap<ObjectHash, PackedObject> =
        objects.into_iter().map(|o| (o.id, o)).collect();
    let mut emitted = HashSet::new();
    let mut ordered = Vec::with_capacity(by_id.len());

    let mut level = vec![head];
    while !level.is_empty() {
        for commit in &level {
            if commit.commit_id.is_zero() {
                continue;
            }
            let ids = std::iter::once(commit.commit_id).chain(commit.entries.iter().map(|e| e.id));
            for id in ids {
                if id.is_zero() || !emitted.insert(id) {
                    continue;
                }
                let object = by_id.remove(&id).ok_or_else(|| {
                    GitError::PackEncodeError(format!("no block was built for {id}"))
                })?;
                ordered.push(object);
            }
        }
        level = level.iter().copied().flat_map(|c| c.parents.iter()).collect();
    }
    Ok(ordered)
}
