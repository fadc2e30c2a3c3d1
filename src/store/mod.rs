//! Object store and resolver.
//!
//! Objects live either loose, one zlib file per object at `objects/<2 hex>/<38 hex>`, or in packs
//! listed by the manifest at `objects/info/packs`. Reads try the object cache, then loose
//! storage, then every registered pack in manifest order. A ref-delta block is resolved by
//! walking its base chain down to a full object and replaying the deltas upwards; every object
//! rebuilt this way is re-hashed against its id before it is returned or cached.

pub mod fs;

use std::{
    collections::HashSet,
    io::{self, Cursor},
    path::PathBuf,
    sync::{Arc, RwLock},
};

use bytes::Bytes;
use tracing::debug;

use crate::{
    config::StoreConfig,
    delta::{Delta, apply_deltas},
    errors::GitError,
    hash::ObjectHash,
    internal::{
        object::ObjectEnvelope,
        pack::{
            PackFile,
            block::Block,
            cache::{ObjectCache, PackCache},
            idx_file_name,
            manifest::PackManifest,
            pack_file_name,
            pack_index::PackIndex,
        },
        zlib::{self, stream::inflate::ReadBoxed},
    },
    store::fs::{LocalFs, Vfs},
};

pub const PACK_DIR: &str = "objects/pack";
pub const MANIFEST_PATH: &str = "objects/info/packs";

/// Relative path of the loose file for `id`.
pub fn loose_path(id: &ObjectHash) -> String {
    let hex = id.to_string();
    format!("objects/{}/{}", &hex[..2], &hex[2..])
}

/// Relative path of a file in the pack directory.
pub fn pack_path(name: &str) -> String {
    format!("{PACK_DIR}/{name}")
}

/// Content-addressed store over a [`Vfs`]. All methods take `&self`; the store can be shared
/// between threads.
pub struct ObjectStore {
    fs: Arc<dyn Vfs>,
    config: StoreConfig,
    objects: ObjectCache,
    indexes: PackCache<Arc<PackIndex>>,
    packs: PackCache<Bytes>,
    /// Parsed `objects/info/packs`, loaded on first use.
    manifest: RwLock<Option<Arc<PackManifest>>>,
}

impl ObjectStore {
    pub fn new(fs: Arc<dyn Vfs>, config: StoreConfig) -> Result<Self, GitError> {
        let cache_bytes = config.object_cache_bytes()?;
        Ok(ObjectStore {
            fs,
            objects: ObjectCache::new(cache_bytes),
            indexes: PackCache::new(config.pack_cache_capacity),
            packs: PackCache::new(config.pack_cache_capacity),
            manifest: RwLock::new(None),
            config,
        })
    }

    /// Store rooted at a local directory, with default settings.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GitError> {
        Self::new(Arc::new(LocalFs::new(root)), StoreConfig::default())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn fs(&self) -> &Arc<dyn Vfs> {
        &self.fs
    }

    /// Store `object` loose and return its id. Writing an id that is already loose is a no-op.
    pub fn write(&self, object: &ObjectEnvelope) -> Result<ObjectHash, GitError> {
        let id = object.id();
        let path = loose_path(&id);
        if self.fs.exists(&path) {
            return Ok(id);
        }
        let compressed = zlib::compress(&object.to_bytes())?;
        self.fs.write(&path, &compressed)?;
        debug!("wrote loose object {} ({})", id, object);
        Ok(id)
    }

    /// Read the object stored under `id`, from loose storage or any registered pack.
    pub fn read(&self, id: &ObjectHash) -> Result<ObjectEnvelope, GitError> {
        if let Some(object) = self.objects.get(id) {
            return Ok(object);
        }
        if let Some(object) = self.read_loose(id)? {
            self.objects.insert(*id, object.clone());
            return Ok(object);
        }
        match self.read_packed(id)? {
            Some(object) => Ok(object),
            None => Err(GitError::ObjectNotFound(id.to_string())),
        }
    }

    /// `true` when `id` is stored loose or in any registered pack.
    pub fn exists(&self, id: &ObjectHash) -> Result<bool, GitError> {
        if self.fs.exists(&loose_path(id)) {
            return Ok(true);
        }
        for name in self.manifest()?.names() {
            if self.pack_index(name)?.contains(id) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove the loose copy of `id`, typically after a repack placed it in a pack.
    pub fn delete_loose(&self, id: &ObjectHash) -> Result<(), GitError> {
        self.fs.delete(&loose_path(id))?;
        self.objects.remove(id);
        Ok(())
    }

    /// The pack manifest; empty when no pack was ever written. It is read from disk once and
    /// then served from memory until [`ObjectStore::invalidate_packs`].
    pub fn manifest(&self) -> Result<Arc<PackManifest>, GitError> {
        if let Some(manifest) = self.manifest.read().ok().and_then(|slot| slot.clone()) {
            return Ok(manifest);
        }
        let manifest = Arc::new(match self.fs.read(MANIFEST_PATH) {
            Ok(bytes) => PackManifest::from_json(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => PackManifest::default(),
            Err(e) => return Err(e.into()),
        });
        debug!("loaded pack manifest with {} packs", manifest.items.len());
        if let Ok(mut slot) = self.manifest.write() {
            *slot = Some(manifest.clone());
        }
        Ok(manifest)
    }

    /// Every id held by any registered pack, in manifest then index order, without repeats.
    pub fn packed_ids(&self) -> Result<Vec<ObjectHash>, GitError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for name in self.manifest()?.names() {
            for id in self.pack_index(name)?.ids() {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Resolve every packed object.
    pub fn read_all_objects(&self) -> Result<Vec<(ObjectHash, ObjectEnvelope)>, GitError> {
        self.packed_ids()?
            .into_iter()
            .map(|id| self.read(&id).map(|object| (id, object)))
            .collect()
    }

    /// Forget the cached manifest, indexes and pack buffers; called whenever the pack set
    /// changes.
    pub fn invalidate_packs(&self) {
        if let Ok(mut slot) = self.manifest.write() {
            *slot = None;
        }
        self.indexes.clear();
        self.packs.clear();
    }

    fn read_loose(&self, id: &ObjectHash) -> Result<Option<ObjectEnvelope>, GitError> {
        let compressed = match self.fs.read(&loose_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut reader = ReadBoxed::new(Cursor::new(compressed));
        let object = ObjectEnvelope::from_buf_read(&mut reader, id)?;
        debug!("read loose object {}", id);
        Ok(Some(object))
    }

    fn pack_index(&self, name: &str) -> Result<Arc<PackIndex>, GitError> {
        if let Some(index) = self.indexes.get(name) {
            return Ok(index);
        }
        let bytes = self.fs.read(&pack_path(&idx_file_name(name)))?;
        let index = PackIndex::parse(&bytes)?;
        if pack_file_name(&index.pack_checksum()) != name {
            return Err(GitError::InvalidIdxFile(format!(
                "index for `{name}` describes pack {}",
                index.pack_checksum()
            )));
        }
        let index = Arc::new(index);
        self.indexes.insert(name.to_string(), index.clone());
        Ok(index)
    }

    fn pack_bytes(&self, name: &str) -> Result<Bytes, GitError> {
        if let Some(bytes) = self.packs.get(name) {
            return Ok(bytes);
        }
        let bytes = Bytes::from(self.fs.read(&pack_path(name))?);
        let checksum = PackFile::verify(&bytes)?;
        if pack_file_name(&checksum) != name {
            return Err(GitError::InvalidPackFile(format!(
                "`{name}` has trailer checksum {checksum}"
            )));
        }
        self.packs.insert(name.to_string(), bytes.clone());
        Ok(bytes)
    }

    /// First registered pack holding `id`, with the block found there.
    fn find_block(&self, id: &ObjectHash) -> Result<Option<(String, u64, Block)>, GitError> {
        for name in self.manifest()?.names() {
            let index = self.pack_index(name)?;
            if let Some(offset) = index.find_offset(id) {
                let bytes = self.pack_bytes(name)?;
                let block = PackFile::read_block_at(&bytes, offset as usize)?;
                debug!("found {} in {} at offset {}", id, name, offset);
                return Ok(Some((name.to_string(), offset, block)));
            }
        }
        Ok(None)
    }

    /// Resolve `id` from the packs: follow ref-delta bases until a full object turns up, then
    /// apply the collected deltas from the bottom of the chain upwards.
    fn read_packed(&self, id: &ObjectHash) -> Result<Option<ObjectEnvelope>, GitError> {
        let mut chain: Vec<(ObjectHash, Vec<Delta>)> = Vec::new();
        let mut seen = HashSet::new();
        let mut current = *id;

        let mut object = loop {
            if !seen.insert(current) {
                return Err(GitError::InvalidPackFile(format!(
                    "delta chain of {id} loops back to {current}"
                )));
            }
            if current != *id {
                if let Some(object) = self.objects.get(&current) {
                    break object;
                }
                if let Some(object) = self.read_loose(&current)? {
                    break object;
                }
            }

            let Some((pack, offset, block)) = self.find_block(&current)? else {
                if chain.is_empty() {
                    return Ok(None);
                }
                return Err(GitError::ObjectNotFound(format!(
                    "{current} (delta base of {id})"
                )));
            };
            match block {
                Block::Base { kind, content } => {
                    let object = ObjectEnvelope::new(kind, content);
                    verify(&current, &object, &pack)?;
                    self.objects.insert(current, object.clone());
                    break object;
                }
                Block::RefDelta { base_id, deltas } => {
                    chain.push((current, deltas));
                    current = base_id;
                }
                Block::OfsDelta { .. } => {
                    return Err(GitError::UnsupportedOfsDelta {
                        id: current,
                        pack,
                        offset,
                    });
                }
            }
        };

        for (target_id, deltas) in chain.into_iter().rev() {
            let data = apply_deltas(&deltas, &object.data)?;
            object = ObjectEnvelope::new(object.kind, data);
            verify(&target_id, &object, "delta chain")?;
            self.objects.insert(target_id, object.clone());
        }
        Ok(Some(object))
    }
}

fn verify(id: &ObjectHash, object: &ObjectEnvelope, source: &str) -> Result<(), GitError> {
    let actual = object.id();
    if actual != *id {
        return Err(GitError::ChecksumMismatch {
            target: format!("object {id} from {source}"),
            expected: *id,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        delta::make_deltas,
        internal::{
            object::types::ObjectType,
            pack::{PackFile, block::PackedObject},
        },
    };

    fn temp_store() -> (tempfile::TempDir, ObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        (dir, store)
    }

    /// Write one pack by hand and register it as the only manifest entry.
    fn install(store: &ObjectStore, objects: &[PackedObject]) -> String {
        let encoded = PackFile::build(objects).unwrap();
        let name = encoded.pack_name();
        store.fs().write(&pack_path(&name), &encoded.pack).unwrap();
        store.fs().write(&pack_path(&encoded.idx_name()), &encoded.index).unwrap();
        let manifest = PackManifest::from_names([name.clone()]);
        store.fs().write(MANIFEST_PATH, &manifest.to_json().unwrap()).unwrap();
        store.invalidate_packs();
        name
    }

    #[test]
    fn loose_write_then_read() {
        let (dir, store) = temp_store();
        let object = ObjectEnvelope::blob(b"hello".to_vec());
        let id = store.write(&object).unwrap();
        assert_eq!(id, object.id());
        assert!(dir.path().join(loose_path(&id)).is_file());
        assert!(store.exists(&id).unwrap());
        assert_eq!(store.read(&id).unwrap(), object);

        // a second write is a no-op
        assert_eq!(store.write(&object).unwrap(), id);
    }

    #[test]
    fn loose_path_is_sharded() {
        let id: ObjectHash = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391".parse().unwrap();
        assert_eq!(
            loose_path(&id),
            "objects/e6/9de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }

    #[test]
    fn missing_object_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store.read(&ObjectHash([7; 20])).unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.exists(&ObjectHash([7; 20])).unwrap());
    }

    #[test]
    fn corrupt_loose_object_is_an_integrity_error() {
        let (_dir, store) = temp_store();
        let object = ObjectEnvelope::blob(b"original".to_vec());
        let id = object.id();
        let other = zlib::compress(&ObjectEnvelope::blob(b"tampered".to_vec()).to_bytes()).unwrap();
        store.fs().write(&loose_path(&id), &other).unwrap();
        assert!(matches!(
            store.read(&id),
            Err(GitError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn undecodable_loose_object_is_a_format_error() {
        let (_dir, store) = temp_store();
        let id = ObjectEnvelope::blob(b"never stored".to_vec()).id();
        store.fs().write(&loose_path(&id), b"not zlib at all").unwrap();
        match store.read(&id) {
            Err(GitError::InvalidObjectInfo(msg)) => assert!(msg.contains(&id.to_string())),
            other => panic!("unexpected result {other:?}"),
        }

        let mut truncated = zlib::compress(&b"blob 400\0".repeat(50)).unwrap();
        truncated.truncate(truncated.len() / 2);
        store.fs().write(&loose_path(&id), &truncated).unwrap();
        assert!(matches!(
            store.read(&id),
            Err(GitError::InvalidObjectInfo(_))
        ));
    }

    #[test]
    fn manifest_is_cached_until_invalidated() {
        let (_dir, store) = temp_store();
        let object = ObjectEnvelope::blob(b"packed only".to_vec());
        let name = install(
            &store,
            &[PackedObject {
                id: object.id(),
                block: Block::Base {
                    kind: ObjectType::Blob,
                    content: object.data.clone(),
                },
            }],
        );
        assert!(store.exists(&object.id()).unwrap());
        let first = store.manifest().unwrap();
        assert!(Arc::ptr_eq(&first, &store.manifest().unwrap()));

        // a rewrite on disk is not seen until the pack caches are dropped
        let empty = PackManifest::default();
        store.fs().write(MANIFEST_PATH, &empty.to_json().unwrap()).unwrap();
        assert!(store.manifest().unwrap().contains(&name));
        assert!(store.exists(&object.id()).unwrap());

        store.invalidate_packs();
        assert!(store.manifest().unwrap().is_empty());
        assert!(!store.exists(&object.id()).unwrap());
    }

    #[test]
    fn ref_delta_chain_resolves() {
        let (_dir, store) = temp_store();
        let v1 = ObjectEnvelope::blob(b"line one\nline two\nline three\n".to_vec());
        let v2 = ObjectEnvelope::blob(b"line one\nline 2\nline three\n".to_vec());
        let v3 = ObjectEnvelope::blob(b"line one\nline 2\nline three\nline four\n".to_vec());
        let objects = vec![
            PackedObject {
                id: v1.id(),
                block: Block::Base {
                    kind: ObjectType::Blob,
                    content: v1.data.clone(),
                },
            },
            PackedObject {
                id: v2.id(),
                block: Block::RefDelta {
                    base_id: v1.id(),
                    deltas: make_deltas(&v2.data, &v1.data),
                },
            },
            PackedObject {
                id: v3.id(),
                block: Block::RefDelta {
                    base_id: v2.id(),
                    deltas: make_deltas(&v3.data, &v2.data),
                },
            },
        ];
        install(&store, &objects);

        assert_eq!(store.read(&v3.id()).unwrap(), v3);
        assert_eq!(store.read(&v1.id()).unwrap(), v1);
        assert!(store.exists(&v2.id()).unwrap());
        assert_eq!(store.packed_ids().unwrap().len(), 3);

        let all = store.read_all_objects().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|(id, object)| object.id() == *id));
    }

    #[test]
    fn delta_base_may_be_loose() {
        let (_dir, store) = temp_store();
        let base = ObjectEnvelope::new(ObjectType::Tree, b"100644 a.txt 1234\n".to_vec());
        let next = ObjectEnvelope::new(ObjectType::Tree, b"100644 a.txt 1234\n100644 b.txt 99\n".to_vec());
        store.write(&base).unwrap();
        install(
            &store,
            &[PackedObject {
                id: next.id(),
                block: Block::RefDelta {
                    base_id: base.id(),
                    deltas: make_deltas(&next.data, &base.data),
                },
            }],
        );
        let resolved = store.read(&next.id()).unwrap();
        assert_eq!(resolved, next);
        assert_eq!(resolved.kind, ObjectType::Tree);
    }

    #[test]
    fn missing_delta_base_is_not_found() {
        let (_dir, store) = temp_store();
        let target = ObjectEnvelope::blob(b"abcdef".to_vec());
        install(
            &store,
            &[PackedObject {
                id: target.id(),
                block: Block::RefDelta {
                    base_id: ObjectHash([9; 20]),
                    deltas: make_deltas(&target.data, b""),
                },
            }],
        );
        assert!(store.read(&target.id()).unwrap_err().is_not_found());
    }

    #[test]
    fn ofs_delta_fails_explicitly() {
        let (_dir, store) = temp_store();
        let id = ObjectHash([3; 20]);
        let name = install(
            &store,
            &[PackedObject {
                id,
                block: Block::OfsDelta {
                    back_offset: 10,
                    deltas: Vec::new(),
                },
            }],
        );
        match store.read(&id) {
            Err(GitError::UnsupportedOfsDelta {
                id: failed,
                pack,
                offset,
            }) => {
                assert_eq!(failed, id);
                assert_eq!(pack, name);
                assert_eq!(offset, 12);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn delta_cycle_is_rejected() {
        let (_dir, store) = temp_store();
        let a = ObjectHash([0xa; 20]);
        let b = ObjectHash([0xb; 20]);
        install(
            &store,
            &[
                PackedObject {
                    id: a,
                    block: Block::RefDelta {
                        base_id: b,
                        deltas: Vec::new(),
                    },
                },
                PackedObject {
                    id: b,
                    block: Block::RefDelta {
                        base_id: a,
                        deltas: Vec::new(),
                    },
                },
            ],
        );
        assert!(matches!(
            store.read(&a),
            Err(GitError::InvalidPackFile(_))
        ));
    }

    #[test]
    fn packed_object_with_wrong_id_is_rejected() {
        let (_dir, store) = temp_store();
        let claimed = ObjectHash([1; 20]);
        install(
            &store,
            &[PackedObject {
                id: claimed,
                block: Block::Base {
                    kind: ObjectType::Blob,
                    content: b"not what the id says".to_vec(),
                },
            }],
        );
        assert!(matches!(
            store.read(&claimed),
            Err(GitError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn delete_loose_removes_file_and_cache() {
        let (_dir, store) = temp_store();
        let object = ObjectEnvelope::blob(b"temporary".to_vec());
        let id = store.write(&object).unwrap();
        store.read(&id).unwrap();
        store.delete_loose(&id).unwrap();
        assert!(!store.exists(&id).unwrap());
        assert!(store.read(&id).unwrap_err().is_not_found());
    }
}
