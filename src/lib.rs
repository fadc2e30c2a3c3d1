//! gitlite-store: the storage engine of a small version-control system. Content-addressed
//! objects, a chunk-matching binary delta codec and pack files with fanout indexes.
//!
//! Goals
//! - Store commits, trees and blobs as opaque payloads identified by the SHA-1 of their
//!   envelope, loose or packed.
//! - Keep history compact: successive versions of a path are stored as deltas against the
//!   version before them.
//! - Fail loudly on any format or integrity violation; never return bytes whose id does not
//!   check out.
//!
//! Modules
//! - `delta`: chunk matcher (`make_deltas`), `apply_deltas` and the instruction codec.
//! - `internal::pack`: block codec, pack framing and splitting, index, manifest, caches.
//! - `internal::object`: object kinds and the `"{kind} {len}\0{data}"` envelope.
//! - `internal::zlib`: compression helpers and a hashing inflate reader.
//! - `store`: the object store and delta-chain resolver over a `Vfs`.
//! - `repack`: rewrites a commit chain's history into size-bounded packs.
//! - `config`, `errors`, `hash`, `utils`: settings, error types, ids and hashing helpers.
//!
//! Typical Usage
//! - `ObjectStore::open(dir)` then `write` / `read` / `exists` objects.
//! - `repack(&store, &head)` to pack everything reachable from a commit chain.

pub mod config;
pub mod delta;
pub mod errors;
pub mod hash;
pub mod internal;
pub mod repack;
pub mod store;
pub mod utils;

pub use config::StoreConfig;
pub use delta::{Delta, apply_deltas, make_deltas};
pub use errors::GitError;
pub use hash::ObjectHash;
pub use internal::object::{ObjectEnvelope, types::ObjectType};
pub use repack::{CommitChainItem, RepackReport, Repacker, TrackedEntry, repack};
pub use store::{
    ObjectStore,
    fs::{LocalFs, Vfs},
};
