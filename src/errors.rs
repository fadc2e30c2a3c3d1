//! Error types for the gitlite-store crate.
//!
//! This module defines a unified error enumeration used across the delta codec,
//! pack block/index handling, the object store and repacking. It integrates
//! with `thiserror` to provide rich `Display` implementations and error source
//! chaining where applicable.
//!
//! Notes:
//! - Format errors (malformed bytes) and integrity errors (checksum mismatch) are
//!   always fatal; nothing in the crate downgrades them to warnings.
//! - [`GitError::ObjectNotFound`] is the only recoverable condition: it means the
//!   id was never written, as opposed to being present but corrupt.

use thiserror::Error;

use crate::{delta::errors::GitDeltaError, hash::ObjectHash};

#[derive(Error, Debug)]
/// Unified error enumeration for the gitlite-store library.
///
/// - Used across object parsing, pack encode/decode, index, caching and repack.
/// - Implements `std::error::Error` via `thiserror`.
pub enum GitError {
    /// Invalid or unsupported object type name or pack type number.
    #[error("The `{0}` is not a valid object type.")]
    InvalidObjectType(String),

    /// Malformed or unsupported index (.idx) file.
    #[error("The `{0}` is not a valid idx file.")]
    InvalidIdxFile(String),

    /// Malformed or unsupported pack file.
    #[error("The `{0}` is not a valid pack file.")]
    InvalidPackFile(String),

    /// Invalid pack header magic or entry count.
    #[error("The `{0}` is not a valid pack header.")]
    InvalidPackHeader(String),

    /// A block header carried a type tag this format does not define.
    #[error("Unknown block type {tag} at pack offset {offset}")]
    UnknownBlockType { tag: u8, offset: usize },

    /// An offset-delta block was met while resolving an object.
    #[error("Offset-delta block for {id} in pack `{pack}` at offset {offset} is not supported")]
    UnsupportedOfsDelta {
        id: ObjectHash,
        pack: String,
        offset: u64,
    },

    /// Stored and recomputed checksums disagree.
    #[error("Checksum mismatch in {target}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        target: String,
        expected: ObjectHash,
        actual: ObjectHash,
    },

    /// Invalid CLI or function argument.
    #[error("Argument parse failed: {0}")]
    InvalidArgument(String),

    /// I/O error from the underlying filesystem.
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    /// Invalid SHA1 hash formatting or value.
    #[error("The {0} is not a valid Hash value ")]
    InvalidHashValue(String),

    /// Delta encode/decode or application error.
    #[error("Delta Object Error Info:{0}")]
    DeltaObjectError(#[from] GitDeltaError),

    /// Invalid decoded object info (envelope header, payload length).
    #[error("Error decode in the Object ,info:{0}")]
    InvalidObjectInfo(String),

    /// Failed to encode blocks to a pack.
    #[error("Can't encode entries to pack: {0}")]
    PackEncodeError(String),

    /// Object missing from loose storage and every registered pack.
    #[error("Can't find specific object: {0}")]
    ObjectNotFound(String),

    /// The pack manifest could not be read or written.
    #[error("Pack manifest error: {0}")]
    ManifestError(#[from] serde_json::Error),
}

impl GitError {
    /// `true` when the error only says the object was never stored.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitError::ObjectNotFound(_))
    }
}
