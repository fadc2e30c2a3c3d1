use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{delta::DEFAULT_CHUNK_SIZE, errors::GitError};

/// Tunables for an [`crate::store::ObjectStore`] and its repacks. Loaded from JSON; every field
/// is optional there and falls back to [`StoreConfig::default`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Chunk width of the delta matcher.
    pub chunk_size: usize,
    /// Heap budget of the object cache: a byte count or a size such as `"64M"`.
    #[serde(deserialize_with = "string_or_usize")]
    pub object_cache_mem_size: String,
    /// Number of parsed indexes (and, separately, pack buffers) kept in memory.
    pub pack_cache_capacity: usize,
    /// Upper bound on the encoded block bytes of one pack written by a repack.
    pub pack_size_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            object_cache_mem_size: "64M".to_string(),
            pack_cache_capacity: 64,
            pack_size_limit: 100_000,
        }
    }
}

impl StoreConfig {
    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GitError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            GitError::InvalidArgument(format!("config `{}`: {e}", path.display()))
        })
    }

    /// [`StoreConfig::object_cache_mem_size`] in bytes.
    pub fn object_cache_bytes(&self) -> Result<usize, GitError> {
        parse_size(&self.object_cache_mem_size)
    }
}

/// Parse `"1024"`, `"512K"`, `"64M"` or `"2G"` (binary multiples, case-insensitive, optional
/// trailing `B`) into bytes.
pub fn parse_size(value: &str) -> Result<usize, GitError> {
    let trimmed = value.trim();
    let upper = trimmed.to_ascii_uppercase();
    let digits = upper.strip_suffix('B').unwrap_or(&upper);
    let (number, shift) = match digits.chars().last() {
        Some('K') => (&digits[..digits.len() - 1], 10),
        Some('M') => (&digits[..digits.len() - 1], 20),
        Some('G') => (&digits[..digits.len() - 1], 30),
        _ => (digits, 0),
    };
    number
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(1usize << shift))
        .ok_or_else(|| GitError::InvalidArgument(format!("invalid size `{value}`")))
}

fn string_or_usize<'deserialize, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'deserialize>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrUSize {
        String(String),
        USize(usize),
    }

    Ok(match StringOrUSize::deserialize(deserializer)? {
        StringOrUSize::String(v) => v,
        StringOrUSize::USize(v) => v.to_string(),
    })
}
