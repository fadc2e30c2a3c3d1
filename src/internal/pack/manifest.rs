//! The packs manifest, stored as JSON at `objects/info/packs`, lists every live pack by file
//! name. Packs absent from the manifest are never read.

use serde::{Deserialize, Serialize};

use crate::errors::GitError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackManifestItem {
    /// Pack file name, e.g. `pack_<checksum>.pack`.
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackManifest {
    pub items: Vec<PackManifestItem>,
}

impl PackManifest {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PackManifest {
            items: names
                .into_iter()
                .map(|name| PackManifestItem { name: name.into() })
                .collect(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, GitError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, GitError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
