//! File catalogue types

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;

use super::stored::{Editable, Stored};
use crate::storage::ids::{AssetId, FileId};

/// SHA-256 digest of a blob's content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl ToSql for ContentHash {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&self.0)))
    }
}

impl FromSql for ContentHash {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        <[u8; 32]>::column_result(value).map(Self)
    }
}

impl From<ContentHash> for rusqlite::types::Value {
    fn from(hash: ContentHash) -> Self {
        rusqlite::types::Value::Blob(hash.0.to_vec())
    }
}

/// A catalogued file. Several files may share one `sha256` and therefore one blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub asset_id: Option<AssetId>,
    pub name: String,
    pub filetype: String,
    pub sha256: ContentHash,
    pub size_bytes: u64,
    pub public_path: String,
    pub full_path: PathBuf,
    pub created_by: Option<i64>,
}

pub type StoredFile = Stored<FileId, Editable<File>>;

/// An incoming file whose bytes have not been stored yet.
pub struct Upload {
    pub name: String,
    pub filetype: String,
    pub asset_id: Option<AssetId>,
    pub created_by: Option<i64>,
    pub content: Box<dyn Read + Send>,
}

impl Upload {
    pub fn new(name: impl Into<String>, filetype: impl Into<String>, content: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            filetype: filetype.into(),
            asset_id: None,
            created_by: None,
            content: Box::new(content),
        }
    }

    pub fn with_asset(mut self, asset_id: AssetId) -> Self {
        self.asset_id = Some(asset_id);
        self
    }

    /// Extension of the original name including the leading dot, or "".
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("name", &self.name)
            .field("filetype", &self.filetype)
            .field("asset_id", &self.asset_id)
            .field("created_by", &self.created_by)
            .finish_non_exhaustive()
    }
}

pub(crate) fn extension_of(name: &str) -> String {
    std::path::Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Filters for listing files. No page size means every matching row.
#[derive(Clone, Debug, Default)]
pub struct ListFilesQuery {
    pub asset_id: Option<AssetId>,
    pub hashes: Option<Vec<ContentHash>>,
    pub page: u64,
    pub page_size: Option<u64>,
}

impl ListFilesQuery {
    pub fn for_asset(asset_id: AssetId) -> Self {
        Self {
            asset_id: Some(asset_id),
            ..Default::default()
        }
    }

    pub fn for_hashes(hashes: impl IntoIterator<Item = ContentHash>) -> Self {
        Self {
            hashes: Some(hashes.into_iter().collect()),
            ..Default::default()
        }
    }
}
