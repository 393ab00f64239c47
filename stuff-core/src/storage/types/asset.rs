//! Asset types
//!
//! An asset owns its parts and purchases outright: they are rewritten as a
//! whole on every update and carry no identity of their own across updates.
//! Files, children and the parent are read-side relations, only filled in
//! when a query asks for them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::file::StoredFile;
use super::stored::{Editable, Stored};
use crate::storage::ids::AssetId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    #[default]
    Asset,
    Component,
    Consumable,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    #[default]
    InStorage,
    InUse,
    Archived,
}

macro_rules! db_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!("unknown {}: {other}", stringify!($ty))),
                }
            }
        }

        impl rusqlite::types::ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl rusqlite::types::FromSql for $ty {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}

db_enum!(AssetType {
    Asset => "ASSET",
    Component => "COMPONENT",
    Consumable => "CONSUMABLE",
});

db_enum!(AssetStatus {
    InStorage => "IN_STORAGE",
    InUse => "IN_USE",
    Archived => "ARCHIVED",
});

/// Free-form attribute attached to an asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomAttr {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub value: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub tag: String,
    pub name: String,
    pub location: String,
    pub position_code: String,
    pub notes: String,
    pub created_by: Option<i64>,
}

/// Amount in minor currency units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonetaryAmount(pub i64);

impl MonetaryAmount {
    pub fn format(&self, decimal_separator: &str) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}{decimal_separator}{:02}", abs / 100, abs % 100)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub supplier: String,
    pub order_no: String,
    pub order_date: Option<NaiveDate>,
    pub amount: MonetaryAmount,
    pub currency: String,
    pub created_by: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Asset {
    pub asset_type: AssetType,
    pub status: AssetStatus,
    pub tag: String,
    pub name: String,
    pub category: String,
    pub model: String,
    pub model_no: String,
    pub serial_no: String,
    pub manufacturer: String,
    pub notes: String,
    pub parent_asset_id: Option<AssetId>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub warranty_until: Option<NaiveDate>,
    pub quantity: u64,
    pub quantity_unit: String,
    #[serde(default)]
    pub custom_attrs: Vec<CustomAttr>,
    pub checked_out_to: Option<i64>,
    pub location: String,
    pub position_code: String,
    pub parts_total_counter: u32,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
    pub created_by: Option<i64>,

    #[serde(skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<StoredFile>,
    #[serde(skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StoredAsset>,
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<StoredAsset>>,
}

impl Asset {
    pub fn new(tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

pub type StoredAsset = Stored<AssetId, Editable<Asset>>;

/// Look up one asset by id or by tag.
#[derive(Clone, Debug)]
pub struct GetAssetQuery {
    pub key: AssetKey,
    pub with_parts: bool,
    pub with_purchases: bool,
    pub with_files: bool,
    pub with_children: bool,
    pub with_parent: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetKey {
    Id(AssetId),
    Tag(String),
}

impl GetAssetQuery {
    pub fn by_id(id: AssetId) -> Self {
        Self::new(AssetKey::Id(id))
    }

    pub fn by_tag(tag: impl Into<String>) -> Self {
        Self::new(AssetKey::Tag(tag.into()))
    }

    fn new(key: AssetKey) -> Self {
        Self {
            key,
            with_parts: false,
            with_purchases: false,
            with_files: false,
            with_children: false,
            with_parent: false,
        }
    }

    pub fn with_parts(mut self) -> Self {
        self.with_parts = true;
        self
    }

    pub fn with_purchases(mut self) -> Self {
        self.with_purchases = true;
        self
    }

    pub fn with_files(mut self) -> Self {
        self.with_files = true;
        self
    }

    pub fn with_children(mut self) -> Self {
        self.with_children = true;
        self
    }

    pub fn with_parent(mut self) -> Self {
        self.with_parent = true;
        self
    }

    /// Every relation.
    pub fn full(self) -> Self {
        self.with_parts()
            .with_purchases()
            .with_files()
            .with_children()
            .with_parent()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderDir {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, Default)]
pub struct ListAssetsQuery {
    /// Full-text query over the searchable columns.
    pub search: Option<String>,
    /// Column-scoped search terms, e.g. `("location", "shelf")`.
    pub fields: Vec<(String, String)>,
    pub ids: Vec<AssetId>,
    pub asset_type: Option<AssetType>,
    pub order_by: Option<String>,
    pub order_dir: OrderDir,
    pub page: u64,
    pub page_size: u64,
}

impl ListAssetsQuery {
    pub const DEFAULT_PAGE_SIZE: u64 = 50;
    pub const MAX_PAGE_SIZE: u64 = 100;

    pub fn effective_page_size(&self) -> u64 {
        match self.page_size {
            0 => Self::DEFAULT_PAGE_SIZE,
            n => n.min(Self::MAX_PAGE_SIZE),
        }
    }
}
