//! Tag types

use serde::{Deserialize, Serialize};

use super::stored::{Editable, Stored};
use crate::storage::ids::TagId;

/// A short human-facing identifier that can be stuck on an asset.
///
/// A tag with `in_use == false` is free to be handed out again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag: String,
    pub in_use: bool,
}

pub type StoredTag = Stored<TagId, Editable<Tag>>;

#[derive(Clone, Debug, Default)]
pub struct ListTagsQuery {
    pub in_use: Option<bool>,
    pub page: u64,
    pub page_size: u64,
}

impl ListTagsQuery {
    pub const DEFAULT_PAGE_SIZE: u64 = 50;
    pub const MAX_PAGE_SIZE: u64 = 100;

    /// Page size after applying the default and the upper bound.
    pub fn effective_page_size(&self) -> u64 {
        match self.page_size {
            0 => Self::DEFAULT_PAGE_SIZE,
            n => n.min(Self::MAX_PAGE_SIZE),
        }
    }
}
