//! Tag allocation and recycling
//!
//! `get_next` always hands out the oldest unused tag before generating a
//! fresh one. Generating a tag does not reserve it: the row only appears
//! (or flips back to in use) through `create_if_not_exists`, which asset
//! creation calls inside its own transaction.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use svix_ksuid::{Ksuid, KsuidLike};
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::traits::TagStore;
use crate::storage::transaction::{Database, OpContext};
use crate::storage::types::{ListPage, ListTagsQuery, StoredTag};

const NANOID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H',
    'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];
const NANOID_LENGTH: usize = 6;

/// How fresh tags are generated once no unused tag is left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TagAlgorithm {
    /// Six characters from `0-9A-Z`.
    #[default]
    Nanoid,
    /// 27 character, time-ordered base62 id.
    Ksuid,
    /// Canonical hyphenated UUIDv4.
    Uuid,
    /// Zero-padded counter following the tag table's insertion sequence.
    Sequential,
}

impl FromStr for TagAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nanoid" => Ok(TagAlgorithm::Nanoid),
            "ksuid" => Ok(TagAlgorithm::Ksuid),
            "uuid" => Ok(TagAlgorithm::Uuid),
            "sequential" => Ok(TagAlgorithm::Sequential),
            other => Err(Error::UnknownTagAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for TagAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TagAlgorithm::Nanoid => "nanoid",
            TagAlgorithm::Ksuid => "ksuid",
            TagAlgorithm::Uuid => "uuid",
            TagAlgorithm::Sequential => "sequential",
        })
    }
}

pub struct TagAllocator<T: TagStore> {
    db: Arc<Database>,
    store: Arc<T>,
    algorithm: TagAlgorithm,
}

impl<T: TagStore> TagAllocator<T> {
    pub fn new(db: Arc<Database>, store: Arc<T>, algorithm: TagAlgorithm) -> Self {
        Self {
            db,
            store,
            algorithm,
        }
    }

    pub fn algorithm(&self) -> TagAlgorithm {
        self.algorithm
    }

    pub fn list(&self, ctx: &OpContext<'_>, query: &ListTagsQuery) -> Result<ListPage<StoredTag>> {
        self.db.read(ctx, |exec| self.store.list(exec, query))
    }

    /// The next tag to hand out: a recycled one if any, else a new candidate.
    pub fn get_next(&self, ctx: &OpContext<'_>) -> Result<String> {
        self.db.in_transaction(ctx, |_, exec| {
            if let Some(unused) = self.store.get_unused(exec)? {
                debug!(tag = %unused, "recycling unused tag");
                return Ok(unused);
            }

            let tag = match self.algorithm {
                TagAlgorithm::Nanoid => nanoid(),
                TagAlgorithm::Ksuid => ksuid(),
                TagAlgorithm::Uuid => uuid::Uuid::new_v4().to_string(),
                TagAlgorithm::Sequential => format!("{:06}", self.store.next_sequential(exec)?),
            };
            debug!(tag = %tag, algorithm = %self.algorithm, "generated tag");
            Ok(tag)
        })
    }

    /// `None` when the tag has never been created.
    pub fn get(&self, ctx: &OpContext<'_>, tag: &str) -> Result<Option<StoredTag>> {
        self.db.read(ctx, |exec| match self.store.get(exec, tag) {
            Ok(found) => Ok(Some(found)),
            Err(Error::TagNotFound) => Ok(None),
            Err(e) => Err(e),
        })
    }

    /// Reserve `tag`, creating its row if needed. Safe to call repeatedly.
    pub fn create_if_not_exists(&self, ctx: &OpContext<'_>, tag: &str) -> Result<StoredTag> {
        if tag.is_empty() {
            return Err(Error::InvalidTag);
        }

        self.db.in_transaction(ctx, |_, exec| {
            match self.store.get(exec, tag) {
                Ok(mut found) => {
                    self.store.mark_used(exec, tag)?;
                    found.in_use = true;
                    return Ok(found);
                }
                Err(Error::TagNotFound) => {}
                Err(e) => return Err(e),
            }

            self.store.create(exec, tag)?;
            self.store.get(exec, tag)
        })
    }

    /// Release a tag for recycling. The row stays.
    pub fn mark_tag_unused(&self, ctx: &OpContext<'_>, tag: &str) -> Result<()> {
        self.db
            .in_transaction(ctx, |_, exec| self.store.mark_unused(exec, tag))
    }

    /// Remove a tag for good. Does nothing while the tag is in use.
    pub fn delete(&self, ctx: &OpContext<'_>, tag: &str) -> Result<()> {
        self.db
            .in_transaction(ctx, |_, exec| self.store.delete(exec, tag))
    }
}

fn nanoid() -> String {
    nanoid::nanoid!(NANOID_LENGTH, &NANOID_ALPHABET)
}

fn ksuid() -> String {
    Ksuid::new(None, None).to_string()
}
