//! Row wrappers
//!
//! - `Stored<Id, T>` pairs a row's content with its id and creation time
//! - `Editable<T>` adds the last update time for rows that can change
//!
//! Tags, files and assets are all `Stored<Id, Editable<T>>`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ops::{Deref, DerefMut};

#[derive(Clone, Debug, Serialize)]
pub struct Stored<Id, T> {
    pub id: Id,
    #[serde(flatten)]
    pub content: T,
    pub created_at: DateTime<Utc>,
}

impl<Id, T> Stored<Id, T> {
    pub fn new(id: Id, content: T, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            content,
            created_at,
        }
    }

    pub fn into_content(self) -> T {
        self.content
    }
}

impl<Id: Copy, T> Stored<Id, T> {
    pub fn id(&self) -> Id {
        self.id
    }
}

impl<Id, T> Deref for Stored<Id, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.content
    }
}

impl<Id, T> DerefMut for Stored<Id, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.content
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Editable<T> {
    #[serde(flatten)]
    pub content: T,
    pub updated_at: DateTime<Utc>,
}

impl<T> Editable<T> {
    pub fn new(content: T, updated_at: DateTime<Utc>) -> Self {
        Self {
            content,
            updated_at,
        }
    }

    pub fn into_content(self) -> T {
        self.content
    }
}

impl<T> Deref for Editable<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.content
    }
}

impl<T> DerefMut for Editable<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.content
    }
}
