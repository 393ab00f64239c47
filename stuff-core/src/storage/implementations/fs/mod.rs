//! Filesystem storage backends

mod blob;

pub use blob::{DEFAULT_PUBLIC_PREFIX, FsBlobStore};
