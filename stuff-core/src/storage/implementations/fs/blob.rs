//! Content-addressed blob storage on the local filesystem
//!
//! Every byte of a blob's SHA-256 digest becomes one directory level, with
//! the last byte plus the upload's extension as the file name:
//!
//! ```text
//! <root>/b9/4d/27/.../fc/de/e9.txt
//! ```
//!
//! Uploads are streamed into a scratch file in a separate temp directory
//! and renamed into place once the digest is known, so a partial write is
//! never visible under the root.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::{NamedTempFile, PersistError};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::traits::BlobStore;
use crate::storage::transaction::OpContext;
use crate::storage::types::file::{ContentHash, File, Upload};

pub const DEFAULT_PUBLIC_PREFIX: &str = "/assets/files";

const CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    tmp_dir: PathBuf,
    public_prefix: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_dir: tmp_dir.into(),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
        }
    }

    pub fn with_public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shard path of a blob relative to the root, with a leading slash.
    pub fn relative_path_for(hash: &ContentHash, ext: &str) -> String {
        let mut path = String::with_capacity(3 * 32 + ext.len());
        for byte in hash.as_bytes() {
            path.push('/');
            path.push_str(&hex::encode([*byte]));
        }
        path.push_str(ext);
        path
    }

    pub fn path_for(&self, hash: &ContentHash, ext: &str) -> PathBuf {
        self.root
            .join(Self::relative_path_for(hash, ext).trim_start_matches('/'))
    }

    pub fn public_path_for(&self, hash: &ContentHash, ext: &str) -> String {
        format!("{}{}", self.public_prefix, Self::relative_path_for(hash, ext))
    }

    fn ensure_under_root(&self, path: &Path) -> Result<()> {
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || path == self.root || !path.starts_with(&self.root) {
            return Err(Error::PathOutsideRoot {
                path: path.to_path_buf(),
                root: self.root.clone(),
            });
        }
        Ok(())
    }

    /// Stream the upload into `tmp`, hashing as it goes.
    fn stage(
        &self,
        ctx: &OpContext<'_>,
        upload: &mut Upload,
        tmp: &mut NamedTempFile,
    ) -> Result<(ContentHash, u64)> {
        let mut hasher = Sha256::new();
        let mut size = 0u64;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let out = tmp.as_file_mut();

        loop {
            ctx.check()?;
            let n = match upload.content.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buf[..n]);
            out.write_all(&buf[..n])?;
            size += n as u64;
        }
        out.sync_all()?;

        Ok((ContentHash::from_bytes(hasher.finalize().into()), size))
    }

    /// Delete now-empty directories from `start` upwards, stopping below the root.
    fn prune_empty_dirs(&self, start: Option<&Path>) -> Result<()> {
        let mut dir = start;
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            let empty = match fs::read_dir(current) {
                Ok(mut entries) => entries.next().is_none(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => true,
                Err(e) => return Err(e.into()),
            };
            if !empty {
                break;
            }
            match fs::remove_dir(current) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                // Someone wrote into this shard since we looked.
                Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => break,
                Err(e) => return Err(e.into()),
            }
            dir = current.parent();
        }
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn write_file(&self, ctx: &OpContext<'_>, upload: &mut Upload) -> Result<File> {
        ctx.check()?;
        fs::create_dir_all(&self.tmp_dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(&self.tmp_dir)?;

        let (sha256, size_bytes) = match self.stage(ctx, upload, &mut tmp) {
            Ok(staged) => staged,
            Err(e) => return Err(Error::join(e, tmp.close().map_err(Error::from))),
        };

        let ext = upload.extension();
        let full_path = self.path_for(&sha256, &ext);
        if let Some(parent) = full_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return Err(Error::join(e.into(), tmp.close().map_err(Error::from)));
            }
        }

        tmp.persist(&full_path)
            .map_err(|PersistError { error, file }| {
                Error::join(error.into(), file.close().map_err(Error::from))
            })?;

        debug!(hash = %sha256, size_bytes, path = %full_path.display(), "stored blob");

        Ok(File {
            asset_id: upload.asset_id,
            name: upload.name.clone(),
            filetype: upload.filetype.clone(),
            sha256,
            size_bytes,
            public_path: self.public_path_for(&sha256, &ext),
            full_path,
            created_by: upload.created_by,
        })
    }

    fn remove_file(&self, file: &File) -> Result<()> {
        let path = file.full_path.as_path();
        self.ensure_under_root(path)?;

        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed blob"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "blob already removed");
            }
            Err(e) => return Err(e.into()),
        }

        self.prune_empty_dirs(path.parent())
    }

    fn open(&self, file: &File) -> Result<Box<dyn Read + Send>> {
        self.ensure_under_root(&file.full_path)?;
        match fs::File::open(&file.full_path) {
            Ok(f) => Ok(Box::new(f)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::FileNotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    // sha256("hello world")
    const HELLO_HASH: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn temp_blob_store() -> (TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("files"), dir.path().join("tmp"));
        (dir, store)
    }

    fn upload(name: &str, data: &'static [u8]) -> Upload {
        Upload::new(name, "text/plain", data)
    }

    fn count_entries(path: &Path) -> usize {
        match fs::read_dir(path) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[test]
    fn test_shard_path_layout() {
        let hash = ContentHash::from_hex(HELLO_HASH).unwrap();
        let rel = FsBlobStore::relative_path_for(&hash, ".txt");

        assert!(rel.starts_with("/b9/4d/27/"));
        assert!(rel.ends_with("/de/e9.txt"));
        assert_eq!(rel.matches('/').count(), 32);
    }

    #[test]
    fn test_write_file() {
        let (_dir, store) = temp_blob_store();
        let ctx = OpContext::background();

        let file = store
            .write_file(&ctx, &mut upload("note.txt", b"hello world"))
            .unwrap();

        assert_eq!(file.sha256.to_hex(), HELLO_HASH);
        assert_eq!(file.size_bytes, 11);
        assert_eq!(file.name, "note.txt");
        assert!(file.public_path.starts_with("/assets/files/b9/4d/"));
        assert!(file.public_path.ends_with(".txt"));
        assert_eq!(fs::read(&file.full_path).unwrap(), b"hello world");
        assert_eq!(count_entries(&store.tmp_dir), 0);

        let mut content = String::new();
        store.open(&file).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello world");
    }

    #[test]
    fn test_same_content_same_path() {
        let (_dir, store) = temp_blob_store();
        let ctx = OpContext::background();

        let a = store.write_file(&ctx, &mut upload("a.txt", b"same")).unwrap();
        let b = store.write_file(&ctx, &mut upload("b.txt", b"same")).unwrap();

        assert_eq!(a.full_path, b.full_path);
        assert_eq!(count_entries(&store.root), 1);
    }

    #[test]
    fn test_remove_prunes_empty_shards() {
        let (_dir, store) = temp_blob_store();
        let ctx = OpContext::background();

        let a = store.write_file(&ctx, &mut upload("a.txt", b"first")).unwrap();
        let b = store.write_file(&ctx, &mut upload("b.txt", b"second")).unwrap();

        store.remove_file(&a).unwrap();
        assert!(!a.full_path.exists());
        assert!(b.full_path.exists());
        assert_eq!(count_entries(&store.root), 1);

        store.remove_file(&b).unwrap();
        assert!(store.root.exists());
        assert_eq!(count_entries(&store.root), 0);

        // already gone
        store.remove_file(&b).unwrap();
    }

    #[test]
    fn test_remove_outside_root() {
        let (dir, store) = temp_blob_store();
        let ctx = OpContext::background();
        let mut file = store.write_file(&ctx, &mut upload("a.txt", b"x")).unwrap();

        let outside = dir.path().join("elsewhere.txt");
        fs::write(&outside, b"keep").unwrap();
        file.full_path = outside.clone();
        assert!(matches!(store.remove_file(&file), Err(Error::PathOutsideRoot { .. })));
        assert!(outside.exists());

        file.full_path = store.root.join("..").join("elsewhere.txt");
        assert!(matches!(store.remove_file(&file), Err(Error::PathOutsideRoot { .. })));
        assert!(outside.exists());
    }

    #[test]
    fn test_cancelled_write_is_discarded() {
        let (_dir, store) = temp_blob_store();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = OpContext::with_cancellation(token);

        let err = store
            .write_file(&ctx, &mut upload("a.txt", b"data"))
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(count_entries(&store.root), 0);
        assert_eq!(count_entries(&store.tmp_dir), 0);
    }

    #[test]
    fn test_failed_read_cleans_scratch_file() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }

        let (_dir, store) = temp_blob_store();
        let mut upload = Upload::new("a.bin", "application/octet-stream", Broken);

        let err = store
            .write_file(&OpContext::background(), &mut upload)
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert_eq!(count_entries(&store.tmp_dir), 0);
    }
}
