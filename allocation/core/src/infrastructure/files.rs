// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File Store Adapters
//!
//! Both stores are content addressed: the [`FileRef`] is the hex SHA-256 of
//! the content followed by the original extension, so storing the same
//! report twice yields the same reference and no second copy.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::files::{FileRef, FileStore, FileStoreError, Upload};

fn content_address(upload: &Upload) -> FileRef {
    let digest = hex::encode(Sha256::digest(&upload.content));
    let extension = Path::new(&upload.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));
    match extension {
        Some(ext) => FileRef(format!("{}.{}", digest, ext.to_ascii_lowercase())),
        None => FileRef(digest),
    }
}

/// References are generated here, but `fetch` also receives stored values;
/// reject anything that could escape the root directory.
fn is_valid_ref(file: &FileRef) -> bool {
    !file.0.is_empty() && file.0.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') && !file.0.starts_with('.')
}

#[derive(Clone, Default)]
pub struct InMemoryFileStore {
    blobs: Arc<RwLock<HashMap<FileRef, Bytes>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn store(&self, upload: &Upload) -> Result<FileRef, FileStoreError> {
        let file = content_address(upload);
        self.blobs.write().insert(file.clone(), upload.content.clone());
        Ok(file)
    }

    async fn fetch(&self, file: &FileRef) -> Result<Bytes, FileStoreError> {
        self.blobs
            .read()
            .get(file)
            .cloned()
            .ok_or_else(|| FileStoreError::NotFound(file.to_string()))
    }
}

/// Stores uploads as files under a root directory.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, FileStoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            FileStoreError::Io(format!("Failed to create file root {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    fn path_for(&self, file: &FileRef) -> Result<PathBuf, FileStoreError> {
        if !is_valid_ref(file) {
            return Err(FileStoreError::NotFound(file.to_string()));
        }
        Ok(self.root.join(&file.0))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, upload: &Upload) -> Result<FileRef, FileStoreError> {
        let file = content_address(upload);
        let path = self.path_for(&file)?;
        if tokio::fs::try_exists(&path).await? {
            return Ok(file);
        }

        // Write then rename so a reader never sees a half-written file. Each
        // writer stages under its own name; the last rename wins with the
        // same content.
        let staging = self.root.join(format!("{}.{}.partial", file.0, uuid::Uuid::new_v4()));
        tokio::fs::write(&staging, &upload.content).await?;
        tokio::fs::rename(&staging, &path).await?;
        tracing::debug!(file = %file, bytes = upload.content.len(), "Stored upload");
        Ok(file)
    }

    async fn fetch(&self, file: &FileRef) -> Result<Bytes, FileStoreError> {
        let path = self.path_for(file)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FileStoreError::NotFound(file.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
