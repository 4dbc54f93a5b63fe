// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # File Store Contract
//!
//! Project descriptions and student reports are opaque blobs to the
//! workflow. The domain only keeps the [`FileRef`] handed back by a
//! [`FileStore`]; implementations live in `crate::infrastructure::files`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle returned by [`FileStore::store`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(pub String);

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An uploaded file as received from the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn store(&self, upload: &Upload) -> Result<FileRef, FileStoreError>;

    async fn fetch(&self, file: &FileRef) -> Result<Bytes, FileStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FileStoreError {
    fn from(err: std::io::Error) -> Self {
        FileStoreError::Io(err.to_string())
    }
}
