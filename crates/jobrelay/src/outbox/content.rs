/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Content stream files.
//!
//! Large payloads are written next to the store as one file per message id,
//! holding one JSON document per line, and read back incrementally.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use crate::error::OutboxError;

/// Rows of a content stream, one serialized record per item.
pub type RecordStream = BoxStream<'static, std::io::Result<String>>;

#[derive(Debug, Clone)]
pub struct ContentStore {
    dir: PathBuf,
}

impl ContentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, message_id: &str) -> PathBuf {
        self.dir.join(message_id)
    }

    /// Writes `rows` as newline-delimited JSON and returns the row count.
    pub async fn write<T, S>(&self, message_id: &str, rows: S) -> Result<usize, OutboxError>
    where
        T: Serialize,
        S: Stream<Item = T>,
    {
        let path = self.path_for(message_id);
        let file_error = |source| OutboxError::ContentFile {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).await.map_err(file_error)?;
        let file = File::create(&path).await.map_err(file_error)?;
        let mut writer = BufWriter::new(file);
        let mut rows = std::pin::pin!(rows);
        let mut count = 0;
        while let Some(row) = rows.next().await {
            let mut line = serde_json::to_vec(&row)?;
            line.push(b'\n');
            writer.write_all(&line).await.map_err(file_error)?;
            count += 1;
        }
        writer.flush().await.map_err(file_error)?;
        debug!(message_id, rows = count, "Wrote outbox content stream");
        Ok(count)
    }

    /// Opens a content stream for reading. Blank lines are skipped.
    pub async fn open(&self, message_id: &str) -> std::io::Result<RecordStream> {
        let file = File::open(self.path_for(message_id)).await?;
        let lines = BufReader::new(file).lines();
        let rows = stream::unfold(Some(lines), |lines| async move {
            let mut lines = lines?;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => return Some((Ok(line), Some(lines))),
                    Ok(None) => return None,
                    Err(e) => return Some((Err(e), None)),
                }
            }
        });
        Ok(rows.boxed())
    }

    /// Removes a content stream. A missing file is not an error.
    pub async fn remove(&self, message_id: &str) -> Result<(), OutboxError> {
        let path = self.path_for(message_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(OutboxError::ContentFile { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_rows_are_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::new(dir.path());
        let written = content
            .write("m1", stream::iter(vec!["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(written, 3);

        let rows: Vec<String> = content.open("m1").await.unwrap().try_collect().await.unwrap();
        assert_eq!(rows, vec!["\"a\"", "\"b\"", "\"c\""]);
    }

    #[tokio::test]
    async fn test_remove_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::new(dir.path());
        content.write("m1", stream::iter(vec![1, 2])).await.unwrap();

        content.remove("m1").await.unwrap();
        assert!(!content.path_for("m1").exists());
        content.remove("m1").await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let content = ContentStore::new(dir.path());
        let err = content.open("absent").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
