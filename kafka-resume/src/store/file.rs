use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::PositionStoreError;
use crate::store::{PositionStore, PositionWriter};
use crate::types::{Partition, Position};

type TopicPositions = BTreeMap<i32, i64>;

/// Stores positions as one JSON document per topic: `<dir>/<topic>.json`
/// holding `{"<partition>": <last processed offset>}`.
///
/// Writes replace the document atomically (temp file + rename) and are
/// serialized within the process; readers never see a half-written file.
#[derive(Debug)]
pub struct FilePositionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePositionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create the backing directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, PositionStoreError> {
        let store = Self::new(dir);
        tokio::fs::create_dir_all(&store.dir).await?;
        Ok(store)
    }

    fn topic_path(&self, topic: &str) -> Result<PathBuf, PositionStoreError> {
        if !is_legal_topic(topic) {
            return Err(PositionStoreError::InvalidTopic(topic.to_string()));
        }
        Ok(self.dir.join(format!("{topic}.json")))
    }

    async fn read_topic(&self, path: &Path) -> Result<TopicPositions, PositionStoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(TopicPositions::new()),
            Err(e) => Err(e.into()),
        }
    }
}

// Same charset the broker accepts for topic names
fn is_legal_topic(topic: &str) -> bool {
    !topic.is_empty()
        && topic != "."
        && topic != ".."
        && topic
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

#[async_trait]
impl PositionStore for FilePositionStore {
    async fn get(
        &self,
        topic: &str,
        partitions: &[i32],
    ) -> Result<Vec<Position>, PositionStoreError> {
        let path = self.topic_path(topic)?;
        let stored = self.read_topic(&path).await?;

        Ok(partitions
            .iter()
            .map(|&number| {
                let offset = stored.get(&number).copied();
                Position::new(Partition::new(topic, number), offset)
            })
            .collect())
    }
}

#[async_trait]
impl PositionWriter for FilePositionStore {
    async fn set(&self, partition: &Partition, offset: i64) -> Result<(), PositionStoreError> {
        let path = self.topic_path(partition.topic())?;

        let _guard = self.write_lock.lock().await;
        let mut stored = self.read_topic(&path).await?;
        stored.insert(partition.partition_number(), offset);

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, serde_json::to_vec(&stored)?).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(
            partition = %partition,
            offset,
            "Recorded position"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_means_unset() {
        let dir = TempDir::new().unwrap();
        let store = FilePositionStore::open(dir.path()).await.unwrap();

        let positions = store.get("orders", &[0, 1]).await.unwrap();

        assert!(positions.iter().all(Position::is_unset));
        assert_eq!(positions.len(), 2);
    }

    #[tokio::test]
    async fn test_positions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FilePositionStore::open(dir.path()).await.unwrap();
            store.set(&Partition::new("orders", 0), 41).await.unwrap();
            store.set(&Partition::new("orders", 2), 5).await.unwrap();
            store.set(&Partition::new("orders", 0), 42).await.unwrap();
        }

        let store = FilePositionStore::open(dir.path()).await.unwrap();
        let positions = store.get("orders", &[0, 1, 2]).await.unwrap();

        assert_eq!(
            positions,
            vec![
                Position::at(Partition::new("orders", 0), 42),
                Position::unset(Partition::new("orders", 1)),
                Position::at(Partition::new("orders", 2), 5),
            ]
        );
        assert!(!dir.path().join("orders.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let dir = TempDir::new().unwrap();
        let store = FilePositionStore::open(dir.path()).await.unwrap();
        store.set(&Partition::new("orders", 0), 10).await.unwrap();

        let positions = store.get("users", &[0]).await.unwrap();
        assert!(positions[0].is_unset());
    }

    #[tokio::test]
    async fn test_rejects_path_like_topics() {
        let dir = TempDir::new().unwrap();
        let store = FilePositionStore::open(dir.path()).await.unwrap();

        for topic in ["..", "../etc", "a/b", ""] {
            assert!(matches!(
                store.get(topic, &[0]).await,
                Err(PositionStoreError::InvalidTopic(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("orders.json"), b"{not json").await.unwrap();
        let store = FilePositionStore::open(dir.path()).await.unwrap();

        assert!(matches!(
            store.get("orders", &[0]).await,
            Err(PositionStoreError::Decode(_))
        ));
    }
}
