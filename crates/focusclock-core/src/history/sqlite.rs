use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::storage::Database;

use super::{CompletedFocusEntry, HistoryLog};

/// History log backed by the `focus_history` table.
pub struct SqliteHistory {
    db: Arc<Database>,
}

impl SqliteHistory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl HistoryLog for SqliteHistory {
    async fn append(&self, entry: CompletedFocusEntry) -> Result<(), StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.insert_focus_entry(&entry)).await??;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<CompletedFocusEntry>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.focus_entries()).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focusclock.db");
        {
            let log = SqliteHistory::new(Arc::new(Database::open_at(&path).unwrap()));
            log.append(CompletedFocusEntry::new(25, Utc::now(), "Focus"))
                .await
                .unwrap();
        }
        let log = SqliteHistory::new(Arc::new(Database::open_at(&path).unwrap()));
        let entries = log.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].duration_minutes, 25);
    }
}
