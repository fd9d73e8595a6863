use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models;

type LockTable = HashMap<models::LogicalFilename, Arc<AsyncMutex<()>>>;

/// Per logical filename mutual exclusion, shared by everything that touches fragments.
///
/// Entries only live while a request holds or waits for them.
#[derive(Clone, Debug, Default)]
pub struct FilenameLocks {
    table: Arc<Mutex<LockTable>>,
}

impl FilenameLocks {
    pub fn new() -> FilenameLocks {
        FilenameLocks::default()
    }

    pub async fn lock(&self, filename: &models::LogicalFilename) -> FilenameGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(filename.clone()).or_default().clone()
        };

        let guard = mutex.lock_owned().await;

        FilenameGuard {
            table: self.table.clone(),
            filename: filename.clone(),
            guard: Some(guard),
        }
    }

    /// Takes the lock of `filename` only if nobody holds or waits for it.
    pub fn try_lock(&self, filename: &models::LogicalFilename) -> Option<FilenameGuard> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);

        let mutex = table.entry(filename.clone()).or_default().clone();

        match mutex.try_lock_owned() {
            Ok(guard) => Some(FilenameGuard {
                table: self.table.clone(),
                filename: filename.clone(),
                guard: Some(guard),
            }),
            Err(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct FilenameGuard {
    table: Arc<Mutex<LockTable>>,
    filename: models::LogicalFilename,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FilenameGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);

        // The table holds the last reference once nobody is waiting.
        let is_idle = table
            .get(&self.filename)
            .map_or(false, |mutex| Arc::strong_count(mutex) == 1);

        if is_idle {
            table.remove(&self.filename);
        }
    }
}
