#![allow(dead_code)]

use std::{
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};
use wordle_db::WordleStorage;

/// A store on a fresh SQLite file, removed again when dropped.
pub struct TestDb {
    pub storage: WordleStorage,
    path: PathBuf,
}

impl TestDb {
    pub async fn new(label: &str) -> Self {
        Self::with_connections(label, 1).await
    }

    pub async fn with_connections(label: &str, max_connections: u32) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();

        let mut path = std::env::temp_dir();
        path.push(format!(
            "wordle-db-{label}-{}-{}.sqlite",
            std::process::id(),
            nanos
        ));

        let database_url = format!("sqlite:{}", path.display());
        let storage = WordleStorage::open(&database_url, max_connections)
            .await
            .expect("failed to open test database");
        storage
            .init_schema()
            .await
            .expect("failed to apply schema");

        Self { storage, path }
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = self.path.clone().into_os_string();
            sidecar.push(suffix);
            let _ = fs::remove_file(sidecar);
        }
    }
}
