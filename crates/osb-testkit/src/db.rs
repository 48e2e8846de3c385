//! A temp on-disk SQLite fixture, complementing the in-memory
//! `testkit_db_pool()` in `osb-db` but backed by a real file path — for
//! tests that exercise file-path behavior (`POLLER_DB_PATH` resolution, WAL
//! sidecar files, re-opening a database across process boundaries via
//! `assert_cmd`) that an in-memory pool can't reach.

use std::path::PathBuf;

use anyhow::Result;
use tempfile::TempDir;

use osb_db::{Encryptor, Store};

/// A 32-byte base64 key, stable across every test that needs one so fixtures
/// built by different crates can interoperate.
pub const TEST_ENCRYPTION_KEY: &str = "MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTIzNDU2Nzg5MDE=";

/// Owns the temp directory backing the database file; dropping this removes
/// the directory and its `-wal`/`-shm` sidecars.
pub struct TempStore {
    dir: TempDir,
    pub store: Store,
}

impl TempStore {
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("poller.db")
    }
}

/// A fresh, migrated, on-disk Store under a temp directory, keyed with
/// [`TEST_ENCRYPTION_KEY`].
pub async fn temp_store() -> Result<TempStore> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("poller.db");
    let pool = osb_db::connect(db_path.to_str().expect("temp path is utf8")).await?;
    osb_db::migrate(&pool).await?;
    let enc = Encryptor::from_base64_key(TEST_ENCRYPTION_KEY)?;
    let store = Store::new(pool, enc);
    Ok(TempStore { dir, store })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn temp_store_is_fresh_and_migrated() {
        let fixture = temp_store().await.unwrap();
        assert!(fixture.db_path().exists());
        let connections = fixture.store.list_all_connections().await.unwrap();
        assert!(connections.is_empty());
    }
}
