// SPDX-License-Identifier: GPL-3.0

//! Block and storage database backing a fork.
//!
//! A fork needs somewhere to keep the ephemeral blocks it produces and the
//! storage values it lazily mirrors from the live chain. Two implementations
//! of [`ForkDatabase`] are provided:
//!
//! - [`SqliteDatabase`] - durable, one file per `(purpose, genesis-hash)`
//!   namespace, so repeated simulations within a session reuse warm state.
//! - [`MemoryDatabase`] - process-local, for headless/server contexts and as
//!   the automatic fallback when the durable backend cannot be initialized.
//!
//! All entries carry the live chain's genesis hash as a namespace column so
//! unrelated chains can never collide, even if a database file is shared.

use crate::error::CacheError;
use async_trait::async_trait;
use scale::{Decode, Encode};
use sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions};
use std::{
	collections::HashMap,
	path::Path,
	sync::{Arc, RwLock},
};
use subxt::config::substrate::H256;

/// Maximum number of connections in the SQLite connection pool.
///
/// The simulator is the only process accessing the database, so this only
/// covers internal async task concurrency.
const MAX_POOL_CONNECTIONS: u32 = 5;

/// SQLite connection string for in-memory databases.
const SQLITE_MEMORY_URL: &str = "sqlite::memory:";

/// Connection pool size for in-memory databases.
///
/// Must be 1 because SQLite in-memory databases are connection-specific:
/// each connection creates a separate, isolated database instance.
const MEMORY_POOL_CONNECTIONS: u32 = 1;

/// A block held in the database.
///
/// # Block Number Type
///
/// Block numbers are stored as `u32` to match Polkadot SDK's `BlockNumber`
/// type. SQLite stores all integers as `i64`; values outside the `u32` range
/// read back as [`CacheError::DataCorruption`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
	/// Block hash.
	pub hash: H256,
	/// Block number.
	pub number: u32,
	/// Parent block hash.
	pub parent_hash: H256,
	/// SCALE-encoded block header.
	pub header: Vec<u8>,
	/// The extrinsics included in this block.
	pub extrinsics: Vec<Vec<u8>>,
	/// Storage changes this block introduced.
	pub storage_diff: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

/// Namespaced block and storage store backing a fork.
///
/// Storage queries distinguish three states: not cached (`Ok(None)`), cached
/// as empty (`Ok(Some(None))`), and cached with a value (`Ok(Some(Some(_)))`).
#[async_trait]
pub trait ForkDatabase: Send + Sync {
	/// Persist a block entry.
	async fn save_block(&self, block: BlockEntry) -> Result<(), CacheError>;

	/// Fetch a block by hash.
	async fn query_block(&self, hash: H256) -> Result<Option<BlockEntry>, CacheError>;

	/// Fetch a block by number.
	async fn query_block_by_number(&self, number: u32) -> Result<Option<BlockEntry>, CacheError>;

	/// Fetch the block with the highest number, if any.
	async fn query_highest_block(&self) -> Result<Option<BlockEntry>, CacheError>;

	/// Delete a block and all storage rows recorded under it.
	async fn delete_block(&self, hash: H256) -> Result<(), CacheError>;

	/// Number of blocks currently stored in this namespace.
	async fn blocks_count(&self) -> Result<u64, CacheError>;

	/// Record a storage value observed at a block. `None` records the
	/// knowledge that the key holds no value.
	async fn save_storage(
		&self,
		block_hash: H256,
		key: &[u8],
		value: Option<&[u8]>,
	) -> Result<(), CacheError>;

	/// Fetch a recorded storage value.
	async fn query_storage(
		&self,
		block_hash: H256,
		key: &[u8],
	) -> Result<Option<Option<Vec<u8>>>, CacheError>;

	/// Release the underlying resources.
	async fn close(&self) -> Result<(), CacheError>;
}

/// Open the best available database for a `(purpose, genesis-hash)` namespace.
///
/// Probes the durable SQLite backend when a directory is supplied and
/// silently degrades to the process-local store on any initialization
/// failure; selection problems are logged, never propagated. With no
/// directory the process-local store is used directly.
pub async fn open_database(
	purpose: &str,
	genesis_hash: H256,
	dir: Option<&Path>,
) -> Arc<dyn ForkDatabase> {
	if let Some(dir) = dir {
		let file = format!("{purpose}-{}.sqlite", hex::encode(&genesis_hash.as_bytes()[..8]));
		match SqliteDatabase::open(&dir.join(file), genesis_hash).await {
			Ok(db) => return Arc::new(db),
			Err(e) => {
				log::warn!("Durable cache unavailable, using in-memory store: {e}");
			},
		}
	}
	Arc::new(MemoryDatabase::new(genesis_hash))
}

/// SQLite-backed implementation of [`ForkDatabase`].
pub struct SqliteDatabase {
	pool: SqlitePool,
	namespace: Vec<u8>,
}

impl SqliteDatabase {
	/// Open or create a database at the specified path, scoped to the given
	/// genesis hash.
	///
	/// Creates the parent directory if it doesn't exist.
	pub async fn open(path: &Path, genesis_hash: H256) -> Result<Self, CacheError> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}

		let url = format!("sqlite:{}?mode=rwc", path.display());
		let pool = SqlitePoolOptions::new()
			.max_connections(MAX_POOL_CONNECTIONS)
			.connect(&url)
			.await?;

		sqlx::query(CREATE_TABLES_SQL).execute(&pool).await?;

		Ok(Self { pool, namespace: genesis_hash.as_bytes().to_vec() })
	}

	/// Open an in-memory database scoped to the given genesis hash.
	pub async fn in_memory(genesis_hash: H256) -> Result<Self, CacheError> {
		let pool = SqlitePoolOptions::new()
			.max_connections(MEMORY_POOL_CONNECTIONS)
			.connect(SQLITE_MEMORY_URL)
			.await?;

		sqlx::query(CREATE_TABLES_SQL).execute(&pool).await?;

		Ok(Self { pool, namespace: genesis_hash.as_bytes().to_vec() })
	}

	fn row_to_entry(r: &sqlx::sqlite::SqliteRow) -> Result<BlockEntry, CacheError> {
		let hash_bytes: Vec<u8> = r.get("hash");
		let parent_bytes: Vec<u8> = r.get("parent_hash");
		let number: u32 = r
			.get::<i64, _>("number")
			.try_into()
			.map_err(|_| CacheError::DataCorruption("block number out of u32 range".into()))?;
		let extrinsics_blob: Vec<u8> = r.get("extrinsics");
		let diff_blob: Vec<u8> = r.get("storage_diff");

		if hash_bytes.len() != 32 || parent_bytes.len() != 32 {
			return Err(CacheError::DataCorruption("block hash is not 32 bytes".into()));
		}

		Ok(BlockEntry {
			hash: H256::from_slice(&hash_bytes),
			number,
			parent_hash: H256::from_slice(&parent_bytes),
			header: r.get("header"),
			extrinsics: Vec::<Vec<u8>>::decode(&mut extrinsics_blob.as_slice())
				.map_err(|e| CacheError::DataCorruption(format!("extrinsics blob: {e}")))?,
			storage_diff: Vec::<(Vec<u8>, Option<Vec<u8>>)>::decode(&mut diff_blob.as_slice())
				.map_err(|e| CacheError::DataCorruption(format!("storage diff blob: {e}")))?,
		})
	}
}

#[async_trait]
impl ForkDatabase for SqliteDatabase {
	async fn save_block(&self, block: BlockEntry) -> Result<(), CacheError> {
		// INSERT OR REPLACE handles re-saving a block whose metadata was
		// incomplete on first sight (e.g. a header fetched later).
		sqlx::query(
			"INSERT OR REPLACE INTO blocks (namespace, hash, number, parent_hash, header, extrinsics, storage_diff) VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(&self.namespace)
		.bind(block.hash.as_bytes())
		.bind(block.number)
		.bind(block.parent_hash.as_bytes())
		.bind(&block.header)
		.bind(block.extrinsics.encode())
		.bind(block.storage_diff.encode())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	async fn query_block(&self, hash: H256) -> Result<Option<BlockEntry>, CacheError> {
		let row = sqlx::query(
			"SELECT hash, number, parent_hash, header, extrinsics, storage_diff FROM blocks WHERE namespace = ? AND hash = ?",
		)
		.bind(&self.namespace)
		.bind(hash.as_bytes())
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(Self::row_to_entry).transpose()
	}

	async fn query_block_by_number(&self, number: u32) -> Result<Option<BlockEntry>, CacheError> {
		let row = sqlx::query(
			"SELECT hash, number, parent_hash, header, extrinsics, storage_diff FROM blocks WHERE namespace = ? AND number = ?",
		)
		.bind(&self.namespace)
		.bind(number)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(Self::row_to_entry).transpose()
	}

	async fn query_highest_block(&self) -> Result<Option<BlockEntry>, CacheError> {
		let row = sqlx::query(
			"SELECT hash, number, parent_hash, header, extrinsics, storage_diff FROM blocks WHERE namespace = ? ORDER BY number DESC LIMIT 1",
		)
		.bind(&self.namespace)
		.fetch_optional(&self.pool)
		.await?;

		row.as_ref().map(Self::row_to_entry).transpose()
	}

	async fn delete_block(&self, hash: H256) -> Result<(), CacheError> {
		// Delete the block and its storage rows together so the namespace
		// never holds orphaned storage entries.
		let mut tx = self.pool.begin().await?;

		sqlx::query("DELETE FROM storage WHERE namespace = ? AND block_hash = ?")
			.bind(&self.namespace)
			.bind(hash.as_bytes())
			.execute(&mut *tx)
			.await?;

		sqlx::query("DELETE FROM blocks WHERE namespace = ? AND hash = ?")
			.bind(&self.namespace)
			.bind(hash.as_bytes())
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;
		Ok(())
	}

	async fn blocks_count(&self) -> Result<u64, CacheError> {
		let row = sqlx::query("SELECT COUNT(*) AS count FROM blocks WHERE namespace = ?")
			.bind(&self.namespace)
			.fetch_one(&self.pool)
			.await?;

		let count: i64 = row.get("count");
		count
			.try_into()
			.map_err(|_| CacheError::DataCorruption("negative block count".into()))
	}

	async fn save_storage(
		&self,
		block_hash: H256,
		key: &[u8],
		value: Option<&[u8]>,
	) -> Result<(), CacheError> {
		// The `is_empty` flag records the knowledge that a key holds no value,
		// which is distinct from the key not having been recorded at all.
		sqlx::query(
			"INSERT OR REPLACE INTO storage (namespace, block_hash, key, value, is_empty) VALUES (?, ?, ?, ?, ?)",
		)
		.bind(&self.namespace)
		.bind(block_hash.as_bytes())
		.bind(key)
		.bind(value)
		.bind(value.is_none())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	async fn query_storage(
		&self,
		block_hash: H256,
		key: &[u8],
	) -> Result<Option<Option<Vec<u8>>>, CacheError> {
		let row = sqlx::query(
			"SELECT value, is_empty FROM storage WHERE namespace = ? AND block_hash = ? AND key = ?",
		)
		.bind(&self.namespace)
		.bind(block_hash.as_bytes())
		.bind(key)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(|r| {
			let is_empty: bool = r.get("is_empty");
			if is_empty { None } else { Some(r.get("value")) }
		}))
	}

	async fn close(&self) -> Result<(), CacheError> {
		self.pool.close().await;
		Ok(())
	}
}

/// SQL to create the database tables.
///
/// Both tables carry the genesis-hash namespace in their primary keys so one
/// file can safely hold entries for several chains. Uses IF NOT EXISTS for
/// idempotent initialization.
const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    namespace BLOB NOT NULL,
    hash BLOB NOT NULL,
    number INTEGER NOT NULL,
    parent_hash BLOB NOT NULL,
    header BLOB NOT NULL,
    extrinsics BLOB NOT NULL,
    storage_diff BLOB NOT NULL,
    PRIMARY KEY (namespace, hash)
);

CREATE INDEX IF NOT EXISTS idx_blocks_number ON blocks(namespace, number);

CREATE TABLE IF NOT EXISTS storage (
    namespace BLOB NOT NULL,
    block_hash BLOB NOT NULL,
    key BLOB NOT NULL,
    value BLOB,
    is_empty BOOLEAN NOT NULL DEFAULT FALSE,
    PRIMARY KEY (namespace, block_hash, key)
);

CREATE INDEX IF NOT EXISTS idx_storage_block ON storage(namespace, block_hash);
"#;

#[derive(Default)]
struct MemoryInner {
	blocks: HashMap<H256, BlockEntry>,
	storage: HashMap<(H256, Vec<u8>), Option<Vec<u8>>>,
}

/// Process-local implementation of [`ForkDatabase`].
///
/// Used in headless/server contexts and as the automatic fallback when the
/// durable backend fails to initialize. The namespace field exists only for
/// parity with the durable store: a `MemoryDatabase` instance is always
/// opened for exactly one chain.
pub struct MemoryDatabase {
	#[allow(dead_code)]
	namespace: H256,
	inner: RwLock<MemoryInner>,
}

impl MemoryDatabase {
	/// Create an empty store scoped to the given genesis hash.
	pub fn new(genesis_hash: H256) -> Self {
		Self { namespace: genesis_hash, inner: RwLock::new(MemoryInner::default()) }
	}

	fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryInner>, CacheError> {
		self.inner.read().map_err(|e| CacheError::Lock(e.to_string()))
	}

	fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryInner>, CacheError> {
		self.inner.write().map_err(|e| CacheError::Lock(e.to_string()))
	}
}

#[async_trait]
impl ForkDatabase for MemoryDatabase {
	async fn save_block(&self, block: BlockEntry) -> Result<(), CacheError> {
		self.write()?.blocks.insert(block.hash, block);
		Ok(())
	}

	async fn query_block(&self, hash: H256) -> Result<Option<BlockEntry>, CacheError> {
		Ok(self.read()?.blocks.get(&hash).cloned())
	}

	async fn query_block_by_number(&self, number: u32) -> Result<Option<BlockEntry>, CacheError> {
		Ok(self.read()?.blocks.values().find(|b| b.number == number).cloned())
	}

	async fn query_highest_block(&self) -> Result<Option<BlockEntry>, CacheError> {
		Ok(self.read()?.blocks.values().max_by_key(|b| b.number).cloned())
	}

	async fn delete_block(&self, hash: H256) -> Result<(), CacheError> {
		let mut inner = self.write()?;
		inner.blocks.remove(&hash);
		inner.storage.retain(|(block_hash, _), _| *block_hash != hash);
		Ok(())
	}

	async fn blocks_count(&self) -> Result<u64, CacheError> {
		Ok(self.read()?.blocks.len() as u64)
	}

	async fn save_storage(
		&self,
		block_hash: H256,
		key: &[u8],
		value: Option<&[u8]>,
	) -> Result<(), CacheError> {
		self.write()?
			.storage
			.insert((block_hash, key.to_vec()), value.map(|v| v.to_vec()));
		Ok(())
	}

	async fn query_storage(
		&self,
		block_hash: H256,
		key: &[u8],
	) -> Result<Option<Option<Vec<u8>>>, CacheError> {
		Ok(self.read()?.storage.get(&(block_hash, key.to_vec())).cloned())
	}

	async fn close(&self) -> Result<(), CacheError> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(hash: u8, number: u32) -> BlockEntry {
		BlockEntry {
			hash: H256::from([hash; 32]),
			number,
			parent_hash: H256::from([hash.wrapping_sub(1); 32]),
			header: vec![1, 2, 3],
			extrinsics: vec![vec![0xde, 0xad]],
			storage_diff: vec![(vec![0x01], Some(vec![0x02])), (vec![0x03], None)],
		}
	}

	async fn databases() -> Vec<Arc<dyn ForkDatabase>> {
		let genesis = H256::from([0x11; 32]);
		vec![
			Arc::new(SqliteDatabase::in_memory(genesis).await.unwrap()),
			Arc::new(MemoryDatabase::new(genesis)),
		]
	}

	#[tokio::test]
	async fn save_and_query_block_round_trips() {
		for db in databases().await {
			let block = entry(5, 100);
			db.save_block(block.clone()).await.unwrap();

			let found = db.query_block(block.hash).await.unwrap().unwrap();
			assert_eq!(found, block);

			let by_number = db.query_block_by_number(100).await.unwrap().unwrap();
			assert_eq!(by_number.hash, block.hash);
		}
	}

	#[tokio::test]
	async fn query_missing_block_returns_none() {
		for db in databases().await {
			assert!(db.query_block(H256::from([9; 32])).await.unwrap().is_none());
			assert!(db.query_block_by_number(42).await.unwrap().is_none());
			assert!(db.query_highest_block().await.unwrap().is_none());
		}
	}

	#[tokio::test]
	async fn highest_block_tracks_numbers() {
		for db in databases().await {
			db.save_block(entry(1, 10)).await.unwrap();
			db.save_block(entry(2, 30)).await.unwrap();
			db.save_block(entry(3, 20)).await.unwrap();

			let highest = db.query_highest_block().await.unwrap().unwrap();
			assert_eq!(highest.number, 30);
		}
	}

	#[tokio::test]
	async fn delete_block_removes_block_and_storage() {
		for db in databases().await {
			let block = entry(7, 50);
			db.save_block(block.clone()).await.unwrap();
			db.save_storage(block.hash, b"key", Some(b"value")).await.unwrap();
			assert_eq!(db.blocks_count().await.unwrap(), 1);

			db.delete_block(block.hash).await.unwrap();

			assert_eq!(db.blocks_count().await.unwrap(), 0);
			assert!(db.query_block(block.hash).await.unwrap().is_none());
			assert!(db.query_storage(block.hash, b"key").await.unwrap().is_none());
		}
	}

	#[tokio::test]
	async fn storage_distinguishes_empty_from_unknown() {
		for db in databases().await {
			let hash = H256::from([2; 32]);

			// Unknown key.
			assert_eq!(db.query_storage(hash, b"unknown").await.unwrap(), None);

			// Recorded as empty.
			db.save_storage(hash, b"empty", None).await.unwrap();
			assert_eq!(db.query_storage(hash, b"empty").await.unwrap(), Some(None));

			// Recorded with a value.
			db.save_storage(hash, b"full", Some(b"v")).await.unwrap();
			assert_eq!(db.query_storage(hash, b"full").await.unwrap(), Some(Some(b"v".to_vec())));
		}
	}

	#[tokio::test]
	async fn save_block_overwrites_existing_entry() {
		for db in databases().await {
			let mut block = entry(4, 77);
			db.save_block(block.clone()).await.unwrap();

			block.header = vec![9, 9, 9];
			db.save_block(block.clone()).await.unwrap();

			assert_eq!(db.blocks_count().await.unwrap(), 1);
			assert_eq!(db.query_block(block.hash).await.unwrap().unwrap().header, vec![9, 9, 9]);
		}
	}

	#[tokio::test]
	async fn namespaces_do_not_collide() {
		// Two databases over the same file, scoped to different chains.
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("shared.sqlite");

		let a = SqliteDatabase::open(&path, H256::from([0xaa; 32])).await.unwrap();
		let b = SqliteDatabase::open(&path, H256::from([0xbb; 32])).await.unwrap();

		a.save_block(entry(1, 1)).await.unwrap();

		assert_eq!(a.blocks_count().await.unwrap(), 1);
		assert_eq!(b.blocks_count().await.unwrap(), 0);
		assert!(b.query_block(H256::from([1; 32])).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn file_persistence_survives_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("persist.sqlite");
		let genesis = H256::from([0x33; 32]);
		let block = entry(6, 12);

		{
			let db = SqliteDatabase::open(&path, genesis).await.unwrap();
			db.save_block(block.clone()).await.unwrap();
			db.close().await.unwrap();
		}

		{
			let db = SqliteDatabase::open(&path, genesis).await.unwrap();
			assert_eq!(db.query_block(block.hash).await.unwrap().unwrap(), block);
		}
	}

	#[tokio::test]
	async fn open_database_degrades_to_memory_on_bad_path() {
		// A directory path that cannot be created (a file stands in the way).
		let dir = tempfile::tempdir().unwrap();
		let blocker = dir.path().join("blocker");
		std::fs::write(&blocker, b"not a directory").unwrap();

		let db = open_database("simulation", H256::from([0x44; 32]), Some(&blocker)).await;

		// Still usable, whichever backend was selected.
		db.save_block(entry(9, 1)).await.unwrap();
		assert_eq!(db.blocks_count().await.unwrap(), 1);
	}
}
