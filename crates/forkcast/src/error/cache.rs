// SPDX-License-Identifier: GPL-3.0

//! Database adapter error types.

use thiserror::Error;

/// Errors that can occur when interacting with the block/storage database.
#[derive(Debug, Error)]
pub enum CacheError {
	/// Database error.
	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),
	/// IO error.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Data corruption detected in the database.
	#[error("Data corruption: {0}")]
	DataCorruption(String),
	/// A lock protecting in-memory state was poisoned.
	#[error("Lock error: {0}")]
	Lock(String),
}
