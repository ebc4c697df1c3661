// SPDX-License-Identifier: GPL-3.0

//! String constants for the fork-engine client module.

/// JSON-RPC method names exposed by a chopsticks-compatible fork service.
///
/// The service hosts the actual runtime execution; this crate only drives it.
pub mod methods {
	pub const FORK_CREATE: &str = "fork_create";
	pub const FORK_DRY_RUN: &str = "fork_dryRun";
	pub const FORK_BUILD_BLOCK: &str = "fork_buildBlock";
	pub const FORK_STORAGE: &str = "fork_getStorage";
	pub const FORK_CLOSE: &str = "fork_close";
}

/// Field names in fork-service responses.
pub mod fields {
	pub const FORK_ID: &str = "forkId";
	pub const HEAD: &str = "head";
	pub const HASH: &str = "hash";
	pub const HEX: &str = "hex";
	pub const NUMBER: &str = "number";
	pub const PARENT_HASH: &str = "parentHash";
	pub const HEADER: &str = "header";
	pub const OUTCOME: &str = "outcome";
	pub const STORAGE_DIFF: &str = "storageDiff";
	pub const NEW_HEAD: &str = "newHead";
}

/// Error-message fragments reported by fork services when the requested
/// anchor block is no longer available on the upstream endpoint.
pub const PRUNED_BLOCK_FRAGMENTS: &[&str] =
	&["block not found", "state already discarded", "pruned", "unknown block"];
