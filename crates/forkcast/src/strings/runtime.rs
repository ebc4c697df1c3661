// SPDX-License-Identifier: GPL-3.0

//! String constants for runtime APIs and well-known storage items.

/// Runtime API entry points referenced in error classification.
pub mod runtime_api {
	pub const VALIDATE_TRANSACTION: &str = "TaggedTransactionQueue_validate_transaction";
}

/// Pallet and storage-item names used when deriving storage keys.
pub mod storage {
	pub const SYSTEM_PALLET: &str = "System";
	pub const ACCOUNT_STORAGE: &str = "Account";
}
