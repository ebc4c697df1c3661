// SPDX-License-Identifier: GPL-3.0

//! String constants for the live-chain RPC client module.

/// JSON-RPC method names used for error reporting.
///
/// These match the actual RPC method names in the Polkadot SDK JSON-RPC specification.
pub mod methods {
	pub const CHAIN_GET_FINALIZED_HEAD: &str = "chain_getFinalisedHead";
	pub const STATE_GET_STORAGE: &str = "state_getStorage";
	pub const STATE_GET_METADATA: &str = "state_getMetadata";
	pub const STATE_GET_RUNTIME_VERSION: &str = "state_getRuntimeVersion";
	pub const SYSTEM_CHAIN: &str = "system_chain";
	pub const CHAIN_GET_BLOCK_HASH: &str = "chain_getBlockHash";
	pub const PAYMENT_QUERY_INFO: &str = "payment_queryInfo";
}
