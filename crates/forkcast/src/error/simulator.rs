// SPDX-License-Identifier: GPL-3.0

//! Simulation pipeline error types.

use super::{CacheError, EngineError, RpcClientError};
use subxt::config::substrate::H256;
use thiserror::Error;

/// Errors raised inside the simulation pipelines.
///
/// These never escape the public simulate entry points: they are converted
/// into `success = false` results with a human-readable message.
#[derive(Debug, Error)]
pub enum SimulatorError {
	/// The request cannot be served with the supplied configuration.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// The operation was encoded against a different codec registry than the
	/// live chain handle's.
	#[error(
		"Registry mismatch: operation was encoded for spec version {operation_spec} on chain {operation_genesis:?}, but the connected chain reports spec version {chain_spec} on {chain_genesis:?}"
	)]
	RegistryMismatch {
		/// Spec version recorded on the operation.
		operation_spec: u32,
		/// Genesis hash recorded on the operation.
		operation_genesis: H256,
		/// Spec version of the connected chain.
		chain_spec: u32,
		/// Genesis hash of the connected chain.
		chain_genesis: H256,
	},
	/// The preferred anchor block has been pruned everywhere and the
	/// configured policy refuses to fall back to the latest block.
	#[error(
		"Anchor block {0:?} is pruned on the selected endpoint and anchor fallback is disabled"
	)]
	AnchorPruned(H256),
	/// A network-layer failure (timeout, connection refusal, bad response).
	#[error("Network error: {0}")]
	Network(String),
	/// Fork engine failure.
	#[error(transparent)]
	Engine(#[from] EngineError),
	/// Database adapter failure.
	#[error(transparent)]
	Cache(#[from] CacheError),
	/// Live-chain RPC failure.
	#[error(transparent)]
	Rpc(#[from] RpcClientError),
}
