// SPDX-License-Identifier: GPL-3.0

//! The fork-engine seam.
//!
//! Hosting a fork means hosting a full WASM runtime that lazily mirrors
//! remote state; that heavy engine is an external collaborator, consumed
//! through the [`ForkEngine`]/[`Fork`] traits rather than implemented here.
//! Fork handles are explicit values threaded through one request: there is no
//! ambient "current fork", so concurrent simulations can never observe each
//! other's state.
//!
//! [`RpcForkEngine`] is the shipped implementation. It drives a
//! chopsticks-compatible fork service over WebSocket JSON-RPC and uses the
//! request's namespaced database as a read-through cache for storage reads.
//! Engine responses are deliberately kept as loose JSON: block hashes in
//! particular arrive in several shapes and are only interpreted by
//! [`normalize_block_hash`](crate::hash::normalize_block_hash) at the crate
//! boundary.

use crate::{
	cache::ForkDatabase,
	error::EngineError,
	hash,
	strings::engine::{PRUNED_BLOCK_FRAGMENTS, fields, methods},
	types::{BuildMode, StorageDiff},
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use subxt::{backend::rpc::RpcClient, config::substrate::H256, ext::subxt_rpcs::rpc_params};
use url::Url;

/// Configuration for creating one fork.
pub struct ForkConfig {
	/// The live-chain endpoint the fork mirrors state from.
	pub endpoint: Url,
	/// Block to fork at. `None` lets the engine pick its own latest block.
	pub anchor: Option<H256>,
	/// How the fork applies operations.
	pub build_mode: BuildMode,
	/// Namespaced database backing the fork.
	pub db: Arc<dyn ForkDatabase>,
}

/// Description of a fork's head block.
///
/// The `hash` field is raw engine JSON; normalize it before use.
#[derive(Debug, Clone)]
pub struct ForkHead {
	/// Block hash in whatever shape the engine produced.
	pub hash: Value,
	/// Block number.
	pub number: u32,
	/// Parent block hash.
	pub parent_hash: H256,
	/// SCALE-encoded header, when the engine supplies one.
	pub header: Vec<u8>,
}

/// Result of dry-running one extrinsic.
#[derive(Debug, Clone)]
pub struct DryRunOutcome {
	/// SCALE-encoded application outcome.
	pub outcome: Vec<u8>,
	/// Storage changes the execution would make.
	pub storage_diff: StorageDiff,
	/// Post-execution head, for engines that advance state on dry run.
	pub new_head: Option<ForkHead>,
}

/// Result of building one ephemeral block.
#[derive(Debug, Clone)]
pub struct BuiltBlock {
	/// The new head block.
	pub head: ForkHead,
	/// SCALE-encoded application outcome of the block's extrinsic.
	pub outcome: Vec<u8>,
	/// Storage changes the block committed.
	pub storage_diff: StorageDiff,
}

/// Creates forks of live chains.
#[async_trait]
pub trait ForkEngine: Send + Sync {
	/// Fork a live chain's state.
	async fn fork(&self, config: ForkConfig) -> Result<Box<dyn Fork>, EngineError>;
}

/// One ephemeral, disposable fork instance.
#[async_trait]
pub trait Fork: Send + Sync {
	/// The fork's current head.
	fn head(&self) -> ForkHead;

	/// Execute an extrinsic against the given block without committing it.
	async fn dry_run(&self, extrinsic: &[u8], at: H256) -> Result<DryRunOutcome, EngineError>;

	/// Build a real (but ephemeral) block containing exactly this extrinsic
	/// on top of the fork's current head. The fork's head advances.
	async fn build_block(&self, extrinsic: &[u8]) -> Result<BuiltBlock, EngineError>;

	/// Read a storage value at a block of this fork.
	async fn storage(&self, at: H256, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError>;

	/// Tear the fork down. Idempotent from the caller's perspective: errors
	/// during teardown are reported but leave the handle unusable either way.
	async fn close(&self) -> Result<(), EngineError>;
}

/// Fork engine backed by an external fork service.
///
/// The service hosts the runtime execution; this client only drives it.
#[derive(Clone)]
pub struct RpcForkEngine {
	service: Url,
}

impl RpcForkEngine {
	/// Create an engine client for the given fork-service URL.
	pub fn new(service: Url) -> Self {
		Self { service }
	}
}

#[async_trait]
impl ForkEngine for RpcForkEngine {
	async fn fork(&self, config: ForkConfig) -> Result<Box<dyn Fork>, EngineError> {
		let rpc = RpcClient::from_url(self.service.as_str()).await.map_err(|e| {
			EngineError::ConnectionFailed {
				endpoint: self.service.to_string(),
				message: e.to_string(),
			}
		})?;

		let request = json!({
			"endpoint": config.endpoint.as_str(),
			"blockHash": config.anchor.map(|h| hash::to_hex(&h)),
			"buildMode": config.build_mode,
		});

		let response: Value =
			rpc.request(methods::FORK_CREATE, rpc_params![request]).await.map_err(|e| {
				let message = e.to_string();
				// A pruned anchor surfaces as a block-not-found refusal.
				if let Some(anchor) = config.anchor {
					let lowered = message.to_lowercase();
					if PRUNED_BLOCK_FRAGMENTS.iter().any(|f| lowered.contains(f)) {
						return EngineError::AnchorUnavailable { anchor };
					}
				}
				EngineError::RequestFailed { method: methods::FORK_CREATE, message }
			})?;

		let fork_id = response
			.get(fields::FORK_ID)
			.and_then(Value::as_str)
			.ok_or_else(|| {
				EngineError::InvalidResponse("fork_create response without forkId".to_string())
			})?
			.to_string();
		let head = parse_fork_head(response.get(fields::HEAD).ok_or_else(|| {
			EngineError::InvalidResponse("fork_create response without head".to_string())
		})?)?;

		log::debug!("forked at block #{} via {}", head.number, self.service);

		Ok(Box::new(RpcFork { rpc, fork_id, head: RwLock::new(head), db: config.db }))
	}
}

/// A fork hosted by an external fork service.
struct RpcFork {
	rpc: RpcClient,
	fork_id: String,
	head: RwLock<ForkHead>,
	db: Arc<dyn ForkDatabase>,
}

#[async_trait]
impl Fork for RpcFork {
	fn head(&self) -> ForkHead {
		self.head.read().expect("head lock poisoned").clone()
	}

	async fn dry_run(&self, extrinsic: &[u8], at: H256) -> Result<DryRunOutcome, EngineError> {
		let response: Value = self
			.rpc
			.request(
				methods::FORK_DRY_RUN,
				rpc_params![&self.fork_id, to_hex_bytes(extrinsic), hash::to_hex(&at)],
			)
			.await
			.map_err(|e| EngineError::RequestFailed {
				method: methods::FORK_DRY_RUN,
				message: e.to_string(),
			})?;

		let outcome = parse_hex_field(&response, fields::OUTCOME)?;
		let storage_diff = parse_storage_diff(response.get(fields::STORAGE_DIFF))?;
		let new_head = match response.get(fields::NEW_HEAD) {
			Some(Value::Null) | None => None,
			Some(value) => Some(parse_fork_head(value)?),
		};

		Ok(DryRunOutcome { outcome, storage_diff, new_head })
	}

	async fn build_block(&self, extrinsic: &[u8]) -> Result<BuiltBlock, EngineError> {
		let response: Value = self
			.rpc
			.request(
				methods::FORK_BUILD_BLOCK,
				rpc_params![&self.fork_id, to_hex_bytes(extrinsic)],
			)
			.await
			.map_err(|e| EngineError::RequestFailed {
				method: methods::FORK_BUILD_BLOCK,
				message: e.to_string(),
			})?;

		let head = parse_fork_head(response.get(fields::HEAD).ok_or_else(|| {
			EngineError::InvalidResponse("buildBlock response without head".to_string())
		})?)?;
		let outcome = parse_hex_field(&response, fields::OUTCOME)?;
		let storage_diff = parse_storage_diff(response.get(fields::STORAGE_DIFF))?;

		*self.head.write().expect("head lock poisoned") = head.clone();

		Ok(BuiltBlock { head, outcome, storage_diff })
	}

	async fn storage(&self, at: H256, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
		// Read-through: the namespaced database already distinguishes
		// "recorded as empty" from "never recorded".
		if let Ok(Some(cached)) = self.db.query_storage(at, key).await {
			return Ok(cached);
		}

		let response: Option<String> = self
			.rpc
			.request(
				methods::FORK_STORAGE,
				rpc_params![&self.fork_id, hash::to_hex(&at), to_hex_bytes(key)],
			)
			.await
			.map_err(|e| EngineError::RequestFailed {
				method: methods::FORK_STORAGE,
				message: e.to_string(),
			})?;

		let value = response.map(|s| parse_hex(&s)).transpose()?;
		if let Err(e) = self.db.save_storage(at, key, value.as_deref()).await {
			log::debug!("storage cache write failed: {e}");
		}
		Ok(value)
	}

	async fn close(&self) -> Result<(), EngineError> {
		self.rpc
			.request::<Value>(methods::FORK_CLOSE, rpc_params![&self.fork_id])
			.await
			.map_err(|e| EngineError::RequestFailed {
				method: methods::FORK_CLOSE,
				message: e.to_string(),
			})?;
		Ok(())
	}
}

/// Parse a fork-service head description.
///
/// The hash is kept in its raw shape; number and parent hash are interpreted
/// here because the rest of the crate needs them typed.
fn parse_fork_head(value: &Value) -> Result<ForkHead, EngineError> {
	let hash = value
		.get(fields::HASH)
		.cloned()
		.unwrap_or_else(|| value.clone());
	let number = value
		.get(fields::NUMBER)
		.and_then(Value::as_u64)
		.and_then(|n| u32::try_from(n).ok())
		.ok_or_else(|| EngineError::InvalidResponse("head without block number".to_string()))?;
	let parent_hash = match value.get(fields::PARENT_HASH) {
		Some(parent) => hash::normalize_block_hash(parent)?,
		None => H256::zero(),
	};
	let header = match value.get(fields::HEADER) {
		Some(Value::String(s)) => parse_hex(s)?,
		_ => vec![],
	};
	Ok(ForkHead { hash, number, parent_hash, header })
}

fn parse_storage_diff(value: Option<&Value>) -> Result<StorageDiff, EngineError> {
	let Some(Value::Array(entries)) = value else {
		return Ok(vec![]);
	};

	entries
		.iter()
		.map(|entry| {
			let pair = entry.as_array().filter(|p| p.len() == 2).ok_or_else(|| {
				EngineError::InvalidResponse(format!("malformed storage diff entry {entry}"))
			})?;
			let key = pair[0]
				.as_str()
				.ok_or_else(|| {
					EngineError::InvalidResponse("storage diff key is not a string".to_string())
				})
				.and_then(parse_hex)?;
			let val = match &pair[1] {
				Value::Null => None,
				Value::String(s) => Some(parse_hex(s)?),
				other =>
					return Err(EngineError::InvalidResponse(format!(
						"storage diff value has unexpected shape {other}"
					))),
			};
			Ok((key, val))
		})
		.collect()
}

fn parse_hex_field(response: &Value, field: &str) -> Result<Vec<u8>, EngineError> {
	response
		.get(field)
		.and_then(Value::as_str)
		.ok_or_else(|| EngineError::InvalidResponse(format!("response without `{field}` field")))
		.and_then(parse_hex)
}

fn parse_hex(s: &str) -> Result<Vec<u8>, EngineError> {
	hex::decode(s.strip_prefix("0x").unwrap_or(s))
		.map_err(|e| EngineError::InvalidResponse(format!("invalid hex `{s}`: {e}")))
}

fn to_hex_bytes(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}
