// SPDX-License-Identifier: GPL-3.0

//! Single-operation simulation.
//!
//! [`Simulator::simulate`] forks a live chain's state at a metadata-consistent
//! anchor block, dry-runs one operation against the fork, and produces a
//! [`SimulationResult`] with a success verdict, fee estimate, and balance
//! deltas. The entry point never returns an error: every failure mode is
//! captured into the result, and fork/database teardown happens on every exit
//! path.
//!
//! # Pipeline
//!
//! ```text
//! validate endpoints ── registry check ── resolve anchor
//!         │
//!         ▼
//! open namespaced database ── fork (Batch mode) ── normalize head
//!         │
//!         ▼
//! dry-run ── balance deltas ── decode outcome ── classify ── estimate fee
//!         │
//!         ▼
//! delete transient block ── close fork ── close database
//! ```

use crate::{
	balance::{account_keys_in_diff, account_storage_key, free_balance_of, lookup_in_diff},
	cache::{BlockEntry, ForkDatabase, open_database},
	engine::{Fork, ForkConfig, ForkEngine},
	error::{EngineError, SimulatorError},
	hash::normalize_block_hash,
	outcome::{DispatchOutcome, decode_apply_result},
	policy::{Phase, classify},
	rpc::LiveChain,
	types::{
		BalanceChange, ProgressSink, ProgressStage, SimulationRequest, SimulationResult,
		StorageDiff, filter_ws_endpoints, notify,
	},
};
use std::{path::PathBuf, sync::Arc};
use subxt::{config::substrate::H256, utils::AccountId32};
use url::Url;

/// What to do when the preferred anchor block is pruned on the selected
/// endpoint.
///
/// Falling back to the engine's latest block risks a runtime-metadata mismatch
/// that corrupts call-index decoding, so the choice is exposed to callers
/// rather than hardcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorPolicy {
	/// Retry the fork without an anchor and record a caveat in the log.
	#[default]
	FallBackToLatest,
	/// Refuse the simulation, naming the pruned anchor.
	FailClosed,
}

/// Simulator configuration.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
	/// Behavior when the anchor block is pruned.
	pub anchor_policy: AnchorPolicy,
	/// Purpose prefix of the cache namespace.
	pub cache_purpose: String,
	/// Directory for the durable cache. `None` keeps everything in memory.
	pub cache_dir: Option<PathBuf>,
}

impl Default for SimulatorConfig {
	fn default() -> Self {
		Self {
			anchor_policy: AnchorPolicy::default(),
			cache_purpose: "simulation".to_string(),
			cache_dir: None,
		}
	}
}

/// Simulates operations against ephemeral forks of live chains.
///
/// Each request owns exactly one fork for its duration; forks are never
/// pooled or shared, so concurrent simulations are mutually independent.
pub struct Simulator {
	engine: Arc<dyn ForkEngine>,
	config: SimulatorConfig,
}

impl Simulator {
	/// Create a simulator with default configuration.
	pub fn new(engine: Arc<dyn ForkEngine>) -> Self {
		Self::with_config(engine, SimulatorConfig::default())
	}

	/// Create a simulator with custom configuration.
	pub fn with_config(engine: Arc<dyn ForkEngine>, config: SimulatorConfig) -> Self {
		Self { engine, config }
	}

	/// The active configuration.
	pub fn config(&self) -> &SimulatorConfig {
		&self.config
	}

	/// Simulate one operation against a fork of the live chain.
	///
	/// Never returns an error: failures come back as `success = false` with a
	/// human-readable message. Progress notifications go to `progress` when
	/// supplied; their delivery is best-effort.
	pub async fn simulate(
		&self,
		chain: &dyn LiveChain,
		request: &SimulationRequest,
		progress: Option<&ProgressSink>,
	) -> SimulationResult {
		notify(progress, ProgressStage::Initializing, "Validating simulation request", 0);

		// Precondition checks, before any resource is allocated.
		let Some(endpoint) = filter_ws_endpoints(&request.endpoints).into_iter().next() else {
			notify(progress, ProgressStage::Error, "No WebSocket endpoint available", 100);
			return SimulationResult::failure(
				SimulatorError::Configuration(
					"no usable RPC endpoint: simulation requires at least one WebSocket (ws:// or wss://) endpoint"
						.to_string(),
				)
				.to_string(),
			);
		};

		let sender = match request.sender.parse::<AccountId32>() {
			Ok(sender) => sender,
			Err(_) => {
				notify(progress, ProgressStage::Error, "Invalid sender address", 100);
				return SimulationResult::failure(
					SimulatorError::Configuration(format!(
						"invalid sender address `{}`: not a valid SS58 account id",
						request.sender
					))
					.to_string(),
				);
			},
		};

		if let Some(registry) = request.operation.registry {
			let ours = chain.registry_fingerprint();
			if registry != ours {
				let err = SimulatorError::RegistryMismatch {
					operation_spec: registry.spec_version,
					operation_genesis: registry.genesis_hash,
					chain_spec: ours.spec_version,
					chain_genesis: ours.genesis_hash,
				};
				notify(progress, ProgressStage::Error, "Registry mismatch", 100);
				return SimulationResult::failure(err.to_string());
			}
		}

		match self.run_single(chain, request, endpoint, &sender, progress).await {
			Ok(result) => {
				if result.success {
					notify(progress, ProgressStage::Complete, "Simulation complete", 100);
				} else {
					notify(progress, ProgressStage::Error, "Simulation found a failure", 100);
				}
				result
			},
			Err(err) => {
				notify(progress, ProgressStage::Error, "Simulation failed", 100);
				SimulationResult::failure(clean_error_message(&err.to_string()))
			},
		}
	}

	async fn run_single(
		&self,
		chain: &dyn LiveChain,
		request: &SimulationRequest,
		endpoint: Url,
		sender: &AccountId32,
		progress: Option<&ProgressSink>,
	) -> Result<SimulationResult, SimulatorError> {
		// Prefer the finalized head of the handle that encoded the operation:
		// it guarantees the fork's runtime metadata matches the metadata used
		// to encode the operation's call indices.
		let anchor = match request.anchor {
			Some(hash) => Some(hash),
			None => match chain.finalized_head().await {
				Ok(hash) => Some(hash),
				Err(e) => {
					log::warn!(
						"Could not fetch the finalized head, forking without an anchor \
						 (runtime metadata may not match the operation's encoding): {e}"
					);
					None
				},
			},
		};

		let db = open_database(
			&self.config.cache_purpose,
			chain.genesis_hash(),
			self.config.cache_dir.as_deref(),
		)
		.await;

		notify(progress, ProgressStage::Forking, "Forking chain state", 20);
		let fork = match self
			.open_fork(endpoint, anchor, request.build_mode, db.clone())
			.await
		{
			Ok(fork) => fork,
			Err(err) => {
				let _ = db.close().await;
				return Err(err);
			},
		};

		let head = fork.head();
		let result = match normalize_block_hash(&head.hash) {
			Ok(head_hash) => {
				// Record the transient fork-point block; deleted on teardown.
				if let Err(e) = db
					.save_block(BlockEntry {
						hash: head_hash,
						number: head.number,
						parent_hash: head.parent_hash,
						header: head.header.clone(),
						extrinsics: vec![],
						storage_diff: vec![],
					})
					.await
				{
					log::debug!("transient block entry not recorded: {e}");
				}

				let result = self
					.dry_run_operation(chain, request, sender, fork.as_ref(), head_hash, progress)
					.await;

				if let Err(e) = db.delete_block(head_hash).await {
					log::debug!("transient block entry not deleted: {e}");
				}
				result
			},
			Err(err) => Err(err.into()),
		};

		if let Err(e) = fork.close().await {
			log::debug!("fork teardown reported: {e}");
		}
		if let Err(e) = db.close().await {
			log::debug!("database close reported: {e}");
		}

		result
	}

	/// Create the fork, applying the configured pruned-anchor policy.
	pub(crate) async fn open_fork(
		&self,
		endpoint: Url,
		anchor: Option<H256>,
		build_mode: crate::types::BuildMode,
		db: Arc<dyn ForkDatabase>,
	) -> Result<Box<dyn Fork>, SimulatorError> {
		let config =
			ForkConfig { endpoint: endpoint.clone(), anchor, build_mode, db: db.clone() };
		match self.engine.fork(config).await {
			Ok(fork) => Ok(fork),
			Err(EngineError::AnchorUnavailable { anchor: pruned }) =>
				match self.config.anchor_policy {
					AnchorPolicy::FailClosed => Err(SimulatorError::AnchorPruned(pruned)),
					AnchorPolicy::FallBackToLatest => {
						log::warn!(
							"Anchor block {pruned:?} is pruned on {endpoint}; forking at the \
							 engine's latest block. Runtime metadata may no longer match the \
							 operation's encoding."
						);
						self.engine
							.fork(ForkConfig { endpoint, anchor: None, build_mode, db })
							.await
							.map_err(Into::into)
					},
				},
			Err(err) => Err(err.into()),
		}
	}

	async fn dry_run_operation(
		&self,
		chain: &dyn LiveChain,
		request: &SimulationRequest,
		sender: &AccountId32,
		fork: &dyn Fork,
		head_hash: H256,
		progress: Option<&ProgressSink>,
	) -> Result<SimulationResult, SimulatorError> {
		notify(progress, ProgressStage::Executing, "Executing operation on the fork", 45);
		let dry = fork.dry_run(&request.operation.call_data, head_hash).await?;

		notify(progress, ProgressStage::Analyzing, "Analyzing execution outcome", 75);
		let new_head = match &dry.new_head {
			Some(head) => Some(normalize_block_hash(&head.hash)?),
			None => None,
		};

		let sender_key = account_storage_key(&sender.0);
		let balance_changes =
			balance_changes(fork, &dry.storage_diff, &sender_key, head_hash, new_head).await;

		let (mut success, mut error) = match decode_apply_result(&dry.outcome, chain.metadata()) {
			Ok(DispatchOutcome::Success) => (true, None),
			Ok(DispatchOutcome::Failed { message }) => (false, Some(message)),
			Err(raw) => {
				let verdict = classify(&raw, Phase::DryRun, Some(chain.chain_name()));
				if verdict.ignore {
					log::info!(
						"treating dry-run outcome as a simulation artifact ({}): {raw}",
						verdict.classification
					);
					(true, None)
				} else {
					(false, Some(clean_error_message(&raw)))
				}
			},
		};

		// Fee estimation runs against the live chain's own registry so a
		// structural fee-path failure is informative in its own right.
		let estimated_fee = match chain.estimate_fee(&request.operation.call_data).await {
			Ok(fee) => fee.to_string(),
			Err(e) => {
				let raw = e.to_string();
				let verdict = classify(&raw, Phase::FeeEstimation, Some(chain.chain_name()));
				if verdict.ignore {
					log::info!(
						"fee estimation failed with a known artifact ({}), reporting zero: {raw}",
						verdict.classification
					);
					"0".to_string()
				} else {
					success = false;
					error = Some(format!("Fee estimation failed: {}", clean_error_message(&raw)));
					"0".to_string()
				}
			},
		};

		Ok(SimulationResult {
			success,
			error,
			estimated_fee,
			balance_changes,
			events: vec![],
		})
	}
}

/// Compute balance movements for every account the diff touches, with the
/// sender first.
///
/// Reads the "before" balance at `old_head`; the "after" balance comes from
/// the diff where present, otherwise from `new_head` when the engine advanced
/// one. Read failures degrade to "no observed change" rather than failing the
/// simulation.
pub(crate) async fn balance_changes(
	fork: &dyn Fork,
	diff: &StorageDiff,
	sender_key: &[u8],
	old_head: H256,
	new_head: Option<H256>,
) -> Vec<BalanceChange> {
	let mut keys: Vec<Vec<u8>> = vec![sender_key.to_vec()];
	for key in account_keys_in_diff(diff) {
		if key != sender_key {
			keys.push(key);
		}
	}

	let mut changes = Vec::new();
	for key in keys {
		let before = free_balance_of(read_storage(fork, old_head, &key).await.as_deref());
		let after = match lookup_in_diff(diff, &key) {
			Some(value) => free_balance_of(value),
			None => match new_head {
				Some(head) =>
					free_balance_of(read_storage(fork, head, &key).await.as_deref()),
				None => before,
			},
		};
		if let Some(change) = crate::balance::delta(before, after) {
			changes.push(change);
		}
	}
	changes
}

async fn read_storage(fork: &dyn Fork, at: H256, key: &[u8]) -> Option<Vec<u8>> {
	match fork.storage(at, key).await {
		Ok(value) => value,
		Err(e) => {
			log::debug!("storage read for balance delta failed: {e}");
			None
		},
	}
}

/// Strip backend noise (WASM backtraces, stack dumps) from an error message
/// and collapse whitespace.
pub(crate) fn clean_error_message(raw: &str) -> String {
	let mut message = raw;
	for marker in ["WASM backtrace", "wasm backtrace", "Wasm backtrace", "Stack:"] {
		if let Some(index) = message.find(marker) {
			message = &message[..index];
		}
	}
	message
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
		.trim_end_matches([':', ',', ';'])
		.trim()
		.to_string()
}
