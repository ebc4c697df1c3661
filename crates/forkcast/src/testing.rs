// SPDX-License-Identifier: GPL-3.0

//! Shared testing utilities for forkcast tests.
//!
//! Provides a scriptable in-process fork engine and live-chain double so the
//! simulation pipelines can be exercised without a network or a runtime.

use crate::{
	balance::{AccountData, AccountInfo},
	cache::ForkDatabase,
	engine::{BuiltBlock, DryRunOutcome, Fork, ForkConfig, ForkEngine, ForkHead},
	error::{EngineError, RpcClientError},
	hash,
	rpc::LiveChain,
	strings::engine::methods,
	types::{RegistryFingerprint, StorageDiff},
};
use async_trait::async_trait;
use scale::Encode;
use serde_json::json;
use std::{
	collections::{HashMap, VecDeque},
	sync::{Arc, Mutex},
};
use subxt::{Metadata, config::substrate::H256};

/// Alice's well-known Sr25519 public key.
pub const ALICE: [u8; 32] = [
	0xd4, 0x35, 0x93, 0xc7, 0x15, 0xfd, 0xd3, 0x1c, 0x61, 0x14, 0x1a, 0xbd, 0x04, 0xa9, 0x9f, 0xd6,
	0x82, 0x2c, 0x85, 0x58, 0x85, 0x4c, 0xcd, 0xe3, 0x9a, 0x56, 0x84, 0xe7, 0xa5, 0x6d, 0xa2, 0x7d,
];

/// Bob's well-known Sr25519 public key.
pub const BOB: [u8; 32] = [
	0x8e, 0xaf, 0x04, 0x15, 0x16, 0x87, 0x73, 0x63, 0x26, 0xc9, 0xfe, 0xa1, 0x7e, 0x25, 0xfc, 0x52,
	0x87, 0x61, 0x36, 0x93, 0xc9, 0x12, 0x90, 0x9c, 0xb2, 0x26, 0xaa, 0x47, 0x94, 0xf2, 0x6a, 0x48,
];

/// Alice's SS58 address.
pub const ALICE_SS58: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

/// Bob's SS58 address.
pub const BOB_SS58: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";

/// SCALE-encoded `AccountInfo` with the given free balance.
pub fn account_blob(free: u128) -> Vec<u8> {
	AccountInfo {
		nonce: 0,
		consumers: 0,
		providers: 1,
		sufficients: 0,
		data: AccountData { free, reserved: 0, frozen: 0, flags: 0 },
	}
	.encode()
}

/// Outcome bytes for a successful application: `Ok(Ok(()))`.
pub fn encoded_success() -> Vec<u8> {
	vec![0x00, 0x00]
}

/// Outcome bytes for `Ok(Err(Token(FundsUnavailable)))`.
pub fn encoded_token_error() -> Vec<u8> {
	vec![0x00, 0x01, 0x07, 0x00]
}

/// Outcome bytes for `Ok(Err(Module { index, error: [error, 0, 0, 0] }))`.
pub fn encoded_module_error(index: u8, error: u8) -> Vec<u8> {
	vec![0x00, 0x01, 0x03, index, error, 0x00, 0x00, 0x00]
}

#[derive(Default)]
struct MockState {
	base_storage: HashMap<Vec<u8>, Vec<u8>>,
	dry_run_outcome: Option<Vec<u8>>,
	dry_run_diff: StorageDiff,
	dry_run_error: Option<String>,
	build_script: VecDeque<Result<(Vec<u8>, StorageDiff), String>>,
	pruned_anchor: bool,
	forks_created: usize,
	open_forks: usize,
	fork_anchors: Vec<Option<H256>>,
	peak_blocks: u64,
}

/// A scriptable fork engine.
///
/// Clones share state, so a clone kept by the test observes everything the
/// simulator did through the engine.
#[derive(Clone, Default)]
pub struct MockEngine {
	state: Arc<Mutex<MockState>>,
	last_db: Arc<Mutex<Option<Arc<dyn ForkDatabase>>>>,
}

impl MockEngine {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn into_arc(self) -> Arc<dyn ForkEngine> {
		Arc::new(self)
	}

	/// Outcome bytes every dry run reports.
	pub fn with_dry_run_outcome(self, outcome: Vec<u8>) -> Self {
		self.state.lock().unwrap().dry_run_outcome = Some(outcome);
		self
	}

	/// Storage diff every dry run reports.
	pub fn with_dry_run_diff(self, diff: StorageDiff) -> Self {
		self.state.lock().unwrap().dry_run_diff = diff;
		self
	}

	/// Make every dry run fail with the given engine error message.
	pub fn with_dry_run_error(self, message: &str) -> Self {
		self.state.lock().unwrap().dry_run_error = Some(message.to_string());
		self
	}

	/// Seed a storage value visible at the fork point.
	pub fn with_storage(self, key: Vec<u8>, value: Vec<u8>) -> Self {
		self.state.lock().unwrap().base_storage.insert(key, value);
		self
	}

	/// Script the next `build_block` call to succeed with the given outcome
	/// bytes and storage diff. Calls are consumed in order.
	pub fn with_build_block(self, outcome: Vec<u8>, diff: StorageDiff) -> Self {
		self.state.lock().unwrap().build_script.push_back(Ok((outcome, diff)));
		self
	}

	/// Script the next `build_block` call to fail at the engine level.
	pub fn with_build_error(self, message: &str) -> Self {
		self.state.lock().unwrap().build_script.push_back(Err(message.to_string()));
		self
	}

	/// Refuse anchored fork attempts as pruned; anchorless attempts succeed.
	pub fn with_pruned_anchor(self) -> Self {
		self.state.lock().unwrap().pruned_anchor = true;
		self
	}

	/// Number of successful fork creations.
	pub fn forks_created(&self) -> usize {
		self.state.lock().unwrap().forks_created
	}

	/// Number of forks created and not yet closed.
	pub fn open_forks(&self) -> usize {
		self.state.lock().unwrap().open_forks
	}

	/// The anchor of every fork attempt, in order, including refused ones.
	pub fn fork_anchors(&self) -> Vec<Option<H256>> {
		self.state.lock().unwrap().fork_anchors.clone()
	}

	/// Highest database block count observed while the engine was executing.
	pub fn peak_blocks(&self) -> u64 {
		self.state.lock().unwrap().peak_blocks
	}

	/// Database block count left behind after the last simulation.
	pub async fn remaining_blocks(&self) -> u64 {
		let db = self.last_db.lock().unwrap().clone();
		match db {
			Some(db) => db.blocks_count().await.unwrap_or(u64::MAX),
			None => 0,
		}
	}
}

// The database handle is observed separately from the scripted state so the
// async count query never overlaps a held state lock.
impl MockEngine {
	fn record_db(&self, db: &Arc<dyn ForkDatabase>) {
		*self.last_db.lock().unwrap() = Some(db.clone());
	}
}

#[async_trait]
impl ForkEngine for MockEngine {
	async fn fork(&self, config: ForkConfig) -> Result<Box<dyn Fork>, EngineError> {
		self.record_db(&config.db);
		let mut state = self.state.lock().unwrap();
		state.fork_anchors.push(config.anchor);

		if state.pruned_anchor {
			if let Some(anchor) = config.anchor {
				return Err(EngineError::AnchorUnavailable { anchor });
			}
		}

		state.forks_created += 1;
		state.open_forks += 1;

		let fork_point = HeadState {
			hash: H256::from([100u8; 32]),
			number: 100,
			parent_hash: H256::from([99u8; 32]),
		};
		let mut snapshots = HashMap::new();
		snapshots.insert(fork_point.hash, state.base_storage.clone());
		drop(state);

		Ok(Box::new(MockFork {
			state: self.state.clone(),
			db: config.db,
			head: Mutex::new(fork_point),
			snapshots: Mutex::new(snapshots),
		}))
	}
}

#[derive(Clone, Copy)]
struct HeadState {
	hash: H256,
	number: u32,
	parent_hash: H256,
}

impl HeadState {
	/// Render the head the way an engine reports it: hash wrapped in an
	/// object shape, exercising normalization in the pipeline.
	fn render(&self) -> ForkHead {
		ForkHead {
			hash: json!({ "hash": hash::to_hex(&self.hash) }),
			number: self.number,
			parent_hash: self.parent_hash,
			header: vec![],
		}
	}
}

struct MockFork {
	state: Arc<Mutex<MockState>>,
	db: Arc<dyn ForkDatabase>,
	head: Mutex<HeadState>,
	snapshots: Mutex<HashMap<H256, HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MockFork {
	async fn observe_blocks(&self) {
		let count = self.db.blocks_count().await.unwrap_or(0);
		let mut state = self.state.lock().unwrap();
		state.peak_blocks = state.peak_blocks.max(count);
	}
}

#[async_trait]
impl Fork for MockFork {
	fn head(&self) -> ForkHead {
		self.head.lock().unwrap().render()
	}

	async fn dry_run(&self, _extrinsic: &[u8], _at: H256) -> Result<DryRunOutcome, EngineError> {
		self.observe_blocks().await;
		let state = self.state.lock().unwrap();
		if let Some(message) = &state.dry_run_error {
			return Err(EngineError::RequestFailed {
				method: methods::FORK_DRY_RUN,
				message: message.clone(),
			});
		}
		Ok(DryRunOutcome {
			outcome: state.dry_run_outcome.clone().unwrap_or_else(encoded_success),
			storage_diff: state.dry_run_diff.clone(),
			new_head: None,
		})
	}

	async fn build_block(&self, _extrinsic: &[u8]) -> Result<BuiltBlock, EngineError> {
		self.observe_blocks().await;
		let script = self.state.lock().unwrap().build_script.pop_front();
		let (outcome, diff) = match script {
			Some(Ok(entry)) => entry,
			Some(Err(message)) =>
				return Err(EngineError::RequestFailed {
					method: methods::FORK_BUILD_BLOCK,
					message,
				}),
			None => (encoded_success(), vec![]),
		};

		let mut head = self.head.lock().unwrap();
		let mut snapshots = self.snapshots.lock().unwrap();

		let mut next_state = snapshots
			.get(&head.hash)
			.cloned()
			.unwrap_or_default();
		for (key, value) in &diff {
			match value {
				Some(value) => next_state.insert(key.clone(), value.clone()),
				None => next_state.remove(key),
			};
		}

		let next = HeadState {
			hash: H256::from([(head.number + 1) as u8; 32]),
			number: head.number + 1,
			parent_hash: head.hash,
		};
		snapshots.insert(next.hash, next_state);
		*head = next;

		Ok(BuiltBlock { head: next.render(), outcome, storage_diff: diff })
	}

	async fn storage(&self, at: H256, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
		let snapshots = self.snapshots.lock().unwrap();
		let state = match snapshots.get(&at) {
			Some(state) => state.get(key).cloned(),
			// Unknown block: read the fork point's base state.
			None => self.state.lock().unwrap().base_storage.get(key).cloned(),
		};
		Ok(state)
	}

	async fn close(&self) -> Result<(), EngineError> {
		self.state.lock().unwrap().open_forks -= 1;
		Ok(())
	}
}

/// A scriptable live-chain double.
pub struct MockChain {
	genesis: H256,
	name: String,
	spec_version: u32,
	finalized: H256,
	finalized_error: bool,
	fee: u128,
	fee_error: Option<String>,
}

impl Default for MockChain {
	fn default() -> Self {
		Self {
			genesis: H256::from([0x77; 32]),
			name: "Polkadot".to_string(),
			spec_version: 1_003_000,
			finalized: H256::from([0x55; 32]),
			finalized_error: false,
			fee: 1_000,
			fee_error: None,
		}
	}
}

impl MockChain {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_name(mut self, name: &str) -> Self {
		self.name = name.to_string();
		self
	}

	pub fn with_fee(mut self, fee: u128) -> Self {
		self.fee = fee;
		self
	}

	pub fn with_fee_error(mut self, message: &str) -> Self {
		self.fee_error = Some(message.to_string());
		self
	}

	pub fn with_finalized_head_error(mut self) -> Self {
		self.finalized_error = true;
		self
	}

	/// The finalized head this chain reports.
	pub fn finalized(&self) -> H256 {
		self.finalized
	}
}

#[async_trait]
impl LiveChain for MockChain {
	fn genesis_hash(&self) -> H256 {
		self.genesis
	}

	fn chain_name(&self) -> &str {
		&self.name
	}

	fn registry_fingerprint(&self) -> RegistryFingerprint {
		RegistryFingerprint { genesis_hash: self.genesis, spec_version: self.spec_version }
	}

	fn metadata(&self) -> Option<&Metadata> {
		None
	}

	async fn finalized_head(&self) -> Result<H256, RpcClientError> {
		if self.finalized_error {
			return Err(RpcClientError::RequestFailed {
				method: crate::strings::rpc::methods::CHAIN_GET_FINALIZED_HEAD,
				message: "mock finalized head failure".to_string(),
			});
		}
		Ok(self.finalized)
	}

	async fn estimate_fee(&self, _extrinsic: &[u8]) -> Result<u128, RpcClientError> {
		match &self.fee_error {
			Some(message) => Err(RpcClientError::RequestFailed {
				method: crate::strings::rpc::methods::PAYMENT_QUERY_INFO,
				message: message.clone(),
			}),
			None => Ok(self.fee),
		}
	}
}
