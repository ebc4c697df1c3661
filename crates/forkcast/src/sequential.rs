// SPDX-License-Identifier: GPL-3.0

//! Sequential simulation.
//!
//! [`Simulator::simulate_sequence`] reuses one fork across N operations,
//! committing each as a real (but ephemeral) block so the nonce and balance
//! effects of step *i* are visible when step *i+1* executes. Execution stops
//! at the first failing step; results cover every step attempted, in input
//! order, and the failing step's result is included.

use crate::{
	balance::account_storage_key,
	cache::BlockEntry,
	error::SimulatorError,
	hash::normalize_block_hash,
	outcome::{DispatchOutcome, decode_apply_result},
	policy::{Phase, classify},
	rpc::LiveChain,
	simulator::{Simulator, balance_changes, clean_error_message},
	types::{
		BalanceChange, Direction, ProgressSink, ProgressStage, SequentialSimulationRequest,
		SequentialSimulationResult, SimulationResult, filter_ws_endpoints, notify,
	},
};
use subxt::{config::substrate::H256, utils::AccountId32};

impl Simulator {
	/// Simulate an ordered sequence of operations against one shared fork.
	///
	/// Never returns an error: failures come back as `success = false` with a
	/// message naming the failing step. Teardown of the fork and database is
	/// guaranteed on every exit path.
	pub async fn simulate_sequence(
		&self,
		chain: &dyn LiveChain,
		request: &SequentialSimulationRequest,
		progress: Option<&ProgressSink>,
	) -> SequentialSimulationResult {
		notify(progress, ProgressStage::Initializing, "Validating simulation sequence", 0);

		let Some(endpoint) = filter_ws_endpoints(&request.endpoints).into_iter().next() else {
			notify(progress, ProgressStage::Error, "No WebSocket endpoint available", 100);
			return failure_result(
				SimulatorError::Configuration(
					"no usable RPC endpoint: simulation requires at least one WebSocket (ws:// or wss://) endpoint"
						.to_string(),
				)
				.to_string(),
				vec![],
			);
		};

		if request.items.is_empty() {
			notify(progress, ProgressStage::Error, "Empty sequence", 100);
			return failure_result("Sequential simulation requires at least one operation", vec![]);
		}

		// All items share one fork, so they must all share the live handle's
		// registry; any mismatch fails before a fork is created.
		let ours = chain.registry_fingerprint();
		for (index, item) in request.items.iter().enumerate() {
			if let Some(registry) = item.operation.registry {
				if registry != ours {
					notify(progress, ProgressStage::Error, "Registry mismatch", 100);
					return failure_result(
						format!(
							"Item {} ({}) was encoded against a different registry than the live chain",
							index + 1,
							item.description
						),
						vec![],
					);
				}
			}
		}

		let db = crate::cache::open_database(
			&self.config().cache_purpose,
			chain.genesis_hash(),
			self.config().cache_dir.as_deref(),
		)
		.await;

		notify(progress, ProgressStage::Forking, "Forking chain state", 20);
		// No pinned anchor: the fork starts from the engine's latest block.
		let fork = match self
			.open_fork(endpoint, None, request.build_mode, db.clone())
			.await
		{
			Ok(fork) => fork,
			Err(err) => {
				let _ = db.close().await;
				notify(progress, ProgressStage::Error, "Fork creation failed", 100);
				return failure_result(clean_error_message(&err.to_string()), vec![]);
			},
		};

		let mut transient_blocks: Vec<H256> = Vec::new();
		let head = fork.head();
		let mut current_head = match normalize_block_hash(&head.hash) {
			Ok(hash) => {
				if db
					.save_block(BlockEntry {
						hash,
						number: head.number,
						parent_hash: head.parent_hash,
						header: head.header.clone(),
						extrinsics: vec![],
						storage_diff: vec![],
					})
					.await
					.is_ok()
				{
					transient_blocks.push(hash);
				}
				hash
			},
			Err(err) => {
				let _ = fork.close().await;
				let _ = db.close().await;
				notify(progress, ProgressStage::Error, "Fork head unusable", 100);
				return failure_result(clean_error_message(&err.to_string()), vec![]);
			},
		};

		let total = request.items.len();
		let mut results: Vec<SimulationResult> = Vec::new();
		let mut total_fee: u128 = 0;
		let mut sequence_error: Option<String> = None;

		for (index, item) in request.items.iter().enumerate() {
			let step = index + 1;
			notify(
				progress,
				ProgressStage::Executing,
				&format!("Applying operation {step}/{total}: {}", item.description),
				(20 + (60 * index / total)) as u8,
			);

			let sender = match item.sender.parse::<AccountId32>() {
				Ok(sender) => sender,
				Err(_) => {
					results.push(SimulationResult::failure(format!(
						"Invalid sender address `{}`",
						item.sender
					)));
					sequence_error = Some(format!(
						"Item {step} ({}) has an invalid sender address",
						item.description
					));
					break;
				},
			};

			let built = match fork.build_block(&item.operation.call_data).await {
				Ok(built) => built,
				Err(err) => {
					let message = clean_error_message(&err.to_string());
					results.push(SimulationResult::failure(message.clone()));
					sequence_error =
						Some(format!("Item {step} ({}) failed: {message}", item.description));
					break;
				},
			};

			let new_head = match normalize_block_hash(&built.head.hash) {
				Ok(hash) => hash,
				Err(err) => {
					let message = clean_error_message(&err.to_string());
					results.push(SimulationResult::failure(message.clone()));
					sequence_error =
						Some(format!("Item {step} ({}) failed: {message}", item.description));
					break;
				},
			};
			if db
				.save_block(BlockEntry {
					hash: new_head,
					number: built.head.number,
					parent_hash: built.head.parent_hash,
					header: built.head.header.clone(),
					extrinsics: vec![item.operation.call_data.clone()],
					storage_diff: built.storage_diff.clone(),
				})
				.await
				.is_ok()
			{
				transient_blocks.push(new_head);
			}

			// Block-level dispatch outcome for this item's operation.
			let outcome = match decode_apply_result(&built.outcome, chain.metadata()) {
				Ok(outcome) => outcome,
				Err(raw) => {
					let verdict = classify(&raw, Phase::DryRun, Some(chain.chain_name()));
					if verdict.ignore {
						log::info!(
							"treating block outcome as a simulation artifact ({}): {raw}",
							verdict.classification
						);
						DispatchOutcome::Success
					} else {
						DispatchOutcome::Failed { message: clean_error_message(&raw) }
					}
				},
			};

			if let DispatchOutcome::Failed { message } = outcome {
				results.push(SimulationResult::failure(message.clone()));
				sequence_error =
					Some(format!("Item {step} ({}) failed: {message}", item.description));
				break;
			}

			// This item's own before/after delta: before is the head the block
			// was built on, not the original fork point.
			let sender_key = account_storage_key(&sender.0);
			let changes = balance_changes(
				fork.as_ref(),
				&built.storage_diff,
				&sender_key,
				current_head,
				Some(new_head),
			)
			.await;

			let fee = match chain.estimate_fee(&item.operation.call_data).await {
				Ok(fee) => fee,
				Err(e) => {
					let raw = e.to_string();
					let verdict = classify(&raw, Phase::FeeEstimation, Some(chain.chain_name()));
					if verdict.ignore {
						log::info!(
							"fee estimation for item {step} failed with a known artifact ({}): {raw}",
							verdict.classification
						);
						0
					} else {
						let message =
							format!("Fee estimation failed: {}", clean_error_message(&raw));
						results.push(SimulationResult::failure(message.clone()));
						sequence_error =
							Some(format!("Item {step} ({}) failed: {message}", item.description));
						break;
					}
				},
			};

			total_fee = total_fee.saturating_add(fee);
			results.push(SimulationResult::ok(fee.to_string(), changes));
			current_head = new_head;
		}

		// Guaranteed teardown: transient blocks, fork, database.
		for hash in &transient_blocks {
			if let Err(e) = db.delete_block(*hash).await {
				log::debug!("transient block entry not deleted: {e}");
			}
		}
		if let Err(e) = fork.close().await {
			log::debug!("fork teardown reported: {e}");
		}
		if let Err(e) = db.close().await {
			log::debug!("database close reported: {e}");
		}

		let success = sequence_error.is_none();
		if success {
			notify(progress, ProgressStage::Complete, "Sequence complete", 100);
		} else {
			notify(progress, ProgressStage::Error, "Sequence stopped at a failure", 100);
		}

		SequentialSimulationResult {
			success,
			error: sequence_error,
			final_balance_changes: aggregate_changes(&results),
			results,
			total_estimated_fee: total_fee.to_string(),
		}
	}
}

fn failure_result(error: impl Into<String>, results: Vec<SimulationResult>) -> SequentialSimulationResult {
	SequentialSimulationResult {
		success: false,
		error: Some(error.into()),
		results,
		total_estimated_fee: "0".to_string(),
		final_balance_changes: vec![],
	}
}

/// Directional aggregate across all per-step results: one `send` total and
/// one `receive` total. Advisory only; opposing per-step movements are not
/// netted against each other.
fn aggregate_changes(results: &[SimulationResult]) -> Vec<BalanceChange> {
	let mut sent: u128 = 0;
	let mut received: u128 = 0;
	for result in results {
		for change in &result.balance_changes {
			let Ok(value) = change.value.parse::<u128>() else { continue };
			match change.change {
				Direction::Send => sent = sent.saturating_add(value),
				Direction::Receive => received = received.saturating_add(value),
			}
		}
	}

	let mut aggregate = Vec::new();
	if sent > 0 {
		aggregate.push(BalanceChange { value: sent.to_string(), change: Direction::Send });
	}
	if received > 0 {
		aggregate.push(BalanceChange { value: received.to_string(), change: Direction::Receive });
	}
	aggregate
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		balance::account_storage_key,
		testing::{
			ALICE, ALICE_SS58, BOB, BOB_SS58, MockChain, MockEngine, account_blob,
			encoded_success, encoded_token_error,
		},
		types::{BuildMode, EncodedOperation, SequenceItem},
	};

	fn item(description: &str, sender: &str) -> SequenceItem {
		SequenceItem {
			operation: EncodedOperation::from_bytes(vec![0x0a, 0x00]),
			description: description.to_string(),
			sender: sender.to_string(),
		}
	}

	fn request(items: Vec<SequenceItem>) -> SequentialSimulationRequest {
		SequentialSimulationRequest {
			endpoints: vec!["wss://rpc.example.com".to_string()],
			items,
			build_mode: BuildMode::Instant,
		}
	}

	#[tokio::test]
	async fn no_websocket_endpoint_fails_without_forking() {
		let engine = MockEngine::new();
		let simulator = Simulator::new(engine.clone().into_arc());
		let chain = MockChain::new();

		let mut req = request(vec![item("transfer", ALICE_SS58)]);
		req.endpoints = vec!["http://rpc.example.com".to_string()];

		let result = simulator.simulate_sequence(&chain, &req, None).await;

		assert!(!result.success);
		assert!(result.error.as_deref().unwrap().contains("WebSocket"));
		assert_eq!(engine.forks_created(), 0);
	}

	#[tokio::test]
	async fn empty_sequence_is_rejected() {
		let engine = MockEngine::new();
		let simulator = Simulator::new(engine.clone().into_arc());
		let chain = MockChain::new();

		let result = simulator.simulate_sequence(&chain, &request(vec![]), None).await;

		assert!(!result.success);
		assert!(result.results.is_empty());
		assert_eq!(engine.forks_created(), 0);
	}

	#[tokio::test]
	async fn all_items_succeed_with_summed_fees() {
		let engine = MockEngine::new()
			.with_build_block(encoded_success(), vec![])
			.with_build_block(encoded_success(), vec![]);
		let simulator = Simulator::new(engine.clone().into_arc());
		let chain = MockChain::new().with_fee(700);

		let req = request(vec![item("first", ALICE_SS58), item("second", ALICE_SS58)]);
		let result = simulator.simulate_sequence(&chain, &req, None).await;

		assert!(result.success, "error: {:?}", result.error);
		assert_eq!(result.results.len(), 2);
		assert_eq!(result.total_estimated_fee, "1400");
		assert_eq!(engine.open_forks(), 0, "fork must be torn down");
		assert_eq!(engine.forks_created(), 1, "sequence shares one fork");
	}

	#[tokio::test]
	async fn stops_at_first_failure_and_reports_only_attempted_items() {
		let engine = MockEngine::new()
			.with_build_block(encoded_token_error(), vec![])
			.with_build_block(encoded_success(), vec![]);
		let simulator = Simulator::new(engine.clone().into_arc());
		let chain = MockChain::new();

		let req = request(vec![item("failing transfer", ALICE_SS58), item("never runs", BOB_SS58)]);
		let result = simulator.simulate_sequence(&chain, &req, None).await;

		assert!(!result.success);
		// Only the failing item's result is present; the second was never attempted.
		assert_eq!(result.results.len(), 1);
		assert!(!result.results[0].success);
		let error = result.error.as_deref().unwrap();
		assert!(error.contains("Item 1"), "got: {error}");
		assert!(error.contains("failing transfer"), "got: {error}");
	}

	#[tokio::test]
	async fn later_items_see_earlier_effects() {
		// Item 1 funds Alice with 10; item 2 moves 5 from Alice to Bob. Each
		// item's delta is computed against its own baseline, so item 2 shows
		// Alice sending 5 (from 10 down to 5), not a change from the original
		// empty account.
		let alice_key = account_storage_key(&ALICE);
		let bob_key = account_storage_key(&BOB);
		let engine = MockEngine::new()
			.with_build_block(
				encoded_success(),
				vec![(alice_key.clone(), Some(account_blob(10)))],
			)
			.with_build_block(
				encoded_success(),
				vec![
					(alice_key.clone(), Some(account_blob(5))),
					(bob_key.clone(), Some(account_blob(5))),
				],
			);
		let simulator = Simulator::new(engine.clone().into_arc());
		let chain = MockChain::new().with_fee(0);

		let req = request(vec![item("fund alice", ALICE_SS58), item("alice pays bob", ALICE_SS58)]);
		let result = simulator.simulate_sequence(&chain, &req, None).await;

		assert!(result.success, "error: {:?}", result.error);
		assert_eq!(result.results.len(), 2);

		let first = &result.results[0].balance_changes;
		assert_eq!(first.len(), 1);
		assert_eq!(first[0].change, Direction::Receive);
		assert_eq!(first[0].value, "10");

		let second = &result.results[1].balance_changes;
		assert_eq!(second.len(), 2);
		assert_eq!(second[0].change, Direction::Send);
		assert_eq!(second[0].value, "5");
		assert_eq!(second[1].change, Direction::Receive);
		assert_eq!(second[1].value, "5");

		// Advisory aggregate: directional sums across all steps.
		assert_eq!(
			result.final_balance_changes,
			vec![
				BalanceChange { value: "5".to_string(), change: Direction::Send },
				BalanceChange { value: "15".to_string(), change: Direction::Receive },
			]
		);
	}

	#[tokio::test]
	async fn engine_failure_mid_sequence_stops_and_cleans_up() {
		let engine = MockEngine::new()
			.with_build_block(encoded_success(), vec![])
			.with_build_error("fork service fell over");
		let simulator = Simulator::new(engine.clone().into_arc());
		let chain = MockChain::new();

		let req = request(vec![
			item("ok", ALICE_SS58),
			item("engine dies", ALICE_SS58),
			item("never runs", ALICE_SS58),
		]);
		let result = simulator.simulate_sequence(&chain, &req, None).await;

		assert!(!result.success);
		assert_eq!(result.results.len(), 2);
		assert!(result.error.as_deref().unwrap().contains("Item 2"));
		assert_eq!(engine.open_forks(), 0);
		assert_eq!(engine.remaining_blocks().await, 0, "no leaked block entries");
	}

	#[tokio::test]
	async fn blocks_are_recorded_and_removed() {
		let engine = MockEngine::new()
			.with_build_block(encoded_success(), vec![])
			.with_build_block(encoded_success(), vec![]);
		let simulator = Simulator::new(engine.clone().into_arc());
		let chain = MockChain::new();

		let req = request(vec![item("a", ALICE_SS58), item("b", ALICE_SS58)]);
		simulator.simulate_sequence(&chain, &req, None).await;

		// Fork point plus one block per item existed during the run.
		assert_eq!(engine.peak_blocks(), 2);
		assert_eq!(engine.remaining_blocks().await, 0);
	}

	#[tokio::test]
	async fn invalid_sender_mid_sequence_stops() {
		let engine = MockEngine::new().with_build_block(encoded_success(), vec![]);
		let simulator = Simulator::new(engine.clone().into_arc());
		let chain = MockChain::new();

		let req = request(vec![item("ok", ALICE_SS58), item("bad sender", "garbage")]);
		let result = simulator.simulate_sequence(&chain, &req, None).await;

		assert!(!result.success);
		assert_eq!(result.results.len(), 2);
		assert!(result.error.as_deref().unwrap().contains("Item 2"));
	}

	#[test]
	fn aggregate_ignores_unparseable_values() {
		let results = vec![SimulationResult {
			success: true,
			error: None,
			estimated_fee: "0".to_string(),
			balance_changes: vec![
				BalanceChange { value: "not a number".to_string(), change: Direction::Send },
				BalanceChange { value: "3".to_string(), change: Direction::Receive },
			],
			events: vec![],
		}];
		assert_eq!(
			aggregate_changes(&results),
			vec![BalanceChange { value: "3".to_string(), change: Direction::Receive }]
		);
	}
}
