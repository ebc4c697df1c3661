// SPDX-License-Identifier: GPL-3.0

//! Request and result types for extrinsic simulation.
//!
//! Result types serialize with camelCase field names so that the in-process
//! and HTTP-delegated execution paths share one wire shape.

use serde::{Deserialize, Serialize};
use subxt::config::substrate::H256;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

/// An ordered list of storage changes produced by one fork mutation.
///
/// Each entry is `(key, value)` where `value` is `None` for deleted keys.
pub type StorageDiff = Vec<(Vec<u8>, Option<Vec<u8>>)>;

/// How the fork applies an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BuildMode {
	/// One-shot dry run: execute against the fork head without producing a block.
	#[default]
	Batch,
	/// Produce a real (but ephemeral) block so effects compound.
	Instant,
}

/// Identity of the codec registry an operation was encoded against.
///
/// Operations encoded against one registry and executed against state with a
/// different one decode into garbage call indices; comparing fingerprints up
/// front turns that failure mode into an explicit error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryFingerprint {
	/// Genesis hash of the chain the registry was fetched from.
	pub genesis_hash: H256,
	/// Runtime spec version of the registry.
	pub spec_version: u32,
}

/// An opaque, pre-encoded extrinsic together with the registry that built it.
#[derive(Debug, Clone)]
pub struct EncodedOperation {
	/// SCALE-encoded extrinsic bytes.
	pub call_data: Vec<u8>,
	/// Fingerprint of the registry the extrinsic was encoded against.
	///
	/// `None` when the operation crossed a delegation boundary that erased
	/// its origin (the registry check is skipped in that case).
	pub registry: Option<RegistryFingerprint>,
}

impl EncodedOperation {
	/// Create an operation from raw call bytes with no registry fingerprint.
	pub fn from_bytes(call_data: Vec<u8>) -> Self {
		Self { call_data, registry: None }
	}

	/// Attach a registry fingerprint.
	pub fn with_registry(mut self, registry: RegistryFingerprint) -> Self {
		self.registry = Some(registry);
		self
	}
}

/// A request to simulate one operation.
#[derive(Debug, Clone)]
pub struct SimulationRequest {
	/// Ordered RPC endpoint URIs, already health-ranked by the caller.
	pub endpoints: Vec<String>,
	/// The operation to simulate.
	pub operation: EncodedOperation,
	/// SS58 address of the sending account.
	pub sender: String,
	/// Optional anchor block hash to fork at. When absent the simulator
	/// anchors at the live chain's finalized head.
	pub anchor: Option<H256>,
	/// How the fork applies the operation.
	pub build_mode: BuildMode,
}

/// One step of a sequential simulation.
#[derive(Debug, Clone)]
pub struct SequenceItem {
	/// The operation to apply in this step.
	pub operation: EncodedOperation,
	/// Human-readable description, used in failure messages.
	pub description: String,
	/// SS58 address of this step's sending account.
	pub sender: String,
}

/// A request to simulate an ordered sequence of operations against one fork.
#[derive(Debug, Clone)]
pub struct SequentialSimulationRequest {
	/// Ordered RPC endpoint URIs, already health-ranked by the caller.
	pub endpoints: Vec<String>,
	/// The steps, executed strictly in order.
	pub items: Vec<SequenceItem>,
	/// How the fork applies each operation.
	pub build_mode: BuildMode,
}

/// Direction of a balance movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
	/// Balance left the account.
	Send,
	/// Balance arrived at the account.
	Receive,
}

/// A single balance movement observed during a simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
	/// Magnitude of the change, as a decimal string in the chain's base unit.
	pub value: String,
	/// Direction of the change.
	pub change: Direction,
}

/// The outcome of simulating one operation.
///
/// Always populated: failures are represented as `success = false` with a
/// human-readable `error`, never as a bare error value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
	/// Whether the operation would succeed.
	pub success: bool,
	/// Human-readable failure description when `success` is false.
	pub error: Option<String>,
	/// Estimated fee as a decimal string in the chain's base unit.
	pub estimated_fee: String,
	/// Balance movements observed for accounts touched by the operation.
	pub balance_changes: Vec<BalanceChange>,
	/// Decoded runtime events. Currently always empty; carried for wire
	/// compatibility with callers that render event lists.
	pub events: Vec<serde_json::Value>,
}

impl SimulationResult {
	/// A failed result with the given error message and no fee or deltas.
	pub fn failure(error: impl Into<String>) -> Self {
		Self {
			success: false,
			error: Some(error.into()),
			estimated_fee: "0".to_string(),
			balance_changes: vec![],
			events: vec![],
		}
	}

	/// A successful result with the given fee and balance movements.
	pub fn ok(estimated_fee: String, balance_changes: Vec<BalanceChange>) -> Self {
		Self { success: true, error: None, estimated_fee, balance_changes, events: vec![] }
	}
}

/// The outcome of a sequential simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequentialSimulationResult {
	/// Whether every step succeeded.
	pub success: bool,
	/// Describes the first failing step when `success` is false.
	pub error: Option<String>,
	/// Per-step results, in input order, up to and including the first
	/// failing step. This list is the authoritative record.
	pub results: Vec<SimulationResult>,
	/// Sum of each successful step's estimated fee, as a decimal string.
	pub total_estimated_fee: String,
	/// Advisory aggregate of balance movements across all steps: one `send`
	/// total and one `receive` total, with no netting of opposing per-step
	/// movements. Consult `results` for anything load-bearing.
	pub final_balance_changes: Vec<BalanceChange>,
}

/// Progress stages emitted while a simulation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
	Initializing,
	Forking,
	Executing,
	Analyzing,
	Complete,
	Error,
}

/// A progress notification.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
	/// Current stage.
	pub stage: ProgressStage,
	/// Human-readable status message.
	pub message: String,
	/// Completion estimate, 0-100.
	pub percent: u8,
}

/// Channel end used to deliver progress notifications.
///
/// Delivery is best-effort: a dropped receiver never affects the simulation.
pub type ProgressSink = UnboundedSender<Progress>;

/// Send a progress notification, ignoring delivery failures.
pub(crate) fn notify(sink: Option<&ProgressSink>, stage: ProgressStage, message: &str, percent: u8) {
	if let Some(sink) = sink {
		let _ = sink.send(Progress { stage, message: message.to_string(), percent });
	}
}

/// Filter an endpoint list down to WebSocket-scheme URIs, preserving order.
///
/// Invalid URIs are skipped rather than reported: the list is supplied by an
/// external endpoint-health manager and is treated as given.
pub fn filter_ws_endpoints(endpoints: &[String]) -> Vec<Url> {
	endpoints
		.iter()
		.filter_map(|e| Url::parse(e).ok())
		.filter(|url| matches!(url.scheme(), "ws" | "wss"))
		.collect()
}
