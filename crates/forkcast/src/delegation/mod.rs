// SPDX-License-Identifier: GPL-3.0

//! Client/server delegation of simulation requests.
//!
//! Hosting a fork is resource-heavy, so a thin caller (e.g. a UI process)
//! can delegate execution to a separate service over HTTP instead of hosting
//! the fork itself. Both halves share one contract, [`SimulationBackend`],
//! with two implementations:
//!
//! - [`LocalBackend`](server::LocalBackend) hosts the fork in-process.
//! - [`RemoteBackend`](client::RemoteBackend) serializes the same request
//!   across HTTP.
//!
//! Which one a caller ends up with is decided by a capability probe
//! ([`select_backend`]), not compile-time configuration, so orchestration
//! code is identical regardless of where execution happens.

pub mod client;
pub mod server;

use crate::{
	hash,
	types::{
		BuildMode, EncodedOperation, SequenceItem, SequentialSimulationRequest,
		SequentialSimulationResult, SimulationRequest, SimulationResult,
	},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Executes simulation requests, locally or remotely.
#[async_trait]
pub trait SimulationBackend: Send + Sync {
	/// Simulate one operation. Never fails: every code path resolves to a
	/// [`SimulationResult`].
	async fn simulate(&self, request: SimulateBody) -> SimulationResult;

	/// Simulate an ordered sequence of operations against one fork.
	async fn simulate_sequence(&self, request: SimulateSequentialBody)
	-> SequentialSimulationResult;
}

/// Wire shape of a single-operation simulation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateBody {
	/// Ordered RPC endpoint URIs, already health-ranked.
	pub rpc_endpoints: Vec<String>,
	/// `0x`-prefixed hex encoding of the extrinsic.
	pub extrinsic_hex: String,
	/// SS58 address of the sending account.
	pub sender_address: String,
	/// Optional anchor block hash, `0x`-prefixed hex.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub block_hash: Option<String>,
	/// How the fork applies the operation.
	#[serde(default)]
	pub build_block_mode: BuildMode,
}

impl SimulateBody {
	/// Parse the wire shape into a typed request.
	///
	/// The registry fingerprint does not survive the wire, so the resulting
	/// operation carries none and the registry check is skipped server-side.
	pub fn into_request(self) -> Result<SimulationRequest, String> {
		let call_data = parse_hex(&self.extrinsic_hex)
			.map_err(|e| format!("Invalid extrinsicHex: {e}"))?;
		let anchor = self
			.block_hash
			.as_deref()
			.map(|s| hash::parse_h256(s).map_err(|e| format!("Invalid blockHash: {e}")))
			.transpose()?;

		Ok(SimulationRequest {
			endpoints: self.rpc_endpoints,
			operation: EncodedOperation::from_bytes(call_data),
			sender: self.sender_address,
			anchor,
			build_mode: self.build_block_mode,
		})
	}
}

/// Wire shape of one sequence step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceItemBody {
	/// `0x`-prefixed hex encoding of the extrinsic.
	pub extrinsic_hex: String,
	/// SS58 address of this step's sending account.
	pub sender_address: String,
	/// Human-readable description, used in failure messages.
	pub description: String,
}

/// Wire shape of a sequential simulation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateSequentialBody {
	/// Ordered RPC endpoint URIs, already health-ranked.
	pub rpc_endpoints: Vec<String>,
	/// The steps, executed strictly in order.
	pub items: Vec<SequenceItemBody>,
	/// How the fork applies each operation.
	#[serde(default = "instant")]
	pub build_block_mode: BuildMode,
}

fn instant() -> BuildMode {
	BuildMode::Instant
}

impl SimulateSequentialBody {
	/// Parse the wire shape into a typed request.
	pub fn into_request(self) -> Result<SequentialSimulationRequest, String> {
		let items = self
			.items
			.into_iter()
			.enumerate()
			.map(|(index, item)| {
				let call_data = parse_hex(&item.extrinsic_hex).map_err(|e| {
					format!("Invalid extrinsicHex on item {}: {e}", index + 1)
				})?;
				Ok(SequenceItem {
					operation: EncodedOperation::from_bytes(call_data),
					description: item.description,
					sender: item.sender_address,
				})
			})
			.collect::<Result<Vec<_>, String>>()?;

		Ok(SequentialSimulationRequest {
			endpoints: self.rpc_endpoints,
			items,
			build_mode: self.build_block_mode,
		})
	}
}

/// Pick an execution backend by probing the remote service's health.
///
/// An unreachable or unhealthy service is a degraded-mode condition, not an
/// error: the local backend is used instead and the degradation is logged.
pub async fn select_backend(
	local: Arc<dyn SimulationBackend>,
	remote: Option<&Url>,
) -> Arc<dyn SimulationBackend> {
	let Some(remote) = remote else {
		return local;
	};
	let backend = client::RemoteBackend::new(remote.clone());
	match backend.probe().await {
		Ok(()) => {
			log::info!("Delegating simulations to {remote}");
			Arc::new(backend)
		},
		Err(e) => {
			log::warn!("Simulation service at {remote} unavailable ({e}); executing locally");
			local
		},
	}
}

fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
	hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| e.to_string())
}
