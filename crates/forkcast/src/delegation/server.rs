// SPDX-License-Identifier: GPL-3.0

//! Server half of the delegation protocol, and the in-process backend.
//!
//! [`LocalBackend`] hosts the fork engine in-process and is used both
//! directly (callers that can afford the fork) and behind [`router`], the
//! axum surface a thin client delegates to. The simulate routes always
//! answer HTTP 200 with a well-formed result body; failures travel inside
//! the result, never as error statuses the client would have to interpret.

use super::{SimulateBody, SimulateSequentialBody, SimulationBackend};
use crate::{
	error::SimulatorError,
	rpc::ChainClient,
	simulator::Simulator,
	types::{SequentialSimulationResult, SimulationResult, filter_ws_endpoints},
};
use async_trait::async_trait;
use axum::{
	Json, Router,
	extract::State,
	routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;

/// Simulation backend that hosts the fork engine in-process.
pub struct LocalBackend {
	simulator: Simulator,
}

impl LocalBackend {
	/// Create a backend around an existing simulator.
	pub fn new(simulator: Simulator) -> Self {
		Self { simulator }
	}

	async fn connect(&self, endpoints: &[String]) -> Result<ChainClient, String> {
		let ws_endpoints = filter_ws_endpoints(endpoints);
		if ws_endpoints.is_empty() {
			return Err(SimulatorError::Configuration(
				"no usable RPC endpoint: simulation requires at least one WebSocket (ws:// or wss://) endpoint"
					.to_string(),
			)
			.to_string());
		}
		ChainClient::connect_any(&ws_endpoints)
			.await
			.map_err(|e| {
				SimulatorError::Network(format!("could not reach the live chain: {e}")).to_string()
			})
	}
}

#[async_trait]
impl SimulationBackend for LocalBackend {
	async fn simulate(&self, request: SimulateBody) -> SimulationResult {
		let request = match request.into_request() {
			Ok(request) => request,
			Err(message) => return SimulationResult::failure(message),
		};
		let chain = match self.connect(&request.endpoints).await {
			Ok(chain) => chain,
			Err(message) => return SimulationResult::failure(message),
		};
		self.simulator.simulate(&chain, &request, None).await
	}

	async fn simulate_sequence(
		&self,
		request: SimulateSequentialBody,
	) -> SequentialSimulationResult {
		let request = match request.into_request() {
			Ok(request) => request,
			Err(message) => return sequence_failure(message),
		};
		let chain = match self.connect(&request.endpoints).await {
			Ok(chain) => chain,
			Err(message) => return sequence_failure(message),
		};
		self.simulator.simulate_sequence(&chain, &request, None).await
	}
}

fn sequence_failure(error: String) -> SequentialSimulationResult {
	SequentialSimulationResult {
		success: false,
		error: Some(error),
		results: vec![],
		total_estimated_fee: "0".to_string(),
		final_balance_changes: vec![],
	}
}

/// Build the HTTP surface over any simulation backend.
///
/// Routes:
/// - `GET /health` - `{"status": "ok"}`
/// - `POST /simulate` - [`SimulateBody`] in, [`SimulationResult`] out
/// - `POST /simulate-sequential` - [`SimulateSequentialBody`] in,
///   [`SequentialSimulationResult`] out
pub fn router(backend: Arc<dyn SimulationBackend>) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/simulate", post(simulate))
		.route("/simulate-sequential", post(simulate_sequential))
		.with_state(backend)
}

async fn health() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}

async fn simulate(
	State(backend): State<Arc<dyn SimulationBackend>>,
	Json(request): Json<SimulateBody>,
) -> Json<SimulationResult> {
	Json(backend.simulate(request).await)
}

async fn simulate_sequential(
	State(backend): State<Arc<dyn SimulationBackend>>,
	Json(request): Json<SimulateSequentialBody>,
) -> Json<SequentialSimulationResult> {
	Json(backend.simulate_sequence(request).await)
}
