// SPDX-License-Identifier: GPL-3.0

//! HTTP client half of the delegation protocol.
//!
//! [`RemoteBackend`] serializes simulation requests to an execution service.
//! A health probe with a short timeout precedes every delegated call; an
//! unreachable or unhealthy service produces a degraded-mode result rather
//! than an error, and no code path leaves the caller hanging past the
//! configured timeouts.

use super::{SimulateBody, SimulateSequentialBody, SimulationBackend};
use crate::types::{SequentialSimulationResult, SimulationResult};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use url::Url;

/// Timeout for the health probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a full simulation request. Generous: a cold fork has
/// to mirror remote state before it can execute anything.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Simulation backend that delegates to a remote execution service.
pub struct RemoteBackend {
	base: Url,
	client: reqwest::Client,
	probe_timeout: Duration,
	request_timeout: Duration,
}

impl RemoteBackend {
	/// Create a backend for the given service base URL.
	pub fn new(base: Url) -> Self {
		Self {
			base,
			client: reqwest::Client::new(),
			probe_timeout: PROBE_TIMEOUT,
			request_timeout: REQUEST_TIMEOUT,
		}
	}

	/// Override the probe and request timeouts.
	pub fn with_timeouts(mut self, probe: Duration, request: Duration) -> Self {
		self.probe_timeout = probe;
		self.request_timeout = request;
		self
	}

	/// Check whether the service is reachable and healthy.
	///
	/// Anything other than an HTTP 200 carrying `{"status": "ok"}` within the
	/// probe timeout means the service is unavailable.
	pub async fn probe(&self) -> Result<(), String> {
		let url = self.join("health")?;
		let response = self
			.client
			.get(url)
			.timeout(self.probe_timeout)
			.send()
			.await
			.map_err(describe_network_error)?;

		if !response.status().is_success() {
			return Err(format!("health probe returned HTTP {}", response.status()));
		}

		let body: serde_json::Value = response
			.json()
			.await
			.map_err(|e| format!("health probe returned a malformed body: {e}"))?;

		match body.get("status").and_then(serde_json::Value::as_str) {
			Some("ok") => Ok(()),
			other => Err(format!("health probe reported status {other:?}")),
		}
	}

	async fn post<B: Serialize + Sync, R: DeserializeOwned>(
		&self,
		path: &str,
		body: &B,
	) -> Result<R, String> {
		let url = self.join(path)?;
		let response = self
			.client
			.post(url)
			.json(body)
			.timeout(self.request_timeout)
			.send()
			.await
			.map_err(describe_network_error)?;

		let status = response.status();
		if !status.is_success() {
			return Err(format!("simulation service returned HTTP {status}"));
		}

		response
			.json()
			.await
			.map_err(|e| format!("simulation service returned a malformed body: {e}"))
	}

	fn join(&self, path: &str) -> Result<Url, String> {
		self.base.join(path).map_err(|e| format!("invalid service URL: {e}"))
	}
}

#[async_trait]
impl SimulationBackend for RemoteBackend {
	async fn simulate(&self, request: SimulateBody) -> SimulationResult {
		if let Err(e) = self.probe().await {
			return SimulationResult::failure(format!("Simulation service unavailable: {e}"));
		}
		match self.post("simulate", &request).await {
			Ok(result) => result,
			Err(e) => SimulationResult::failure(format!("Simulation request failed: {e}")),
		}
	}

	async fn simulate_sequence(
		&self,
		request: SimulateSequentialBody,
	) -> SequentialSimulationResult {
		if let Err(e) = self.probe().await {
			return sequence_failure(format!("Simulation service unavailable: {e}"));
		}
		match self.post("simulate-sequential", &request).await {
			Ok(result) => result,
			Err(e) => sequence_failure(format!("Simulation request failed: {e}")),
		}
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

/// Render a reqwest failure so that timeouts, connection failures, and other
/// network errors are distinguishable in the returned text.
fn describe_network_error(error: reqwest::Error) -> String {
	if error.is_timeout() {
		format!("request timed out: {error}")
	} else if error.is_connect() {
		format!("connection failed: {error}")
	} else {
		format!("network error: {error}")
	}
}
