// SPDX-License-Identifier: GPL-3.0

//! Fork engine error types.

use subxt::config::substrate::H256;
use thiserror::Error;

/// Errors that can occur when driving the fork engine.
#[derive(Debug, Error)]
pub enum EngineError {
	/// Failed to connect to the fork service.
	#[error("Failed to connect to fork service at {endpoint}: {message}")]
	ConnectionFailed {
		/// The service URL that failed to connect.
		endpoint: String,
		/// The error message describing the failure.
		message: String,
	},
	/// A fork-service request failed.
	#[error("Fork service request `{method}` failed: {message}")]
	RequestFailed {
		/// The method that failed.
		method: &'static str,
		/// The error message describing the failure.
		message: String,
	},
	/// The requested anchor block is not available on the upstream endpoint.
	#[error("Anchor block {anchor:?} is not available on the selected endpoint (pruned)")]
	AnchorUnavailable {
		/// The anchor block hash that could not be found.
		anchor: H256,
	},
	/// A response field did not have any recognized shape.
	#[error("Invalid fork service response: {0}")]
	InvalidResponse(String),
	/// A block-hash value had no recognized shape.
	#[error("Unrecognized block hash shape: {0}")]
	UnrecognizedHashShape(String),
}
