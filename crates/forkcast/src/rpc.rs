// SPDX-License-Identifier: GPL-3.0

//! RPC client for the live chain a simulation is anchored to.
//!
//! Wraps subxt's [`LegacyRpcMethods`] behind a focused API: the simulators
//! need the finalized head (a metadata-consistent fork anchor), the genesis
//! hash (cache namespace), the runtime version (registry fingerprint), the
//! chain name (chain-scoped error classification), runtime metadata (module
//! error resolution), and fee estimation. Legacy (`state_*`, `chain_*`) RPCs
//! are used rather than the newer `chainHead_v1_*` spec because they work
//! against every Polkadot SDK node and need no subscription lifecycle
//! management for point queries.
//!
//! The [`LiveChain`] trait is the seam the simulators consume; [`ChainClient`]
//! is its network-backed implementation.

use crate::{
	error::RpcClientError,
	strings::rpc::methods,
	types::RegistryFingerprint,
};
use async_trait::async_trait;
use serde_json::Value;
use subxt::{
	Metadata, SubstrateConfig,
	backend::{legacy::LegacyRpcMethods, rpc::RpcClient},
	config::substrate::H256,
	ext::codec::Decode,
	ext::subxt_rpcs::rpc_params,
};
use url::Url;

/// Read-only view of the live chain a simulation anchors to.
///
/// Consumed by the simulators; implemented by [`ChainClient`] for real
/// endpoints and by test doubles in unit tests.
#[async_trait]
pub trait LiveChain: Send + Sync {
	/// Genesis hash, used as the cache namespace.
	fn genesis_hash(&self) -> H256;

	/// Human-readable chain name (e.g. "Polkadot Asset Hub").
	fn chain_name(&self) -> &str;

	/// Fingerprint of the codec registry this handle currently speaks.
	fn registry_fingerprint(&self) -> RegistryFingerprint;

	/// Runtime metadata, when available, for module-error resolution.
	fn metadata(&self) -> Option<&Metadata>;

	/// The most recent finalized block hash.
	async fn finalized_head(&self) -> Result<H256, RpcClientError>;

	/// Estimated fee for an encoded extrinsic, in the chain's base unit.
	async fn estimate_fee(&self, extrinsic: &[u8]) -> Result<u128, RpcClientError>;
}

/// RPC client for a live Polkadot-SDK chain.
///
/// Connection-time state (genesis hash, runtime version, chain name,
/// metadata) is fetched once; the runtime version observed at connect time is
/// the registry fingerprint for every operation built against this handle.
pub struct ChainClient {
	rpc: RpcClient,
	legacy: LegacyRpcMethods<SubstrateConfig>,
	endpoint: Url,
	genesis_hash: H256,
	spec_version: u32,
	chain_name: String,
	metadata: Metadata,
}

impl ChainClient {
	/// Connect to a live chain and snapshot its identity.
	///
	/// # Arguments
	/// * `endpoint` - WebSocket URL of the chain's RPC endpoint
	pub async fn connect(endpoint: &Url) -> Result<Self, RpcClientError> {
		let rpc = RpcClient::from_url(endpoint.as_str()).await.map_err(|e| {
			RpcClientError::ConnectionFailed {
				endpoint: endpoint.to_string(),
				message: e.to_string(),
			}
		})?;
		let legacy = LegacyRpcMethods::<SubstrateConfig>::new(rpc.clone());

		let genesis_hash = legacy.genesis_hash().await.map_err(|e| {
			RpcClientError::RequestFailed {
				method: methods::CHAIN_GET_BLOCK_HASH,
				message: e.to_string(),
			}
		})?;

		let runtime_version =
			legacy.state_get_runtime_version(None).await.map_err(|e| {
				RpcClientError::RequestFailed {
					method: methods::STATE_GET_RUNTIME_VERSION,
					message: e.to_string(),
				}
			})?;

		let chain_name = legacy.system_chain().await.map_err(|e| {
			RpcClientError::RequestFailed { method: methods::SYSTEM_CHAIN, message: e.to_string() }
		})?;

		let metadata_bytes = legacy.state_get_metadata(None).await.map_err(|e| {
			RpcClientError::RequestFailed {
				method: methods::STATE_GET_METADATA,
				message: e.to_string(),
			}
		})?;
		let metadata = Metadata::decode(&mut metadata_bytes.into_raw().as_slice())
			.map_err(|_| RpcClientError::MetadataDecode)?;

		Ok(Self {
			rpc,
			legacy,
			endpoint: endpoint.clone(),
			genesis_hash,
			spec_version: runtime_version.spec_version,
			chain_name,
			metadata,
		})
	}

	/// Connect to the first endpoint in an ordered list that answers.
	///
	/// The list is already health-ranked by the caller, so first-wins is the
	/// intended selection.
	pub async fn connect_any(endpoints: &[Url]) -> Result<Self, RpcClientError> {
		let mut last_error = RpcClientError::InvalidResponse("no endpoints supplied".to_string());
		for endpoint in endpoints {
			match Self::connect(endpoint).await {
				Ok(client) => return Ok(client),
				Err(e) => {
					log::warn!("Endpoint {endpoint} unavailable: {e}");
					last_error = e;
				},
			}
		}
		Err(last_error)
	}

	/// The endpoint this client is connected to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Runtime spec version observed at connect time.
	pub fn spec_version(&self) -> u32 {
		self.spec_version
	}

	/// Get a single storage value at a specific block.
	pub async fn storage(
		&self,
		key: &[u8],
		at: Option<H256>,
	) -> Result<Option<Vec<u8>>, RpcClientError> {
		self.legacy.state_get_storage(key, at).await.map_err(|e| {
			RpcClientError::RequestFailed {
				method: methods::STATE_GET_STORAGE,
				message: e.to_string(),
			}
		})
	}
}

#[async_trait]
impl LiveChain for ChainClient {
	fn genesis_hash(&self) -> H256 {
		self.genesis_hash
	}

	fn chain_name(&self) -> &str {
		&self.chain_name
	}

	fn registry_fingerprint(&self) -> RegistryFingerprint {
		RegistryFingerprint { genesis_hash: self.genesis_hash, spec_version: self.spec_version }
	}

	fn metadata(&self) -> Option<&Metadata> {
		Some(&self.metadata)
	}

	async fn finalized_head(&self) -> Result<H256, RpcClientError> {
		self.legacy.chain_get_finalized_head().await.map_err(|e| {
			RpcClientError::RequestFailed {
				method: methods::CHAIN_GET_FINALIZED_HEAD,
				message: e.to_string(),
			}
		})
	}

	async fn estimate_fee(&self, extrinsic: &[u8]) -> Result<u128, RpcClientError> {
		let ext_hex = format!("0x{}", hex::encode(extrinsic));
		let info: Value = self
			.rpc
			.request(methods::PAYMENT_QUERY_INFO, rpc_params![ext_hex])
			.await
			.map_err(|e| RpcClientError::RequestFailed {
				method: methods::PAYMENT_QUERY_INFO,
				message: e.to_string(),
			})?;

		let fee = info.get("partialFee").ok_or_else(|| {
			RpcClientError::InvalidResponse("fee info without partialFee field".to_string())
		})?;
		parse_numeric(fee)
			.ok_or_else(|| RpcClientError::InvalidResponse(format!("unparseable fee value {fee}")))
	}
}

/// Parse a JSON numeric value that nodes render inconsistently: a decimal
/// string, a `0x`-prefixed hex string, or a plain number.
pub(crate) fn parse_numeric(value: &Value) -> Option<u128> {
	match value {
		Value::Number(n) => n.as_u64().map(u128::from),
		Value::String(s) => {
			if let Some(hex_digits) = s.strip_prefix("0x") {
				u128::from_str_radix(hex_digits, 16).ok()
			} else {
				s.parse::<u128>().ok()
			}
		},
		_ => None,
	}
}
