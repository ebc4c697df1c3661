// SPDX-License-Identifier: GPL-3.0

//! Block-hash normalization.
//!
//! The fork engine reports block hashes in several shapes depending on which
//! backend code path produced them: a raw hex string, an object carrying a
//! `hash` field, an object carrying a pre-rendered `hex` field, or a raw byte
//! array. Every hash crossing from the engine into this crate goes through
//! [`normalize_block_hash`] exactly once; nothing else in the crate inspects
//! the raw shapes.

use crate::{error::EngineError, strings::engine::fields};
use serde_json::Value;
use subxt::config::substrate::H256;

/// Normalize any engine-reported block-hash shape into an [`H256`].
///
/// Accepted shapes:
/// - `"0x…"` / `"…"` - a 32-byte hex string, with or without the `0x` prefix
/// - `{"hash": …}` - an object wrapping any accepted shape
/// - `{"hex": …}` - an object carrying a pre-rendered hex conversion
/// - `[18, 52, …]` - an array of 32 byte values
pub fn normalize_block_hash(value: &Value) -> Result<H256, EngineError> {
	match value {
		Value::String(s) => parse_h256(s),
		Value::Array(bytes) => {
			let collected: Option<Vec<u8>> = bytes
				.iter()
				.map(|b| b.as_u64().and_then(|n| u8::try_from(n).ok()))
				.collect();
			match collected {
				Some(bytes) if bytes.len() == 32 => Ok(H256::from_slice(&bytes)),
				_ => Err(EngineError::UnrecognizedHashShape(format!(
					"byte array of length {} is not a 32-byte hash",
					bytes.len()
				))),
			}
		},
		Value::Object(map) => {
			if let Some(inner) = map.get(fields::HASH) {
				normalize_block_hash(inner)
			} else if let Some(inner) = map.get(fields::HEX) {
				normalize_block_hash(inner)
			} else {
				Err(EngineError::UnrecognizedHashShape(format!(
					"object without `{}` or `{}` field",
					fields::HASH,
					fields::HEX
				)))
			}
		},
		other => Err(EngineError::UnrecognizedHashShape(other.to_string())),
	}
}

/// Parse a hex string (with or without `0x` prefix) into an [`H256`].
pub fn parse_h256(s: &str) -> Result<H256, EngineError> {
	let stripped = s.strip_prefix("0x").unwrap_or(s);
	let bytes = hex::decode(stripped)
		.map_err(|e| EngineError::UnrecognizedHashShape(format!("invalid hex `{s}`: {e}")))?;
	if bytes.len() != 32 {
		return Err(EngineError::UnrecognizedHashShape(format!(
			"hex string decodes to {} bytes, expected 32",
			bytes.len()
		)));
	}
	Ok(H256::from_slice(&bytes))
}

/// Render an [`H256`] as a `0x`-prefixed hex string.
pub fn to_hex(hash: &H256) -> String {
	format!("0x{}", hex::encode(hash.as_bytes()))
}
