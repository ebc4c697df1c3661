// SPDX-License-Identifier: GPL-3.0

//! Classification of raw backend error text.
//!
//! The execution backend has documented, narrow classes of false negatives
//! (fee-path WASM traps on chains with asset-aware fee hooks, rejections of
//! the mock signatures a simulation submits) that must not block an operation
//! the real chain would accept. Everything else defaults to blocking so
//! genuine problems are never masked.
//!
//! The policy is data, not branching logic: an ordered table of independently
//! testable rules, evaluated top to bottom with short-circuit precedence.
//! Fatal patterns are checked first and always block, overriding any ignore
//! rule that would otherwise match the same message.

use crate::strings::runtime::runtime_api;

/// The pipeline phase a message was produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	/// Fee estimation against the live chain's registry.
	FeeEstimation,
	/// Dry run or block inclusion on the fork.
	DryRun,
}

/// The phases a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePhase {
	FeeEstimation,
	DryRun,
	Both,
}

/// How serious a classified message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
	Info,
	Warning,
	Error,
}

/// One entry of the classification table.
#[derive(Debug, Clone, Copy)]
pub struct IgnoreRule {
	/// Stable identifier, also used as the verdict classification.
	pub id: &'static str,
	/// Case-insensitive fragments; matching any one fragment matches the rule.
	pub fragments: &'static [&'static str],
	/// Phase the rule applies to.
	pub phase: RulePhase,
	/// Severity reported when the rule matches.
	pub severity: Severity,
	/// Chain names the rule is scoped to; `None` applies everywhere.
	pub chain_scope: Option<&'static [&'static str]>,
	/// Whether a match means the message is a simulation artifact.
	pub ignore: bool,
	/// Why the rule exists.
	pub reason: &'static str,
}

/// The verdict for one raw message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
	/// Whether the message is a known simulation artifact and can be ignored.
	pub ignore: bool,
	/// Rule id or fatal classification that produced this verdict.
	pub classification: String,
	/// Severity of the underlying condition.
	pub severity: Severity,
	/// Explanation carried over from the matching rule.
	pub reason: Option<String>,
}

/// Patterns that indicate a structurally broken operation.
///
/// These are never simulation artifacts, so they are checked before the rule
/// table and always block, regardless of any ignore rule matching the same
/// message.
const FATAL_FRAGMENTS: &[(&str, &str)] = &[
	(runtime_api::VALIDATE_TRANSACTION, "TRANSACTION_VALIDITY_TRAP"),
	("unable to decode", "CODEC_FAILURE"),
	("failed to decode", "CODEC_FAILURE"),
	("codec error", "CODEC_FAILURE"),
	("unknown call index", "CODEC_FAILURE"),
	("unknown pallet", "UNKNOWN_PALLET"),
	("pallet not found", "UNKNOWN_PALLET"),
	("invalid address", "ADDRESS_DECODE_FAILURE"),
	("invalid ss58", "ADDRESS_DECODE_FAILURE"),
	("spec version mismatch", "REGISTRY_MISMATCH"),
	("registry mismatch", "REGISTRY_MISMATCH"),
	("metadata version mismatch", "REGISTRY_MISMATCH"),
];

/// Chain names carrying asset-aware fee hooks whose fee path traps in the
/// backend's WASM executor.
const ASSET_HUB_CHAINS: &[&str] =
	&["Polkadot Asset Hub", "Kusama Asset Hub", "Westend Asset Hub", "Statemint", "Statemine"];

/// The ordered classification table. First matching rule wins.
pub const IGNORE_RULES: &[IgnoreRule] = &[
	IgnoreRule {
		id: "ASSET_HUB_FEE_WASM_TRAP",
		fragments: &["wasm `unreachable` instruction", "unreachable instruction", "wasm unreachable"],
		phase: RulePhase::FeeEstimation,
		severity: Severity::Warning,
		chain_scope: Some(ASSET_HUB_CHAINS),
		ignore: true,
		reason: "fee estimation traps inside asset-conversion fee hooks on these chains; the dry run remains authoritative",
	},
	IgnoreRule {
		id: "MOCK_SIGNATURE_REJECTED",
		fragments: &["bad proof", "badproof", "invalid signature"],
		phase: RulePhase::Both,
		severity: Severity::Warning,
		chain_scope: None,
		ignore: true,
		reason: "simulations submit mock-signed operations; signature rejection says nothing about the signed transaction",
	},
	IgnoreRule {
		id: "UNSIGNED_VALIDATION",
		fragments: &["no unsigned validator", "transaction is not signed"],
		phase: RulePhase::DryRun,
		severity: Severity::Warning,
		chain_scope: None,
		ignore: true,
		reason: "unsigned simulation of a signed operation; the real submission carries a signature",
	},
	IgnoreRule {
		id: "POOL_ARTIFACT",
		fragments: &["already imported", "priority is too low", "temporarily banned"],
		phase: RulePhase::Both,
		severity: Severity::Info,
		chain_scope: None,
		ignore: true,
		reason: "transaction-pool noise from re-submitting inside a fork",
	},
	IgnoreRule {
		id: "STATE_DISCARDED",
		fragments: &["state already discarded", "block is pruned"],
		phase: RulePhase::Both,
		severity: Severity::Error,
		chain_scope: None,
		ignore: false,
		reason: "the anchor state is gone on this endpoint; retry against a fresh block",
	},
];

/// Classify a raw backend message.
///
/// Unknown text is never silently swallowed: no match yields a blocking
/// `UNKNOWN` verdict.
pub fn classify(raw: &str, phase: Phase, chain: Option<&str>) -> Verdict {
	let lowered = raw.to_lowercase();

	for (fragment, classification) in FATAL_FRAGMENTS {
		if lowered.contains(&fragment.to_lowercase()) {
			return Verdict {
				ignore: false,
				classification: (*classification).to_string(),
				severity: Severity::Error,
				reason: Some("structurally broken operation, not a simulation artifact".into()),
			};
		}
	}

	for rule in IGNORE_RULES {
		if fragment_matches(&lowered, rule.fragments)
			&& phase_matches(rule.phase, phase)
			&& scope_matches(rule.chain_scope, chain)
		{
			log::debug!("classification rule {} matched (ignore={})", rule.id, rule.ignore);
			return Verdict {
				ignore: rule.ignore,
				classification: rule.id.to_string(),
				severity: rule.severity,
				reason: Some(rule.reason.to_string()),
			};
		}
	}

	Verdict {
		ignore: false,
		classification: "UNKNOWN".to_string(),
		severity: Severity::Error,
		reason: None,
	}
}

/// Whether any fragment is a case-insensitive substring of the message.
///
/// `lowered` must already be lowercase.
fn fragment_matches(lowered: &str, fragments: &[&str]) -> bool {
	fragments.iter().any(|f| lowered.contains(&f.to_lowercase()))
}

/// Whether a rule's declared phase covers the call's phase.
fn phase_matches(rule: RulePhase, call: Phase) -> bool {
	match rule {
		RulePhase::Both => true,
		RulePhase::FeeEstimation => call == Phase::FeeEstimation,
		RulePhase::DryRun => call == Phase::DryRun,
	}
}

/// Whether a rule's chain scope covers the supplied chain name.
///
/// An unscoped rule matches everywhere; a scoped rule with no chain name
/// supplied does not match.
fn scope_matches(scope: Option<&[&str]>, chain: Option<&str>) -> bool {
	match (scope, chain) {
		(None, _) => true,
		(Some(_), None) => false,
		(Some(scope), Some(chain)) => scope.iter().any(|entry| chain_names_equivalent(entry, chain)),
	}
}

/// The relay network a chain name belongs to, when it names one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relay {
	Polkadot,
	Kusama,
	Westend,
}

fn normalized(name: &str) -> String {
	name.to_lowercase().replace([' ', '-', '_'], "")
}

/// Whether a name is one of the Asset Hub system-chain variants.
fn is_asset_hub(name: &str) -> bool {
	let n = normalized(name);
	n.contains("assethub") || n.contains("statemint") || n.contains("statemine")
}

/// The relay network a name implies, directly or via its legacy alias.
fn relay_of(name: &str) -> Option<Relay> {
	let n = normalized(name);
	if n.contains("polkadot") || n.contains("statemint") {
		Some(Relay::Polkadot)
	} else if n.contains("kusama") || n.contains("statemine") {
		Some(Relay::Kusama)
	} else if n.contains("westend") {
		Some(Relay::Westend)
	} else {
		None
	}
}

/// Whether two chain names refer to the same chain.
///
/// Asset Hub name variants ("Asset Hub", "AssetHub", "Statemint"/"Statemine")
/// are treated as equivalent, and when both names imply a relay network the
/// networks must agree.
fn chain_names_equivalent(a: &str, b: &str) -> bool {
	if is_asset_hub(a) && is_asset_hub(b) {
		return match (relay_of(a), relay_of(b)) {
			(Some(ra), Some(rb)) => ra == rb,
			_ => true,
		};
	}
	normalized(a) == normalized(b)
}
