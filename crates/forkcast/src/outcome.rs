// SPDX-License-Identifier: GPL-3.0

//! Decoding of extrinsic application outcomes.
//!
//! Both a dry run and block inclusion report the same SCALE-encoded shape,
//! `Result<Result<(), DispatchError>, TransactionValidityError>`. The enums
//! below mirror `sp_runtime` with explicit codec indices so decoding works
//! against any chain without pulling the full runtime in.
//!
//! Module errors carry only a pallet index and an error byte; when runtime
//! metadata is available they are resolved to `Section.Name` plus the error
//! variant's documentation text.

use scale::Decode;
use subxt::Metadata;

/// Result of transaction validation.
///
/// Mirrors `sp_runtime::transaction_validity::TransactionValidityError`.
#[derive(Debug, Clone, Decode)]
pub enum TransactionValidityError {
	/// Transaction is invalid (won't ever be valid).
	#[codec(index = 0)]
	Invalid(InvalidTransaction),
	/// Transaction validity is unknown (might become valid).
	#[codec(index = 1)]
	Unknown(UnknownTransaction),
}

/// Reasons a transaction is invalid.
#[derive(Debug, Clone, Decode)]
pub enum InvalidTransaction {
	/// General call failure.
	#[codec(index = 0)]
	Call,
	/// Payment failed (can't pay fees).
	#[codec(index = 1)]
	Payment,
	/// Future transaction (nonce too high).
	#[codec(index = 2)]
	Future,
	/// Stale transaction (nonce too low).
	#[codec(index = 3)]
	Stale,
	/// Bad signature.
	#[codec(index = 4)]
	BadProof,
	/// Transaction birth block is ancient.
	#[codec(index = 5)]
	AncientBirthBlock,
	/// Would exhaust block resources.
	#[codec(index = 6)]
	ExhaustsResources,
	/// Custom error (runtime-specific).
	#[codec(index = 7)]
	Custom(u8),
	/// Bad mandatory inherent.
	#[codec(index = 8)]
	BadMandatory,
	/// Mandatory dispatch error.
	#[codec(index = 9)]
	MandatoryValidation,
	/// Bad signer.
	#[codec(index = 10)]
	BadSigner,
}

/// Reasons transaction validity is unknown.
#[derive(Debug, Clone, Decode)]
pub enum UnknownTransaction {
	/// Can't lookup validity (dependencies missing).
	#[codec(index = 0)]
	CannotLookup,
	/// No unsigned validation handler.
	#[codec(index = 1)]
	NoUnsignedValidator,
	/// Custom unknown error.
	#[codec(index = 2)]
	Custom(u8),
}

impl TransactionValidityError {
	/// A human-readable reason for the rejection.
	pub fn reason(&self) -> String {
		match self {
			Self::Invalid(inv) => match inv {
				InvalidTransaction::Call => "Call failed".into(),
				InvalidTransaction::Payment => "Insufficient funds to pay fees".into(),
				InvalidTransaction::Future => "Nonce too high".into(),
				InvalidTransaction::Stale => "Nonce too low (already used)".into(),
				InvalidTransaction::BadProof => "Bad proof (invalid signature)".into(),
				InvalidTransaction::AncientBirthBlock => "Birth block is ancient".into(),
				InvalidTransaction::ExhaustsResources => "Would exhaust block resources".into(),
				InvalidTransaction::Custom(code) => format!("Custom validity error: {code}"),
				InvalidTransaction::BadMandatory => "Bad mandatory inherent".into(),
				InvalidTransaction::MandatoryValidation => "Mandatory dispatch failed".into(),
				InvalidTransaction::BadSigner => "Invalid signer".into(),
			},
			Self::Unknown(unk) => match unk {
				UnknownTransaction::CannotLookup => "Cannot lookup validity".into(),
				UnknownTransaction::NoUnsignedValidator => "No unsigned validator".into(),
				UnknownTransaction::Custom(code) => format!("Custom unknown validity: {code}"),
			},
		}
	}
}

/// Dispatch failure reported by the runtime.
///
/// Mirrors `sp_runtime::DispatchError`.
#[derive(Debug, Clone, Decode)]
pub enum DispatchError {
	/// Unspecified error.
	#[codec(index = 0)]
	Other,
	/// Failed to look up some data.
	#[codec(index = 1)]
	CannotLookup,
	/// Bad origin.
	#[codec(index = 2)]
	BadOrigin,
	/// A pallet-specific error.
	#[codec(index = 3)]
	Module(ModuleError),
	/// Account must not be killed while consumers remain.
	#[codec(index = 4)]
	ConsumerRemaining,
	/// Account has no providers.
	#[codec(index = 5)]
	NoProviders,
	/// Too many consumers.
	#[codec(index = 6)]
	TooManyConsumers,
	/// Token handling error.
	#[codec(index = 7)]
	Token(TokenError),
	/// Arithmetic error.
	#[codec(index = 8)]
	Arithmetic(ArithmeticError),
	/// Transactional-layer error.
	#[codec(index = 9)]
	Transactional(TransactionalError),
	/// Resources exhausted.
	#[codec(index = 10)]
	Exhausted,
	/// State corruption.
	#[codec(index = 11)]
	Corruption,
	/// Resource unavailable.
	#[codec(index = 12)]
	Unavailable,
	/// Root origin is not allowed here.
	#[codec(index = 13)]
	RootNotAllowed,
}

/// A pallet-specific error: pallet index plus raw error bytes.
#[derive(Debug, Clone, Decode, scale::Encode)]
pub struct ModuleError {
	/// Index of the pallet within the runtime.
	pub index: u8,
	/// Raw error value; the first byte is the error variant index.
	pub error: [u8; 4],
}

/// Token handling errors. Mirrors `sp_runtime::TokenError`.
#[derive(Debug, Clone, Decode)]
pub enum TokenError {
	#[codec(index = 0)]
	FundsUnavailable,
	#[codec(index = 1)]
	OnlyProvider,
	#[codec(index = 2)]
	BelowMinimum,
	#[codec(index = 3)]
	CannotCreate,
	#[codec(index = 4)]
	UnknownAsset,
	#[codec(index = 5)]
	Frozen,
	#[codec(index = 6)]
	Unsupported,
	#[codec(index = 7)]
	CannotCreateHold,
	#[codec(index = 8)]
	NotExpendable,
	#[codec(index = 9)]
	Blocked,
}

impl TokenError {
	fn reason(&self) -> &'static str {
		match self {
			Self::FundsUnavailable => "Funds are unavailable (insufficient balance)",
			Self::OnlyProvider => "Account would be destroyed (only provider)",
			Self::BelowMinimum => "Balance would fall below the existential minimum",
			Self::CannotCreate => "Account cannot be created",
			Self::UnknownAsset => "Asset is not known",
			Self::Frozen => "Funds are frozen",
			Self::Unsupported => "Operation is not supported for this asset",
			Self::CannotCreateHold => "Hold cannot be created",
			Self::NotExpendable => "Account is not expendable",
			Self::Blocked => "Account is blocked",
		}
	}
}

/// Arithmetic errors. Mirrors `sp_arithmetic::ArithmeticError`.
#[derive(Debug, Clone, Decode)]
pub enum ArithmeticError {
	#[codec(index = 0)]
	Underflow,
	#[codec(index = 1)]
	Overflow,
	#[codec(index = 2)]
	DivisionByZero,
}

/// Transactional-layer errors. Mirrors `sp_runtime::TransactionalError`.
#[derive(Debug, Clone, Decode)]
pub enum TransactionalError {
	#[codec(index = 0)]
	LimitReached,
	#[codec(index = 1)]
	NoLayer,
}

/// The full outcome shape returned by `BlockBuilder_apply_extrinsic`.
#[derive(Debug, Clone, Decode)]
enum ApplyExtrinsicResult {
	#[codec(index = 0)]
	Ok(DispatchResult),
	#[codec(index = 1)]
	Err(TransactionValidityError),
}

#[derive(Debug, Clone, Decode)]
enum DispatchResult {
	#[codec(index = 0)]
	Ok,
	#[codec(index = 1)]
	Err(DispatchError),
}

/// A decoded application outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
	/// The operation would be applied successfully.
	Success,
	/// The operation was applied or validated and failed.
	Failed {
		/// Human-readable failure description.
		message: String,
	},
}

/// Decode outcome bytes into a [`DispatchOutcome`].
///
/// Trailing bytes after the outcome are tolerated (some engines append diff
/// metadata); truncated input is not. The error carries a description of the
/// raw bytes so the caller can hand it to the classification policy.
pub fn decode_apply_result(
	bytes: &[u8],
	metadata: Option<&Metadata>,
) -> Result<DispatchOutcome, String> {
	let mut input = bytes;
	let result = ApplyExtrinsicResult::decode(&mut input)
		.map_err(|e| format!("undecodable outcome 0x{}: {e}", hex::encode(bytes)))?;

	Ok(match result {
		ApplyExtrinsicResult::Ok(DispatchResult::Ok) => DispatchOutcome::Success,
		ApplyExtrinsicResult::Ok(DispatchResult::Err(err)) =>
			DispatchOutcome::Failed { message: render_dispatch_error(&err, metadata) },
		ApplyExtrinsicResult::Err(validity) =>
			DispatchOutcome::Failed { message: validity.reason() },
	})
}

/// Render a dispatch error as user-facing text.
pub fn render_dispatch_error(error: &DispatchError, metadata: Option<&Metadata>) -> String {
	match error {
		DispatchError::Module(module) => render_module_error(module, metadata),
		DispatchError::Token(token) => format!("Token error: {}", token.reason()),
		DispatchError::Arithmetic(err) => format!("Arithmetic error: {err:?}"),
		DispatchError::Transactional(err) => format!("Transactional error: {err:?}"),
		other => format!("Dispatch error: {other:?}"),
	}
}

/// Resolve a module error to `Section.Name: docs` through runtime metadata.
///
/// Falls back to raw indices when metadata is unavailable or the lookup
/// misses (e.g. a runtime upgrade removed the variant).
fn render_module_error(module: &ModuleError, metadata: Option<&Metadata>) -> String {
	if let Some(metadata) = metadata {
		if let Some(pallet) = metadata.pallet_by_index(module.index) {
			if let Some(variant) = pallet.error_variant_by_index(module.error[0]) {
				let docs = variant.docs.join(" ");
				let docs = docs.trim();
				return if docs.is_empty() {
					format!("{}.{}", pallet.name(), variant.name)
				} else {
					format!("{}.{}: {}", pallet.name(), variant.name, docs)
				};
			}
			return format!("{}.<error {}>", pallet.name(), module.error[0]);
		}
	}
	format!("Module error (pallet {}, error {})", module.index, module.error[0])
}

#[cfg(test)]
mod tests {
	use super::*;
	use scale::Encode;

	// Hand-encoded outcome fixtures. The outcome shape is
	// Result<Result<(), DispatchError>, TransactionValidityError>.

	#[test]
	fn decodes_success() {
		// Ok(Ok(()))
		let bytes = [0x00, 0x00];
		assert_eq!(decode_apply_result(&bytes, None).unwrap(), DispatchOutcome::Success);
	}

	#[test]
	fn tolerates_trailing_bytes() {
		let bytes = [0x00, 0x00, 0xff, 0xff];
		assert_eq!(decode_apply_result(&bytes, None).unwrap(), DispatchOutcome::Success);
	}

	#[test]
	fn decodes_token_error_with_insufficiency_text() {
		// Ok(Err(Token(FundsUnavailable))): 0x00, 0x01, index 7, variant 0.
		let bytes = [0x00, 0x01, 0x07, 0x00];
		let outcome = decode_apply_result(&bytes, None).unwrap();
		match outcome {
			DispatchOutcome::Failed { message } => {
				assert!(message.contains("insufficient balance"), "got: {message}");
			},
			other => panic!("expected failure, got {other:?}"),
		}
	}

	#[test]
	fn decodes_module_error_without_metadata() {
		// Ok(Err(Module { index: 5, error: [2, 0, 0, 0] })).
		let mut bytes = vec![0x00, 0x01, 0x03];
		bytes.push(5);
		bytes.extend([2, 0, 0, 0]);
		let outcome = decode_apply_result(&bytes, None).unwrap();
		match outcome {
			DispatchOutcome::Failed { message } => {
				assert!(message.contains("pallet 5"), "got: {message}");
				assert!(message.contains("error 2"), "got: {message}");
			},
			other => panic!("expected failure, got {other:?}"),
		}
	}

	#[test]
	fn decodes_validity_rejection() {
		// Err(Invalid(Payment)): 0x01, 0x00, variant 1.
		let bytes = [0x01, 0x00, 0x01];
		let outcome = decode_apply_result(&bytes, None).unwrap();
		match outcome {
			DispatchOutcome::Failed { message } => {
				assert!(message.contains("Insufficient funds"), "got: {message}");
			},
			other => panic!("expected failure, got {other:?}"),
		}
	}

	#[test]
	fn decodes_stale_nonce_rejection() {
		// Err(Invalid(Stale)).
		let bytes = [0x01, 0x00, 0x03];
		let outcome = decode_apply_result(&bytes, None).unwrap();
		assert!(matches!(
			outcome,
			DispatchOutcome::Failed { ref message } if message.contains("Nonce too low")
		));
	}

	#[test]
	fn rejects_truncated_outcome() {
		let err = decode_apply_result(&[0x00], None).unwrap_err();
		assert!(err.contains("undecodable outcome"), "got: {err}");
	}

	#[test]
	fn rejects_empty_outcome() {
		assert!(decode_apply_result(&[], None).is_err());
	}

	#[test]
	fn module_error_scale_layout_is_stable() {
		// ModuleError must encode as index byte followed by four error bytes.
		let module = ModuleError { index: 9, error: [1, 0, 0, 0] };
		assert_eq!(module.encode(), vec![9, 1, 0, 0, 0]);
	}
}
