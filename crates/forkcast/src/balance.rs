// SPDX-License-Identifier: GPL-3.0

//! Account balance decoding and delta computation.
//!
//! Balance deltas are computed opportunistically from the storage diff a fork
//! mutation produces; when the relevant key is absent from the diff, callers
//! fall back to querying the fork directly at the old and new heads.

use crate::{
	strings::runtime::storage,
	types::{BalanceChange, Direction, StorageDiff},
};
use scale::{Decode, Encode};

/// Account balances, mirroring `pallet_balances::AccountData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct AccountData {
	/// Balance free to spend.
	pub free: u128,
	/// Balance reserved by the runtime.
	pub reserved: u128,
	/// Balance frozen by locks.
	pub frozen: u128,
	/// Runtime-internal flags.
	pub flags: u128,
}

/// Account record, mirroring `frame_system::AccountInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct AccountInfo {
	/// Number of transactions the account has sent.
	pub nonce: u32,
	/// Modules that depend on this account existing.
	pub consumers: u32,
	/// Modules that allow this account to exist.
	pub providers: u32,
	/// Self-sufficient reference count.
	pub sufficients: u32,
	/// The account's balances.
	pub data: AccountData,
}

/// Compute the `System::Account` storage key for an account (Blake2_128Concat).
///
/// Works with both 32-byte (Substrate) and 20-byte (Ethereum-style) account ids.
pub fn account_storage_key(account: &[u8]) -> Vec<u8> {
	let mut key = Vec::new();
	key.extend(sp_core::twox_128(storage::SYSTEM_PALLET.as_bytes()));
	key.extend(sp_core::twox_128(storage::ACCOUNT_STORAGE.as_bytes()));
	key.extend(sp_core::blake2_128(account));
	key.extend(account);
	key
}

/// The 32-byte prefix shared by all `System::Account` storage keys.
pub fn account_key_prefix() -> Vec<u8> {
	let mut prefix = Vec::with_capacity(32);
	prefix.extend(sp_core::twox_128(storage::SYSTEM_PALLET.as_bytes()));
	prefix.extend(sp_core::twox_128(storage::ACCOUNT_STORAGE.as_bytes()));
	prefix
}

/// Whether a storage key addresses a `System::Account` entry.
pub fn is_account_key(key: &[u8]) -> bool {
	key.len() > 48 && key.starts_with(&account_key_prefix())
}

/// Decode an `AccountInfo` blob and extract the free balance.
///
/// Returns 0 for an undecodable blob: a missing or malformed account record
/// reads as an empty account, matching runtime semantics for non-existent
/// accounts.
pub fn decode_free_balance(bytes: &[u8]) -> u128 {
	AccountInfo::decode(&mut &bytes[..]).map(|info| info.data.free).unwrap_or(0)
}

/// Free balance from an optional storage value; absent storage reads as 0.
pub fn free_balance_of(value: Option<&[u8]>) -> u128 {
	value.map(decode_free_balance).unwrap_or(0)
}

/// Look up a key in a storage diff.
///
/// Returns `None` when the key is absent from the diff, `Some(None)` when the
/// diff deletes the key, and `Some(Some(value))` when the diff writes it.
pub fn lookup_in_diff<'a>(diff: &'a StorageDiff, key: &[u8]) -> Option<Option<&'a [u8]>> {
	diff.iter()
		.find(|(k, _)| k == key)
		.map(|(_, v)| v.as_deref())
}

/// All `System::Account` keys touched by a diff, in diff order.
pub fn account_keys_in_diff(diff: &StorageDiff) -> Vec<Vec<u8>> {
	diff.iter()
		.filter(|(k, _)| is_account_key(k))
		.map(|(k, _)| k.clone())
		.collect()
}

/// The balance movement between two readings, if any.
pub fn delta(before: u128, after: u128) -> Option<BalanceChange> {
	match after.cmp(&before) {
		std::cmp::Ordering::Greater =>
			Some(BalanceChange { value: (after - before).to_string(), change: Direction::Receive }),
		std::cmp::Ordering::Less =>
			Some(BalanceChange { value: (before - after).to_string(), change: Direction::Send }),
		std::cmp::Ordering::Equal => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Alice's well-known Sr25519 public key.
	const ALICE: [u8; 32] = [
		0xd4, 0x35, 0x93, 0xc7, 0x15, 0xfd, 0xd3, 0x1c, 0x61, 0x14, 0x1a, 0xbd, 0x04, 0xa9, 0x9f,
		0xd6, 0x82, 0x2c, 0x85, 0x58, 0x85, 0x4c, 0xcd, 0xe3, 0x9a, 0x56, 0x84, 0xe7, 0xa5, 0x6d,
		0xa2, 0x7d,
	];

	fn account_blob(free: u128) -> Vec<u8> {
		AccountInfo {
			nonce: 3,
			consumers: 0,
			providers: 1,
			sufficients: 0,
			data: AccountData { free, reserved: 0, frozen: 0, flags: 0 },
		}
		.encode()
	}

	#[test]
	fn account_storage_key_has_correct_length() {
		// twox128("System") + twox128("Account") + blake2_128(account) + account
		// = 16 + 16 + 16 + 32 = 80
		assert_eq!(account_storage_key(&ALICE).len(), 80);
	}

	#[test]
	fn account_key_is_recognized_by_prefix() {
		let key = account_storage_key(&ALICE);
		assert!(is_account_key(&key));
		assert!(!is_account_key(&key[..40]));
		assert!(!is_account_key(b"some other key"));
	}

	#[test]
	fn account_info_encodes_to_eighty_bytes() {
		// nonce/consumers/providers/sufficients (4 x u32) + 4 x u128.
		assert_eq!(account_blob(42).len(), 80);
	}

	#[test]
	fn decode_free_balance_reads_encoded_value() {
		assert_eq!(decode_free_balance(&account_blob(1_000_000_000_000)), 1_000_000_000_000);
	}

	#[test]
	fn decode_free_balance_treats_garbage_as_empty() {
		assert_eq!(decode_free_balance(&[1, 2, 3]), 0);
		assert_eq!(free_balance_of(None), 0);
	}

	#[test]
	fn lookup_in_diff_distinguishes_absent_deleted_and_written() {
		let key = account_storage_key(&ALICE);
		let diff: StorageDiff =
			vec![(key.clone(), Some(vec![1])), (b"deleted".to_vec(), None)];

		assert_eq!(lookup_in_diff(&diff, &key), Some(Some([1u8].as_slice())));
		assert_eq!(lookup_in_diff(&diff, b"deleted"), Some(None));
		assert_eq!(lookup_in_diff(&diff, b"missing"), None);
	}

	#[test]
	fn account_keys_in_diff_filters_non_account_keys() {
		let key = account_storage_key(&ALICE);
		let diff: StorageDiff = vec![
			(b"unrelated".to_vec(), Some(vec![0])),
			(key.clone(), Some(account_blob(5))),
		];
		assert_eq!(account_keys_in_diff(&diff), vec![key]);
	}

	#[test]
	fn delta_reports_direction_and_magnitude() {
		let send = delta(100, 40).unwrap();
		assert_eq!(send.change, Direction::Send);
		assert_eq!(send.value, "60");

		let receive = delta(40, 100).unwrap();
		assert_eq!(receive.change, Direction::Receive);
		assert_eq!(receive.value, "60");

		assert!(delta(7, 7).is_none());
	}
}
