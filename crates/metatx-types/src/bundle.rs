//! Bundle model: calls, nonces and the canonical bundle digest.

use crate::abi::IMainModule;
use crate::errors::{MetaTxnError, Result};
use alloy::primitives::{keccak256, Address, Bytes, B256, U160, U256};
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// Width of the sequential part of an encoded nonce.
pub const NONCE_COUNTER_BITS: usize = 96;

/// A single sub-operation executed by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
	/// Contract or account the wallet calls.
	pub target: Address,
	/// Calldata forwarded to the target.
	#[serde(default)]
	pub data: Bytes,
	/// Native value attached to the call.
	#[serde(default)]
	pub value: U256,
	/// Gas forwarded to the call. Zero forwards all remaining gas.
	#[serde(default)]
	pub gas_limit: U256,
	#[serde(default)]
	pub delegate_call: bool,
	/// Revert the whole bundle when this call fails.
	#[serde(default)]
	pub revert_on_error: bool,
}

impl Call {
	pub fn new(target: Address, data: impl Into<Bytes>) -> Self {
		Self {
			target,
			data: data.into(),
			value: U256::ZERO,
			gas_limit: U256::ZERO,
			delegate_call: false,
			revert_on_error: false,
		}
	}

	pub fn with_value(mut self, value: U256) -> Self {
		self.value = value;
		self
	}

	pub fn with_gas_limit(mut self, gas_limit: U256) -> Self {
		self.gas_limit = gas_limit;
		self
	}

	pub fn with_delegate_call(mut self, delegate_call: bool) -> Self {
		self.delegate_call = delegate_call;
		self
	}

	pub fn with_revert_on_error(mut self, revert_on_error: bool) -> Self {
		self.revert_on_error = revert_on_error;
		self
	}
}

impl From<&Call> for IMainModule::Transaction {
	fn from(call: &Call) -> Self {
		IMainModule::Transaction {
			delegateCall: call.delegate_call,
			revertOnError: call.revert_on_error,
			gasLimit: call.gas_limit,
			target: call.target,
			value: call.value,
			data: call.data.clone(),
		}
	}
}

/// Wallet nonce: a 160-bit space and a 96-bit counter within that space.
///
/// Spaces are independent sequences, so bundles in different spaces never
/// compete for the same nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawNonce")]
pub struct Nonce {
	space: U160,
	counter: U256,
}

/// Unchecked wire form of [`Nonce`].
#[derive(Deserialize)]
struct RawNonce {
	space: U160,
	counter: U256,
}

impl TryFrom<RawNonce> for Nonce {
	type Error = MetaTxnError;

	fn try_from(raw: RawNonce) -> Result<Self> {
		Self::new(raw.space, raw.counter)
	}
}

impl Nonce {
	pub fn new(space: U160, counter: U256) -> Result<Self> {
		if counter > Self::counter_mask() {
			return Err(MetaTxnError::InvalidInput(format!(
				"nonce counter {} does not fit in {} bits",
				counter, NONCE_COUNTER_BITS
			)));
		}
		Ok(Self { space, counter })
	}

	pub fn space(&self) -> U160 {
		self.space
	}

	pub fn counter(&self) -> U256 {
		self.counter
	}

	/// Packs the nonce into the single `uint256` the wallet expects.
	pub fn encode(&self) -> U256 {
		(space_to_u256(self.space) << NONCE_COUNTER_BITS) | self.counter
	}

	pub fn decode(raw: U256) -> Self {
		let space_word = (raw >> NONCE_COUNTER_BITS).to_be_bytes::<32>();
		Self {
			space: U160::from_be_slice(&space_word[12..]),
			counter: raw & Self::counter_mask(),
		}
	}

	/// The nonce following this one in the same space.
	pub fn next(&self) -> Result<Self> {
		Self::new(self.space, self.counter + U256::from(1))
	}

	fn counter_mask() -> U256 {
		(U256::from(1) << NONCE_COUNTER_BITS) - U256::from(1)
	}
}

/// Widens a nonce space to the word it occupies in calldata.
pub fn space_to_u256(space: U160) -> U256 {
	U256::from_be_slice(&space.to_be_bytes::<20>())
}

/// An ordered set of calls executed atomically under one nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBundle {
	pub calls: Vec<Call>,
	#[serde(default)]
	pub nonce: Nonce,
}

impl TransactionBundle {
	pub fn new(calls: Vec<Call>, nonce: Nonce) -> Self {
		Self { calls, nonce }
	}

	/// Canonical content digest of the bundle.
	///
	/// keccak256 over the ABI encoding of the ordered call array. The nonce
	/// does not take part, so the digest only changes with the calls.
	pub fn digest(&self) -> Result<B256> {
		if self.calls.is_empty() {
			return Err(MetaTxnError::InvalidInput(
				"cannot digest an empty bundle".to_string(),
			));
		}
		Ok(keccak256(self.abi_calls().abi_encode()))
	}

	/// Calls in the form the wallet ABI expects.
	pub fn abi_calls(&self) -> Vec<IMainModule::Transaction> {
		self.calls.iter().map(Into::into).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::address;

	fn sample_call() -> Call {
		Call::new(
			address!("1111111111111111111111111111111111111111"),
			vec![0xdeu8, 0xad, 0xbe, 0xef],
		)
		.with_value(U256::from(5))
		.with_gas_limit(U256::from(190_000))
	}

	fn sample_bundle() -> TransactionBundle {
		TransactionBundle::new(
			vec![
				sample_call(),
				Call::new(address!("2222222222222222222222222222222222222222"), vec![1u8]),
			],
			Nonce::default(),
		)
	}

	#[test]
	fn test_digest_is_deterministic() {
		let bundle = sample_bundle();
		assert_eq!(bundle.digest().unwrap(), bundle.digest().unwrap());
		assert_eq!(bundle.digest().unwrap(), sample_bundle().digest().unwrap());
	}

	#[test]
	fn test_empty_bundle_is_rejected() {
		let bundle = TransactionBundle::new(vec![], Nonce::default());
		assert!(matches!(
			bundle.digest(),
			Err(MetaTxnError::InvalidInput(_))
		));
	}

	#[test]
	fn test_digest_changes_with_every_field() {
		let base = sample_bundle().digest().unwrap();
		let call = sample_call();
		let variants = vec![
			Call {
				target: address!("3333333333333333333333333333333333333333"),
				..call.clone()
			},
			Call {
				data: Bytes::from(vec![0xdeu8, 0xad, 0xbe, 0xee]),
				..call.clone()
			},
			call.clone().with_value(U256::from(6)),
			call.clone().with_gas_limit(U256::from(190_001)),
			call.clone().with_delegate_call(true),
			call.clone().with_revert_on_error(true),
		];

		for variant in variants {
			let mut bundle = sample_bundle();
			bundle.calls[0] = variant.clone();
			assert_ne!(
				bundle.digest().unwrap(),
				base,
				"digest did not change for {:?}",
				variant
			);
		}
	}

	#[test]
	fn test_digest_depends_on_order() {
		let mut bundle = sample_bundle();
		bundle.calls.reverse();
		assert_ne!(bundle.digest().unwrap(), sample_bundle().digest().unwrap());
	}

	#[test]
	fn test_digest_ignores_nonce() {
		let mut bundle = sample_bundle();
		bundle.nonce = Nonce::new(U160::from(7), U256::from(3)).unwrap();
		assert_eq!(bundle.digest().unwrap(), sample_bundle().digest().unwrap());
	}

	#[test]
	fn test_nonce_encoding() {
		let nonce = Nonce::new(U160::from(1), U256::from(2)).unwrap();
		assert_eq!(nonce.encode(), (U256::from(1) << 96) + U256::from(2));
		assert_eq!(Nonce::decode(nonce.encode()), nonce);

		let max_space = Nonce::new(U160::MAX, U256::from(42)).unwrap();
		assert_eq!(Nonce::decode(max_space.encode()), max_space);
	}

	#[test]
	fn test_nonce_counter_bounds() {
		let limit = U256::from(1) << 96;
		assert!(Nonce::new(U160::ZERO, limit - U256::from(1)).is_ok());
		assert!(matches!(
			Nonce::new(U160::ZERO, limit),
			Err(MetaTxnError::InvalidInput(_))
		));

		let last = Nonce::new(U160::from(9), limit - U256::from(1)).unwrap();
		assert!(last.next().is_err());
		assert_eq!(
			Nonce::default().next().unwrap().counter(),
			U256::from(1)
		);
	}

	#[test]
	fn test_bundle_from_json() {
		let json = r#"{
			"calls": [{
				"target": "0x1111111111111111111111111111111111111111",
				"data": "0xdeadbeef",
				"value": "0x5",
				"gasLimit": "0x2e630"
			}]
		}"#;
		let bundle: TransactionBundle = serde_json::from_str(json).unwrap();
		assert_eq!(bundle.calls[0], sample_call());
		assert_eq!(bundle.nonce, Nonce::default());
	}

	#[test]
	fn test_nonce_json_enforces_counter_width() {
		let nonce: Nonce =
			serde_json::from_str(r#"{"space":"0x1","counter":"0xffffffffffffffffffffffff"}"#)
				.unwrap();
		assert_eq!(Nonce::decode(nonce.encode()), nonce);

		let oversized = r#"{"space":"0x1","counter":"0x1000000000000000000000000"}"#;
		assert!(serde_json::from_str::<Nonce>(oversized).is_err());

		let bundle_json = format!(
			r#"{{
				"calls": [{{ "target": "0x1111111111111111111111111111111111111111" }}],
				"nonce": {}
			}}"#,
			oversized
		);
		assert!(serde_json::from_str::<TransactionBundle>(&bundle_json).is_err());
	}
}
