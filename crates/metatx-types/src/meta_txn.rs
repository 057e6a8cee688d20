//! Meta-transaction identifiers and outcomes.
//!
//! A meta-transaction id is derived client-side from the wallet address, the
//! chain and the bundle digest. The wallet emits the same 32 bytes on chain
//! when it executes the bundle, which is what lets the confirmation engine
//! find the outcome without trusting the relayer.

use crate::bundle::TransactionBundle;
use crate::chain::{ChainId, TransactionReceipt};
use crate::errors::{MetaTxnError, Result};
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of the external hex form of an identifier.
pub const META_TXN_ID_HEX_LEN: usize = 64;

/// Identifier of a relayed bundle.
///
/// Rendered as 64 lowercase hex characters without a `0x` prefix at every
/// boundary (logs, persistence, relayer protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetaTxnId(B256);

impl MetaTxnId {
	pub fn from_bytes(bytes: B256) -> Self {
		Self(bytes)
	}

	/// Raw identifier bytes, as they appear in wallet event data.
	pub fn as_bytes(&self) -> &[u8] {
		self.0.as_slice()
	}

	pub fn as_b256(&self) -> B256 {
		self.0
	}
}

impl fmt::Display for MetaTxnId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&hex::encode(self.0))
	}
}

impl FromStr for MetaTxnId {
	type Err = MetaTxnError;

	fn from_str(s: &str) -> Result<Self> {
		let trimmed = s.strip_prefix("0x").unwrap_or(s);
		if trimmed.len() != META_TXN_ID_HEX_LEN {
			return Err(MetaTxnError::InvalidInput(format!(
				"meta txn id must be {} hex characters, got {}",
				META_TXN_ID_HEX_LEN,
				trimmed.len()
			)));
		}
		let bytes = hex::decode(trimmed)
			.map_err(|e| MetaTxnError::InvalidInput(format!("invalid meta txn id: {}", e)))?;
		Ok(Self(B256::from_slice(&bytes)))
	}
}

impl Serialize for MetaTxnId {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for MetaTxnId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// Outcome of a meta-transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaTxnStatus {
	Unknown,
	Executed,
	Failed,
}

impl fmt::Display for MetaTxnStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			MetaTxnStatus::Unknown => write!(f, "unknown"),
			MetaTxnStatus::Executed => write!(f, "executed"),
			MetaTxnStatus::Failed => write!(f, "failed"),
		}
	}
}

/// Resolved outcome together with the native receipt that carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTxnReceipt {
	pub status: MetaTxnStatus,
	pub receipt: TransactionReceipt,
}

/// Domain separation applied by the wallet before signing a bundle digest.
pub trait SubDigestScheme: Send + Sync {
	fn sub_digest(&self, chain_id: ChainId, wallet: Address, digest: B256) -> Bytes;
}

/// Wallet sub-digest: `keccak256(0x1901 ‖ uint256(chainId) ‖ wallet ‖ digest)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalletSubDigest;

impl SubDigestScheme for WalletSubDigest {
	fn sub_digest(&self, chain_id: ChainId, wallet: Address, digest: B256) -> Bytes {
		let mut packed = Vec::with_capacity(2 + 32 + 20 + 32);
		packed.extend_from_slice(b"\x19\x01");
		packed.extend_from_slice(&U256::from(chain_id.0).to_be_bytes::<32>());
		packed.extend_from_slice(wallet.as_slice());
		packed.extend_from_slice(digest.as_slice());
		Bytes::copy_from_slice(keccak256(&packed).as_slice())
	}
}

/// Derives the identifier of a bundle from its digest.
pub fn derive_meta_txn_id(
	scheme: &dyn SubDigestScheme,
	chain_id: ChainId,
	wallet: Address,
	digest: B256,
) -> Result<MetaTxnId> {
	let sub_digest = scheme.sub_digest(chain_id, wallet, digest);

	let encoded = hex::encode(&sub_digest);
	if encoded.len() != META_TXN_ID_HEX_LEN {
		return Err(MetaTxnError::Computation(format!(
			"computed meta txn id has {} hex characters, expected {}",
			encoded.len(),
			META_TXN_ID_HEX_LEN
		)));
	}

	encoded.parse()
}

/// Identifier of `bundle` executed by `wallet` on `chain_id`.
pub fn compute_meta_txn_id(
	chain_id: ChainId,
	wallet: Address,
	bundle: &TransactionBundle,
) -> Result<MetaTxnId> {
	derive_meta_txn_id(&WalletSubDigest, chain_id, wallet, bundle.digest()?)
}
