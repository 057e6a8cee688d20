//! Submission types exchanged with relayers.

use metatx_types::{
	compute_meta_txn_id, Address, Bytes, ChainId, MetaTxnError, MetaTxnId, TransactionBundle,
	TxHash,
};
use serde::{Deserialize, Serialize};

/// A bundle together with the wallet signature authorizing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedBundle {
	pub chain_id: ChainId,
	/// Wallet that executes the bundle.
	pub wallet: Address,
	pub bundle: TransactionBundle,
	/// Wallet signature over the bundle, produced by the signing collaborator.
	pub signature: Bytes,
}

impl SignedBundle {
	/// Identifier the wallet will emit when executing this bundle.
	pub fn meta_txn_id(&self) -> Result<MetaTxnId, MetaTxnError> {
		compute_meta_txn_id(self.chain_id, self.wallet, &self.bundle)
	}
}

/// Relayer acknowledgment of a bundle.
///
/// Only says the relayer broadcast a carrier transaction; the outcome of the
/// bundle still has to be confirmed on chain. The [`SignedBundle`] itself
/// stays with the caller, who pairs it with this acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerSubmission {
	pub meta_txn_id: MetaTxnId,
	/// Hash of the native transaction carrying the bundle.
	pub tx_hash: TxHash,
}
