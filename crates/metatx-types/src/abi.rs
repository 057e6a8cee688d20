//! Solidity bindings for the wallet main module.
//!
//! Only the pieces the relay system touches are declared: the call struct
//! used for bundle digests and `execute` calldata, the nonce reader, and the
//! two events the confirmation engine scans for.

use alloy::primitives::B256;
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
	interface IMainModule {
		/// A single call as the wallet decodes it from `execute` calldata.
		struct Transaction {
			bool delegateCall;
			bool revertOnError;
			uint256 gasLimit;
			address target;
			uint256 value;
			bytes data;
		}

		function execute(Transaction[] _txs, uint256 _nonce, bytes _signature) external;

		function readNonce(uint256 _space) external view returns (uint256);

		/// Emitted by every successful `execute`, whatever the outcome of the calls.
		event NonceChange(uint256 _space, uint256 _newNonce);

		/// Emitted when a call reverts and `revertOnError` is not set.
		event TxFailed(bytes32 _tx, bytes _reason);
	}
}

/// Topic of the `NonceChange(uint256,uint256)` event.
pub const NONCE_CHANGE_EVENT_SIG: B256 = IMainModule::NonceChange::SIGNATURE_HASH;

/// Topic of the `TxFailed(bytes32,bytes)` event.
pub const TX_FAILED_EVENT_SIG: B256 = IMainModule::TxFailed::SIGNATURE_HASH;
