//! Outcome classification from wallet logs.
//!
//! A successful execution is signalled by an anonymous log (no topics) whose
//! data is exactly the meta-transaction id. A failed one is signalled by a
//! `TxFailed` log whose data starts with the id, followed by the revert
//! reason.

use metatx_types::{Address, Log, MetaTxnId, MetaTxnStatus, TransactionReceipt, B256};

/// Classifies a single log against `id`. Returns `Unknown` for unrelated logs.
pub fn classify_log(id: &MetaTxnId, log: &Log, tx_failed_topic: B256) -> MetaTxnStatus {
	let id_bytes = id.as_bytes();

	if log.topics.is_empty() && log.data.as_ref() == id_bytes {
		return MetaTxnStatus::Executed;
	}

	if log.topics.len() == 1 && log.topics[0] == tx_failed_topic && log.data.starts_with(id_bytes) {
		return MetaTxnStatus::Failed;
	}

	MetaTxnStatus::Unknown
}

/// Outcome carried by `receipt`, if any.
///
/// Logs are visited in receipt order and the first one that classifies wins.
/// With `emitter` set, logs from other contracts are ignored.
pub fn classify_receipt(
	id: &MetaTxnId,
	receipt: &TransactionReceipt,
	tx_failed_topic: B256,
	emitter: Option<Address>,
) -> Option<MetaTxnStatus> {
	receipt
		.logs
		.iter()
		.filter(|log| emitter.map_or(true, |wallet| log.address == wallet))
		.map(|log| classify_log(id, log, tx_failed_topic))
		.find(|status| *status != MetaTxnStatus::Unknown)
}
