//! The log-scanning wait loop.
//!
//! Each wait walks forward from `head - initial_lookback_blocks`, re-scanning
//! `reorg_overlap_blocks` behind the previous window on every iteration. Chain
//! query failures pause for one poll interval and retry the same window; only
//! the deadline and the cancel signal end a wait without a result.

use crate::cancel::CancelSignal;
use crate::classify::classify_receipt;
use crate::{ConfirmationConfig, ConfirmationError};
use metatx_chain::ChainReader;
use metatx_types::{BlockNumber, Log, LogFilter, MetaTxnId, MetaTxnReceipt, TxHash};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Deadline used when the requested timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Waits for relayed meta-transactions to land on chain.
///
/// One waiter can serve any number of concurrent waits; each wait keeps its
/// own scan state and only shares the read-only chain reader.
#[derive(Clone)]
pub struct MetaTxnWaiter {
	chain: Arc<dyn ChainReader>,
	config: ConfirmationConfig,
}

/// State of a single wait.
struct Scan<'a> {
	id: &'a MetaTxnId,
	timeout: Duration,
	deadline: Instant,
	cancel: CancelSignal,
}

enum WindowOutcome {
	Resolved(MetaTxnReceipt),
	/// Every candidate receipt was checked without a match.
	Exhausted,
	/// A receipt lookup failed; the window has to be scanned again.
	Interrupted,
}

impl Scan<'_> {
	fn deadline_exceeded(&self) -> ConfirmationError {
		ConfirmationError::DeadlineExceeded {
			id: *self.id,
			timeout: self.timeout,
		}
	}

	fn cancelled(&self) -> ConfirmationError {
		ConfirmationError::Cancelled { id: *self.id }
	}

	fn check(&self) -> Result<(), ConfirmationError> {
		if Instant::now() >= self.deadline {
			return Err(self.deadline_exceeded());
		}
		if self.cancel.is_cancelled() {
			return Err(self.cancelled());
		}
		Ok(())
	}

	/// Runs `fut` unless the deadline passes or the wait is cancelled first.
	async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, ConfirmationError> {
		tokio::select! {
			biased;
			_ = tokio::time::sleep_until(self.deadline) => Err(self.deadline_exceeded()),
			_ = self.cancel.cancelled() => Err(self.cancelled()),
			output = fut => Ok(output),
		}
	}

	async fn pause(&self, interval: Duration) -> Result<(), ConfirmationError> {
		self.guard(tokio::time::sleep(interval)).await
	}
}

impl MetaTxnWaiter {
	pub fn new(
		chain: Arc<dyn ChainReader>,
		config: ConfirmationConfig,
	) -> Result<Self, ConfirmationError> {
		config.validate()?;
		Ok(Self { chain, config })
	}

	pub fn config(&self) -> &ConfirmationConfig {
		&self.config
	}

	/// Waits for `id` to execute or fail, for at most `timeout`
	/// (the configured default when `None`).
	pub async fn wait(
		&self,
		id: &MetaTxnId,
		timeout: Option<Duration>,
	) -> Result<MetaTxnReceipt, ConfirmationError> {
		self.wait_with_cancel(id, timeout, CancelSignal::never())
			.await
	}

	/// Like [`wait`](Self::wait), also ending early when `cancel` fires.
	pub async fn wait_with_cancel(
		&self,
		id: &MetaTxnId,
		timeout: Option<Duration>,
		cancel: CancelSignal,
	) -> Result<MetaTxnReceipt, ConfirmationError> {
		let timeout = timeout.unwrap_or(self.config.default_timeout);
		let now = Instant::now();
		let scan = Scan {
			id,
			timeout,
			deadline: now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE),
			cancel,
		};
		let poll_interval = self.config.poll_interval;

		info!(
			meta_txn_id = %id,
			timeout_secs = timeout.as_secs(),
			"Waiting for meta transaction"
		);

		let mut last_scanned: Option<BlockNumber> = None;

		loop {
			scan.check()?;

			let head = match scan.guard(self.chain.block_number()).await? {
				Ok(head) => head,
				Err(e) => {
					warn!(meta_txn_id = %id, error = %e, "Failed to fetch head block, retrying");
					scan.pause(poll_interval).await?;
					continue;
				}
			};

			let last = *last_scanned
				.get_or_insert_with(|| head.saturating_sub(self.config.initial_lookback_blocks));
			let filter = LogFilter {
				from_block: last
					.saturating_sub(self.config.reorg_overlap_blocks)
					.min(head),
				to_block: head,
				address: self.config.wallet,
				topic0: self.config.nonce_changed_topic,
			};

			let logs = match scan.guard(self.chain.get_logs(&filter)).await? {
				Ok(logs) => logs,
				Err(e) => {
					warn!(meta_txn_id = %id, error = %e, "Failed to fetch logs, retrying");
					scan.pause(poll_interval).await?;
					continue;
				}
			};

			debug!(
				meta_txn_id = %id,
				from_block = filter.from_block,
				to_block = filter.to_block,
				candidates = logs.len(),
				"Scanned block range"
			);

			match self.scan_window(&scan, logs).await? {
				WindowOutcome::Resolved(result) => {
					info!(
						meta_txn_id = %id,
						status = %result.status,
						tx_hash = %result.receipt.transaction_hash,
						block_number = result.receipt.block_number,
						"Meta transaction resolved"
					);
					return Ok(result);
				}
				WindowOutcome::Interrupted => {
					scan.pause(poll_interval).await?;
					continue;
				}
				WindowOutcome::Exhausted => {}
			}

			scan.pause(poll_interval).await?;
			last_scanned = Some(head);
		}
	}

	/// Checks the carrier receipts of `logs` in block then log order.
	async fn scan_window(
		&self,
		scan: &Scan<'_>,
		mut logs: Vec<Log>,
	) -> Result<WindowOutcome, ConfirmationError> {
		logs.sort_by_key(|log| (log.block_number, log.log_index));

		let mut checked: HashSet<TxHash> = HashSet::new();
		for log in logs {
			if !checked.insert(log.transaction_hash) {
				continue;
			}

			let receipt = match scan
				.guard(self.chain.transaction_receipt(log.transaction_hash))
				.await?
			{
				Ok(Some(receipt)) => receipt,
				Ok(None) => {
					debug!(tx_hash = %log.transaction_hash, "Receipt not found, skipping");
					continue;
				}
				Err(e) => {
					warn!(
						meta_txn_id = %scan.id,
						tx_hash = %log.transaction_hash,
						error = %e,
						"Failed to fetch receipt, retrying"
					);
					return Ok(WindowOutcome::Interrupted);
				}
			};

			if let Some(status) = classify_receipt(
				scan.id,
				&receipt,
				self.config.tx_failed_topic,
				self.config.wallet,
			) {
				return Ok(WindowOutcome::Resolved(MetaTxnReceipt { status, receipt }));
			}
		}

		Ok(WindowOutcome::Exhausted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cancel::cancel_pair;
	use async_trait::async_trait;
	use metatx_chain::ChainError;
	use metatx_types::abi::{NONCE_CHANGE_EVENT_SIG, TX_FAILED_EVENT_SIG};
	use metatx_types::{Address, Bytes, MetaTxnStatus, TransactionReceipt, B256};
	use std::collections::HashMap;
	use std::sync::Mutex;

	const WALLET: Address = Address::repeat_byte(0xaa);

	#[derive(Default)]
	struct MockState {
		head: u64,
		head_step: u64,
		logs: Vec<Log>,
		receipts: HashMap<TxHash, TransactionReceipt>,
		fail_calls: usize,
		fail_receipts: usize,
		calls: usize,
		filters: Vec<LogFilter>,
	}

	// Mock chain whose head advances by a fixed step on every head query
	#[derive(Default)]
	struct MockChain {
		state: Mutex<MockState>,
	}

	impl MockChain {
		fn new(head: u64, head_step: u64) -> Arc<Self> {
			let chain = Self::default();
			{
				let mut state = chain.state.lock().unwrap();
				state.head = head;
				state.head_step = head_step;
			}
			Arc::new(chain)
		}

		fn add_receipt(&self, receipt: TransactionReceipt) {
			let mut state = self.state.lock().unwrap();
			let nonce_logs: Vec<Log> = receipt
				.logs
				.iter()
				.filter(|log| log.topics.first() == Some(&NONCE_CHANGE_EVENT_SIG))
				.cloned()
				.collect();
			state.logs.extend(nonce_logs);
			state.receipts.insert(receipt.transaction_hash, receipt);
		}

		fn add_orphan_log(&self, log: Log) {
			self.state.lock().unwrap().logs.push(log);
		}

		fn fail_next(&self, calls: usize) {
			self.state.lock().unwrap().fail_calls = calls;
		}

		fn fail_next_receipts(&self, calls: usize) {
			self.state.lock().unwrap().fail_receipts = calls;
		}

		fn calls(&self) -> usize {
			self.state.lock().unwrap().calls
		}

		fn filters(&self) -> Vec<LogFilter> {
			self.state.lock().unwrap().filters.clone()
		}
	}

	fn take_failure(state: &mut MockState) -> Result<(), ChainError> {
		state.calls += 1;
		if state.fail_calls > 0 {
			state.fail_calls -= 1;
			return Err(ChainError::Network("connection reset".to_string()));
		}
		Ok(())
	}

	#[async_trait]
	impl ChainReader for MockChain {
		async fn block_number(&self) -> Result<BlockNumber, ChainError> {
			let mut state = self.state.lock().unwrap();
			take_failure(&mut state)?;
			let head = state.head;
			state.head += state.head_step;
			Ok(head)
		}

		async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
			let mut state = self.state.lock().unwrap();
			take_failure(&mut state)?;
			state.filters.push(filter.clone());
			Ok(state
				.logs
				.iter()
				.filter(|log| {
					log.block_number >= filter.from_block
						&& log.block_number <= filter.to_block
						&& log.topics.first() == Some(&filter.topic0)
						&& filter.address.map_or(true, |a| a == log.address)
				})
				.cloned()
				.collect())
		}

		async fn transaction_receipt(
			&self,
			tx_hash: TxHash,
		) -> Result<Option<TransactionReceipt>, ChainError> {
			let mut state = self.state.lock().unwrap();
			take_failure(&mut state)?;
			if state.fail_receipts > 0 {
				state.fail_receipts -= 1;
				return Err(ChainError::Network("receipt timeout".to_string()));
			}
			Ok(state.receipts.get(&tx_hash).cloned())
		}
	}

	fn id(byte: u8) -> MetaTxnId {
		MetaTxnId::from_bytes(B256::repeat_byte(byte))
	}

	fn entry(tx: u8, block: u64, index: u64, topics: Vec<B256>, data: Vec<u8>) -> Log {
		Log {
			address: WALLET,
			topics,
			data: Bytes::from(data),
			block_number: block,
			transaction_hash: B256::repeat_byte(tx),
			log_index: index,
		}
	}

	fn nonce_change(tx: u8, block: u64) -> Log {
		entry(tx, block, 0, vec![NONCE_CHANGE_EVENT_SIG], vec![0u8; 64])
	}

	fn carrier(tx: u8, block: u64, mut logs: Vec<Log>) -> TransactionReceipt {
		let mut all = vec![nonce_change(tx, block)];
		all.append(&mut logs);
		TransactionReceipt {
			transaction_hash: B256::repeat_byte(tx),
			block_number: block,
			success: true,
			gas_used: 100_000,
			logs: all,
		}
	}

	fn executed(meta: &MetaTxnId, tx: u8, block: u64) -> TransactionReceipt {
		carrier(
			tx,
			block,
			vec![
				entry(tx, block, 1, vec![B256::repeat_byte(0x77)], vec![9u8; 32]),
				entry(tx, block, 2, vec![], meta.as_bytes().to_vec()),
			],
		)
	}

	fn failed(meta: &MetaTxnId, tx: u8, block: u64) -> TransactionReceipt {
		let mut data = meta.as_bytes().to_vec();
		data.extend_from_slice(b"execution reverted");
		carrier(
			tx,
			block,
			vec![entry(tx, block, 1, vec![TX_FAILED_EVENT_SIG], data)],
		)
	}

	fn unrelated(tx: u8, block: u64) -> TransactionReceipt {
		carrier(
			tx,
			block,
			vec![entry(tx, block, 1, vec![], B256::repeat_byte(0xee).to_vec())],
		)
	}

	fn waiter(chain: Arc<MockChain>) -> MetaTxnWaiter {
		MetaTxnWaiter::new(chain, ConfirmationConfig::default()).unwrap()
	}

	#[tokio::test(start_paused = true)]
	async fn test_resolves_executed() {
		let chain = MockChain::new(1000, 1);
		let meta = id(0x42);
		chain.add_receipt(executed(&meta, 0x01, 990));

		let result = waiter(chain).wait(&meta, None).await.unwrap();
		assert_eq!(result.status, MetaTxnStatus::Executed);
		assert_eq!(result.receipt.transaction_hash, B256::repeat_byte(0x01));
	}

	#[tokio::test(start_paused = true)]
	async fn test_resolves_failed() {
		let chain = MockChain::new(1000, 1);
		let meta = id(0x42);
		chain.add_receipt(failed(&meta, 0x02, 995));

		let result = waiter(chain).wait(&meta, None).await.unwrap();
		assert_eq!(result.status, MetaTxnStatus::Failed);
		assert_eq!(result.receipt.transaction_hash, B256::repeat_byte(0x02));
	}

	#[tokio::test(start_paused = true)]
	async fn test_skips_unrelated_receipts_and_keeps_scanning() {
		let chain = MockChain::new(1000, 1);
		let meta = id(0x42);
		chain.add_receipt(unrelated(0x01, 995));
		chain.add_receipt(executed(&meta, 0x02, 1003));

		let started = Instant::now();
		let result = waiter(chain.clone()).wait(&meta, None).await.unwrap();
		let elapsed = started.elapsed();

		assert_eq!(result.status, MetaTxnStatus::Executed);
		assert_eq!(result.receipt.transaction_hash, B256::repeat_byte(0x02));
		assert!(elapsed >= Duration::from_secs(3), "resolved too early: {:?}", elapsed);
		assert!(elapsed < Duration::from_secs(4), "resolved too late: {:?}", elapsed);
		assert_eq!(chain.filters().len(), 4);
	}

	#[tokio::test(start_paused = true)]
	async fn test_deadline_exceeded_and_no_calls_afterwards() {
		let chain = MockChain::new(1000, 1);
		chain.add_receipt(unrelated(0x01, 999));
		let meta = id(0x42);

		let started = Instant::now();
		let result = waiter(chain.clone())
			.wait(&meta, Some(Duration::from_secs(2)))
			.await;
		let elapsed = started.elapsed();

		assert_eq!(
			result,
			Err(ConfirmationError::DeadlineExceeded {
				id: meta,
				timeout: Duration::from_secs(2),
			})
		);
		assert!(elapsed <= Duration::from_secs(3), "deadline overshot: {:?}", elapsed);

		let calls = chain.calls();
		tokio::time::sleep(Duration::from_secs(10)).await;
		assert_eq!(chain.calls(), calls);
	}

	#[tokio::test(start_paused = true)]
	async fn test_unbounded_timeout_still_resolves() {
		let chain = MockChain::new(1000, 1);
		let meta = id(0x42);
		chain.add_receipt(executed(&meta, 0x01, 990));

		let result = waiter(chain)
			.wait(&meta, Some(Duration::from_secs(u64::MAX)))
			.await
			.unwrap();
		assert_eq!(result.status, MetaTxnStatus::Executed);
	}

	#[tokio::test(start_paused = true)]
	async fn test_transient_failures_are_retried() {
		let chain = MockChain::new(1000, 1);
		let meta = id(0x42);
		chain.add_receipt(executed(&meta, 0x01, 990));
		chain.fail_next(5);

		let started = Instant::now();
		let result = waiter(chain).wait(&meta, None).await.unwrap();

		assert_eq!(result.status, MetaTxnStatus::Executed);
		assert!(started.elapsed() >= Duration::from_secs(5));
	}

	#[tokio::test(start_paused = true)]
	async fn test_receipt_failure_rescans_same_window() {
		let chain = MockChain::new(5000, 1);
		let meta = id(0x42);
		chain.add_receipt(executed(&meta, 0x01, 4990));
		chain.fail_next_receipts(2);

		let result = waiter(chain.clone()).wait(&meta, None).await.unwrap();
		assert_eq!(result.status, MetaTxnStatus::Executed);

		let filters = chain.filters();
		assert_eq!(filters.len(), 3);
		assert_eq!(filters[0].from_block, 3964);
		assert!(filters.iter().all(|f| f.from_block == 3964));
	}

	#[tokio::test(start_paused = true)]
	async fn test_missing_receipt_is_skipped() {
		let chain = MockChain::new(1000, 1);
		let meta = id(0x42);
		chain.add_orphan_log(nonce_change(0x09, 980));
		chain.add_receipt(executed(&meta, 0x01, 990));

		let result = waiter(chain).wait(&meta, None).await.unwrap();
		assert_eq!(result.receipt.transaction_hash, B256::repeat_byte(0x01));
	}

	#[tokio::test(start_paused = true)]
	async fn test_bundles_in_same_range_resolve_independently() {
		let chain = MockChain::new(1000, 1);
		let first = id(0x42);
		let second = id(0x43);
		chain.add_receipt(executed(&first, 0x01, 990));
		chain.add_receipt(failed(&second, 0x02, 990));

		let waiter = waiter(chain);
		let (a, b) = tokio::join!(waiter.wait(&first, None), waiter.wait(&second, None));

		let a = a.unwrap();
		let b = b.unwrap();
		assert_eq!(a.status, MetaTxnStatus::Executed);
		assert_eq!(a.receipt.transaction_hash, B256::repeat_byte(0x01));
		assert_eq!(b.status, MetaTxnStatus::Failed);
		assert_eq!(b.receipt.transaction_hash, B256::repeat_byte(0x02));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_during_wait() {
		let chain = MockChain::new(1000, 1);
		let meta = id(0x42);
		let (handle, signal) = cancel_pair();
		let waiter = waiter(chain);

		let started = Instant::now();
		let (result, _) = tokio::join!(
			waiter.wait_with_cancel(&meta, Some(Duration::from_secs(60)), signal),
			async {
				tokio::time::sleep(Duration::from_millis(2500)).await;
				handle.cancel();
			}
		);

		assert_eq!(result, Err(ConfirmationError::Cancelled { id: meta }));
		assert!(started.elapsed() < Duration::from_secs(3));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancelled_before_start_makes_no_calls() {
		let chain = MockChain::new(1000, 1);
		let meta = id(0x42);
		let (handle, signal) = cancel_pair();
		handle.cancel();

		let result = waiter(chain.clone())
			.wait_with_cancel(&meta, None, signal)
			.await;
		assert_eq!(result, Err(ConfirmationError::Cancelled { id: meta }));
		assert_eq!(chain.calls(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_scan_windows_overlap_previous_head() {
		let chain = MockChain::new(2000, 5);
		let meta = id(0x42);

		let _ = waiter(chain.clone())
			.wait(&meta, Some(Duration::from_millis(2500)))
			.await;

		let windows: Vec<(u64, u64)> = chain
			.filters()
			.iter()
			.map(|f| (f.from_block, f.to_block))
			.collect();
		assert_eq!(windows, vec![(964, 2000), (1988, 2005), (1993, 2010)]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_lookback_saturates_near_genesis() {
		let chain = MockChain::new(5, 1);
		let meta = id(0x42);
		chain.add_receipt(executed(&meta, 0x01, 0));

		let result = waiter(chain.clone()).wait(&meta, None).await.unwrap();
		assert_eq!(result.receipt.block_number, 0);
		assert_eq!(chain.filters()[0].from_block, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_wallet_filter_is_applied() {
		let chain = MockChain::new(1000, 1);
		let meta = id(0x42);
		chain.add_receipt(executed(&meta, 0x01, 990));

		let config = ConfirmationConfig::default().with_wallet(WALLET);
		let waiter = MetaTxnWaiter::new(chain.clone(), config).unwrap();
		let result = waiter.wait(&meta, None).await.unwrap();

		assert_eq!(result.status, MetaTxnStatus::Executed);
		assert_eq!(chain.filters()[0].address, Some(WALLET));
	}

	#[test]
	fn test_invalid_config_is_rejected() {
		let chain = MockChain::new(0, 0);
		let config = ConfirmationConfig::default().with_poll_interval(Duration::ZERO);
		assert!(MetaTxnWaiter::new(chain, config).is_err());
	}
}
