//! Command handlers for the `metatx` binary.

use anyhow::{Context, Result};
use metatx_chain::create_chain_reader;
use metatx_config::{Config, ConfigLoader};
use metatx_confirm::{cancel_pair, MetaTxnWaiter};
use metatx_delivery::{create_local_relayer, RelayService};
use metatx_types::{Address, MetaTxnId, MetaTxnReceipt, U160};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::bundle_file::{read_signed_bundle, BundleFile};
use crate::shutdown_signal;

pub async fn load_config(path: &Path) -> Result<Config> {
	ConfigLoader::new()
		.with_file(path)
		.load()
		.await
		.context("Failed to load configuration")
}

pub fn compute_id(bundle: &Path) -> Result<()> {
	let file = BundleFile::read(bundle)?;
	let id = file
		.meta_txn_id()
		.context("Failed to derive meta transaction id")?;
	println!("{}", id);
	Ok(())
}

pub async fn wait(config: &Config, id: &str, timeout_secs: Option<u64>) -> Result<()> {
	let id: MetaTxnId = id.parse().context("Invalid meta transaction id")?;

	let chain = create_chain_reader(&config.network.rpc_url)
		.await
		.context("Failed to connect to RPC endpoint")?;
	let confirmation = config.confirmation.to_confirmation_config()?;
	let waiter = MetaTxnWaiter::new(chain, confirmation)?;

	let (handle, signal) = cancel_pair();
	let interrupt = tokio::spawn(async move {
		shutdown_signal().await;
		warn!("Interrupted, cancelling wait");
		handle.cancel();
	});

	let result = waiter
		.wait_with_cancel(&id, timeout_secs.map(Duration::from_secs), signal)
		.await;
	interrupt.abort();

	print_receipt(&id, &result?);
	Ok(())
}

pub async fn nonce(config: &Config, wallet: Address, space: U160) -> Result<()> {
	let service = relay_service(config).await?;
	let nonce = service
		.get_nonce(wallet, space, None)
		.await
		.context("Failed to read wallet nonce")?;

	info!(
		wallet = %wallet,
		space = %nonce.space(),
		counter = %nonce.counter(),
		"Read wallet nonce"
	);
	println!("space:   {}", nonce.space());
	println!("counter: {}", nonce.counter());
	println!("encoded: {:#x}", nonce.encode());
	Ok(())
}

pub async fn relay(
	config: &Config,
	signed: &Path,
	wait: bool,
	timeout_secs: Option<u64>,
) -> Result<()> {
	let signed = read_signed_bundle(signed)?;
	let service = relay_service(config).await?;

	let submission = service
		.submit(&signed)
		.await
		.context("Failed to relay bundle")?;
	println!("meta_txn_id: {}", submission.meta_txn_id);
	println!("tx_hash:     {}", submission.tx_hash);

	if !wait {
		return Ok(());
	}

	let timeout = timeout_secs.map(Duration::from_secs);
	tokio::select! {
		result = service.wait(&submission.meta_txn_id, timeout) => {
			let receipt = result.context("Failed to confirm bundle")?;
			print_receipt(&submission.meta_txn_id, &receipt);
		}
		_ = shutdown_signal() => {
			warn!(meta_txn_id = %submission.meta_txn_id, "Interrupted before confirmation");
		}
	}
	Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
	let confirmation = config.confirmation.to_confirmation_config()?;

	info!("Configuration is valid");
	info!("Chain: {}", config.network.chain_id());
	info!("RPC URL: {}", config.network.rpc_url);
	info!(
		"Confirmation: timeout {}s, lookback {} blocks, overlap {} blocks, poll every {}ms",
		confirmation.default_timeout.as_secs(),
		confirmation.initial_lookback_blocks,
		confirmation.reorg_overlap_blocks,
		confirmation.poll_interval.as_millis()
	);
	if let Some(wallet) = confirmation.wallet {
		info!("Wallet filter: {}", wallet);
	}
	info!(
		"Local relayer: {}",
		if config.relayer.is_some() {
			"configured"
		} else {
			"not configured"
		}
	);
	Ok(())
}

async fn relay_service(config: &Config) -> Result<RelayService> {
	let relayer_settings = config
		.relayer
		.as_ref()
		.context("A [relayer] section is required for this command")?;

	let relayer = create_local_relayer(
		&config.network.rpc_url,
		config.network.chain_id(),
		&relayer_settings.private_key,
		config.confirmation.to_confirmation_config()?,
	)
	.await
	.context("Failed to create local relayer")?;

	Ok(RelayService::new(relayer))
}

fn print_receipt(id: &MetaTxnId, receipt: &MetaTxnReceipt) {
	println!("meta_txn_id: {}", id);
	println!("status:      {}", receipt.status);
	println!("tx_hash:     {}", receipt.receipt.transaction_hash);
	println!("block:       {}", receipt.receipt.block_number);
}
