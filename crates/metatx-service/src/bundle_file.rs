//! JSON files describing bundles on disk.

use anyhow::{Context, Result};
use metatx_delivery::SignedBundle;
use metatx_types::{
	compute_meta_txn_id, Address, Call, ChainId, MetaTxnId, Nonce, TransactionBundle, U160, U256,
};
use serde::Deserialize;
use std::path::Path;

/// An unsigned bundle as written by hand or by another tool.
#[derive(Debug, Deserialize)]
pub struct BundleFile {
	pub chain_id: u64,
	pub wallet: Address,
	#[serde(default)]
	pub nonce: NonceFile,
	pub calls: Vec<Call>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NonceFile {
	#[serde(default)]
	pub space: U160,
	#[serde(default)]
	pub counter: U256,
}

impl BundleFile {
	pub fn parse(content: &str) -> Result<Self> {
		serde_json::from_str(content).context("Failed to parse bundle JSON")
	}

	pub fn read(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read bundle file: {:?}", path))?;
		Self::parse(&content)
	}

	pub fn to_bundle(&self) -> Result<TransactionBundle> {
		let nonce = Nonce::new(self.nonce.space, self.nonce.counter)?;
		Ok(TransactionBundle::new(self.calls.clone(), nonce))
	}

	pub fn meta_txn_id(&self) -> Result<MetaTxnId> {
		let bundle = self.to_bundle()?;
		Ok(compute_meta_txn_id(
			ChainId(self.chain_id),
			self.wallet,
			&bundle,
		)?)
	}
}

/// Reads a signed bundle in the relayer submission format.
pub fn read_signed_bundle(path: &Path) -> Result<SignedBundle> {
	let content = std::fs::read_to_string(path)
		.with_context(|| format!("Failed to read signed bundle file: {:?}", path))?;
	serde_json::from_str(&content).context("Failed to parse signed bundle JSON")
}
