//! Error types for bundle and identifier handling.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetaTxnError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetaTxnError {
	#[error("Invalid input: {0}")]
	InvalidInput(String),

	/// The derived identifier does not have the expected digest width.
	#[error("Computation error: {0}")]
	Computation(String),
}
