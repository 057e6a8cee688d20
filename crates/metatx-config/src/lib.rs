//! Configuration loading for the meta transaction tooling.
//!
//! Reads a TOML file, substitutes `${VAR}` references from the environment,
//! applies prefixed environment overrides and validates the result.

use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "METATX_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self.file_path.as_deref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;

		if !Path::new(file_path).exists() {
			return Err(ConfigError::FileNotFound(file_path.to_string()));
		}

		let content = tokio::fs::read_to_string(file_path).await?;
		self.load_str(&content)
	}

	/// Parses configuration text, then applies overrides and validation.
	pub fn load_str(&self, content: &str) -> Result<Config, ConfigError> {
		let substituted_content = self.substitute_env_vars(content)?;

		let mut config: Config = toml::from_str(&substituted_content)
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		let re = regex::Regex::new(r"\$\{([^}]+)\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(rpc_url) = env::var(format!("{}RPC_URL", self.env_prefix)) {
			debug!("Overriding RPC URL from environment");
			config.network.rpc_url = rpc_url;
		}

		if let Ok(chain_id) = env::var(format!("{}CHAIN_ID", self.env_prefix)) {
			config.network.chain_id = chain_id
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid chain id: {}", e)))?;
		}

		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.logging.level = log_level;
		}

		if let Ok(private_key) = env::var(format!("{}PRIVATE_KEY", self.env_prefix)) {
			debug!("Overriding relayer private key from environment");
			config.relayer = Some(RelayerSettings { private_key });
		}

		Ok(())
	}
}

/// Checks cross-field constraints that serde cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
	if config.network.chain_id == 0 {
		return Err(ConfigError::ValidationError(
			"network.chain_id must be greater than zero".to_string(),
		));
	}

	let url = &config.network.rpc_url;
	if !(url.starts_with("http://") || url.starts_with("https://")) {
		return Err(ConfigError::ValidationError(format!(
			"network.rpc_url must be an http(s) URL, got '{}'",
			url
		)));
	}

	if config.confirmation.default_timeout_secs == 0 {
		return Err(ConfigError::ValidationError(
			"confirmation.default_timeout_secs must be greater than zero".to_string(),
		));
	}

	config.confirmation.to_confirmation_config()?;

	if let Some(relayer) = &config.relayer {
		let key = relayer
			.private_key
			.strip_prefix("0x")
			.unwrap_or(&relayer.private_key);
		if key.len() != 64 || hex::decode(key).is_err() {
			return Err(ConfigError::ValidationError(
				"relayer.private_key must be 32 bytes of hex".to_string(),
			));
		}
	}

	Ok(())
}
