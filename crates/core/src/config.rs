//! Driver and pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_protocol::{Address, AuthToken};

/// Client identity sent in the handshake unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("tether/", env!("CARGO_PKG_VERSION"));

/// Limits for the connection pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
	/// Maximum number of connections checked out or idle at once.
	pub max_size: usize,
	/// Maximum number of idle connections kept; extra ones are closed on release.
	pub max_idle: usize,
	/// How long `acquire` waits for a free slot. `None` waits indefinitely.
	pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_size: 100,
			max_idle: 100,
			acquire_timeout: Some(Duration::from_secs(60)),
		}
	}
}

impl PoolConfig {
	pub fn with_max_size(mut self, max_size: usize) -> Self {
		self.max_size = max_size;
		self
	}

	pub fn with_max_idle(mut self, max_idle: usize) -> Self {
		self.max_idle = max_idle;
		self
	}

	pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.acquire_timeout = timeout;
		self
	}
}

/// Everything a [`Driver`](crate::Driver) needs to open connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
	pub address: Address,
	/// Client identity presented in the handshake.
	pub user_agent: String,
	pub auth: AuthToken,
	pub pool: PoolConfig,
	/// Upper bound on opening a TCP stream (default connector only).
	pub connect_timeout: Option<Duration>,
}

impl Default for DriverConfig {
	fn default() -> Self {
		Self {
			address: Address::default(),
			user_agent: DEFAULT_USER_AGENT.to_string(),
			auth: AuthToken::none(),
			pool: PoolConfig::default(),
			connect_timeout: Some(Duration::from_secs(30)),
		}
	}
}

impl DriverConfig {
	pub fn new(address: Address) -> Self {
		Self {
			address,
			..Self::default()
		}
	}

	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();
		self
	}

	pub fn with_auth(mut self, auth: AuthToken) -> Self {
		self.auth = auth;
		self
	}

	pub fn with_pool(mut self, pool: PoolConfig) -> Self {
		self.pool = pool;
		self
	}

	pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.connect_timeout = timeout;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_sane() {
		let config = DriverConfig::default();
		assert_eq!(config.address, Address::new("localhost", 7687));
		assert!(config.user_agent.starts_with("tether/"));
		assert_eq!(config.auth.scheme, "none");
		assert!(config.pool.max_idle <= config.pool.max_size);
	}

	#[test]
	fn partial_json_fills_defaults() {
		let config: DriverConfig = serde_json::from_value(serde_json::json!({
			"address": {"host": "db", "port": 9000},
			"pool": {"max_size": 4}
		}))
		.unwrap();

		assert_eq!(config.address.to_string(), "db:9000");
		assert_eq!(config.pool.max_size, 4);
		assert_eq!(config.pool.max_idle, PoolConfig::default().max_idle);
		assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
	}

	#[test]
	fn builders_chain() {
		let config = DriverConfig::new(Address::new("db", 1))
			.with_user_agent("app/1.0")
			.with_auth(AuthToken::basic("u", "p"))
			.with_pool(PoolConfig::default().with_max_size(2).with_max_idle(1))
			.with_connect_timeout(None);

		assert_eq!(config.user_agent, "app/1.0");
		assert_eq!(config.pool.max_size, 2);
		assert_eq!(config.pool.max_idle, 1);
		assert_eq!(config.connect_timeout, None);
	}
}
