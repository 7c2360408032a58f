//! Backend addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port used when an address does not name one.
pub const DEFAULT_PORT: u16 = 7687;

const SCHEME_PREFIX: &str = "tether://";

/// Errors from parsing an [`Address`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
	#[error("address is empty")]
	Empty,

	#[error("invalid port in address '{0}'")]
	InvalidPort(String),
}

/// Host and port of a backend server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
	pub host: String,
	pub port: u16,
}

impl Address {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self {
			host: host.into(),
			port,
		}
	}
}

impl Default for Address {
	fn default() -> Self {
		Self::new("localhost", DEFAULT_PORT)
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.host, self.port)
	}
}

/// Accepts `host`, `host:port` and `tether://host:port`.
impl FromStr for Address {
	type Err = AddressError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		let s = s.strip_prefix(SCHEME_PREFIX).unwrap_or(s);
		let s = s.trim_end_matches('/');
		if s.is_empty() {
			return Err(AddressError::Empty);
		}

		match s.rsplit_once(':') {
			Some((host, port)) => {
				if host.is_empty() {
					return Err(AddressError::Empty);
				}
				let port = port
					.parse::<u16>()
					.map_err(|_| AddressError::InvalidPort(s.to_string()))?;
				Ok(Self::new(host, port))
			}
			None => Ok(Self::new(s, DEFAULT_PORT)),
		}
	}
}
