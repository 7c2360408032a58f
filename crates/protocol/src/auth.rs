//! Authentication token presented in the `hello` handshake.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Credentials for a single connection.
///
/// `Debug` output never includes the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
	/// Authentication scheme: `basic` or `none`.
	pub scheme: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub principal: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub credentials: String,
}

impl AuthToken {
	/// Username/password authentication.
	pub fn basic(principal: impl Into<String>, credentials: impl Into<String>) -> Self {
		Self {
			scheme: "basic".to_string(),
			principal: principal.into(),
			credentials: credentials.into(),
		}
	}

	/// No authentication.
	pub fn none() -> Self {
		Self {
			scheme: "none".to_string(),
			principal: String::new(),
			credentials: String::new(),
		}
	}
}

impl Default for AuthToken {
	fn default() -> Self {
		Self::none()
	}
}

impl fmt::Debug for AuthToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AuthToken")
			.field("scheme", &self.scheme)
			.field("principal", &self.principal)
			.field("credentials", &"<redacted>")
			.finish()
	}
}
