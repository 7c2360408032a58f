//! Request and response messages.
//!
//! A connection runs a strict request/response exchange: every [`Request`]
//! except [`Request::Goodbye`] is answered by exactly one [`Response`], in
//! order. Clients may pipeline several requests in one flush and read the
//! replies back in the same order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::AuthToken;

/// Named statement parameters.
pub type Parameters = Map<String, Value>;

/// Message sent from the client to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
	/// Handshake sent once, right after the transport is opened.
	Hello {
		/// Client identity, e.g. `tether/0.1.0`.
		user_agent: String,
		/// Credentials for this connection.
		auth: AuthToken,
	},
	/// Execute a statement.
	Run {
		statement: String,
		#[serde(default, skip_serializing_if = "Map::is_empty")]
		parameters: Parameters,
	},
	/// Clear all server-side state held for this connection.
	Reset,
	/// Announce an orderly close. The backend does not reply.
	Goodbye,
}

impl Request {
	/// Short name used in logs.
	pub fn name(&self) -> &'static str {
		match self {
			Request::Hello { .. } => "hello",
			Request::Run { .. } => "run",
			Request::Reset => "reset",
			Request::Goodbye => "goodbye",
		}
	}

	/// Whether the backend answers this request.
	pub fn expects_reply(&self) -> bool {
		!matches!(self, Request::Goodbye)
	}
}

/// Reply sent from the backend to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
	/// The request succeeded.
	Success {
		#[serde(default)]
		metadata: Map<String, Value>,
	},
	/// The request was rejected or failed on the backend.
	Failure {
		/// Backend error code, e.g. `Security.Unauthorized`.
		code: String,
		message: String,
	},
}

impl Response {
	/// Success reply without metadata.
	pub fn success() -> Self {
		Response::Success {
			metadata: Map::new(),
		}
	}

	pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
		Response::Failure {
			code: code.into(),
			message: message.into(),
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(self, Response::Success { .. })
	}
}
