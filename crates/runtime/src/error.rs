//! Error types for the tether runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a backend.
#[derive(Debug, Error)]
pub enum Error {
	/// The backend could not be reached.
	#[error("Failed to connect to {address}: {reason}")]
	ConnectionFailed { address: String, reason: String },

	/// The backend rejected the handshake.
	#[error("Authentication failed ({code}): {message}")]
	AuthFailed { code: String, message: String },

	/// The connection was closed, locally or by the peer.
	#[error("Connection closed")]
	ConnectionClosed,

	/// Timeout waiting for an operation.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The peer sent something that is not a valid frame or message.
	#[error("Protocol error: {0}")]
	Protocol(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if the connection that produced this error is unusable.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			Error::ConnectionClosed | Error::Protocol(_) | Error::Io(_) | Error::Json(_)
		)
	}

	/// Returns true if this is a connection-closed error.
	pub fn is_connection_closed(&self) -> bool {
		matches!(self, Error::ConnectionClosed)
	}

	/// Returns true if this error came from establishing a connection.
	pub fn is_establishment_failure(&self) -> bool {
		matches!(
			self,
			Error::ConnectionFailed { .. } | Error::AuthFailed { .. } | Error::Timeout(_)
		)
	}
}
