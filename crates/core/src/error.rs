//! Error types for the driver.

use std::time::Duration;

use tether_protocol::AddressError;
use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`Driver`](crate::Driver), [`Pool`](crate::Pool) and
/// [`Session`](crate::Session).
#[derive(Debug, Error)]
pub enum Error {
	/// Transport, handshake or connection-level failure.
	#[error(transparent)]
	Runtime(#[from] tether_runtime::Error),

	/// The pool no longer hands out resources.
	#[error("Connection pool is closed")]
	PoolClosed,

	/// No pooled connection became available in time.
	#[error("Timed out after {0:?} waiting for a pooled connection")]
	AcquireTimeout(Duration),

	/// The driver was closed.
	#[error("Driver is closed")]
	DriverClosed,

	/// The session was already closed by its caller.
	#[error("Session is closed")]
	SessionClosed,

	#[error("Invalid address: {0}")]
	InvalidAddress(#[from] AddressError),

	/// The backend answered a request with a failure.
	#[error("{code}: {message}")]
	Remote { code: String, message: String },
}

impl Error {
	/// Returns true if the underlying connection is closed.
	pub fn is_connection_closed(&self) -> bool {
		matches!(self, Error::Runtime(e) if e.is_connection_closed())
	}

	/// Returns true if this error came from opening or authenticating a connection.
	pub fn is_establishment_failure(&self) -> bool {
		matches!(self, Error::Runtime(e) if e.is_establishment_failure())
	}

	/// Returns the backend error code if this is a Remote error.
	pub fn code(&self) -> Option<&str> {
		match self {
			Error::Remote { code, .. } => Some(code),
			Error::Runtime(tether_runtime::Error::AuthFailed { code, .. }) => Some(code),
			_ => None,
		}
	}
}
