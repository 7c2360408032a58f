//! Caller-facing handle bound to one pooled connection.

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::{Map, Value};
use tether_protocol::{Parameters, Request, Response};
use tether_runtime::{Connection, ConnectionId};
use tracing::debug;

use crate::driver::PooledConnection;
use crate::error::{Error, Result};

/// Returns a session's connection to the pool. Runs at most once.
struct CloseHandler {
	lease: PooledConnection,
}

impl CloseHandler {
	fn fire(self) {
		self.lease.connection().reset();
		debug!(id = %self.lease.id(), "session closed; connection released");
		self.lease.release();
	}
}

/// A short-lived handle for running requests on a pooled connection.
///
/// Sessions are never reused. Closing one queues a reset on its connection
/// and returns the connection to the pool; dropping an unclosed session
/// closes it.
pub struct Session {
	id: ConnectionId,
	connection: Weak<Connection>,
	on_close: Option<CloseHandler>,
}

impl Session {
	pub(crate) fn new(lease: PooledConnection) -> Self {
		Self {
			id: lease.id(),
			connection: Arc::downgrade(lease.connection()),
			on_close: Some(CloseHandler { lease }),
		}
	}

	/// Id of the connection this session is bound to.
	pub fn id(&self) -> ConnectionId {
		self.id
	}

	/// Whether the session has not been closed by its caller.
	pub fn is_open(&self) -> bool {
		self.on_close.is_some()
	}

	/// Runs `statement` and returns the success metadata.
	///
	/// A failure reply surfaces as [`Error::Remote`]; the connection stays
	/// usable.
	pub async fn run(&self, statement: impl Into<String>, parameters: Parameters) -> Result<Map<String, Value>> {
		if !self.is_open() {
			return Err(Error::SessionClosed);
		}
		let connection = self
			.connection
			.upgrade()
			.ok_or(tether_runtime::Error::ConnectionClosed)?;

		let request = Request::Run {
			statement: statement.into(),
			parameters,
		};
		match connection.send(&request).await? {
			Response::Success { metadata } => Ok(metadata),
			Response::Failure { code, message } => Err(Error::Remote { code, message }),
		}
	}

	/// Closes the session.
	///
	/// Returns `true` if this call released the connection, `false` if the
	/// session was already closed.
	pub fn close(&mut self) -> bool {
		match self.on_close.take() {
			Some(handler) => {
				handler.fire();
				true
			}
			None => false,
		}
	}

	/// Closes the session and then calls `callback`.
	///
	/// The callback runs only if this call released the connection.
	pub fn close_with<F>(&mut self, callback: F) -> bool
	where
		F: FnOnce(ConnectionId),
	{
		let released = self.close();
		if released {
			callback(self.id);
		}
		released
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.close();
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.id)
			.field("open", &self.is_open())
			.finish()
	}
}
