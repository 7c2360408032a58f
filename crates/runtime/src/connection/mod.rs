//! A single live channel to a backend.
//!
//! A [`Connection`] runs a strict request/response exchange over a framed
//! transport. It handles:
//! - The `hello` handshake ([`Connection::initialize`])
//! - Deferred reset: [`Connection::reset`] only raises a flag, and the next
//!   [`Connection::send`] writes the `reset` frame ahead of its own request in
//!   the same flush
//! - Idempotent close that fails any in-flight request with
//!   [`Error::ConnectionClosed`]
//!
//! # Exchange
//!
//! 1. Caller invokes `send()` with a request
//! 2. The I/O lock is taken, a pending reset (if any) is consumed
//! 3. `reset` (optional) and the request are written and flushed together
//! 4. The reset reply is read and discarded, then the request reply returned


use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tether_protocol::{AuthToken, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex as TokioMutex, Notify};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::{BoxReader, BoxWriter, FrameReader, FrameWriter, framed};

/// Identity assigned to a connection by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "conn-{}", self.0)
	}
}

struct Io {
	reader: FrameReader<BoxReader>,
	writer: FrameWriter<BoxWriter>,
}

/// Live channel to a backend.
pub struct Connection {
	/// Identity slot, written once by the owner
	id: OnceLock<ConnectionId>,
	/// Peer label for logs
	peer: String,
	open: AtomicBool,
	/// Set by `reset()`, consumed by the next `send()`
	pending_reset: AtomicBool,
	/// Wakes in-flight sends when the connection is closed
	closed: Notify,
	io: TokioMutex<Io>,
}

impl Connection {
	/// Wraps an already-open byte stream.
	pub fn new<S>(stream: S) -> Self
	where
		S: AsyncRead + AsyncWrite + Send + 'static,
	{
		let (reader, writer) = framed(stream);
		Self {
			id: OnceLock::new(),
			peer: String::from("unknown"),
			open: AtomicBool::new(true),
			pending_reset: AtomicBool::new(false),
			closed: Notify::new(),
			io: TokioMutex::new(Io { reader, writer }),
		}
	}

	/// Sets the peer label used in log output.
	pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
		self.peer = peer.into();
		self
	}

	pub fn peer(&self) -> &str {
		&self.peer
	}

	/// The identity assigned by the owner, if any.
	pub fn id(&self) -> Option<ConnectionId> {
		self.id.get().copied()
	}

	/// Assigns the identity. Only the first assignment takes effect.
	pub fn assign_id(&self, id: ConnectionId) -> bool {
		self.id.set(id).is_ok()
	}

	pub fn is_open(&self) -> bool {
		self.open.load(Ordering::Acquire)
	}

	/// Whether a reset is queued for the next request.
	pub fn has_pending_reset(&self) -> bool {
		self.pending_reset.load(Ordering::Acquire)
	}

	/// Performs the `hello` handshake.
	pub async fn initialize(&self, user_agent: &str, auth: &AuthToken) -> Result<()> {
		let hello = Request::Hello {
			user_agent: user_agent.to_string(),
			auth: auth.clone(),
		};
		match self.send(&hello).await? {
			Response::Success { .. } => {
				debug!(peer = %self.peer, scheme = %auth.scheme, "handshake complete");
				Ok(())
			}
			Response::Failure { code, message } => Err(Error::AuthFailed { code, message }),
		}
	}

	/// Queues a reset of server-side state.
	///
	/// No I/O happens here; the reset is written ahead of the next request.
	pub fn reset(&self) {
		self.pending_reset.store(true, Ordering::Release);
	}

	/// Sends a request and awaits its reply.
	///
	/// Requests that expect no reply resolve to an empty success once flushed.
	pub async fn send(&self, request: &Request) -> Result<Response> {
		// Register before checking so a concurrent close cannot be missed.
		let closed = self.closed.notified();
		if !self.is_open() {
			return Err(Error::ConnectionClosed);
		}

		let result = tokio::select! {
			biased;
			_ = closed => Err(Error::ConnectionClosed),
			result = self.exchange(request) => result,
		};

		if let Err(e) = &result {
			if e.is_fatal() {
				self.mark_broken(&e.to_string());
			}
		}
		result
	}

	/// Takes the connection out of service without any I/O.
	fn mark_broken(&self, reason: &str) {
		if self.open.swap(false, Ordering::AcqRel) {
			warn!(peer = %self.peer, reason, "connection broken");
			self.closed.notify_waiters();
		}
	}

	async fn exchange(&self, request: &Request) -> Result<Response> {
		let mut io = self.io.lock().await;
		// From here on the stream is mid-exchange until the reply is read.
		let guard = InFlight {
			connection: self,
			finished: false,
		};

		let reset = self.pending_reset.swap(false, Ordering::AcqRel);
		if reset {
			io.writer.write(&Request::Reset).await?;
		}
		io.writer.write(request).await?;
		io.writer.flush().await?;
		debug!(peer = %self.peer, request = request.name(), reset, "sent");

		if reset {
			if let Response::Failure { code, message } = io.reader.recv().await? {
				warn!(peer = %self.peer, %code, %message, "reset rejected");
			}
		}

		let reply = if request.expects_reply() {
			io.reader.recv().await?
		} else {
			Response::success()
		};
		guard.finish();
		Ok(reply)
	}

	/// Closes the channel.
	///
	/// Safe to call more than once; only the first call does any work.
	pub async fn close(&self) -> Result<()> {
		if !self.open.swap(false, Ordering::AcqRel) {
			return Ok(());
		}
		self.closed.notify_waiters();
		debug!(peer = %self.peer, id = ?self.id(), "closing connection");

		let mut io = self.io.lock().await;
		if let Err(e) = io.writer.send(&Request::Goodbye).await {
			debug!(peer = %self.peer, error = %e, "goodbye not delivered");
		}
		match io.writer.shutdown().await {
			Err(Error::Io(e))
				if matches!(
					e.kind(),
					std::io::ErrorKind::BrokenPipe
						| std::io::ErrorKind::NotConnected
						| std::io::ErrorKind::ConnectionReset
				) =>
			{
				Ok(())
			}
			other => other,
		}
	}
}

/// Breaks the connection if an exchange is abandoned between writing the
/// request and reading its reply, so no later caller reads a stale reply.
struct InFlight<'a> {
	connection: &'a Connection,
	finished: bool,
}

impl InFlight<'_> {
	fn finish(mut self) {
		self.finished = true;
	}
}

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		if !self.finished {
			self.connection.mark_broken("exchange did not complete");
		}
	}
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("id", &self.id())
			.field("peer", &self.peer)
			.field("open", &self.is_open())
			.field("pending_reset", &self.has_pending_reset())
			.finish()
	}
}
