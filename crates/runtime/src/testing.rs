//! In-memory backend for tests.
//!
//! [`MockBackend`] implements [`Connector`] by handing out connections over
//! `tokio::io::duplex` pipes, each served by a spawned task that answers
//! every request and records it for later inspection.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tether_protocol::{Address, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::connection::Connection;
use crate::connector::Connector;
use crate::error::{Error, Result};
use crate::transport::{FrameReader, FrameWriter};

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Default)]
struct BackendState {
	accepted: AtomicUsize,
	refuse: AtomicBool,
	reject_auth: AtomicBool,
	fail_shutdown: AtomicBool,
	/// Every request received, tagged with the index of the connection
	log: Mutex<Vec<(usize, Request)>>,
}

/// Scriptable in-memory backend.
#[derive(Clone, Default)]
pub struct MockBackend {
	state: Arc<BackendState>,
}

impl MockBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes subsequent `connect` calls fail as if the host were unreachable.
	pub fn refuse_connections(&self, refuse: bool) {
		self.state.refuse.store(refuse, Ordering::SeqCst);
	}

	/// Makes subsequent handshakes fail with an auth failure.
	pub fn reject_credentials(&self, reject: bool) {
		self.state.reject_auth.store(reject, Ordering::SeqCst);
	}

	/// Makes connections opened from now on fail when closing their write
	/// half, with an error naming the connection.
	pub fn fail_shutdown(&self, fail: bool) {
		self.state.fail_shutdown.store(fail, Ordering::SeqCst);
	}

	/// Number of connections opened so far.
	pub fn connections_accepted(&self) -> usize {
		self.state.accepted.load(Ordering::SeqCst)
	}

	/// Requests received, in arrival order, with their connection index.
	pub fn requests(&self) -> Vec<(usize, Request)> {
		self.state.log.lock().clone()
	}

	/// Requests received on one connection.
	pub fn requests_on(&self, connection: usize) -> Vec<Request> {
		self.state
			.log
			.lock()
			.iter()
			.filter(|(index, _)| *index == connection)
			.map(|(_, request)| request.clone())
			.collect()
	}

	/// Number of `reset` requests received across all connections.
	pub fn reset_count(&self) -> usize {
		self.state
			.log
			.lock()
			.iter()
			.filter(|(_, request)| matches!(request, Request::Reset))
			.count()
	}

	/// Opens a raw connection without going through [`Connector`].
	pub fn open(&self) -> Connection {
		let index = self.state.accepted.fetch_add(1, Ordering::SeqCst);
		let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
		tokio::spawn(serve(server, index, Arc::clone(&self.state)));

		let peer = format!("mock-{index}");
		let connection = if self.state.fail_shutdown.load(Ordering::SeqCst) {
			Connection::new(ShutdownFails {
				inner: client,
				peer: peer.clone(),
			})
		} else {
			Connection::new(client)
		};
		connection.with_peer(peer)
	}
}

impl Connector for MockBackend {
	fn connect<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<Connection>> {
		Box::pin(async move {
			if self.state.refuse.load(Ordering::SeqCst) {
				return Err(Error::ConnectionFailed {
					address: address.to_string(),
					reason: "connection refused".to_string(),
				});
			}
			Ok(self.open())
		})
	}
}

/// Client end whose `shutdown` always fails.
struct ShutdownFails {
	inner: DuplexStream,
	peer: String,
}

impl AsyncRead for ShutdownFails {
	fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_read(cx, buf)
	}
}

impl AsyncWrite for ShutdownFails {
	fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		Pin::new(&mut self.inner).poll_write(cx, buf)
	}

	fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.inner).poll_flush(cx)
	}

	fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Err(io::Error::other(format!("shutdown refused on {}", self.peer))))
	}
}

async fn serve(stream: DuplexStream, index: usize, state: Arc<BackendState>) {
	let (read, write) = tokio::io::split(stream);
	let mut reader = FrameReader::new(read);
	let mut writer = FrameWriter::new(write);

	while let Ok(request) = reader.recv::<Request>().await {
		state.log.lock().push((index, request.clone()));

		let reply = match &request {
			Request::Goodbye => break,
			Request::Hello { .. } if state.reject_auth.load(Ordering::SeqCst) => {
				Response::failure("Security.Unauthorized", "invalid credentials")
			}
			Request::Hello { .. } | Request::Reset => Response::success(),
			Request::Run { statement, .. } => {
				let mut metadata = Map::new();
				metadata.insert("statement".to_string(), Value::from(statement.as_str()));
				metadata.insert("connection".to_string(), Value::from(index));
				Response::Success { metadata }
			}
		};

		if writer.send(&reply).await.is_err() {
			break;
		}
	}
}
