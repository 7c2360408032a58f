//! Opening connections to a backend.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tether_protocol::Address;
use tokio::net::TcpStream;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{Error, Result};

/// Opens transport-level connections.
///
/// The returned [`Connection`] is open but not yet initialized; the caller
/// performs the handshake with [`Connection::initialize`].
pub trait Connector: Send + Sync {
	fn connect<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<Connection>>;
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
	connect_timeout: Option<Duration>,
	nodelay: bool,
}

impl Default for TcpConnector {
	fn default() -> Self {
		Self {
			connect_timeout: Some(Duration::from_secs(30)),
			nodelay: true,
		}
	}
}

impl TcpConnector {
	pub fn new() -> Self {
		Self::default()
	}

	/// Upper bound on establishing the TCP stream. `None` waits indefinitely.
	pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.connect_timeout = timeout;
		self
	}

	pub fn with_nodelay(mut self, nodelay: bool) -> Self {
		self.nodelay = nodelay;
		self
	}

	async fn open(&self, address: &Address) -> Result<TcpStream> {
		let connect = TcpStream::connect((address.host.as_str(), address.port));
		let stream = match self.connect_timeout {
			Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
				Error::Timeout(format!("connecting to {address} took longer than {limit:?}"))
			})?,
			None => connect.await,
		};
		stream.map_err(|e| Error::ConnectionFailed {
			address: address.to_string(),
			reason: e.to_string(),
		})
	}
}

impl Connector for TcpConnector {
	fn connect<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<Connection>> {
		Box::pin(async move {
			let stream = self.open(address).await?;
			stream.set_nodelay(self.nodelay)?;
			debug!(%address, "tcp stream established");
			Ok(Connection::new(stream).with_peer(address.to_string()))
		})
	}
}
