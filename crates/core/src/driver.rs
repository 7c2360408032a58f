//! The session manager.
//!
//! A [`Driver`] owns a [`Pool`] of connections and the [`Registry`] of every
//! connection it has opened. It plugs into the pool as its [`Lifecycle`]
//! through [`ConnectionFactory`], and hands callers [`Session`]s.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tether_protocol::{Address, AuthToken};
use tether_runtime::{Connection, ConnectionId, Connector, TcpConnector};
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::error::{Error, Result};
use crate::pool::{Lifecycle, Pool, PoolStatus, Releaser};
use crate::registry::Registry;
use crate::session::Session;

/// A connection checked out of, or idle in, the driver's pool.
pub struct PooledConnection {
	id: ConnectionId,
	connection: Arc<Connection>,
	releaser: Releaser<PooledConnection>,
}

impl PooledConnection {
	pub fn id(&self) -> ConnectionId {
		self.id
	}

	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	/// Hands the connection back to the pool it came from.
	pub fn release(self) {
		let releaser = self.releaser.clone();
		releaser.release(self);
	}
}

impl fmt::Debug for PooledConnection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PooledConnection")
			.field("id", &self.id)
			.field("open", &self.connection.is_open())
			.finish()
	}
}

/// Opens, checks and disposes of connections on behalf of the pool.
pub struct ConnectionFactory {
	address: Address,
	user_agent: String,
	auth: AuthToken,
	connector: Arc<dyn Connector>,
	registry: Arc<Registry>,
}

impl ConnectionFactory {
	async fn open(&self, releaser: Releaser<PooledConnection>) -> Result<PooledConnection> {
		let id = self.registry.allocate_id();
		let connection = self.connector.connect(&self.address).await?;

		if let Err(e) = connection.initialize(&self.user_agent, &self.auth).await {
			if let Err(close_err) = connection.close().await {
				debug!(%id, error = %close_err, "close after failed handshake");
			}
			return Err(e.into());
		}
		connection.assign_id(id);

		let connection = Arc::new(connection);
		if let Err(e) = self.registry.register(id, Arc::clone(&connection)) {
			debug!(%id, "driver closed during connect; discarding connection");
			if let Err(close_err) = connection.close().await {
				debug!(%id, error = %close_err, "close of late connection failed");
			}
			return Err(e);
		}

		debug!(%id, peer = connection.peer(), "connection registered");
		Ok(PooledConnection {
			id,
			connection,
			releaser,
		})
	}
}

impl Lifecycle for ConnectionFactory {
	type Resource = PooledConnection;

	fn create(&self, releaser: Releaser<PooledConnection>) -> BoxFuture<'_, Result<PooledConnection>> {
		Box::pin(self.open(releaser))
	}

	fn validate(&self, resource: &PooledConnection) -> bool {
		resource.connection.is_open()
	}

	fn destroy(&self, resource: PooledConnection) -> BoxFuture<'_, ()> {
		Box::pin(async move {
			let removed = self.registry.remove(resource.id).is_some();
			if let Err(e) = resource.connection.close().await {
				debug!(id = %resource.id, error = %e, "close during destroy failed");
			}
			debug!(id = %resource.id, removed, "connection destroyed");
		})
	}
}

impl fmt::Debug for ConnectionFactory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionFactory")
			.field("address", &self.address)
			.field("user_agent", &self.user_agent)
			.field("auth", &self.auth)
			.finish_non_exhaustive()
	}
}

struct DriverInner {
	config: DriverConfig,
	registry: Arc<Registry>,
	pool: Pool<ConnectionFactory>,
}

/// Hands out sessions backed by pooled connections.
///
/// Cloning is cheap; clones share the same pool and registry.
#[derive(Clone)]
pub struct Driver {
	inner: Arc<DriverInner>,
}

impl Driver {
	/// Creates a driver that connects over TCP.
	///
	/// No connection is opened until the first [`Driver::session`].
	pub fn new(config: DriverConfig) -> Self {
		let connector = TcpConnector::new().with_connect_timeout(config.connect_timeout);
		Self::with_connector(config, Arc::new(connector))
	}

	/// Creates a driver that opens connections through `connector`.
	pub fn with_connector(config: DriverConfig, connector: Arc<dyn Connector>) -> Self {
		let registry = Arc::new(Registry::new());
		let factory = ConnectionFactory {
			address: config.address.clone(),
			user_agent: config.user_agent.clone(),
			auth: config.auth.clone(),
			connector,
			registry: Arc::clone(&registry),
		};
		let pool = Pool::new(factory, config.pool.clone());
		debug!(address = %config.address, "driver created");

		Self {
			inner: Arc::new(DriverInner {
				config,
				registry,
				pool,
			}),
		}
	}

	pub fn config(&self) -> &DriverConfig {
		&self.inner.config
	}

	/// Opens a session on a pooled connection.
	///
	/// Waits while the pool is at capacity. Fails with
	/// [`Error::DriverClosed`] after [`Driver::close`].
	pub async fn session(&self) -> Result<Session> {
		if self.inner.registry.is_closed() {
			return Err(Error::DriverClosed);
		}
		let lease = self.inner.pool.acquire().await.map_err(|e| match e {
			Error::PoolClosed => Error::DriverClosed,
			other => other,
		})?;
		debug!(id = %lease.id(), "session opened");
		Ok(Session::new(lease))
	}

	/// Force-closes every tracked connection, checked out or idle.
	///
	/// Sessions still holding a connection fail with a connection-closed
	/// error on their next request. Every connection is attempted; the last
	/// close error, if any, is returned.
	pub async fn close(&self) -> Result<()> {
		let snapshot = self.inner.registry.close();
		info!(connections = snapshot.len(), "closing driver");

		let mut last_error = None;
		for (id, connection) in snapshot {
			if let Err(e) = connection.close().await {
				warn!(%id, error = %e, "failed to close connection");
				last_error = Some(e);
			}
		}
		self.inner.pool.close().await;

		match last_error {
			Some(e) => Err(e.into()),
			None => Ok(()),
		}
	}

	pub fn is_closed(&self) -> bool {
		self.inner.registry.is_closed()
	}

	/// Number of connections currently tracked.
	pub fn registered(&self) -> usize {
		self.inner.registry.len()
	}

	/// Ids of the tracked connections, ascending.
	pub fn registered_ids(&self) -> Vec<ConnectionId> {
		self.inner.registry.ids()
	}

	pub fn pool_status(&self) -> PoolStatus {
		self.inner.pool.status()
	}
}

impl fmt::Debug for Driver {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Driver")
			.field("address", &self.inner.config.address)
			.field("registered", &self.registered())
			.field("pool", &self.pool_status())
			.finish()
	}
}

/// Creates a TCP driver for `address` (`host`, `host:port` or
/// `tether://host:port`).
pub fn driver(address: &str, user_agent: impl Into<String>, auth: AuthToken) -> Result<Driver> {
	let address: Address = address.parse()?;
	let config = DriverConfig::new(address)
		.with_user_agent(user_agent)
		.with_auth(auth);
	Ok(Driver::new(config))
}
