//! tether: pooled-connection session manager for database clients
//!
//! A [`Driver`] hands out short-lived [`Session`]s backed by a bounded pool of
//! reusable connections, and tracks every connection it opens so they can be
//! torn down together with [`Driver::close`].
//!
//! # Example
//!
//! ```ignore
//! use tether::{AuthToken, Parameters};
//!
//! #[tokio::main]
//! async fn main() -> tether::Result<()> {
//!     let driver = tether::driver("localhost:7687", "my-app/1.0", AuthToken::basic("neo", "secret"))?;
//!
//!     let mut session = driver.session().await?;
//!     let metadata = session.run("RETURN 1", Parameters::new()).await?;
//!     println!("{metadata:?}");
//!     session.close();
//!
//!     driver.close().await
//! }
//! ```
//!
//! Closing a session does not talk to the backend. It queues a reset that is
//! sent ahead of the next request on the same connection, then returns the
//! connection to the pool.

pub mod config;
pub mod driver;
pub mod error;
pub mod pool;
mod registry;
pub mod session;

pub use config::{DEFAULT_USER_AGENT, DriverConfig, PoolConfig};
pub use driver::{Driver, PooledConnection, driver};
pub use error::{Error, Result};
pub use pool::{Lifecycle, Pool, PoolStatus, Releaser};
pub use session::Session;
pub use tether_protocol::{Address, AuthToken, Parameters};
pub use tether_runtime::{Connection, ConnectionId, Connector, TcpConnector};
