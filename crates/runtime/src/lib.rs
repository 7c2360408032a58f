//! tether runtime - transport and connection layer
//!
//! This crate provides the low-level plumbing between the client and a
//! database backend:
//!
//! - **Transport**: length-prefixed JSON frames over any async byte stream
//! - **Connection**: one live channel with request/response exchange,
//!   deferred reset and idempotent close
//! - **Connector**: opens connections to an [`Address`](tether_protocol::Address)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  tether      │  Driver, Pool, Session
//! └──────┬───────┘
//!        │ Connector::connect
//! ┌──────▼───────┐
//! │ tether-rt    │  This crate
//! │  ┌────────┐  │
//! │  │ Conn   │  │  request/response, pending reset
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  frame codec
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod connection;
pub mod connector;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use connection::{Connection, ConnectionId};
pub use connector::{Connector, TcpConnector};
pub use error::{Error, Result};
pub use transport::{FrameReader, FrameWriter, MAX_FRAME_LEN};
