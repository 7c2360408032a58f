//! Wire types for the tether database client.
//!
//! Every frame exchanged with a backend carries one of the messages defined
//! here, serialised as JSON:
//!
//! - [`Request`] - messages from client to backend
//! - [`Response`] - replies from backend to client
//! - [`AuthToken`] - credentials presented during the `hello` handshake
//! - [`Address`] - backend host and port

pub mod address;
pub mod auth;
pub mod message;

pub use address::{Address, AddressError, DEFAULT_PORT};
pub use auth::AuthToken;
pub use message::{Parameters, Request, Response};
