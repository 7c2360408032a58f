//! Tracking of every live connection a driver owns.
//!
//! The id counter and the id-to-connection map share one lock. The critical
//! sections are short and never await, so a blocking [`parking_lot::Mutex`]
//! is used; all transport I/O happens after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tether_runtime::{Connection, ConnectionId};

use crate::error::{Error, Result};

struct State {
	next_id: u64,
	open: HashMap<ConnectionId, Arc<Connection>>,
	closed: bool,
}

/// Id allocator and map of open connections.
pub(crate) struct Registry {
	state: Mutex<State>,
}

impl Registry {
	pub(crate) fn new() -> Self {
		Self {
			state: Mutex::new(State {
				next_id: 1,
				open: HashMap::new(),
				closed: false,
			}),
		}
	}

	/// Returns the next id. Ids are strictly increasing and never reused.
	pub(crate) fn allocate_id(&self) -> ConnectionId {
		let mut state = self.state.lock();
		let id = ConnectionId(state.next_id);
		state.next_id += 1;
		id
	}

	/// Tracks `connection` under `id`.
	///
	/// Fails with [`Error::DriverClosed`] once [`Registry::close`] has run; the
	/// caller still owns the connection and must close it.
	pub(crate) fn register(&self, id: ConnectionId, connection: Arc<Connection>) -> Result<()> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(Error::DriverClosed);
		}
		state.open.insert(id, connection);
		Ok(())
	}

	/// Stops tracking `id`. Unknown ids are ignored.
	pub(crate) fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
		self.state.lock().open.remove(&id)
	}

	#[cfg(test)]
	pub(crate) fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
		self.state.lock().open.get(&id).cloned()
	}

	pub(crate) fn len(&self) -> usize {
		self.state.lock().open.len()
	}

	/// Tracked ids in ascending order.
	pub(crate) fn ids(&self) -> Vec<ConnectionId> {
		let mut ids: Vec<_> = self.state.lock().open.keys().copied().collect();
		ids.sort_unstable();
		ids
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	/// Refuses further registrations and hands back every tracked connection,
	/// ordered by id.
	///
	/// The returned snapshot is authoritative: nothing can be registered after
	/// this call.
	pub(crate) fn close(&self) -> Vec<(ConnectionId, Arc<Connection>)> {
		let mut state = self.state.lock();
		state.closed = true;
		let mut snapshot: Vec<_> = state.open.drain().collect();
		snapshot.sort_unstable_by_key(|(id, _)| *id);
		snapshot
	}
}

#[cfg(test)]
mod tests {
	use tether_runtime::testing::MockBackend;

	use super::*;

	#[test]
	fn ids_are_strictly_increasing() {
		let registry = Registry::new();
		let ids: Vec<_> = (0..5).map(|_| registry.allocate_id()).collect();
		assert_eq!(ids.first(), Some(&ConnectionId(1)));
		assert!(ids.windows(2).all(|w| w[0] < w[1]));
	}

	#[tokio::test]
	async fn ids_are_not_reused_after_removal() {
		let backend = MockBackend::new();
		let registry = Registry::new();

		let id = registry.allocate_id();
		registry.register(id, Arc::new(backend.open())).unwrap();
		registry.remove(id);

		let next = registry.allocate_id();
		assert!(next > id);
		assert_eq!(registry.len(), 0);
	}

	#[tokio::test]
	async fn removing_unknown_id_is_a_noop() {
		let backend = MockBackend::new();
		let registry = Registry::new();

		let id = registry.allocate_id();
		registry.register(id, Arc::new(backend.open())).unwrap();

		assert!(registry.remove(ConnectionId(999)).is_none());
		assert!(registry.remove(id).is_some());
		assert!(registry.remove(id).is_none());
		assert_eq!(registry.len(), 0);
	}

	#[tokio::test]
	async fn close_drains_and_refuses_new_entries() {
		let backend = MockBackend::new();
		let registry = Registry::new();

		for _ in 0..3 {
			let id = registry.allocate_id();
			registry.register(id, Arc::new(backend.open())).unwrap();
		}

		let snapshot = registry.close();
		let ids: Vec<_> = snapshot.iter().map(|(id, _)| id.0).collect();
		assert_eq!(ids, vec![1, 2, 3]);
		assert_eq!(registry.len(), 0);
		assert!(registry.is_closed());

		let late = registry.allocate_id();
		let result = registry.register(late, Arc::new(backend.open()));
		assert!(matches!(result, Err(Error::DriverClosed)));
		assert!(registry.ids().is_empty());
	}
}
