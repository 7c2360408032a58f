//! Generic bounded resource pool.
//!
//! The pool knows nothing about connections. It drives a [`Lifecycle`]
//! implementation through three callbacks:
//!
//! - `create` when a caller needs a resource and none is idle
//! - `validate` before an idle resource is handed out again
//! - `destroy` when a resource is stale, in excess of `max_idle`, or the
//!   pool is closed
//!
//! Capacity is a [`Semaphore`] with `max_size` permits. A permit is held for
//! as long as a resource is checked out and returned by [`Pool::release`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};

/// Callbacks the pool uses to manage its resources.
pub trait Lifecycle: Send + Sync + 'static {
	type Resource: Send + 'static;

	/// Creates a new resource. `releaser` returns it to this pool.
	fn create(&self, releaser: Releaser<Self::Resource>) -> BoxFuture<'_, Result<Self::Resource>>;

	/// Whether an idle resource may be handed out again. Must not have side effects.
	fn validate(&self, resource: &Self::Resource) -> bool;

	/// Disposes of a resource that leaves the pool for good.
	fn destroy(&self, resource: Self::Resource) -> BoxFuture<'_, ()>;
}

trait ReleaseTarget<R>: Send + Sync {
	fn release(&self, resource: R);
}

struct Detached;

impl<R> ReleaseTarget<R> for Detached {
	fn release(&self, _resource: R) {}
}

/// Returns a resource to the pool it was created by.
///
/// Holds only a weak reference: releasing after the pool is gone drops the
/// resource.
pub struct Releaser<R> {
	target: Weak<dyn ReleaseTarget<R>>,
}

impl<R> Clone for Releaser<R> {
	fn clone(&self) -> Self {
		Self {
			target: Weak::clone(&self.target),
		}
	}
}

impl<R: 'static> Releaser<R> {
	/// A releaser bound to no pool.
	pub fn detached() -> Self {
		let target: Weak<dyn ReleaseTarget<R>> = Weak::<Detached>::new();
		Self { target }
	}

	pub fn release(&self, resource: R) {
		match self.target.upgrade() {
			Some(target) => target.release(resource),
			None => drop(resource),
		}
	}
}

impl<R> fmt::Debug for Releaser<R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Releaser")
			.field("attached", &(self.target.strong_count() > 0))
			.finish()
	}
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
	pub max_size: usize,
	pub idle: usize,
	pub in_use: usize,
	pub closed: bool,
}

struct Shared<L: Lifecycle> {
	lifecycle: L,
	config: PoolConfig,
	/// Idle resources, most recently released last
	idle: Mutex<Vec<L::Resource>>,
	permits: Semaphore,
	in_use: AtomicUsize,
	closed: AtomicBool,
	self_ref: Weak<Shared<L>>,
}

/// Bounded pool of resources produced by a [`Lifecycle`].
pub struct Pool<L: Lifecycle> {
	shared: Arc<Shared<L>>,
}

impl<L: Lifecycle> Pool<L> {
	pub fn new(lifecycle: L, config: PoolConfig) -> Self {
		let max_size = config.max_size.max(1);
		let shared = Arc::new_cyclic(|self_ref| Shared {
			lifecycle,
			config: PoolConfig { max_size, ..config },
			idle: Mutex::new(Vec::new()),
			permits: Semaphore::new(max_size),
			in_use: AtomicUsize::new(0),
			closed: AtomicBool::new(false),
			self_ref: Weak::clone(self_ref),
		});
		Self { shared }
	}

	pub fn lifecycle(&self) -> &L {
		&self.shared.lifecycle
	}

	/// Checks out a resource, waiting for capacity if the pool is full.
	///
	/// Idle resources are reused most-recent first; any that fail validation
	/// are destroyed. When none is left a new one is created.
	pub async fn acquire(&self) -> Result<L::Resource> {
		let shared = &self.shared;
		if shared.closed.load(Ordering::Acquire) {
			return Err(Error::PoolClosed);
		}

		let permit = match shared.config.acquire_timeout {
			Some(limit) => tokio::time::timeout(limit, shared.permits.acquire())
				.await
				.map_err(|_| Error::AcquireTimeout(limit))?,
			None => shared.permits.acquire().await,
		}
		.map_err(|_| Error::PoolClosed)?;

		// No await between popping and handing off, so a cancelled acquire
		// cannot drop a popped resource without destroying it.
		loop {
			let candidate = shared.idle.lock().pop();
			let Some(resource) = candidate else { break };
			if shared.lifecycle.validate(&resource) {
				permit.forget();
				shared.in_use.fetch_add(1, Ordering::AcqRel);
				return Ok(resource);
			}
			debug!("discarding stale idle resource");
			shared.destroy_later(resource);
		}

		let releaser = Releaser {
			target: Weak::clone(&shared.self_ref) as Weak<dyn ReleaseTarget<L::Resource>>,
		};
		let resource = shared.lifecycle.create(releaser).await?;

		if shared.closed.load(Ordering::Acquire) {
			shared.destroy_later(resource);
			return Err(Error::PoolClosed);
		}
		permit.forget();
		shared.in_use.fetch_add(1, Ordering::AcqRel);
		Ok(resource)
	}

	/// Returns a checked-out resource. Never blocks.
	pub fn release(&self, resource: L::Resource) {
		self.shared.release(resource);
	}

	/// Stops handing out resources and destroys the idle ones.
	///
	/// Checked-out resources are destroyed when they are released.
	pub async fn close(&self) {
		let shared = &self.shared;
		if shared.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		shared.permits.close();

		let idle = std::mem::take(&mut *shared.idle.lock());
		debug!(idle = idle.len(), "closing pool");
		for resource in idle {
			shared.lifecycle.destroy(resource).await;
		}
	}

	pub fn status(&self) -> PoolStatus {
		let shared = &self.shared;
		PoolStatus {
			max_size: shared.config.max_size,
			idle: shared.idle.lock().len(),
			in_use: shared.in_use.load(Ordering::Acquire),
			closed: shared.closed.load(Ordering::Acquire),
		}
	}
}

impl<L: Lifecycle> Shared<L> {
	fn release(&self, resource: L::Resource) {
		let previously_in_use = self.in_use.fetch_sub(1, Ordering::AcqRel);
		debug_assert!(previously_in_use > 0, "release without matching acquire");

		let valid = self.lifecycle.validate(&resource);
		let rejected = {
			// `closed` is read under the idle lock so a concurrent `close`
			// either sees this push in its drain or we see it closed.
			let mut idle = self.idle.lock();
			if valid && !self.closed.load(Ordering::Acquire) && idle.len() < self.config.max_idle {
				idle.push(resource);
				None
			} else {
				Some(resource)
			}
		};

		if let Some(resource) = rejected {
			self.destroy_later(resource);
		}
		self.permits.add_permits(1);
	}

	fn destroy_later(&self, resource: L::Resource) {
		let Some(shared) = self.self_ref.upgrade() else {
			return;
		};
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				handle.spawn(async move {
					shared.lifecycle.destroy(resource).await;
				});
			}
			Err(_) => warn!("no async runtime; dropping released resource without destroy"),
		}
	}
}

impl<L: Lifecycle> ReleaseTarget<L::Resource> for Shared<L> {
	fn release(&self, resource: L::Resource) {
		Shared::release(self, resource);
	}
}

impl<L: Lifecycle> fmt::Debug for Pool<L> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Pool").field("status", &self.status()).finish()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	/// Hands out numbered tokens and records what happened to them.
	#[derive(Default)]
	struct Counter {
		next: AtomicUsize,
		fail_create: AtomicBool,
		hang_create: AtomicBool,
		stale: Mutex<Vec<usize>>,
		destroyed: Mutex<Vec<usize>>,
	}

	#[derive(Debug)]
	struct Token {
		n: usize,
		releaser: Releaser<Token>,
	}

	impl Token {
		fn give_back(self) {
			let releaser = self.releaser.clone();
			releaser.release(self);
		}
	}

	impl Lifecycle for Arc<Counter> {
		type Resource = Token;

		fn create(&self, releaser: Releaser<Token>) -> BoxFuture<'_, Result<Token>> {
			Box::pin(async move {
				if self.fail_create.load(Ordering::SeqCst) {
					return Err(tether_runtime::Error::ConnectionFailed {
						address: "test".to_string(),
						reason: "refused".to_string(),
					}
					.into());
				}
				if self.hang_create.load(Ordering::SeqCst) {
					std::future::pending::<()>().await;
				}
				let n = self.next.fetch_add(1, Ordering::SeqCst);
				Ok(Token { n, releaser })
			})
		}

		fn validate(&self, resource: &Token) -> bool {
			!self.stale.lock().contains(&resource.n)
		}

		fn destroy(&self, resource: Token) -> BoxFuture<'_, ()> {
			Box::pin(async move {
				self.destroyed.lock().push(resource.n);
			})
		}
	}

	fn pool(config: PoolConfig) -> (Pool<Arc<Counter>>, Arc<Counter>) {
		let counter = Arc::new(Counter::default());
		(Pool::new(Arc::clone(&counter), config), counter)
	}

	#[tokio::test]
	async fn test_released_resource_is_reused() {
		let (pool, _) = pool(PoolConfig::default());

		let first = pool.acquire().await.unwrap();
		assert_eq!(first.n, 0);
		first.give_back();

		let again = pool.acquire().await.unwrap();
		assert_eq!(again.n, 0);
		assert_eq!(pool.status().in_use, 1);
	}

	#[tokio::test]
	async fn test_concurrent_checkouts_are_distinct() {
		let (pool, _) = pool(PoolConfig::default());

		let a = pool.acquire().await.unwrap();
		let b = pool.acquire().await.unwrap();
		let c = pool.acquire().await.unwrap();
		let mut ns = vec![a.n, b.n, c.n];
		ns.sort_unstable();
		ns.dedup();
		assert_eq!(ns.len(), 3);
		assert_eq!(pool.status().in_use, 3);
	}

	#[tokio::test]
	async fn test_stale_idle_resource_is_destroyed_and_replaced() {
		let (pool, counter) = pool(PoolConfig::default());

		pool.acquire().await.unwrap().give_back();
		counter.stale.lock().push(0);

		let fresh = pool.acquire().await.unwrap();
		assert_eq!(fresh.n, 1);
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(*counter.destroyed.lock(), vec![0]);
	}

	#[tokio::test]
	async fn test_cancelled_acquire_still_destroys_stale_resource() {
		let (pool, counter) = pool(PoolConfig::default());

		pool.acquire().await.unwrap().give_back();
		counter.stale.lock().push(0);
		counter.hang_create.store(true, Ordering::SeqCst);

		let result = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
		assert!(result.is_err(), "acquire should hang in create");

		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(*counter.destroyed.lock(), vec![0]);
		assert_eq!(pool.status().idle, 0);
		assert_eq!(pool.status().in_use, 0);
	}

	#[tokio::test]
	async fn test_release_beyond_max_idle_destroys() {
		let (pool, counter) = pool(PoolConfig::default().with_max_idle(1));

		let a = pool.acquire().await.unwrap();
		let b = pool.acquire().await.unwrap();
		a.give_back();
		b.give_back();

		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(pool.status().idle, 1);
		assert_eq!(*counter.destroyed.lock(), vec![1]);
	}

	#[tokio::test]
	async fn test_acquire_waits_for_capacity() {
		let (pool, _) = pool(PoolConfig::default().with_max_size(1));
		let pool = Arc::new(pool);

		let held = pool.acquire().await.unwrap();
		let waiter = {
			let pool = Arc::clone(&pool);
			tokio::spawn(async move { pool.acquire().await.map(|t| t.n) })
		};

		tokio::time::sleep(Duration::from_millis(10)).await;
		assert!(!waiter.is_finished());

		held.give_back();
		assert_eq!(waiter.await.unwrap().unwrap(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_acquire_times_out_when_full() {
		let config = PoolConfig::default()
			.with_max_size(1)
			.with_acquire_timeout(Some(Duration::from_millis(50)));
		let (pool, _) = pool(config);

		let _held = pool.acquire().await.unwrap();
		let err = pool.acquire().await.unwrap_err();
		assert!(matches!(err, Error::AcquireTimeout(_)), "got {err:?}");
	}

	#[tokio::test]
	async fn test_failed_create_returns_capacity() {
		let (pool, counter) = pool(PoolConfig::default().with_max_size(1));

		counter.fail_create.store(true, Ordering::SeqCst);
		assert!(pool.acquire().await.is_err());

		counter.fail_create.store(false, Ordering::SeqCst);
		let token = pool.acquire().await.unwrap();
		assert_eq!(token.n, 0);
	}

	#[tokio::test]
	async fn test_close_destroys_idle_and_rejects_acquire() {
		let (pool, counter) = pool(PoolConfig::default());

		let held = pool.acquire().await.unwrap();
		pool.acquire().await.unwrap().give_back();

		pool.close().await;
		assert_eq!(*counter.destroyed.lock(), vec![1]);
		assert!(matches!(pool.acquire().await, Err(Error::PoolClosed)));

		// Checked-out resources are destroyed once they come back.
		held.give_back();
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(*counter.destroyed.lock(), vec![1, 0]);
		assert!(pool.status().closed);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_release_racing_close_is_destroyed() {
		let (pool, counter) = pool(PoolConfig::default());
		let token = pool.acquire().await.unwrap();

		// Hold the idle lock so the release is parked on it, then flip
		// `closed` as `close` does before draining.
		let idle = pool.shared.idle.lock();
		let releasing = tokio::task::spawn_blocking(move || token.give_back());
		std::thread::sleep(Duration::from_millis(20));
		pool.shared.closed.store(true, Ordering::Release);
		drop(idle);

		releasing.await.unwrap();
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(pool.status().idle, 0);
		assert_eq!(*counter.destroyed.lock(), vec![0]);
	}

	#[tokio::test]
	async fn test_close_wakes_waiters() {
		let (pool, _) = pool(PoolConfig::default().with_max_size(1).with_acquire_timeout(None));
		let pool = Arc::new(pool);

		let _held = pool.acquire().await.unwrap();
		let waiter = {
			let pool = Arc::clone(&pool);
			tokio::spawn(async move { pool.acquire().await.map(|t| t.n) })
		};
		tokio::time::sleep(Duration::from_millis(10)).await;

		pool.close().await;
		assert!(matches!(waiter.await.unwrap(), Err(Error::PoolClosed)));
	}

	#[test]
	fn test_detached_releaser_drops_resource() {
		let releaser: Releaser<Token> = Releaser::detached();
		releaser.release(Token {
			n: 9,
			releaser: releaser.clone(),
		});
	}
}
