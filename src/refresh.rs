//! Single-flight token refresh coordination.
//!
//! [`RefreshCoordinator`] guarantees at most one in-flight refresh call per client.
//! The first caller to observe an auth failure while the state is idle becomes the
//! cycle leader and performs the network call; callers that fail while the cycle is in
//! flight join it as queued waiters and observe the leader's outcome through oneshot
//! handles, issuing no network call of their own. Settling a cycle atomically returns
//! the state to idle *before* any waiter is resolved, so a caller arriving after the
//! settle always starts a fresh cycle instead of joining a drained queue.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	classify::ErrorBody,
	client::SignOutHook,
	error::RefreshFailure,
	http::{HttpTransport, Method, RequestDescriptor},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::TokenStore,
	token::{AccessTokenCache, Credentials, TokenSecret},
};

/// Default bound on the number of waiters one refresh cycle may accumulate.
pub const DEFAULT_MAX_PENDING: usize = 256;

type Waiter = oneshot::Sender<Result<TokenSecret, RefreshFailure>>;

/// Refresh cycle state guarded by the coordinator's mutex.
enum RefreshState {
	/// No refresh in flight; the next auth failure elects a leader.
	Idle,
	/// A leader is refreshing; concurrent callers queue here in FIFO order.
	Refreshing {
		queue: Vec<Waiter>,
	},
}

/// Outcome of the atomic join-or-lead decision.
enum Ticket {
	Leader,
	Follower(oneshot::Receiver<Result<TokenSecret, RefreshFailure>>),
	Rejected(RefreshFailure),
}

/// Wire request sent to the refresh endpoint.
#[derive(Serialize)]
struct RefreshTokenRequest<'a> {
	refresh_token: &'a str,
}

/// Wire response issued by the refresh endpoint.
#[derive(Deserialize)]
struct RefreshTokenResponse {
	token: String,
	refresh_token: String,
}

/// Single-flight engine coordinating token refresh across concurrent callers.
///
/// Owned by the client instance; all clones of the client share one coordinator, so
/// the single-flight guarantee spans every request the client issues.
pub struct RefreshCoordinator<C>
where
	C: ?Sized + HttpTransport,
{
	transport: Arc<C>,
	store: Arc<dyn TokenStore>,
	sign_out: Arc<dyn SignOutHook>,
	endpoint: Url,
	cache: AccessTokenCache,
	state: Mutex<RefreshState>,
	max_pending: AtomicUsize,
	metrics: Arc<RefreshMetrics>,
}
impl<C> RefreshCoordinator<C>
where
	C: ?Sized + HttpTransport,
{
	pub(crate) fn new(
		transport: Arc<C>,
		store: Arc<dyn TokenStore>,
		sign_out: Arc<dyn SignOutHook>,
		endpoint: Url,
		cache: AccessTokenCache,
	) -> Self {
		Self {
			transport,
			store,
			sign_out,
			endpoint,
			cache,
			state: Mutex::new(RefreshState::Idle),
			max_pending: AtomicUsize::new(DEFAULT_MAX_PENDING),
			metrics: Default::default(),
		}
	}

	pub(crate) fn set_max_pending(&self, bound: usize) {
		self.max_pending.store(bound, Ordering::Relaxed);
	}

	pub(crate) fn metrics(&self) -> Arc<RefreshMetrics> {
		self.metrics.clone()
	}

	/// Recovers from an auth failure by performing or joining a single-flight refresh.
	///
	/// Resolves with the renewed access token once the cycle settles; the caller
	/// replays its own request with that token. A refresh failure has already triggered
	/// the sign-out hook (exactly once per cycle) by the time it is returned here.
	pub async fn handle_auth_failure(&self, refresh_token: &TokenSecret) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "handle_auth_failure");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				match self.join_cycle() {
					Ticket::Leader => self.lead(refresh_token).await.map_err(Error::from),
					Ticket::Follower(handle) => {
						self.metrics.record_coalesced();

						match handle.await {
							Ok(Ok(token)) => Ok(token),
							Ok(Err(failure)) => Err(failure.into()),
							Err(_) => Err(RefreshFailure::new(
								"refresh cycle was abandoned by its leader",
							)
							.into()),
						}
					},
					Ticket::Rejected(failure) => Err(failure.into()),
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Atomic check-and-set on the cycle state: the read of `RefreshState` and the
	/// enqueue decision happen under one lock, so two callers can never both observe
	/// `Idle` and both become leaders.
	fn join_cycle(&self) -> Ticket {
		let mut state = self.state.lock();

		match &mut *state {
			RefreshState::Idle => {
				*state = RefreshState::Refreshing { queue: Vec::new() };

				Ticket::Leader
			},
			RefreshState::Refreshing { queue } => {
				if queue.len() >= self.max_pending.load(Ordering::Relaxed) {
					return Ticket::Rejected(RefreshFailure::new(format!(
						"refresh queue is full ({} pending requests)",
						queue.len()
					)));
				}

				let (sender, receiver) = oneshot::channel();

				queue.push(sender);

				Ticket::Follower(receiver)
			},
		}
	}

	/// Leader path: performs the refresh call, persists the renewed credentials, then
	/// settles the cycle for every queued waiter.
	async fn lead(&self, refresh_token: &TokenSecret) -> Result<TokenSecret, RefreshFailure> {
		self.metrics.record_attempt();

		let mut cycle = CycleGuard::new(self);
		let settled = match self.execute_refresh(refresh_token).await {
			Ok(credentials) => {
				let access_token = credentials.access_token.clone();

				match self.store.save(credentials).await {
					Ok(()) => {
						self.cache.set(access_token.clone());

						Ok(access_token)
					},
					Err(e) => Err(RefreshFailure::new(format!(
						"failed to persist renewed credentials: {e}"
					))),
				}
			},
			Err(failure) => Err(failure),
		};

		match settled {
			Ok(token) => {
				self.metrics.record_success();
				cycle.settle(Ok(token.clone()));

				Ok(token)
			},
			Err(failure) => {
				self.metrics.record_failure();
				cycle.settle(Err(failure.clone()));
				self.sign_out.sign_out();

				Err(failure)
			},
		}
	}

	/// Executes the network call against the refresh endpoint and validates the renewed
	/// pair.
	async fn execute_refresh(
		&self,
		refresh_token: &TokenSecret,
	) -> Result<Credentials, RefreshFailure> {
		let body =
			serde_json::to_value(RefreshTokenRequest { refresh_token: refresh_token.expose() })
				.map_err(|e| {
					RefreshFailure::new(format!("failed to encode refresh request: {e}"))
				})?;
		let request = RequestDescriptor::new(Method::Post, self.endpoint.clone()).with_body(body);
		let response = self
			.transport
			.execute(request.encode(None))
			.await
			.map_err(|e| RefreshFailure::new(format!("refresh call failed: {e}")))?;

		if !response.is_success() {
			let message = response
				.json::<ErrorBody>()
				.ok()
				.and_then(|body| body.message)
				.unwrap_or_else(|| {
					format!("refresh endpoint returned status {}", response.status())
				});

			return Err(RefreshFailure::new(message).with_status(response.status()));
		}

		let payload = response.json::<RefreshTokenResponse>().map_err(|e| {
			RefreshFailure::new(format!("refresh endpoint returned malformed JSON: {e}"))
				.with_status(response.status())
		})?;

		Credentials::new(payload.token, payload.refresh_token).map_err(|e| {
			RefreshFailure::new(format!("refresh endpoint returned unusable credentials: {e}"))
				.with_status(response.status())
		})
	}
}
impl<C> Debug for RefreshCoordinator<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("endpoint", &self.endpoint.as_str())
			.field("max_pending", &self.max_pending.load(Ordering::Relaxed))
			.finish()
	}
}

/// Scoped settle guard for one refresh cycle.
///
/// Draining the queue swaps the state back to `Idle` in the same critical section, so
/// the queue is closed the instant settling begins. If the leader's future is dropped
/// before it settles, `Drop` performs the drain anyway and the discarded senders
/// reject every waiter; the state machine always exits `Refreshing`.
struct CycleGuard<'a, C>
where
	C: ?Sized + HttpTransport,
{
	coordinator: &'a RefreshCoordinator<C>,
	settled: bool,
}
impl<'a, C> CycleGuard<'a, C>
where
	C: ?Sized + HttpTransport,
{
	fn new(coordinator: &'a RefreshCoordinator<C>) -> Self {
		Self { coordinator, settled: false }
	}

	/// Closes the cycle and resolves the drained queue in FIFO order. Waiters that
	/// stopped listening are skipped.
	fn settle(&mut self, outcome: Result<TokenSecret, RefreshFailure>) {
		self.settled = true;

		for waiter in self.drain() {
			let _ = waiter.send(outcome.clone());
		}
	}

	fn drain(&self) -> Vec<Waiter> {
		let mut state = self.coordinator.state.lock();

		match std::mem::replace(&mut *state, RefreshState::Idle) {
			RefreshState::Refreshing { queue } => queue,
			RefreshState::Idle => Vec::new(),
		}
	}
}
impl<C> Drop for CycleGuard<'_, C>
where
	C: ?Sized + HttpTransport,
{
	fn drop(&mut self) {
		if !self.settled {
			drop(self.drain());
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicUsize;
	// crates.io
	use tokio::sync::Notify;
	// self
	use super::*;
	use crate::{
		http::testing::{ScriptedTransport, json_response},
		store::MemoryStore,
	};

	fn endpoint() -> Url {
		Url::parse("https://api.example.test/sessions/refresh-token")
			.expect("Fixture endpoint should parse successfully.")
	}

	fn seeded_store() -> Arc<MemoryStore> {
		let store = Arc::new(MemoryStore::default());

		store.seed(
			Credentials::new("access-stale", "refresh-stale")
				.expect("Credential fixture should build successfully."),
		);

		store
	}

	fn renewed_pair() -> serde_json::Value {
		serde_json::json!({ "token": "access-new", "refresh_token": "refresh-new" })
	}

	fn counting_hook() -> (Arc<AtomicUsize>, Arc<dyn SignOutHook>) {
		let count = Arc::new(AtomicUsize::new(0));
		let counter = count.clone();
		let hook: Arc<dyn SignOutHook> = Arc::new(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		(count, hook)
	}

	fn build_coordinator(
		transport: Arc<ScriptedTransport>,
		store: Arc<MemoryStore>,
		hook: Arc<dyn SignOutHook>,
	) -> Arc<RefreshCoordinator<ScriptedTransport>> {
		Arc::new(RefreshCoordinator::new(
			transport,
			store,
			hook,
			endpoint(),
			AccessTokenCache::default(),
		))
	}

	async fn wait_for_coalesced(coordinator: &RefreshCoordinator<ScriptedTransport>, n: u64) {
		while coordinator.metrics.coalesced() < n {
			tokio::task::yield_now().await;
		}
	}

	fn spawn_failure_handler(
		coordinator: &Arc<RefreshCoordinator<ScriptedTransport>>,
	) -> tokio::task::JoinHandle<Result<TokenSecret>> {
		let coordinator = coordinator.clone();

		tokio::spawn(
			async move { coordinator.handle_auth_failure(&TokenSecret::new("refresh-stale")).await },
		)
	}

	#[tokio::test]
	async fn concurrent_failures_produce_one_refresh_call() {
		let gate = Arc::new(Notify::new());
		let transport = Arc::new(
			ScriptedTransport::new([Ok(json_response(200, &renewed_pair()))]).gated(gate.clone()),
		);
		let store = seeded_store();
		let (sign_outs, hook) = counting_hook();
		let coordinator = build_coordinator(transport.clone(), store.clone(), hook);
		let first = spawn_failure_handler(&coordinator);
		let second = spawn_failure_handler(&coordinator);
		let third = spawn_failure_handler(&coordinator);

		wait_for_coalesced(&coordinator, 2).await;
		gate.notify_one();

		let (first, second, third) = tokio::join!(first, second, third);
		let tokens = [
			first.expect("Leader task should not panic."),
			second.expect("Second task should not panic."),
			third.expect("Third task should not panic."),
		];

		for token in tokens {
			assert_eq!(
				token.expect("Every caller should resolve with the renewed token.").expose(),
				"access-new"
			);
		}

		assert_eq!(transport.calls().len(), 1);
		assert_eq!(coordinator.metrics.attempts(), 1);
		assert_eq!(coordinator.metrics.successes(), 1);
		assert_eq!(coordinator.metrics.coalesced(), 2);
		assert_eq!(sign_outs.load(Ordering::SeqCst), 0);

		let rotated = store.snapshot().expect("Renewed credentials should be persisted.");

		assert_eq!(rotated.access_token.expose(), "access-new");
		assert_eq!(rotated.refresh_token.expose(), "refresh-new");
		assert_eq!(
			coordinator.cache.get().map(|token| token.expose().to_string()),
			Some("access-new".into())
		);
	}

	#[tokio::test]
	async fn failed_cycle_rejects_all_waiters_and_signs_out_once() {
		let gate = Arc::new(Notify::new());
		let transport = Arc::new(
			ScriptedTransport::new([
				Ok(json_response(401, &serde_json::json!({ "message": "session revoked" }))),
				Ok(json_response(200, &renewed_pair())),
			])
			.gated(gate.clone()),
		);
		let store = seeded_store();
		let (sign_outs, hook) = counting_hook();
		let coordinator = build_coordinator(transport.clone(), store.clone(), hook);
		let first = spawn_failure_handler(&coordinator);
		let second = spawn_failure_handler(&coordinator);
		let third = spawn_failure_handler(&coordinator);

		wait_for_coalesced(&coordinator, 2).await;
		gate.notify_one();

		let (first, second, third) = tokio::join!(first, second, third);

		for outcome in [
			first.expect("Leader task should not panic."),
			second.expect("Second task should not panic."),
			third.expect("Third task should not panic."),
		] {
			let err = outcome.expect_err("Every caller should observe the refresh failure.");

			assert!(matches!(
				err,
				Error::RefreshFailed(RefreshFailure { status: Some(401), .. })
			));
		}

		assert_eq!(sign_outs.load(Ordering::SeqCst), 1);
		assert_eq!(transport.calls().len(), 1);

		// The state machine is idle again: a new failure elects a fresh leader.
		gate.notify_one();

		let renewed = coordinator
			.handle_auth_failure(&TokenSecret::new("refresh-stale"))
			.await
			.expect("A new cycle after a failed one should succeed.");

		assert_eq!(renewed.expose(), "access-new");
		assert_eq!(coordinator.metrics.attempts(), 2);
		assert_eq!(coordinator.metrics.failures(), 1);
		assert_eq!(coordinator.metrics.successes(), 1);
		assert_eq!(sign_outs.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn full_queue_rejects_joiners_without_disturbing_the_cycle() {
		let gate = Arc::new(Notify::new());
		let transport = Arc::new(
			ScriptedTransport::new([Ok(json_response(200, &renewed_pair()))]).gated(gate.clone()),
		);
		let store = seeded_store();
		let (sign_outs, hook) = counting_hook();
		let coordinator = build_coordinator(transport.clone(), store.clone(), hook);

		coordinator.set_max_pending(1);

		let leader = spawn_failure_handler(&coordinator);
		let follower = spawn_failure_handler(&coordinator);

		wait_for_coalesced(&coordinator, 1).await;

		// The queue is at capacity, so this join is rejected immediately.
		let rejected = coordinator
			.handle_auth_failure(&TokenSecret::new("refresh-stale"))
			.await
			.expect_err("Joining a full queue should fail fast.");

		assert!(matches!(&rejected, Error::RefreshFailed(failure) if failure.reason.contains("queue is full")));

		gate.notify_one();

		let (leader, follower) = tokio::join!(leader, follower);

		leader
			.expect("Leader task should not panic.")
			.expect("Leader should still settle successfully.");
		follower
			.expect("Follower task should not panic.")
			.expect("Queued follower should still settle successfully.");

		assert_eq!(transport.calls().len(), 1);
		assert_eq!(sign_outs.load(Ordering::SeqCst), 0);
	}
}
