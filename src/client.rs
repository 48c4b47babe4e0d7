//! The authentication-aware client: bearer attachment, failure classification,
//! refresh delegation, and request replay.

// self
use crate::{
	_prelude::*,
	classify::{self, Failure, FailureKind},
	http::{HttpTransport, RequestDescriptor, Response},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{RefreshCoordinator, RefreshMetrics},
	store::TokenStore,
	token::{AccessTokenCache, Credentials, TokenSecret},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Callback invoked when the session cannot be recovered.
///
/// Implementations must be idempotent: the middleware invokes the hook at most once per
/// refresh cycle, but application-level logout may invoke it again. Typical hooks clear
/// UI session state and call [`AuthClient::clear_credentials`].
pub trait SignOutHook
where
	Self: Send + Sync,
{
	/// Clears session state and credentials.
	fn sign_out(&self);
}
impl<F> SignOutHook for F
where
	F: Fn() + Send + Sync,
{
	fn sign_out(&self) {
		self()
	}
}

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestAuthClient = AuthClient<ReqwestTransport>;

/// Authentication-aware HTTP client wrapping an arbitrary transport.
///
/// Every outgoing request carries the cached bearer token. Failures are classified;
/// expired or invalid tokens are recovered through the shared [`RefreshCoordinator`]
/// (one refresh call per cycle, however many requests fail concurrently) and the
/// original request is replayed with the renewed token. Clones share the token cache
/// and refresh state.
pub struct AuthClient<C>
where
	C: ?Sized + HttpTransport,
{
	transport: Arc<C>,
	store: Arc<dyn TokenStore>,
	sign_out: Arc<dyn SignOutHook>,
	cache: AccessTokenCache,
	coordinator: Arc<RefreshCoordinator<C>>,
}
impl<C> AuthClient<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	///
	/// `refresh_endpoint` is the absolute URL of the token-refresh endpoint; `sign_out`
	/// is invoked when the session terminates (unrecoverable failure or failed
	/// refresh).
	pub fn with_transport(
		store: Arc<dyn TokenStore>,
		refresh_endpoint: Url,
		sign_out: Arc<dyn SignOutHook>,
		transport: impl Into<Arc<C>>,
	) -> Self {
		let transport = transport.into();
		let cache = AccessTokenCache::default();
		let coordinator = Arc::new(RefreshCoordinator::new(
			transport.clone(),
			store.clone(),
			sign_out.clone(),
			refresh_endpoint,
			cache.clone(),
		));

		Self { transport, store, sign_out, cache, coordinator }
	}

	/// Overrides the bound on queued waiters per refresh cycle (defaults to
	/// [`DEFAULT_MAX_PENDING`](crate::refresh::DEFAULT_MAX_PENDING)).
	pub fn with_max_pending(self, bound: usize) -> Self {
		self.coordinator.set_max_pending(bound);

		self
	}

	/// Sends a request, transparently recovering expired sessions.
	///
	/// Auth failures are recovered via single-flight refresh and replay; business
	/// errors surface with their message; network failures and unrecognized statuses
	/// propagate unchanged.
	pub async fn send(&self, request: RequestDescriptor) -> Result<Response> {
		const KIND: FlowKind = FlowKind::Send;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.send_inner(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Loads stored credentials and primes the cached access token.
	///
	/// Returns whether a stored session was present.
	pub async fn restore_session(&self) -> Result<bool> {
		match self.store.load().await? {
			Some(credentials) => {
				self.cache.set(credentials.access_token);

				Ok(true)
			},
			None => {
				self.cache.clear();

				Ok(false)
			},
		}
	}

	/// Persists a freshly issued credential pair (e.g., after sign-in) and primes the
	/// cache, so subsequent requests carry the new token immediately.
	pub async fn store_credentials(&self, credentials: Credentials) -> Result<()> {
		let access_token = credentials.access_token.clone();

		self.store.save(credentials).await?;
		self.cache.set(access_token);

		Ok(())
	}

	/// Clears stored credentials and the cached token. Idempotent; safe to call from a
	/// [`SignOutHook`].
	pub async fn clear_credentials(&self) -> Result<()> {
		self.cache.clear();
		self.store.clear().await?;

		Ok(())
	}

	/// Currently cached access token, if a session is active.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.cache.get()
	}

	/// Read-only refresh counters for this client's coordinator.
	pub fn refresh_metrics(&self) -> Arc<RefreshMetrics> {
		self.coordinator.metrics()
	}

	async fn send_inner(&self, request: RequestDescriptor) -> Result<Response> {
		let bearer = self.cache.get();
		let attempt = self
			.transport
			.execute(request.encode(bearer.as_ref().map(TokenSecret::expose)))
			.await;
		let failure = match attempt {
			Ok(response) if response.is_success() => return Ok(response),
			Ok(response) => Failure::Response(response),
			Err(source) => Failure::Transport(source),
		};

		match classify::classify(&failure) {
			FailureKind::AuthExpired | FailureKind::AuthInvalid => self.recover(&request).await,
			FailureKind::AuthOther { message } => {
				self.sign_out.sign_out();

				match message {
					Some(message) => Err(Error::Business { message }),
					None => Err(failure.into_error()),
				}
			},
			FailureKind::Business { message } => Err(Error::Business { message }),
			FailureKind::Network | FailureKind::Unknown => Err(failure.into_error()),
		}
	}

	/// Recovers an auth failure: loads the refresh token, performs or joins the
	/// single-flight refresh, then replays the original request with the renewed token.
	async fn recover(&self, request: &RequestDescriptor) -> Result<Response> {
		let Some(credentials) = self.store.load().await? else {
			self.sign_out.sign_out();

			return Err(Error::Unrecoverable);
		};
		let token = self.coordinator.handle_auth_failure(&credentials.refresh_token).await?;

		self.replay(request, &token).await
	}

	/// Replays a request with the renewed token. An auth failure on replay is not
	/// refreshed again; it terminates the session instead of recursing.
	async fn replay(&self, request: &RequestDescriptor, token: &TokenSecret) -> Result<Response> {
		const KIND: FlowKind = FlowKind::Replay;

		let span = FlowSpan::new(KIND, "replay");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.replay_inner(request, token)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn replay_inner(
		&self,
		request: &RequestDescriptor,
		token: &TokenSecret,
	) -> Result<Response> {
		let attempt = self.transport.execute(request.encode(Some(token.expose()))).await;
		let failure = match attempt {
			Ok(response) if response.is_success() => return Ok(response),
			Ok(response) => Failure::Response(response),
			Err(source) => Failure::Transport(source),
		};

		match classify::classify(&failure) {
			FailureKind::AuthExpired => {
				self.sign_out.sign_out();

				Err(Error::AuthExpired)
			},
			FailureKind::AuthInvalid => {
				self.sign_out.sign_out();

				Err(Error::AuthInvalid)
			},
			FailureKind::AuthOther { message } => {
				self.sign_out.sign_out();

				match message {
					Some(message) => Err(Error::Business { message }),
					None => Err(failure.into_error()),
				}
			},
			FailureKind::Business { message } => Err(Error::Business { message }),
			FailureKind::Network | FailureKind::Unknown => Err(failure.into_error()),
		}
	}
}
#[cfg(feature = "reqwest")]
impl AuthClient<ReqwestTransport> {
	/// Creates a client with the crate's default reqwest transport.
	pub fn new(
		store: Arc<dyn TokenStore>,
		refresh_endpoint: Url,
		sign_out: Arc<dyn SignOutHook>,
	) -> Self {
		Self::with_transport(store, refresh_endpoint, sign_out, ReqwestTransport::default())
	}
}
impl<C> Clone for AuthClient<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			sign_out: self.sign_out.clone(),
			cache: self.cache.clone(),
			coordinator: self.coordinator.clone(),
		}
	}
}
impl<C> Debug for AuthClient<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthClient")
			.field("coordinator", &self.coordinator)
			.field("session_active", &self.cache.get().is_some())
			.finish()
	}
}
