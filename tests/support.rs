#![cfg(feature = "reqwest")]

//! Shared fixtures for the middleware integration tests.

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use url::Url;
// self
use auth_relay::{
	client::{AuthClient, SignOutHook},
	http::ReqwestTransport,
	reqwest::Client as ReqwestClient,
	store::{MemoryStore, TokenStore},
	token::Credentials,
};

/// Client type used by the reqwest-backed integration tests.
pub type ReqwestTestClient = AuthClient<ReqwestTransport>;

/// Sign-out hook that counts its invocations so tests can assert "exactly once".
#[derive(Debug, Default)]
pub struct SignOutProbe(AtomicUsize);
impl SignOutProbe {
	/// Returns the number of times the hook has fired.
	pub fn invocations(&self) -> usize {
		self.0.load(Ordering::SeqCst)
	}
}
impl SignOutHook for SignOutProbe {
	fn sign_out(&self) {
		self.0.fetch_add(1, Ordering::SeqCst);
	}
}

/// Builds a reqwest transport that accepts the self-signed certificates produced by
/// `httpmock` during tests.
pub fn test_reqwest_transport() -> ReqwestTransport {
	let client = ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestTransport::with_client(client)
}

/// Constructs an [`AuthClient`] backed by an in-memory store, a sign-out probe, and the
/// reqwest transport used across integration tests.
pub fn build_reqwest_test_client(
	refresh_endpoint: Url,
	credentials: Option<Credentials>,
) -> (ReqwestTestClient, Arc<MemoryStore>, Arc<SignOutProbe>) {
	let store_backend = Arc::new(MemoryStore::default());

	if let Some(credentials) = credentials {
		store_backend.seed(credentials);
	}

	let probe = Arc::new(SignOutProbe::default());
	let store: Arc<dyn TokenStore> = store_backend.clone();
	let hook: Arc<dyn SignOutHook> = probe.clone();
	let client =
		AuthClient::with_transport(store, refresh_endpoint, hook, test_reqwest_transport());

	(client, store_backend, probe)
}
