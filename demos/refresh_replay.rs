//! Demonstrates transparent session recovery: a request fails with an expired token,
//! the client refreshes once, and the original request is replayed with the renewed
//! credential.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use auth_relay::{
	client::{AuthClient, SignOutHook},
	http::RequestDescriptor,
	store::{MemoryStore, TokenStore},
	token::Credentials,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let _stale_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/exercises").header("authorization", "Bearer demo-stale");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"message\":\"token.expired\"}");
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/sessions/refresh-token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"token\":\"demo-renewed\",\"refresh_token\":\"demo-refresh-2\"}");
		})
		.await;
	let _renewed_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/exercises").header("authorization", "Bearer demo-renewed");
			then.status(200).header("content-type", "application/json").body("{\"data\":[]}");
		})
		.await;
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let sign_out: Arc<dyn SignOutHook> = Arc::new(|| println!("Session terminated; signing out."));
	let client = AuthClient::new(
		store,
		Url::parse(&server.url("/sessions/refresh-token"))?,
		sign_out,
	);

	client.store_credentials(Credentials::new("demo-stale", "demo-refresh-1")?).await?;

	let response = client
		.send(RequestDescriptor::get(Url::parse(&server.url("/exercises"))?))
		.await?;

	println!("Replayed request completed with status {}.", response.status());
	println!(
		"Refresh cycles led: {}; coalesced joins: {}.",
		client.refresh_metrics().attempts(),
		client.refresh_metrics().coalesced()
	);

	refresh_mock.assert_async().await;

	Ok(())
}
