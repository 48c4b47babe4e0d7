//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{StoreFuture, TokenStore},
	token::Credentials,
};

type Slot = Arc<RwLock<Option<Credentials>>>;

/// Thread-safe backend that keeps the credential pair in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl MemoryStore {
	/// Seeds the store synchronously; fixture convenience for tests and demos.
	pub fn seed(&self, credentials: Credentials) {
		*self.0.write() = Some(credentials);
	}

	/// Returns a snapshot of the stored pair.
	pub fn snapshot(&self) -> Option<Credentials> {
		self.0.read().clone()
	}
}
impl TokenStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<Credentials>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn save(&self, credentials: Credentials) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = Some(credentials);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = None;

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn build_credentials() -> Credentials {
		Credentials::new("access-1", "refresh-1")
			.expect("Credential fixture should build successfully.")
	}

	#[tokio::test]
	async fn save_and_load_round_trip() {
		let store = MemoryStore::default();

		assert!(
			store
				.load()
				.await
				.expect("Loading from an empty memory store should succeed.")
				.is_none()
		);

		store
			.save(build_credentials())
			.await
			.expect("Saving credentials into memory store should succeed.");

		let loaded = store
			.load()
			.await
			.expect("Loading stored credentials should succeed.")
			.expect("Stored credentials should remain present.");

		assert_eq!(loaded.access_token.expose(), "access-1");
		assert_eq!(loaded.refresh_token.expose(), "refresh-1");
	}

	#[tokio::test]
	async fn clear_is_idempotent() {
		let store = MemoryStore::default();

		store.seed(build_credentials());
		store.clear().await.expect("Clearing a populated store should succeed.");
		store.clear().await.expect("Clearing an already-empty store should succeed.");

		assert!(store.snapshot().is_none());
	}
}
