//! Storage contracts and built-in credential store implementations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, token::Credentials};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable storage contract for the session's credential pair.
///
/// An absent session is `None`; implementations never surface a partially populated
/// pair (see [`Credentials`]). Stores must survive process restarts when the host
/// application needs sessions to: [`FileStore`] does, [`MemoryStore`] is for tests
/// and demos.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Loads the stored credential pair, if present.
	fn load(&self) -> StoreFuture<'_, Option<Credentials>>;

	/// Persists or replaces the credential pair.
	fn save(&self, credentials: Credentials) -> StoreFuture<'_, ()>;

	/// Removes any stored credentials. Idempotent.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
