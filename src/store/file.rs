//! Simple file-backed [`TokenStore`] that survives process restarts.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{StoreError, StoreFuture, TokenStore},
	token::Credentials,
};

/// Persists the credential pair to a JSON file after each mutation.
///
/// Writes go through a temporary sibling file followed by a rename, so a crash
/// mid-write never leaves a corrupt snapshot behind. Clearing removes the file.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Option<Credentials>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<Option<Credentials>, StoreError> {
		if !path.exists() {
			return Ok(None);
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(None);
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let credentials: Credentials =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(Some(credentials))
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}
		Ok(())
	}

	fn persist_locked(&self, contents: &Option<Credentials>) -> Result<(), StoreError> {
		let Some(credentials) = contents else {
			return match fs::remove_file(&self.path) {
				Ok(()) => Ok(()),
				Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
				Err(e) => Err(StoreError::Backend {
					message: format!("Failed to remove {}: {e}", self.path.display()),
				}),
			};
		};

		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(credentials).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl TokenStore for FileStore {
	fn load(&self) -> StoreFuture<'_, Option<Credentials>> {
		Box::pin(async move { Ok(self.inner.read().clone()) })
	}

	fn save(&self, credentials: Credentials) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			*guard = Some(credentials);
			self.persist_locked(&guard)?;

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			*guard = None;
			self.persist_locked(&guard)?;

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use time::OffsetDateTime;
	use tokio::runtime::Runtime;
	// self
	use super::*;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"auth_relay_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn build_credentials() -> Credentials {
		Credentials::new("access-file", "refresh-file")
			.expect("Credential fixture should build successfully.")
	}

	#[test]
	fn save_and_reload_round_trip() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(build_credentials()))
			.expect("Failed to save fixture credentials to file store.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let loaded = rt
			.block_on(reopened.load())
			.expect("Failed to load fixture credentials from file store.")
			.expect("File store lost credentials after reopen.");

		assert_eq!(loaded.access_token.expose(), "access-file");
		assert_eq!(loaded.refresh_token.expose(), "refresh-file");

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn clear_removes_snapshot_durably() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(build_credentials()))
			.expect("Failed to save fixture credentials to file store.");
		rt.block_on(store.clear()).expect("Failed to clear file store.");
		rt.block_on(store.clear()).expect("Clearing an already-empty file store should succeed.");

		assert!(!path.exists());

		let reopened = FileStore::open(&path).expect("Failed to reopen cleared file store.");

		assert!(
			rt.block_on(reopened.load())
				.expect("Loading a cleared file store should succeed.")
				.is_none()
		);
	}

	#[test]
	fn partial_snapshot_is_rejected_on_open() {
		let path = temp_path();

		fs::write(&path, "{\"access_token\":\"only-half\"}")
			.expect("Failed to write tampered snapshot fixture.");

		let err = FileStore::open(&path)
			.expect_err("Opening a partially populated snapshot should fail.");

		assert!(matches!(err, StoreError::Serialization { .. }));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove tampered snapshot fixture {}: {e}", path.display())
		});
	}
}
