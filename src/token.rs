//! Credential models: redacted token secrets, the stored access/refresh pair, and the
//! shared access-token cache.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Errors produced when constructing [`Credentials`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialsError {
	/// The access token member was empty.
	#[error("Access token must not be empty.")]
	EmptyAccessToken,
	/// The refresh token member was empty.
	#[error("Refresh token must not be empty.")]
	EmptyRefreshToken,
}

/// Stored credential pair.
///
/// Both members are always populated; an absent session is represented as `None` at the
/// [`TokenStore`](crate::store::TokenStore) boundary rather than as a partially filled
/// pair. Deserialization re-validates the invariant, so a tampered snapshot cannot
/// smuggle in a half-set pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCredentials")]
pub struct Credentials {
	/// Short-lived token attached to authenticated requests.
	pub access_token: TokenSecret,
	/// Longer-lived token used to obtain a new access token without re-authentication.
	pub refresh_token: TokenSecret,
}
impl Credentials {
	/// Creates a credential pair, rejecting partially populated input.
	pub fn new(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
	) -> Result<Self, CredentialsError> {
		let access_token = access_token.into();
		let refresh_token = refresh_token.into();

		if access_token.is_empty() {
			return Err(CredentialsError::EmptyAccessToken);
		}
		if refresh_token.is_empty() {
			return Err(CredentialsError::EmptyRefreshToken);
		}

		Ok(Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
		})
	}
}
impl TryFrom<RawCredentials> for Credentials {
	type Error = CredentialsError;

	fn try_from(value: RawCredentials) -> Result<Self, Self::Error> {
		Self::new(value.access_token, value.refresh_token)
	}
}

#[derive(Deserialize)]
struct RawCredentials {
	access_token: String,
	refresh_token: String,
}

/// Shared cache of the access token attached to outgoing requests.
///
/// The middleware updates the cache on every successful session restore or refresh;
/// clones share the same slot, so the update is visible to all subsequent sends
/// immediately.
#[derive(Clone, Debug, Default)]
pub struct AccessTokenCache(Arc<RwLock<Option<TokenSecret>>>);
impl AccessTokenCache {
	/// Returns the cached token, if a session is active.
	pub fn get(&self) -> Option<TokenSecret> {
		self.0.read().clone()
	}

	/// Replaces the cached token.
	pub fn set(&self, token: TokenSecret) {
		*self.0.write() = Some(token);
	}

	/// Clears the cached token.
	pub fn clear(&self) {
		*self.0.write() = None;
	}
}
