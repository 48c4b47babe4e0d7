//! Middleware-level error types shared across the client, coordinator, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical middleware error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Transport failure; no response was received.
	#[error(transparent)]
	Network(#[from] TransportError),
	/// Token refresh settled unsuccessfully, or the refresh cycle could not be joined.
	#[error("Token refresh failed: {0}")]
	RefreshFailed(#[from] RefreshFailure),

	/// Replayed request was rejected again with an expired access token.
	#[error("Access token expired again after a successful refresh.")]
	AuthExpired,
	/// Replayed request was rejected again as carrying an invalid access token.
	#[error("Access token was rejected as invalid after a successful refresh.")]
	AuthInvalid,
	/// Backend rejected the request with a structured application message.
	#[error("{message}")]
	Business {
		/// Message carried by the backend's error envelope.
		message: String,
	},
	/// No refresh token is available, so the session cannot be recovered.
	#[error("No refresh token is available; the session cannot be recovered.")]
	Unrecoverable,
	/// Response carried a failure status with no recognizable structure.
	#[error("Server returned an unexpected {status} response.")]
	Unexpected {
		/// HTTP status code of the failed response.
		status: u16,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while executing the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while executing the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Cloneable summary of a failed refresh cycle.
///
/// One refresh failure may reject many queued callers, so the summary carries an owned
/// reason string instead of an error source.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{reason}.")]
pub struct RefreshFailure {
	/// Human-readable description of why the refresh cycle failed.
	pub reason: String,
	/// HTTP status returned by the refresh endpoint, when a response was received.
	pub status: Option<u16>,
}
impl RefreshFailure {
	/// Builds a failure summary with no associated HTTP status.
	pub fn new(reason: impl Into<String>) -> Self {
		Self { reason: reason.into(), status: None }
	}

	/// Attaches the HTTP status observed on the refresh response.
	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);

		self
	}
}
