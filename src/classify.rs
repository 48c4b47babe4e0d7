//! Pure classification of failed requests into the middleware's failure taxonomy.
//!
//! The backend signals auth problems through a 401 status plus a machine-readable
//! `message` code in its error envelope; everything the recovery logic decides hangs
//! off the [`FailureKind`] produced here. Classification is pure: no side effects, no
//! I/O, no state.

// self
use crate::{_prelude::*, error::TransportError, http::Response};

/// Backend message code signaling an expired access token.
pub const TOKEN_EXPIRED: &str = "token.expired";
/// Backend message code signaling an invalid access token.
pub const TOKEN_INVALID: &str = "token.invalid";

/// Structured error envelope returned by the backend alongside failure statuses.
#[derive(Clone, Debug, Deserialize)]
pub struct ErrorBody {
	/// Application-level message (or machine-readable code) describing the failure.
	#[serde(default)]
	pub message: Option<String>,
}

/// A failed request: either no response at all, or a response with a failure status.
#[derive(Debug)]
pub enum Failure {
	/// The transport gave up before producing a response.
	Transport(TransportError),
	/// The backend answered with a non-success status.
	Response(Response),
}
impl Failure {
	/// Converts the failure into the raw error propagated for non-auth kinds.
	pub fn into_error(self) -> Error {
		match self {
			Self::Transport(source) => Error::Network(source),
			Self::Response(response) => Error::Unexpected { status: response.status() },
		}
	}
}

/// Failure taxonomy produced by [`classify`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
	/// No response was received from the backend.
	Network,
	/// The access token was rejected as expired; recoverable via refresh.
	AuthExpired,
	/// The access token was rejected as invalid; recoverable via refresh.
	AuthInvalid,
	/// Authentication failed for a reason refresh cannot repair.
	AuthOther {
		/// Message from the error envelope, when one was present.
		message: Option<String>,
	},
	/// The backend rejected the request with an application-level message.
	Business {
		/// Message from the error envelope.
		message: String,
	},
	/// The failure carries no recognizable structure.
	Unknown,
}

/// Maps a failed request onto [`FailureKind`].
pub fn classify(failure: &Failure) -> FailureKind {
	let response = match failure {
		Failure::Transport(_) => return FailureKind::Network,
		Failure::Response(response) => response,
	};
	let message = response.json::<ErrorBody>().ok().and_then(|body| body.message);

	match (response.status(), message) {
		(401, Some(message)) if message == TOKEN_EXPIRED => FailureKind::AuthExpired,
		(401, Some(message)) if message == TOKEN_INVALID => FailureKind::AuthInvalid,
		(401, message) => FailureKind::AuthOther { message },
		(_, Some(message)) => FailureKind::Business { message },
		(_, None) => FailureKind::Unknown,
	}
}
