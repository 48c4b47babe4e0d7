//! Authentication-aware HTTP middleware: attach bearer tokens, coalesce concurrent
//! token refreshes into a single network call, replay failed requests with the renewed
//! credential, and fail over to a sign-out hook when the session cannot be recovered.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod classify;
pub mod client;
pub mod error;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod store;
pub mod token;

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
