//! Transport primitives shared by the middleware and the refresh coordinator.
//!
//! [`RequestDescriptor`] is the immutable logical snapshot of a request: method, URL,
//! headers, and the body in its pre-encoding JSON form. [`WireRequest`] is the
//! transport encoding, derived freshly by [`RequestDescriptor::encode`] at every
//! dispatch, so a replay re-encodes from the logical body instead of re-serializing
//! already-encoded bytes. [`HttpTransport`] is the crate's only dependency on an HTTP
//! stack; the default reqwest-backed implementation lives behind the `reqwest`
//! feature.

// std
use std::ops::Deref;
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, error::TransportError};

/// Header carrying the bearer token; replaced wholesale on replay.
pub const AUTHORIZATION: &str = "authorization";

const CONTENT_TYPE: &str = "content-type";
const APPLICATION_JSON: &str = "application/json";

/// HTTP methods the middleware can issue and replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
	/// HTTP GET.
	Get,
	/// HTTP POST.
	Post,
	/// HTTP PUT.
	Put,
	/// HTTP PATCH.
	Patch,
	/// HTTP DELETE.
	Delete,
}
impl Method {
	/// Returns the canonical uppercase method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Response, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing middleware requests.
///
/// Implementations return a [`Response`] for every HTTP status the backend produces;
/// only connection-level failures (DNS, TCP, TLS, per-request timeout expiry) map to
/// [`TransportError`]. Per-request timeouts are the transport's responsibility, so an
/// expiry surfaces here as a network failure.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes one encoded request against the backend.
	fn execute(&self, request: WireRequest) -> TransportFuture<'_>;
}

/// Immutable logical snapshot of a request, sufficient to re-issue it.
///
/// Header names are normalized to lowercase so the `Authorization` substitution on
/// replay can never leave a stale duplicate behind.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
	method: Method,
	url: Url,
	headers: BTreeMap<String, String>,
	body: Option<serde_json::Value>,
}
impl RequestDescriptor {
	/// Starts a descriptor for the provided method and URL.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: BTreeMap::new(), body: None }
	}

	/// Convenience constructor for GET requests.
	pub fn get(url: Url) -> Self {
		Self::new(Method::Get, url)
	}

	/// Convenience constructor for POST requests.
	pub fn post(url: Url) -> Self {
		Self::new(Method::Post, url)
	}

	/// Adds or replaces a header. Names are stored lowercase.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Attaches the logical JSON body; the wire encoding is derived at dispatch time.
	pub fn with_body(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Method this request uses.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Target URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Lowercase header map attached to every dispatch of this request.
	pub fn headers(&self) -> &BTreeMap<String, String> {
		&self.headers
	}

	/// Logical body, when one is attached.
	pub fn body(&self) -> Option<&serde_json::Value> {
		self.body.as_ref()
	}

	/// Encodes the logical request into its wire form, substituting the provided bearer
	/// token into the `Authorization` header.
	///
	/// Encoding happens freshly on every call: the body bytes are always derived from
	/// the logical JSON value, never from a previous attempt's encoding.
	pub fn encode(&self, bearer: Option<&str>) -> WireRequest {
		let mut headers = self.headers.clone();

		if let Some(token) = bearer {
			headers.insert(AUTHORIZATION.into(), format!("Bearer {token}"));
		}

		let body = self.body.as_ref().map(|value| {
			headers.entry(CONTENT_TYPE.into()).or_insert_with(|| APPLICATION_JSON.into());

			value.to_string().into_bytes()
		});

		WireRequest { method: self.method, url: self.url.clone(), headers, body }
	}
}

/// Transport encoding of a [`RequestDescriptor`], produced at dispatch time.
#[derive(Clone, Debug)]
pub struct WireRequest {
	/// HTTP method token.
	pub method: Method,
	/// Target URL.
	pub url: Url,
	/// Complete lowercase header set, including the substituted `Authorization` header.
	pub headers: BTreeMap<String, String>,
	/// Encoded body bytes, present when the descriptor carries a logical body.
	pub body: Option<Vec<u8>>,
}

/// Response surfaced by a transport: status, headers, and raw body bytes.
#[derive(Clone, Debug)]
pub struct Response {
	status: u16,
	headers: BTreeMap<String, String>,
	body: Vec<u8>,
}
impl Response {
	/// Builds a response from its parts. Header names are normalized to lowercase.
	pub fn new(status: u16, headers: BTreeMap<String, String>, body: impl Into<Vec<u8>>) -> Self {
		let headers =
			headers.into_iter().map(|(name, value)| (name.to_ascii_lowercase(), value)).collect();

		Self { status, headers, body: body.into() }
	}

	/// HTTP status code.
	pub fn status(&self) -> u16 {
		self.status
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Looks up a header value; names are lowercase.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).map(String::as_str)
	}

	/// Raw body bytes.
	pub fn body(&self) -> &[u8] {
		&self.body
	}

	/// Deserializes the body as JSON, reporting the failing path on malformed payloads.
	pub fn json<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// TLS, redirect policy, and per-request timeouts are all configured on the inner
/// [`ReqwestClient`]; a timeout expiry surfaces as a [`TransportError`] and is treated
/// by the middleware as a network failure rather than an auth concern.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: WireRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Patch => reqwest::Method::PATCH,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut builder = client.request(method, request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(Response::new(status, headers, body))
		})
	}
}
