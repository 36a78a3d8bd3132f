//! Buffered request and response values carried through the pipeline.

// crates.io
use reqwest::{
	Method, RequestBuilder, StatusCode,
	header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, body_preview},
	rate_limit::DimensionKey,
	transport::{AMZN_REQUEST_ID_HEADER, RATE_LIMIT_HEADER},
};

/// Outbound request with a fully buffered body.
///
/// Requests are cloned for every retry attempt, so the body is re-sent intact.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute URL.
	pub url: Url,
	/// Request headers.
	pub headers: HeaderMap,
	/// Buffered body.
	pub body: Option<Vec<u8>>,
	/// Rate budget this request draws from; `None` skips rate limiting.
	pub rate_limit_key: Option<DimensionKey>,
	/// Forces restricted-data-token signing regardless of the path.
	pub restricted: bool,
}
impl ApiRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self {
			method,
			url,
			headers: HeaderMap::new(),
			body: None,
			rate_limit_key: None,
			restricted: false,
		}
	}

	/// `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// `PUT` request.
	pub fn put(url: Url) -> Self {
		Self::new(Method::PUT, url)
	}

	/// `PATCH` request.
	pub fn patch(url: Url) -> Self {
		Self::new(Method::PATCH, url)
	}

	/// `DELETE` request.
	pub fn delete(url: Url) -> Self {
		Self::new(Method::DELETE, url)
	}

	/// Adds or replaces a header.
	pub fn header(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
		self.set_header(name, value)?;

		Ok(self)
	}

	/// Appends `key=value` to the query string.
	pub fn query(mut self, key: &str, value: &str) -> Self {
		self.url.query_pairs_mut().append_pair(key, value);

		self
	}

	/// Serializes `body` as JSON and sets `content-type`.
	pub fn json<T>(mut self, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let mut buf = Vec::new();
		let mut serializer = serde_json::Serializer::new(&mut buf);

		serde_path_to_error::serialize(body, &mut serializer)
			.map_err(|source| Error::Encode { source })?;

		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		self.body = Some(buf);

		Ok(self)
	}

	/// Sets a raw body.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Draws from the rate budget identified by `key`.
	pub fn rate_limited(mut self, key: DimensionKey) -> Self {
		self.rate_limit_key = Some(key);

		self
	}

	/// Marks the request as needing a restricted data token.
	pub fn restricted(mut self, restricted: bool) -> Self {
		self.restricted = restricted;

		self
	}

	/// Adds or replaces a header in place.
	pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
		let (name, value) = parse_header(name, value)?;

		self.headers.insert(name, value);

		Ok(())
	}

	/// Adds or replaces a header whose value must never be printed.
	pub fn set_sensitive_header(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
		let (name, mut value) = parse_header(name, value)?;

		value.set_sensitive(true);
		self.headers.insert(name, value);

		Ok(())
	}

	/// Returns a header value if present and valid UTF-8.
	pub fn header_value(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// URL path.
	pub fn path(&self) -> &str {
		self.url.path()
	}

	pub(crate) fn into_reqwest(self, client: &ReqwestClient) -> RequestBuilder {
		let builder = client.request(self.method, self.url).headers(self.headers);

		match self.body {
			Some(body) => builder.body(body),
			None => builder,
		}
	}
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
	let invalid = || ConfigError::InvalidHeader { name: name.to_owned() };
	let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
	let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;

	Ok((header_name, header_value))
}

/// Response with a fully buffered body.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Buffered body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates an empty response with `status`.
	pub fn new(status: StatusCode) -> Self {
		Self { status, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Returns true for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Returns a header value if present and valid UTF-8.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// Server rate hint (`x-amzn-RateLimit-Limit`).
	pub fn rate_limit_hint(&self) -> Option<&str> {
		self.header(RATE_LIMIT_HEADER)
	}

	/// Server request identifier (`x-amzn-RequestId`).
	pub fn request_id(&self) -> Option<&str> {
		self.header(AMZN_REQUEST_ID_HEADER)
	}

	/// Decodes the body as JSON, reporting the path of the first mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|source| Error::Decode { source })
	}

	/// Converts a non-2xx response into [`Error::Status`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(Error::Status { status: self.status.as_u16(), body: body_preview(&self.body) })
		}
	}
}
