//! HTTP transport used for Login-with-Amazon token exchanges.
//!
//! [`TokenHttpClient`] is the seam between the `oauth2` client and an HTTP stack. Each exchange
//! hands the transport a fresh [`ResponseMetadataSlot`]; the transport records what it observed
//! (status, OAuth error fields) so failures and 2xx-with-error bodies can be classified after
//! `oauth2` resolves.

// std
use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
// self
use crate::_prelude::*;

/// HTTP transport capable of executing token exchanges while publishing response metadata.
///
/// Implementations are shared behind `Arc` and hand out short-lived [`AsyncHttpClient`]
/// handles. Handles own whatever state their request futures need so those futures stay `Send`.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds a handle that records outcomes in `slot`.
	///
	/// Handles must clear the slot before sending and store metadata once the response status
	/// is known.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// OAuth `error` fields found in a token endpoint body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct OAuthErrorBody {
	/// OAuth `error` code.
	#[serde(default)]
	pub error: String,
	/// OAuth `error_description`, if supplied.
	#[serde(default)]
	pub error_description: Option<String>,
}
impl OAuthErrorBody {
	/// Extracts a populated `error` field from a JSON body.
	pub fn from_body(body: &[u8]) -> Option<Self> {
		serde_json::from_slice::<Self>(body).ok().filter(|parsed| !parsed.error.is_empty())
	}
}

/// Metadata captured from the most recent token endpoint response.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// OAuth error fields present in the body, even on a 2xx status.
	pub oauth_error: Option<OAuthErrorBody>,
}

/// Thread-safe slot shared between a transport handle and the exchange's error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns and clears the captured metadata.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Reqwest-backed [`TokenHttpClient`].
///
/// The wrapped client should not follow redirects; [`PoolConfig::build_client`](crate::config::PoolConfig::build_client)
/// configures that for clients built by this crate.
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Wraps an existing reqwest client, sharing its connection pool.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle(Arc::new(InstrumentedInner { client: self.0.clone(), slot }))
	}
}

struct InstrumentedInner {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that records response metadata.
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedInner>);
impl Debug for InstrumentedHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("InstrumentedHandle(..)")
	}
}
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			inner.slot.take();

			let response = inner
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(Box::new)?.to_vec();

			inner.slot.store(ResponseMetadata {
				status: Some(status.as_u16()),
				oauth_error: OAuthErrorBody::from_body(&body),
			});

			let mut converted = HttpResponse::new(body);

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn oauth_error_body_requires_populated_error() {
		let parsed = OAuthErrorBody::from_body(
			br#"{"error":"invalid_grant","error_description":"The refresh token is invalid."}"#,
		)
		.expect("Populated error fields should parse.");

		assert_eq!(parsed.error, "invalid_grant");
		assert_eq!(parsed.error_description.as_deref(), Some("The refresh token is invalid."));
		assert!(OAuthErrorBody::from_body(br#"{"error":""}"#).is_none());
		assert!(OAuthErrorBody::from_body(br#"{"access_token":"a"}"#).is_none());
		assert!(OAuthErrorBody::from_body(b"not json").is_none());
	}

	#[test]
	fn metadata_slot_take_clears() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(400), oauth_error: None });

		assert_eq!(slot.take().and_then(|meta| meta.status), Some(400));
		assert!(slot.take().is_none());
	}
}
